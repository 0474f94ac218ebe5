//! Command-line front end for the risk dashboard core.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::{sleep, Instant};

use riskdash::cohort::CohortStatus;
use riskdash::scenario::ScenarioPhase;
use riskdash::{Dashboard, DashboardConfig, RawProfile, TunableFeature};

const SETTLE_POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "riskdash")]
#[command(about = "Diabetes risk assessment against the prediction services")]
struct Cli {
    /// Override the API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the prediction service is up
    Health,

    /// Assess a patient profile, optionally with a what-if scenario
    Assess {
        /// Profile JSON, inline or a path to a file
        #[arg(short, long)]
        profile: String,

        /// BMI change (-10 to 0)
        #[arg(long, allow_hyphen_values = true)]
        bmi_delta: Option<f64>,

        /// HbA1c change (-3 to 0)
        #[arg(long, allow_hyphen_values = true)]
        hba1c_delta: Option<f64>,

        /// Blood glucose change (-50 to 0)
        #[arg(long, allow_hyphen_values = true)]
        glucose_delta: Option<f64>,

        /// Also generate the clinical report (and scenario analysis)
        #[arg(long)]
        report: bool,
    },

    /// Show the recent risk history and its velocity
    Trend {
        /// Number of records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    riskdash::init_tracing();
    let cli = Cli::parse();

    let mut config = DashboardConfig::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    let dashboard = Dashboard::connect(config)?;

    let outcome = match cli.command {
        Commands::Health => health(&dashboard).await,
        Commands::Assess {
            profile,
            bmi_delta,
            hba1c_delta,
            glucose_delta,
            report,
        } => {
            let deltas = [
                (TunableFeature::Bmi, bmi_delta),
                (TunableFeature::HbA1c, hba1c_delta),
                (TunableFeature::BloodGlucose, glucose_delta),
            ];
            assess(&dashboard, &profile, &deltas, report).await
        }
        Commands::Trend { limit } => trend(&dashboard, limit).await,
    };

    dashboard.dispose();
    outcome
}

async fn health(dashboard: &Dashboard) -> Result<()> {
    let status = dashboard.health().await?;
    println!(
        "Service: {} (model loaded: {})",
        status.status,
        if status.model_loaded { "yes" } else { "no" }
    );
    Ok(())
}

fn read_profile(arg: &str) -> Result<RawProfile> {
    let json = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(Path::new(arg))
            .with_context(|| format!("Failed to read profile file {}", arg))?
    };
    serde_json::from_str(&json).context("Profile is not valid JSON")
}

async fn assess(
    dashboard: &Dashboard,
    profile: &str,
    deltas: &[(TunableFeature, Option<f64>)],
    report: bool,
) -> Result<()> {
    let raw = read_profile(profile)?;
    let Some(assessment) = dashboard.assess(&raw).await?.applied() else {
        bail!("Assessment was superseded");
    };

    println!(
        "Risk: {:.1}% ({})",
        assessment.risk_score() * 100.0,
        assessment.risk_level().as_str()
    );
    for warning in assessment.warnings() {
        println!("  warning: {:?}", warning);
    }
    for explanation in dashboard.display_explanations() {
        println!(
            "  {:<24} {:+.3}  {}",
            explanation.label(),
            explanation.impact_score,
            explanation.description
        );
    }

    let deadline = Instant::now() + dashboard.config().request_timeout();
    while dashboard.cohort().status() == CohortStatus::Loading && Instant::now() < deadline {
        sleep(SETTLE_POLL).await;
    }
    match dashboard.cohort().snapshot() {
        Some(cohort) => {
            for (feature, percentile) in cohort.percentiles() {
                println!("  {} percentile: {:.1}", feature, percentile);
            }
            if let Some(rate) = cohort.twin_diabetes_rate() {
                println!(
                    "  {} similar patients, {:.0}% diagnosed",
                    cohort.twins().len(),
                    rate * 100.0
                );
            }
        }
        None => println!("  cohort context unavailable"),
    }

    let mut simulated = false;
    for (feature, delta) in deltas {
        if let Some(delta) = delta {
            dashboard.scenario().set_delta(*feature, *delta)?;
            simulated = true;
        }
    }

    if simulated {
        let deadline = Instant::now() + dashboard.config().debounce() + dashboard.config().request_timeout();
        while matches!(
            dashboard.scenario().phase(),
            ScenarioPhase::Debouncing | ScenarioPhase::Requesting
        ) && Instant::now() < deadline
        {
            sleep(SETTLE_POLL).await;
        }
        let snapshot = dashboard.scenario().snapshot();
        match (snapshot.result, snapshot.error) {
            (Some(result), _) => println!(
                "Scenario: {:.1}% -> {:.1}% (reduction {:.1} points)",
                result.original_risk * 100.0,
                result.new_risk * 100.0,
                result.risk_reduction * 100.0
            ),
            (None, Some(err)) => println!("Scenario failed: {}", err),
            (None, None) => println!("Scenario: no change"),
        }
    }

    if report {
        match dashboard.generate_report().await {
            Ok(report) => {
                println!("\n{}", report.report);
                if let Some(url) = report.pdf_url {
                    println!("PDF: {}", url);
                }
            }
            Err(e) => println!("\n{}", e),
        }
        if simulated {
            match dashboard.scenario().analyze_scenario().await {
                Ok(narrative) => println!("\n{}", narrative.report),
                Err(e) => println!("\n{}", e),
            }
        }
    }

    Ok(())
}

async fn trend(dashboard: &Dashboard, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(dashboard.config().history_limit);
    let Some(series) = dashboard.trend().poll(limit).await? else {
        println!("No assessments recorded yet");
        return Ok(());
    };

    let velocity = series.velocity();
    println!("{} (v={})", velocity.label, velocity.velocity);
    if let Some(latest) = series.latest() {
        println!(
            "Latest: {:.1}% ({})",
            latest.risk_assessment.score * 100.0,
            latest.risk_assessment.level
        );
    }
    for point in series.chart_points() {
        println!("  {:>2}  {}  {:5.1}%", point.index, point.time_label, point.risk_percent);
    }
    Ok(())
}
