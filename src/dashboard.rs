use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::types::HealthStatus;
use crate::api::{HttpRiskApi, RiskApi};
use crate::assessment::{AssessmentCoordinator, ClinicalReport, Explanation, RiskAssessment};
use crate::cohort::CohortAggregator;
use crate::config::DashboardConfig;
use crate::error::RiskDashError;
use crate::feedback::{ClinicianFeedback, FeedbackSubmitter};
use crate::guard::{GenerationCounter, Outcome};
use crate::profile::{validate_profile, RawProfile};
use crate::scenario::ScenarioEngine;
use crate::trend::TrendPoller;

pub type AssessmentWatch = watch::Receiver<Option<Arc<RiskAssessment>>>;

/// Owns the displayed assessment and every component that depends on it.
///
/// The assessment is published through a watch channel and replaced as a
/// whole; replacing it resets the scenario and refreshes the cohort context
/// before subscribers are notified.
pub struct Dashboard {
    config: DashboardConfig,
    api: Arc<dyn RiskApi>,
    coordinator: AssessmentCoordinator,
    scenario: ScenarioEngine,
    cohort: CohortAggregator,
    trend: TrendPoller,
    feedback: FeedbackSubmitter,
    current: watch::Sender<Option<Arc<RiskAssessment>>>,
    assessments: Mutex<GenerationCounter>,
    disposed: AtomicBool,
}

impl Dashboard {
    pub fn new(config: DashboardConfig, api: Arc<dyn RiskApi>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            coordinator: AssessmentCoordinator::new(Arc::clone(&api)),
            scenario: ScenarioEngine::new(Arc::clone(&api), config.debounce()),
            cohort: CohortAggregator::new(Arc::clone(&api)),
            trend: TrendPoller::new(Arc::clone(&api), config.poll_interval(), config.history_limit),
            feedback: FeedbackSubmitter::new(Arc::clone(&api)),
            current,
            assessments: Mutex::new(GenerationCounter::new()),
            disposed: AtomicBool::new(false),
            api,
            config,
        }
    }

    /// Dashboard backed by the HTTP services named in `config`.
    pub fn connect(config: DashboardConfig) -> Result<Self, RiskDashError> {
        config.validate()?;
        let api = HttpRiskApi::from_config(&config).map_err(RiskDashError::Config)?;
        info!("Dashboard connected to {}", api.base_url());
        Ok(Self::new(config, Arc::new(api)))
    }

    fn generations(&self) -> MutexGuard<'_, GenerationCounter> {
        self.assessments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Validate the form input, assess it and display the result. Invalid
    /// input never reaches the network; a failed assessment leaves the
    /// displayed one in place. Discarded once the dashboard is disposed.
    pub async fn assess(
        &self,
        raw: &RawProfile,
    ) -> Result<Outcome<Arc<RiskAssessment>>, RiskDashError> {
        let profile = Arc::new(validate_profile(raw)?);
        if self.is_disposed() {
            debug!("Dashboard disposed, not assessing");
            return Ok(Outcome::Discarded);
        }
        let generation = self.generations().issue();

        let assessment = self.coordinator.assess(profile).await?;

        if !self.generations().is_current(generation) {
            debug!(
                "Discarding assessment {} superseded while in flight",
                generation.value()
            );
            return Ok(Outcome::Discarded);
        }
        Ok(self.replace(assessment))
    }

    /// Make `assessment` the displayed one and fan out to dependents.
    pub fn replace(&self, assessment: RiskAssessment) -> Outcome<Arc<RiskAssessment>> {
        if self.is_disposed() {
            debug!("Dashboard disposed, assessment not displayed");
            return Outcome::Discarded;
        }
        let assessment = Arc::new(assessment);
        let profile = Arc::clone(assessment.profile());

        self.scenario.reset(Some(Arc::clone(&profile)));
        self.cohort.clear();
        self.cohort.refresh(profile);

        self.current.send_replace(Some(Arc::clone(&assessment)));
        info!(
            "Displaying assessment: score {:.3} ({})",
            assessment.risk_score(),
            assessment.risk_level().as_str()
        );
        Outcome::Applied(assessment)
    }

    /// Clear the displayed assessment and everything derived from it.
    pub fn start_new_assessment(&self) {
        self.generations().invalidate();
        self.scenario.reset(None);
        self.cohort.clear();
        self.current.send_replace(None);
        debug!("Dashboard cleared for a new assessment");
    }

    pub fn current(&self) -> Option<Arc<RiskAssessment>> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> AssessmentWatch {
        self.current.subscribe()
    }

    /// Explanations for the displayed assessment, capped at the configured limit.
    pub fn display_explanations(&self) -> Vec<Explanation> {
        self.current()
            .map(|a| a.display_explanations(self.config.explanation_display_limit).to_vec())
            .unwrap_or_default()
    }

    pub async fn generate_report(&self) -> Result<ClinicalReport, RiskDashError> {
        let Some(assessment) = self.current() else {
            return Err(RiskDashError::PartialFailure(
                "No assessment to report on".to_string(),
            ));
        };
        self.coordinator.generate_report(&assessment).await
    }

    /// Send clinician feedback on the displayed assessment. Returns None when
    /// nothing is displayed.
    pub fn submit_feedback(&self, feedback: ClinicianFeedback) -> Option<JoinHandle<()>> {
        let assessment = self.current()?;
        Some(
            self.feedback
                .submit(assessment.profile(), assessment.risk_score(), feedback),
        )
    }

    pub async fn health(&self) -> Result<HealthStatus, RiskDashError> {
        self.api.health().await.map_err(RiskDashError::Transport)
    }

    pub fn scenario(&self) -> &ScenarioEngine {
        &self.scenario
    }

    pub fn cohort(&self) -> &CohortAggregator {
        &self.cohort
    }

    pub fn trend(&self) -> &TrendPoller {
        &self.trend
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Stop every timer and drop every late response. Later assessments are
    /// discarded.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generations().invalidate();
        self.scenario.dispose();
        self.cohort.dispose();
        self.trend.deactivate();
        self.current.send_replace(None);
        info!("Dashboard disposed");
    }
}
