pub mod api;
pub mod assessment;
pub mod cohort;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feedback;
pub mod guard;
pub mod profile;
pub mod scenario;
pub mod trend;

pub use api::{HttpRiskApi, RiskApi};
pub use assessment::{RiskAssessment, RiskLevel};
pub use config::DashboardConfig;
pub use dashboard::Dashboard;
pub use error::RiskDashError;
pub use profile::{PatientProfile, RawProfile, TunableFeature};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
