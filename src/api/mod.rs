pub mod http_client;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::profile::PatientProfile;

pub use self::http_client::HttpRiskApi;
use self::types::{
    CohortAnalysisResponse, ExplainResponse, FeedbackRequest, HealthStatus, HistoryPayload,
    PredictResponse, ReportResponse, SimulateRequest, SimulateResponse, TwinsResponse,
};

/// The remote services the dashboard core orchestrates.
///
/// Every call is an independent suspension point with no ordering guarantee
/// relative to other calls. Errors are human-readable messages; callers map
/// them into the crate's error taxonomy according to each call's policy.
#[async_trait]
pub trait RiskApi: Send + Sync {
    async fn predict(&self, profile: &PatientProfile) -> Result<PredictResponse, String>;

    async fn explain(&self, profile: &PatientProfile) -> Result<ExplainResponse, String>;

    async fn simulate(&self, request: &SimulateRequest) -> Result<SimulateResponse, String>;

    async fn report(&self, profile: &PatientProfile) -> Result<ReportResponse, String>;

    async fn simulation_report(&self, request: &SimulateRequest) -> Result<ReportResponse, String>;

    async fn cohort_analysis(&self, profile: &PatientProfile) -> Result<CohortAnalysisResponse, String>;

    async fn cohort_twins(&self, profile: &PatientProfile) -> Result<TwinsResponse, String>;

    async fn history(&self, limit: usize) -> Result<HistoryPayload, String>;

    async fn feedback(&self, request: &FeedbackRequest) -> Result<(), String>;

    async fn health(&self) -> Result<HealthStatus, String>;
}
