use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};
use url::Url;

use crate::config::DashboardConfig;
use crate::profile::PatientProfile;

use super::types::{
    CohortAnalysisResponse, ExplainResponse, FeedbackRequest, HealthStatus, HistoryPayload,
    PredictResponse, ReportResponse, SimulateRequest, SimulateResponse, TwinsResponse,
};
use super::RiskApi;

const USER_AGENT: &str = "riskdash/0.1";

/// Maximum characters of an error body echoed into messages.
const ERROR_BODY_LIMIT: usize = 300;

/// reqwest-backed client for the risk services.
pub struct HttpRiskApi {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpRiskApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        // A trailing slash makes Url::join append to the path instead of replacing it.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| format!("Invalid API base URL '{}': {}", base_url, e))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self, String> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| format!("Invalid endpoint path '{}': {}", path, e))
    }

    pub fn history_url(&self, limit: usize) -> Result<Url, String> {
        let mut url = self.endpoint("history")?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        Ok(url)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, String>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let body_text = handle_api_response(response, path).await?;
        decode(&body_text, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, label: &str) -> Result<T, String> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let body_text = handle_api_response(response, label).await?;
        decode(&body_text, label)
    }

    fn transport_error(&self, url: &Url, e: reqwest::Error) -> String {
        let msg = if e.is_timeout() {
            format!("Request to {} timed out after {}s", url, self.timeout.as_secs())
        } else if e.is_connect() {
            format!("Could not connect to {}. Is the risk service running?", url)
        } else {
            format!("Request to {} failed: {}", url, e)
        };
        error!("{}", msg);
        msg
    }
}

/// Return the body of a 2xx response, or a descriptive error with the
/// status and the start of the body.
async fn handle_api_response(response: reqwest::Response, label: &str) -> Result<String, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read {} response body: {}", label, e))?;

    if !status.is_success() {
        let msg = format!(
            "{} returned HTTP {} {}: {}",
            label,
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            truncate(&body, ERROR_BODY_LIMIT)
        );
        error!("{}", msg);
        return Err(msg);
    }

    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &str, label: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|e| {
        let msg = format!(
            "Unexpected {} response shape: {}. Body: {}",
            label,
            e,
            truncate(body, ERROR_BODY_LIMIT)
        );
        error!("{}", msg);
        msg
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[async_trait]
impl RiskApi for HttpRiskApi {
    async fn predict(&self, profile: &PatientProfile) -> Result<PredictResponse, String> {
        self.post_json("predict", profile).await
    }

    async fn explain(&self, profile: &PatientProfile) -> Result<ExplainResponse, String> {
        self.post_json("explain", profile).await
    }

    async fn simulate(&self, request: &SimulateRequest) -> Result<SimulateResponse, String> {
        self.post_json("simulate", request).await
    }

    async fn report(&self, profile: &PatientProfile) -> Result<ReportResponse, String> {
        self.post_json("report", profile).await
    }

    async fn simulation_report(&self, request: &SimulateRequest) -> Result<ReportResponse, String> {
        self.post_json("simulate/report", request).await
    }

    async fn cohort_analysis(&self, profile: &PatientProfile) -> Result<CohortAnalysisResponse, String> {
        self.post_json("cohort/analysis", profile).await
    }

    async fn cohort_twins(&self, profile: &PatientProfile) -> Result<TwinsResponse, String> {
        self.post_json("cohort/twins", profile).await
    }

    async fn history(&self, limit: usize) -> Result<HistoryPayload, String> {
        let url = self.history_url(limit)?;
        self.get_json(url, "history").await
    }

    async fn feedback(&self, request: &FeedbackRequest) -> Result<(), String> {
        let url = self.endpoint("feedback/")?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        handle_api_response(response, "feedback").await?;
        info!("Clinician feedback recorded");
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus, String> {
        let url = self.endpoint("health")?;
        self.get_json(url, "health").await
    }
}
