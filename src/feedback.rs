use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::types::FeedbackRequest;
use crate::api::RiskApi;
use crate::profile::PatientProfile;

/// Clinician agreement with a prediction, optionally with the confirmed
/// diagnosis (0 or 1).
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicianFeedback {
    pub agreed: bool,
    pub notes: String,
    pub actual_diagnosis: Option<u8>,
}

/// Fire-and-forget feedback delivery. Nothing is retried and no state
/// changes on failure.
pub struct FeedbackSubmitter {
    api: Arc<dyn RiskApi>,
}

impl FeedbackSubmitter {
    pub fn new(api: Arc<dyn RiskApi>) -> Self {
        Self { api }
    }

    /// Send in the background. The handle may be dropped.
    pub fn submit(
        &self,
        profile: &PatientProfile,
        risk_score: f64,
        feedback: ClinicianFeedback,
    ) -> JoinHandle<()> {
        let request = FeedbackRequest {
            patient_data: profile.clone(),
            predicted_risk: risk_score,
            agreed: feedback.agreed,
            clinician_notes: feedback.notes,
            actual_diagnosis: feedback.actual_diagnosis.filter(|d| *d <= 1),
        };
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            match api.feedback(&request).await {
                Ok(()) => info!(
                    "Feedback recorded (agreed: {}, score {:.3})",
                    request.agreed, request.predicted_risk
                ),
                Err(e) => warn!("Failed to submit feedback: {}", e),
            }
        })
    }
}
