use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::RiskApi;
use crate::error::RiskDashError;
use crate::profile::PatientProfile;

use super::types::{merge_explanations, AssessmentWarning, ClinicalReport, RiskAssessment, RiskLevel};

/// Builds a `RiskAssessment` from the prediction and explanation services.
///
/// The two calls are issued together and are independent: a failed
/// prediction is fatal, a failed explanation only leaves the assessment
/// without explanations.
pub struct AssessmentCoordinator {
    api: Arc<dyn RiskApi>,
}

impl AssessmentCoordinator {
    pub fn new(api: Arc<dyn RiskApi>) -> Self {
        Self { api }
    }

    pub async fn assess(&self, profile: Arc<PatientProfile>) -> Result<RiskAssessment, RiskDashError> {
        info!(
            "Requesting assessment (age {}, bmi {}, HbA1c {}, glucose {})",
            profile.age(),
            profile.bmi(),
            profile.hba1c_level(),
            profile.blood_glucose_level()
        );

        let (prediction, explanation) =
            tokio::join!(self.api.predict(&profile), self.api.explain(&profile));

        let prediction = prediction.map_err(|e| {
            error!("Prediction failed: {}", e);
            RiskDashError::PredictionUnavailable(e)
        })?;

        let score = prediction.risk_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            let msg = format!("risk_score {} is outside [0, 1]", score);
            error!("Prediction rejected: {}", msg);
            return Err(RiskDashError::PredictionUnavailable(msg));
        }

        let mut warnings = Vec::new();

        let local_level = RiskLevel::from_score(score);
        if RiskLevel::parse_label(&prediction.risk_level) != Some(local_level) {
            warn!(
                "Risk level mismatch for score {:.3}: backend '{}', thresholds give '{}'",
                score,
                prediction.risk_level,
                local_level.as_str()
            );
            warnings.push(AssessmentWarning::RiskLevelMismatch {
                backend: prediction.risk_level.clone(),
                local: local_level,
            });
        }

        let explanations = match explanation {
            Ok(response) => merge_explanations(response.explanations),
            Err(e) => {
                warn!("Could not fetch explanations, continuing without: {}", e);
                warnings.push(AssessmentWarning::ExplanationsUnavailable(e));
                Vec::new()
            }
        };

        info!(
            "Assessment ready: score {:.3} ({}), {} explanations, {} warnings",
            score,
            local_level.as_str(),
            explanations.len(),
            warnings.len()
        );

        Ok(RiskAssessment::new(
            profile,
            score,
            prediction.risk_level,
            explanations,
            warnings,
        ))
    }

    /// Generate the clinical narrative for an assessment. Failure leaves the
    /// assessment usable; the message is meant for inline display.
    pub async fn generate_report(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<ClinicalReport, RiskDashError> {
        info!("Requesting clinical report");
        let response = self.api.report(assessment.profile()).await.map_err(|e| {
            warn!("Report generation failed: {}", e);
            RiskDashError::PartialFailure(format!("Report generation failed: {}", e))
        })?;

        if response.report.trim().is_empty() {
            warn!("Report service returned an empty report");
            return Err(RiskDashError::PartialFailure(
                "Report service returned an empty report".to_string(),
            ));
        }

        Ok(ClinicalReport {
            report: response.report,
            pdf_url: response.pdf_url,
        })
    }
}
