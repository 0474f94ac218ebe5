use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskDashError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Prediction unavailable: {0}")]
    PredictionUnavailable(String),

    #[error("Partial failure: {0}")]
    PartialFailure(String),

    #[error("Cohort context unavailable: {0}")]
    CohortUnavailable(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl RiskDashError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        RiskDashError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Fatal errors halt the owning component's pipeline; everything else
    /// degrades in place.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RiskDashError::PredictionUnavailable(_)
                | RiskDashError::Simulation(_)
                | RiskDashError::Config(_)
        )
    }
}

impl From<RiskDashError> for String {
    fn from(err: RiskDashError) -> Self {
        err.to_string()
    }
}
