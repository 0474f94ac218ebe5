pub mod coordinator;
pub mod types;

pub use coordinator::AssessmentCoordinator;
pub use types::{
    feature_label, AssessmentWarning, ClinicalReport, Explanation, RiskAssessment, RiskLevel,
};
