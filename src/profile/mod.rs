pub mod types;
pub mod validation;

pub use types::{Gender, PatientProfile, RawProfile, SmokingHistory, TunableFeature};
pub use validation::{profile_issues, validate_profile, FieldRange, ValidationIssue};
