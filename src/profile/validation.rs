use tracing::debug;

use crate::error::RiskDashError;

use super::types::{Gender, PatientProfile, RawProfile, SmokingHistory};

/// Declared clinical range for a numeric profile field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

pub const AGE_RANGE: FieldRange = FieldRange { field: "age", min: 0.0, max: 120.0 };
pub const BMI_RANGE: FieldRange = FieldRange { field: "bmi", min: 10.0, max: 100.0 };
pub const HBA1C_RANGE: FieldRange = FieldRange { field: "HbA1c_level", min: 2.0, max: 20.0 };
pub const GLUCOSE_RANGE: FieldRange = FieldRange {
    field: "blood_glucose_level",
    min: 50.0,
    max: 500.0,
};

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl From<ValidationIssue> for RiskDashError {
    fn from(issue: ValidationIssue) -> Self {
        RiskDashError::Validation {
            field: issue.field,
            message: issue.message,
        }
    }
}

/// Check every field of a raw profile and report all problems, in field order.
pub fn profile_issues(raw: &RawProfile) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if Gender::parse(&raw.gender).is_none() {
        issues.push(ValidationIssue {
            field: "gender".to_string(),
            message: format!("'{}' is not one of Male, Female, Other", raw.gender),
        });
    }

    check_range(&mut issues, AGE_RANGE, raw.age);
    check_flag(&mut issues, "hypertension", raw.hypertension);
    check_flag(&mut issues, "heart_disease", raw.heart_disease);

    if SmokingHistory::parse(&raw.smoking_history).is_none() {
        issues.push(ValidationIssue {
            field: "smoking_history".to_string(),
            message: format!("'{}' is not a known smoking history", raw.smoking_history),
        });
    }

    check_range(&mut issues, BMI_RANGE, raw.bmi);
    check_range(&mut issues, HBA1C_RANGE, raw.hba1c_level);
    check_range(&mut issues, GLUCOSE_RANGE, raw.blood_glucose_level);

    issues
}

/// Normalize and range-check a raw profile. Fails on the first invalid field.
pub fn validate_profile(raw: &RawProfile) -> Result<PatientProfile, RiskDashError> {
    if let Some(issue) = profile_issues(raw).into_iter().next() {
        debug!("Profile rejected: {} ({})", issue.field, issue.message);
        return Err(issue.into());
    }

    // Both parses succeeded above.
    let gender = Gender::parse(&raw.gender)
        .ok_or_else(|| RiskDashError::validation("gender", "unrecognized value"))?;
    let smoking_history = SmokingHistory::parse(&raw.smoking_history)
        .ok_or_else(|| RiskDashError::validation("smoking_history", "unrecognized value"))?;

    Ok(PatientProfile::from_checked(
        gender,
        raw.age,
        raw.hypertension as u8,
        raw.heart_disease as u8,
        smoking_history,
        raw.bmi,
        raw.hba1c_level,
        raw.blood_glucose_level,
    ))
}

fn check_range(issues: &mut Vec<ValidationIssue>, range: FieldRange, value: f64) {
    if !value.is_finite() {
        issues.push(ValidationIssue {
            field: range.field.to_string(),
            message: format!("value {} is not a finite number", value),
        });
    } else if !range.contains(value) {
        issues.push(ValidationIssue {
            field: range.field.to_string(),
            message: format!("{} out of range ({}-{})", value, range.min, range.max),
        });
    }
}

fn check_flag(issues: &mut Vec<ValidationIssue>, field: &str, value: i64) {
    if value != 0 && value != 1 {
        issues.push(ValidationIssue {
            field: field.to_string(),
            message: format!("{} must be 0 or 1", value),
        });
    }
}
