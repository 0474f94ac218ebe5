use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::api::types::ExplanationEntry;
use crate::profile::PatientProfile;

/// Scores below this are Low.
pub const LOW_RISK_UPPER: f64 = 0.33;
/// Scores below this (and at least `LOW_RISK_UPPER`) are Medium.
pub const MEDIUM_RISK_UPPER: f64 = 0.66;

/// Explanations shown by default.
pub const DEFAULT_DISPLAY_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Gauge bands. Boundary scores belong to the upper band.
    pub fn from_score(score: f64) -> Self {
        if score < LOW_RISK_UPPER {
            RiskLevel::Low
        } else if score < MEDIUM_RISK_UPPER {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// Interpret a backend label. "Moderate" names the middle band.
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        let normalized = normalized.trim_end_matches(" risk");
        match normalized {
            "low" => Some(RiskLevel::Low),
            "medium" | "moderate" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

/// One feature's contribution to the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub feature: String,
    pub impact_score: f64,
    pub description: String,
}

impl Explanation {
    pub fn label(&self) -> &str {
        feature_label(&self.feature)
    }

    pub fn increases_risk(&self) -> bool {
        self.impact_score > 0.0
    }
}

/// Readable name for a model feature; unknown features are shown as is.
pub fn feature_label(feature: &str) -> &str {
    match feature {
        "age" => "Age",
        "gender" => "Gender",
        "bmi" => "BMI",
        "hypertension" => "Hypertension",
        "heart_disease" => "Heart Disease",
        "smoking_history" => "Smoking History",
        "HbA1c_level" => "HbA1c Level",
        "blood_glucose_level" => "Blood Glucose",
        "BMI_Age_Interaction" => "BMI & Age Synergy",
        "Glucose_HbA1c_Interaction" => "Glucose & HbA1c Synergy",
        "BMI_Category" => "BMI Category",
        other => other,
    }
}

/// Non-fatal problems recorded while building an assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AssessmentWarning {
    /// The explanation call failed; the assessment has no explanations.
    ExplanationsUnavailable(String),
    /// The backend's level label disagrees with the local thresholds.
    RiskLevelMismatch { backend: String, local: RiskLevel },
}

/// The merged result of prediction and explanation for one profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    #[serde(skip)]
    profile: Arc<PatientProfile>,
    risk_score: f64,
    risk_level: RiskLevel,
    backend_risk_level: String,
    explanations: Vec<Explanation>,
    warnings: Vec<AssessmentWarning>,
}

impl RiskAssessment {
    pub(crate) fn new(
        profile: Arc<PatientProfile>,
        risk_score: f64,
        backend_risk_level: String,
        explanations: Vec<Explanation>,
        warnings: Vec<AssessmentWarning>,
    ) -> Self {
        Self {
            profile,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            backend_risk_level,
            explanations,
            warnings,
        }
    }

    pub fn profile(&self) -> &Arc<PatientProfile> {
        &self.profile
    }

    pub fn risk_score(&self) -> f64 {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn backend_risk_level(&self) -> &str {
        &self.backend_risk_level
    }

    /// All explanations, strongest first.
    pub fn explanations(&self) -> &[Explanation] {
        &self.explanations
    }

    /// The strongest `limit` explanations.
    pub fn display_explanations(&self, limit: usize) -> &[Explanation] {
        &self.explanations[..self.explanations.len().min(limit)]
    }

    pub fn warnings(&self) -> &[AssessmentWarning] {
        &self.warnings
    }

    pub fn explanations_unavailable(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, AssessmentWarning::ExplanationsUnavailable(_)))
    }
}

/// A generated clinical narrative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalReport {
    pub report: String,
    pub pdf_url: Option<String>,
}

/// Drop non-finite impacts, keep one entry per feature (the strongest), and
/// order by descending absolute impact.
pub fn merge_explanations(entries: Vec<ExplanationEntry>) -> Vec<Explanation> {
    let mut by_feature: HashMap<String, Explanation> = HashMap::new();

    for entry in entries {
        if !entry.impact_score.is_finite() || entry.feature.trim().is_empty() {
            continue;
        }
        let candidate = Explanation {
            feature: entry.feature,
            impact_score: entry.impact_score,
            description: entry.impact_description,
        };
        match by_feature.get(&candidate.feature) {
            Some(existing) if existing.impact_score.abs() >= candidate.impact_score.abs() => {}
            _ => {
                by_feature.insert(candidate.feature.clone(), candidate);
            }
        }
    }

    let mut merged: Vec<Explanation> = by_feature.into_values().collect();
    merged.sort_by(|a, b| {
        b.impact_score
            .abs()
            .partial_cmp(&a.impact_score.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    merged
}
