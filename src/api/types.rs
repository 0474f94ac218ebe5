//! Request and response bodies of the risk services. Field names are the
//! compatibility surface and must not change.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::profile::PatientProfile;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictResponse {
    pub risk_score: f64,
    pub risk_level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExplanationEntry {
    pub feature: String,
    pub impact_score: f64,
    #[serde(default)]
    pub impact_description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExplainResponse {
    #[serde(default)]
    pub explanations: Vec<ExplanationEntry>,
}

/// Body of `/simulate` and `/simulate/report`. Modifications are absolute
/// values keyed by wire field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulateRequest {
    pub patient: PatientProfile,
    pub modifications: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulateResponse {
    pub original_risk: f64,
    pub new_risk: f64,
    pub risk_reduction: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportResponse {
    pub report: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CohortAnalysisResponse {
    #[serde(default)]
    pub percentiles: HashMap<String, f64>,
}

/// A retrieved neighbor record. Only the displayed fields are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalTwin {
    pub age: f64,
    pub bmi: f64,
    #[serde(rename = "HbA1c_level")]
    pub hba1c_level: f64,
    pub diabetes: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_glucose_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoking_history: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TwinsResponse {
    #[serde(default)]
    pub twins: Vec<DigitalTwin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAssessment {
    pub score: f64,
    #[serde(default)]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub timestamp: String,
    #[serde(default)]
    pub patient_data: serde_json::Value,
    pub risk_assessment: RecordedAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub velocity: f64,
    pub status: String,
}

/// `/history` answers either with a bare array or with a wrapper object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryPayload {
    Bare(Vec<TrendRecord>),
    Wrapped {
        history: Vec<TrendRecord>,
        #[serde(default)]
        trend_analysis: Option<TrendAnalysis>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub patient_data: PatientProfile,
    pub predicted_risk: f64,
    pub agreed: bool,
    pub clinician_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_diagnosis: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
}
