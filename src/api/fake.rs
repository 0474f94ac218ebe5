//! In-memory `RiskApi` for unit tests: scripted responses, call recording and
//! per-call latency (driven by tokio's paused clock).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::profile::{PatientProfile, RawProfile, TunableFeature};

use super::types::{
    CohortAnalysisResponse, DigitalTwin, ExplainResponse, ExplanationEntry, FeedbackRequest,
    HealthStatus, HistoryPayload, PredictResponse, ReportResponse, SimulateRequest,
    SimulateResponse, TwinsResponse,
};
use super::RiskApi;

/// Risk change per unit of improvement, per feature, in the fake model.
const RISK_PER_UNIT: f64 = 0.01;

pub(crate) struct FakeApi {
    pub predict: Mutex<Result<PredictResponse, String>>,
    pub predict_latencies: Mutex<VecDeque<Duration>>,
    pub explain: Mutex<Result<ExplainResponse, String>>,
    pub simulate_error: Mutex<Option<String>>,
    /// Added to the reported `risk_reduction` to exercise integrity checks.
    pub reduction_skew: Mutex<f64>,
    pub simulate_latencies: Mutex<VecDeque<Duration>>,
    pub simulate_calls: Mutex<Vec<SimulateRequest>>,
    pub report: Mutex<Result<ReportResponse, String>>,
    pub simulation_report: Mutex<Result<ReportResponse, String>>,
    pub simulation_report_calls: Mutex<Vec<SimulateRequest>>,
    pub analysis: Mutex<Result<CohortAnalysisResponse, String>>,
    pub twins: Mutex<Result<TwinsResponse, String>>,
    pub analysis_latencies: Mutex<VecDeque<Duration>>,
    pub history: Mutex<Result<HistoryPayload, String>>,
    pub history_latency: Mutex<Duration>,
    pub feedback: Mutex<Result<(), String>>,
    pub feedback_calls: Mutex<Vec<FeedbackRequest>>,
    pub predict_calls: AtomicUsize,
    pub explain_calls: AtomicUsize,
    pub cohort_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            predict: Mutex::new(Ok(PredictResponse {
                risk_score: 0.62,
                risk_level: "Moderate".to_string(),
            })),
            predict_latencies: Mutex::new(VecDeque::new()),
            explain: Mutex::new(Ok(ExplainResponse {
                explanations: vec![
                    entry("HbA1c_level", 0.31),
                    entry("blood_glucose_level", 0.22),
                    entry("bmi", -0.05),
                ],
            })),
            simulate_error: Mutex::new(None),
            reduction_skew: Mutex::new(0.0),
            simulate_latencies: Mutex::new(VecDeque::new()),
            simulate_calls: Mutex::new(Vec::new()),
            report: Mutex::new(Ok(ReportResponse {
                report: "Patient shows elevated glycemic markers.".to_string(),
                pdf_url: Some("/reports/r1.pdf".to_string()),
            })),
            simulation_report: Mutex::new(Ok(ReportResponse {
                report: "Lowering BMI reduces projected risk.".to_string(),
                pdf_url: None,
            })),
            simulation_report_calls: Mutex::new(Vec::new()),
            analysis: Mutex::new(Ok(CohortAnalysisResponse {
                percentiles: HashMap::from([
                    ("bmi_percentile".to_string(), 82.5),
                    ("HbA1c_level_percentile".to_string(), 71.0),
                    ("age_percentile".to_string(), 55.2),
                ]),
            })),
            twins: Mutex::new(Ok(TwinsResponse {
                twins: vec![twin(49.0, 29.5, 6.9, 1), twin(52.0, 30.4, 7.1, 0)],
            })),
            analysis_latencies: Mutex::new(VecDeque::new()),
            history: Mutex::new(Ok(HistoryPayload::Bare(Vec::new()))),
            history_latency: Mutex::new(Duration::ZERO),
            feedback: Mutex::new(Ok(())),
            feedback_calls: Mutex::new(Vec::new()),
            predict_calls: AtomicUsize::new(0),
            explain_calls: AtomicUsize::new(0),
            cohort_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn simulate_call_count(&self) -> usize {
        self.simulate_calls.lock().unwrap().len()
    }

    pub fn last_simulate(&self) -> Option<SimulateRequest> {
        self.simulate_calls.lock().unwrap().last().cloned()
    }

    pub fn push_predict_latency(&self, latency: Duration) {
        self.predict_latencies.lock().unwrap().push_back(latency);
    }

    pub fn push_simulate_latency(&self, latency: Duration) {
        self.simulate_latencies.lock().unwrap().push_back(latency);
    }

    pub fn push_analysis_latency(&self, latency: Duration) {
        self.analysis_latencies.lock().unwrap().push_back(latency);
    }
}

pub(crate) fn entry(feature: &str, impact: f64) -> ExplanationEntry {
    ExplanationEntry {
        feature: feature.to_string(),
        impact_score: impact,
        impact_description: format!("{} contributes {:+.2}", feature, impact),
    }
}

pub(crate) fn twin(age: f64, bmi: f64, hba1c: f64, diabetes: u8) -> DigitalTwin {
    DigitalTwin {
        age,
        bmi,
        hba1c_level: hba1c,
        diabetes,
        gender: None,
        blood_glucose_level: None,
        smoking_history: None,
    }
}

/// The worked example profile: 50 year old male, BMI 30, HbA1c 7.0, glucose 150.
pub(crate) fn sample_profile() -> PatientProfile {
    PatientProfile::try_from(sample_raw()).expect("sample profile is valid")
}

pub(crate) fn sample_raw() -> RawProfile {
    RawProfile {
        gender: "Male".to_string(),
        age: 50.0,
        hypertension: 0,
        heart_disease: 0,
        smoking_history: "never".to_string(),
        bmi: 30.0,
        hba1c_level: 7.0,
        blood_glucose_level: 150.0,
    }
}

#[async_trait]
impl RiskApi for FakeApi {
    async fn predict(&self, _profile: &PatientProfile) -> Result<PredictResponse, String> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.predict_latencies.lock().unwrap().pop_front();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.predict.lock().unwrap().clone()
    }

    async fn explain(&self, _profile: &PatientProfile) -> Result<ExplainResponse, String> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        self.explain.lock().unwrap().clone()
    }

    async fn simulate(&self, request: &SimulateRequest) -> Result<SimulateResponse, String> {
        self.simulate_calls.lock().unwrap().push(request.clone());
        let latency = self.simulate_latencies.lock().unwrap().pop_front();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.simulate_error.lock().unwrap().clone() {
            return Err(err);
        }

        let original = self.predict.lock().unwrap().as_ref().map(|p| p.risk_score).unwrap_or(0.5);
        let improvement: f64 = request
            .modifications
            .iter()
            .filter_map(|(key, value)| {
                TunableFeature::from_key(key).map(|f| request.patient.value_of(f) - value)
            })
            .sum();
        let new_risk = (original - improvement * RISK_PER_UNIT).clamp(0.0, 1.0);
        let skew = *self.reduction_skew.lock().unwrap();
        Ok(SimulateResponse {
            original_risk: original,
            new_risk,
            risk_reduction: original - new_risk + skew,
        })
    }

    async fn report(&self, _profile: &PatientProfile) -> Result<ReportResponse, String> {
        self.report.lock().unwrap().clone()
    }

    async fn simulation_report(&self, request: &SimulateRequest) -> Result<ReportResponse, String> {
        self.simulation_report_calls.lock().unwrap().push(request.clone());
        self.simulation_report.lock().unwrap().clone()
    }

    async fn cohort_analysis(&self, _profile: &PatientProfile) -> Result<CohortAnalysisResponse, String> {
        self.cohort_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.analysis_latencies.lock().unwrap().pop_front();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.analysis.lock().unwrap().clone()
    }

    async fn cohort_twins(&self, _profile: &PatientProfile) -> Result<TwinsResponse, String> {
        self.twins.lock().unwrap().clone()
    }

    async fn history(&self, _limit: usize) -> Result<HistoryPayload, String> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.history_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.history.lock().unwrap().clone()
    }

    async fn feedback(&self, request: &FeedbackRequest) -> Result<(), String> {
        self.feedback_calls.lock().unwrap().push(request.clone());
        self.feedback.lock().unwrap().clone()
    }

    async fn health(&self) -> Result<HealthStatus, String> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            model_loaded: true,
        })
    }
}
