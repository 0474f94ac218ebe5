use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::types::SimulateRequest;
use crate::api::RiskApi;
use crate::assessment::ClinicalReport;
use crate::error::RiskDashError;
use crate::guard::{Generation, GenerationCounter, Outcome};
use crate::profile::{PatientProfile, TunableFeature};

use super::types::{
    Narrative, ScenarioPhase, ScenarioSnapshot, SimulationResult, SimulationScenario,
};

struct EngineState {
    profile: Option<Arc<PatientProfile>>,
    scenario: SimulationScenario,
    phase: ScenarioPhase,
    generations: GenerationCounter,
    result: Option<SimulationResult>,
    error: Option<RiskDashError>,
    narrative: Option<Narrative>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every mutation; a timer only fires if it is still the latest.
    timer_seq: u64,
    disposed: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            profile: None,
            scenario: SimulationScenario::identity(),
            phase: ScenarioPhase::Idle,
            generations: GenerationCounter::new(),
            result: None,
            error: None,
            narrative: None,
            timer: None,
            timer_seq: 0,
            disposed: false,
        }
    }

    fn cancel_timer(&mut self) {
        self.timer_seq += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn clear(&mut self) {
        self.cancel_timer();
        self.generations.invalidate();
        self.scenario = SimulationScenario::identity();
        self.phase = ScenarioPhase::Idle;
        self.result = None;
        self.error = None;
        self.narrative = None;
    }

    fn request_for(&self, profile: &PatientProfile) -> SimulateRequest {
        SimulateRequest {
            patient: profile.clone(),
            modifications: self.scenario.absolute(profile).modifications(),
        }
    }
}

/// What-if simulation for the assessed profile.
///
/// Mutations are debounced: a simulate call is issued only once the scenario
/// has been quiet for the debounce window, and only the response to the most
/// recently issued call is ever applied. Must be driven from inside a tokio
/// runtime.
pub struct ScenarioEngine {
    api: Arc<dyn RiskApi>,
    debounce: Duration,
    state: Arc<Mutex<EngineState>>,
}

impl ScenarioEngine {
    pub fn new(api: Arc<dyn RiskApi>, debounce: Duration) -> Self {
        Self {
            api,
            debounce,
            state: Arc::new(Mutex::new(EngineState::new())),
        }
    }

    fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point the engine at a new profile (or none). The scenario returns to
    /// identity and anything pending or in flight is dropped.
    pub fn reset(&self, profile: Option<Arc<PatientProfile>>) {
        let mut state = Self::lock(&self.state);
        if state.disposed {
            return;
        }
        state.clear();
        state.profile = profile;
        debug!("Scenario reset (profile loaded: {})", state.profile.is_some());
    }

    /// Change one feature's delta and restart the debounce window.
    pub fn set_delta(&self, feature: TunableFeature, delta: f64) -> Result<(), RiskDashError> {
        let mut state = Self::lock(&self.state);
        if state.disposed {
            debug!("Ignoring scenario change after dispose");
            return Ok(());
        }
        if state.profile.is_none() {
            return Err(RiskDashError::Simulation(
                "No assessment loaded to simulate against".to_string(),
            ));
        }

        let mut scenario = state.scenario.clone();
        scenario.set(feature, delta)?;
        if scenario == state.scenario {
            return Ok(());
        }
        state.scenario = scenario;

        if state.narrative.take().is_some() {
            debug!("Scenario changed, dropping narrative");
        }

        state.cancel_timer();
        state.phase = ScenarioPhase::Debouncing;

        let seq = state.timer_seq;
        let debounce = self.debounce;
        let shared = Arc::clone(&self.state);
        let api = Arc::clone(&self.api);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            Self::dispatch(shared, api, seq);
        }));
        Ok(())
    }

    /// Runs when the debounce window closes. The request itself goes to a
    /// separate task so a later mutation cannot cancel it mid-flight.
    fn dispatch(shared: Arc<Mutex<EngineState>>, api: Arc<dyn RiskApi>, seq: u64) {
        let mut state = Self::lock(&shared);
        if state.disposed || state.timer_seq != seq {
            return;
        }
        state.timer = None;

        let Some(profile) = state.profile.clone() else {
            state.phase = ScenarioPhase::Idle;
            return;
        };

        if state.scenario.is_identity() {
            state.generations.invalidate();
            state.result = None;
            state.error = None;
            state.phase = ScenarioPhase::Settled;
            debug!("Identity scenario, nothing to simulate");
            return;
        }

        let generation = state.generations.issue();
        let request = state.request_for(&profile);
        state.phase = ScenarioPhase::Requesting;
        drop(state);

        info!(
            "Simulating generation {} with {:?}",
            generation.value(),
            request.modifications
        );
        tokio::spawn(async move {
            Self::run_simulation(shared, api, generation, request).await;
        });
    }

    async fn run_simulation(
        shared: Arc<Mutex<EngineState>>,
        api: Arc<dyn RiskApi>,
        generation: Generation,
        request: SimulateRequest,
    ) -> Outcome<()> {
        let response = api.simulate(&request).await;

        let mut state = Self::lock(&shared);
        if state.disposed || !state.generations.is_current(generation) {
            debug!(
                "Discarding simulation result for superseded generation {}",
                generation.value()
            );
            return Outcome::Discarded;
        }

        match response
            .map_err(RiskDashError::Simulation)
            .and_then(|r| SimulationResult::from_response(r, generation))
        {
            Ok(result) => {
                info!(
                    "Simulation settled: {:.3} -> {:.3} (reduction {:.3})",
                    result.original_risk, result.new_risk, result.risk_reduction
                );
                state.result = Some(result);
                state.error = None;
            }
            Err(e) => {
                warn!("Simulation failed: {}", e);
                state.result = None;
                state.error = Some(e);
            }
        }
        // A mutation during the request restarted the debounce window; the
        // engine stays Debouncing until that scenario is simulated.
        if state.timer.is_none() {
            state.phase = ScenarioPhase::Settled;
        } else {
            debug!("Scenario changed while simulating, awaiting the next request");
        }
        Outcome::Applied(())
    }

    /// Narrative for the settled scenario. Cached until the scenario changes;
    /// failure is reported inline and leaves the simulation result alone.
    pub async fn analyze_scenario(&self) -> Result<ClinicalReport, RiskDashError> {
        let (profile, scenario, request) = {
            let state = Self::lock(&self.state);
            if state.disposed {
                return Err(RiskDashError::PartialFailure(
                    "Scenario engine disposed".to_string(),
                ));
            }
            let Some(profile) = state.profile.clone() else {
                return Err(RiskDashError::PartialFailure(
                    "No assessment loaded".to_string(),
                ));
            };
            if state.phase != ScenarioPhase::Settled || state.result.is_none() {
                return Err(RiskDashError::PartialFailure(
                    "Run a simulation before requesting an analysis".to_string(),
                ));
            }
            if let Some(narrative) = &state.narrative {
                if narrative.scenario == state.scenario {
                    return Ok(narrative.report.clone());
                }
            }
            let request = state.request_for(&profile);
            (profile, state.scenario.clone(), request)
        };

        info!("Requesting scenario analysis for {:?}", request.modifications);
        let response = self.api.simulation_report(&request).await.map_err(|e| {
            warn!("Scenario analysis failed: {}", e);
            RiskDashError::PartialFailure(format!("Scenario analysis failed: {}", e))
        })?;
        let report = ClinicalReport {
            report: response.report,
            pdf_url: response.pdf_url,
        };

        let mut state = Self::lock(&self.state);
        let still_current = !state.disposed
            && state.scenario == scenario
            && state
                .profile
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &profile));
        if still_current {
            state.narrative = Some(Narrative {
                scenario,
                report: report.clone(),
            });
        } else {
            debug!("Scenario moved on during analysis, narrative not kept");
        }
        Ok(report)
    }

    pub fn snapshot(&self) -> ScenarioSnapshot {
        let state = Self::lock(&self.state);
        ScenarioSnapshot {
            phase: state.phase,
            scenario: state.scenario.clone(),
            result: state.result.clone(),
            error: state.error.clone(),
            narrative: state.narrative.as_ref().map(|n| n.report.clone()),
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        Self::lock(&self.state).phase
    }

    pub fn result(&self) -> Option<SimulationResult> {
        Self::lock(&self.state).result.clone()
    }

    pub fn scenario(&self) -> SimulationScenario {
        Self::lock(&self.state).scenario.clone()
    }

    /// Cancel pending work; every later response is dropped.
    pub fn dispose(&self) {
        let mut state = Self::lock(&self.state);
        if state.disposed {
            return;
        }
        state.clear();
        state.profile = None;
        state.disposed = true;
        debug!("Scenario engine disposed");
    }
}

impl Drop for ScenarioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{sample_profile, FakeApi};
    use crate::scenario::types::REDUCTION_TOLERANCE;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn engine(api: &Arc<FakeApi>) -> ScenarioEngine {
        let engine = ScenarioEngine::new(api.clone(), DEBOUNCE);
        engine.reset(Some(Arc::new(sample_profile())));
        engine
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_sends_one_request() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        for delta in [-1.0, -2.0, -3.0, -4.0, -5.0] {
            engine.set_delta(TunableFeature::Bmi, delta).unwrap();
            advance(20).await;
        }
        assert_eq!(engine.phase(), ScenarioPhase::Debouncing);
        assert_eq!(api.simulate_call_count(), 0);

        advance(600).await;
        assert_eq!(api.simulate_call_count(), 1, "debounce should coalesce the burst");
        let request = api.last_simulate().unwrap();
        assert_eq!(request.modifications.len(), 1);
        assert_eq!(request.modifications.get("bmi"), Some(&25.0));
        assert_eq!(engine.phase(), ScenarioPhase::Settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bmi_reduction_worked_example() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        advance(600).await;

        let result = engine.result().expect("simulation should settle");
        assert_eq!(result.original_risk, 0.62);
        assert!((result.new_risk - 0.57).abs() < 1e-9);
        assert!((result.risk_reduction - (result.original_risk - result.new_risk)).abs() < REDUCTION_TOLERANCE);
        assert!(!result.integrity_mismatch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_scenario_skips_request() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        advance(100).await;
        engine.set_delta(TunableFeature::Bmi, 0.0).unwrap();
        advance(600).await;

        assert_eq!(api.simulate_call_count(), 0);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, ScenarioPhase::Settled);
        assert!(snapshot.result.is_none());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_returning_to_identity_clears_result() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::HbA1c, -1.0).unwrap();
        advance(600).await;
        assert!(engine.result().is_some());

        engine.set_delta(TunableFeature::HbA1c, 0.0).unwrap();
        advance(600).await;
        assert!(engine.result().is_none());
        assert!(engine.snapshot().error.is_none());
        assert_eq!(api.simulate_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_for_older_scenario_is_discarded() {
        let api = Arc::new(FakeApi::new());
        api.push_simulate_latency(Duration::from_millis(2000));
        api.push_simulate_latency(Duration::from_millis(100));
        let engine = engine(&api);

        // A: issued at 500ms, resolves at 2500ms.
        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        advance(600).await;
        assert_eq!(engine.phase(), ScenarioPhase::Requesting);

        // B: issued at 1100ms, resolves at 1200ms.
        engine.set_delta(TunableFeature::Bmi, -8.0).unwrap();
        advance(700).await;
        let after_b = engine.result().expect("B should be applied");
        assert!((after_b.new_risk - 0.54).abs() < 1e-9);

        advance(1500).await;
        assert_eq!(api.simulate_call_count(), 2);
        let final_result = engine.result().unwrap();
        assert_eq!(final_result, after_b, "A resolved last but must not overwrite B");
        assert_eq!(engine.phase(), ScenarioPhase::Settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_bounds_delta_rejected() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        assert!(engine.set_delta(TunableFeature::Bmi, 2.0).is_err());
        assert!(engine.set_delta(TunableFeature::BloodGlucose, -55.0).is_err());
        assert!(engine.scenario().is_identity());
        assert_eq!(engine.phase(), ScenarioPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_delta_requires_profile() {
        let api = Arc::new(FakeApi::new());
        let engine = ScenarioEngine::new(api.clone(), DEBOUNCE);
        let err = engine.set_delta(TunableFeature::Bmi, -1.0).unwrap_err();
        assert!(matches!(err, RiskDashError::Simulation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_reduction_is_not_trusted() {
        let api = Arc::new(FakeApi::new());
        *api.reduction_skew.lock().unwrap() = 0.1;
        let engine = engine(&api);

        engine.set_delta(TunableFeature::BloodGlucose, -20.0).unwrap();
        advance(600).await;

        let result = engine.result().unwrap();
        assert!((result.risk_reduction - (result.original_risk - result.new_risk)).abs() < REDUCTION_TOLERANCE);
        assert!(result.integrity_mismatch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_failure_surfaces_error() {
        let api = Arc::new(FakeApi::new());
        *api.simulate_error.lock().unwrap() = Some("simulate returned HTTP 500".to_string());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::Bmi, -2.0).unwrap();
        advance(600).await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, ScenarioPhase::Settled);
        assert!(snapshot.result.is_none());
        assert_eq!(
            snapshot.error,
            Some(RiskDashError::Simulation("simulate returned HTTP 500".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_drops_in_flight_response() {
        let api = Arc::new(FakeApi::new());
        api.push_simulate_latency(Duration::from_millis(1000));
        let engine = engine(&api);

        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        advance(600).await;
        engine.reset(Some(Arc::new(sample_profile())));
        advance(2000).await;

        let snapshot = engine.snapshot();
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.phase, ScenarioPhase::Idle);
        assert!(snapshot.scenario.is_identity());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending_timer() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        engine.dispose();
        advance(1000).await;
        assert_eq!(api.simulate_call_count(), 0);

        engine.set_delta(TunableFeature::Bmi, -1.0).unwrap();
        advance(1000).await;
        assert_eq!(api.simulate_call_count(), 0);
        assert!(engine.scenario().is_identity());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_requires_settled_result() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        let err = engine.analyze_scenario().await.unwrap_err();
        assert!(matches!(err, RiskDashError::PartialFailure(_)));

        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        let err = engine.analyze_scenario().await.unwrap_err();
        assert!(matches!(err, RiskDashError::PartialFailure(_)), "debouncing scenario is not settled");
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_during_debounce_does_not_settle() {
        let api = Arc::new(FakeApi::new());
        api.push_simulate_latency(Duration::from_millis(1000));
        let engine = engine(&api);

        // Issued at 500ms, resolves at 1500ms.
        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        advance(1300).await;
        engine.set_delta(TunableFeature::Bmi, -8.0).unwrap();
        advance(300).await;

        assert_eq!(api.simulate_call_count(), 1);
        assert_eq!(engine.phase(), ScenarioPhase::Debouncing);
        let err = engine.analyze_scenario().await.unwrap_err();
        assert!(matches!(err, RiskDashError::PartialFailure(_)));
        assert!(api.simulation_report_calls.lock().unwrap().is_empty());
        assert!(engine.snapshot().narrative.is_none());

        advance(300).await;
        assert_eq!(api.simulate_call_count(), 2);
        assert_eq!(engine.phase(), ScenarioPhase::Settled);
        assert!((engine.result().unwrap().new_risk - 0.54).abs() < 1e-9);

        engine.analyze_scenario().await.unwrap();
        let calls = api.simulation_report_calls.lock().unwrap();
        assert_eq!(calls[0].modifications.get("bmi"), Some(&22.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_cached_until_scenario_changes() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::Bmi, -5.0).unwrap();
        advance(600).await;

        let first = engine.analyze_scenario().await.unwrap();
        let second = engine.analyze_scenario().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.simulation_report_calls.lock().unwrap().len(), 1);
        assert_eq!(
            api.simulation_report_calls.lock().unwrap()[0].modifications.get("bmi"),
            Some(&25.0)
        );
        assert!(engine.snapshot().narrative.is_some());

        engine.set_delta(TunableFeature::Bmi, -6.0).unwrap();
        assert!(engine.snapshot().narrative.is_none(), "narrative belongs to the old scenario");

        advance(600).await;
        engine.analyze_scenario().await.unwrap();
        assert_eq!(api.simulation_report_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_failure_keeps_result() {
        let api = Arc::new(FakeApi::new());
        *api.simulation_report.lock().unwrap() = Err("LLM offline".to_string());
        let engine = engine(&api);

        engine.set_delta(TunableFeature::HbA1c, -0.5).unwrap();
        advance(600).await;

        let err = engine.analyze_scenario().await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(engine.result().is_some());
        assert!(engine.snapshot().narrative.is_none());
    }
}
