use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::api::types::SimulateResponse;
use crate::assessment::ClinicalReport;
use crate::error::RiskDashError;
use crate::guard::Generation;
use crate::profile::{PatientProfile, TunableFeature};

/// Allowed tolerance between a reported risk reduction and
/// `original_risk - new_risk`.
pub const REDUCTION_TOLERANCE: f64 = 1e-9;

/// Slider range for one tunable feature. Deltas only ever improve a factor,
/// so `max` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl DeltaBounds {
    pub fn contains(&self, delta: f64) -> bool {
        delta.is_finite() && delta >= self.min && delta <= self.max
    }
}

pub fn delta_bounds(feature: TunableFeature) -> DeltaBounds {
    match feature {
        TunableFeature::Bmi => DeltaBounds { min: -10.0, max: 0.0, step: 0.5 },
        TunableFeature::HbA1c => DeltaBounds { min: -3.0, max: 0.0, step: 0.1 },
        TunableFeature::BloodGlucose => DeltaBounds { min: -50.0, max: 0.0, step: 5.0 },
    }
}

/// Hypothetical changes to a patient's tunable risk factors, as deltas from
/// the profile values. Zero deltas are not stored, so two scenarios with the
/// same effective changes compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationScenario {
    deltas: BTreeMap<TunableFeature, f64>,
}

impl SimulationScenario {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn delta(&self, feature: TunableFeature) -> f64 {
        self.deltas.get(&feature).copied().unwrap_or(0.0)
    }

    /// Set a delta, rejecting values outside the feature's bounds.
    pub fn set(&mut self, feature: TunableFeature, delta: f64) -> Result<(), RiskDashError> {
        let bounds = delta_bounds(feature);
        if !bounds.contains(delta) {
            return Err(RiskDashError::validation(
                feature.key(),
                format!(
                    "delta {} outside allowed range ({} to {})",
                    delta, bounds.min, bounds.max
                ),
            ));
        }
        if delta == 0.0 {
            self.deltas.remove(&feature);
        } else {
            self.deltas.insert(feature, delta);
        }
        Ok(())
    }

    pub fn is_identity(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Absolute target values for the changed features. Not clamped: the
    /// simulation service decides whether a target is clinically valid.
    pub fn absolute(&self, profile: &PatientProfile) -> AbsoluteScenario {
        AbsoluteScenario {
            values: self
                .deltas
                .iter()
                .map(|(feature, delta)| (*feature, profile.value_of(*feature) + delta))
                .collect(),
        }
    }
}

/// Profile value plus delta, for changed features only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AbsoluteScenario {
    values: BTreeMap<TunableFeature, f64>,
}

impl AbsoluteScenario {
    pub fn value(&self, feature: TunableFeature) -> Option<f64> {
        self.values.get(&feature).copied()
    }

    /// Keyed by wire field name, as the simulation endpoints expect.
    pub fn modifications(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .map(|(feature, value)| (feature.key().to_string(), *value))
            .collect()
    }
}

/// A simulation outcome, tagged with the generation of its request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub original_risk: f64,
    pub new_risk: f64,
    /// Always `original_risk - new_risk`.
    pub risk_reduction: f64,
    /// What the service reported, kept for diagnostics.
    pub reported_reduction: f64,
    #[serde(skip)]
    pub generation: Generation,
}

impl SimulationResult {
    pub fn from_response(
        response: SimulateResponse,
        generation: Generation,
    ) -> Result<Self, RiskDashError> {
        for (name, value) in [
            ("original_risk", response.original_risk),
            ("new_risk", response.new_risk),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RiskDashError::Simulation(format!(
                    "{} {} is outside [0, 1]",
                    name, value
                )));
            }
        }

        let risk_reduction = response.original_risk - response.new_risk;
        if !response.risk_reduction.is_finite()
            || (response.risk_reduction - risk_reduction).abs() > REDUCTION_TOLERANCE
        {
            warn!(
                "Simulation integrity check failed: reported reduction {} but {} - {} = {}; using computed value",
                response.risk_reduction, response.original_risk, response.new_risk, risk_reduction
            );
        }

        Ok(Self {
            original_risk: response.original_risk,
            new_risk: response.new_risk,
            risk_reduction,
            reported_reduction: response.risk_reduction,
            generation,
        })
    }

    /// True when the service's reported reduction disagreed with the identity.
    pub fn integrity_mismatch(&self) -> bool {
        !self.reported_reduction.is_finite()
            || (self.reported_reduction - self.risk_reduction).abs() > REDUCTION_TOLERANCE
    }
}

/// AI narrative for a specific scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub scenario: SimulationScenario,
    pub report: ClinicalReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScenarioPhase {
    /// No simulation pending or displayed.
    Idle,
    /// Waiting for the input to go quiet.
    Debouncing,
    /// A simulate call for the latest scenario is in flight.
    Requesting,
    /// The latest request resolved (result or error).
    Settled,
}

/// Point-in-time view of the engine for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSnapshot {
    pub phase: ScenarioPhase,
    pub scenario: SimulationScenario,
    pub result: Option<SimulationResult>,
    pub error: Option<RiskDashError>,
    pub narrative: Option<ClinicalReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::sample_profile;
    use crate::guard::GenerationCounter;

    #[test]
    fn test_bounds_per_feature() {
        assert_eq!(delta_bounds(TunableFeature::Bmi).min, -10.0);
        assert_eq!(delta_bounds(TunableFeature::HbA1c).step, 0.1);
        assert_eq!(delta_bounds(TunableFeature::BloodGlucose).min, -50.0);
        for feature in TunableFeature::ALL {
            assert_eq!(delta_bounds(feature).max, 0.0);
        }
    }

    #[test]
    fn test_set_rejects_out_of_bounds() {
        let mut scenario = SimulationScenario::identity();
        assert!(scenario.set(TunableFeature::Bmi, 1.0).is_err());
        assert!(scenario.set(TunableFeature::Bmi, -10.5).is_err());
        assert!(scenario.set(TunableFeature::HbA1c, f64::NAN).is_err());
        assert!(scenario.is_identity());

        let err = scenario.set(TunableFeature::BloodGlucose, -60.0).unwrap_err();
        assert!(
            matches!(err, RiskDashError::Validation { ref field, .. } if field == "blood_glucose_level")
        );
    }

    #[test]
    fn test_zero_delta_removes_feature() {
        let mut scenario = SimulationScenario::identity();
        scenario.set(TunableFeature::Bmi, -5.0).unwrap();
        assert!(!scenario.is_identity());
        scenario.set(TunableFeature::Bmi, 0.0).unwrap();
        assert!(scenario.is_identity());
        assert_eq!(scenario, SimulationScenario::identity());
    }

    #[test]
    fn test_absolute_only_includes_changed_features() {
        let profile = sample_profile();
        let mut scenario = SimulationScenario::identity();
        scenario.set(TunableFeature::Bmi, -5.0).unwrap();

        let absolute = scenario.absolute(&profile);
        assert_eq!(absolute.value(TunableFeature::Bmi), Some(25.0));
        assert_eq!(absolute.value(TunableFeature::HbA1c), None);

        let mods = absolute.modifications();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods.get("bmi"), Some(&25.0));
    }

    #[test]
    fn test_absolute_is_not_clamped() {
        let mut raw = crate::api::fake::sample_raw();
        raw.bmi = 12.0;
        let profile = PatientProfile::try_from(raw).unwrap();
        let mut scenario = SimulationScenario::identity();
        scenario.set(TunableFeature::Bmi, -10.0).unwrap();
        // 12 - 10 = 2 is below the profile's BMI range; still sent as is.
        assert_eq!(scenario.absolute(&profile).value(TunableFeature::Bmi), Some(2.0));
    }

    #[test]
    fn test_reduction_identity_enforced() {
        let mut counter = GenerationCounter::new();
        let response = SimulateResponse {
            original_risk: 0.62,
            new_risk: 0.48,
            risk_reduction: 0.5,
        };
        let result = SimulationResult::from_response(response, counter.issue()).unwrap();
        assert!((result.risk_reduction - (0.62 - 0.48)).abs() < REDUCTION_TOLERANCE);
        assert_eq!(result.reported_reduction, 0.5);
        assert!(result.integrity_mismatch());
    }

    #[test]
    fn test_consistent_response_passes_integrity() {
        let mut counter = GenerationCounter::new();
        let response = SimulateResponse {
            original_risk: 0.62,
            new_risk: 0.57,
            risk_reduction: 0.62 - 0.57,
        };
        let result = SimulationResult::from_response(response, counter.issue()).unwrap();
        assert!(!result.integrity_mismatch());
    }

    #[test]
    fn test_out_of_range_risk_rejected() {
        let mut counter = GenerationCounter::new();
        let response = SimulateResponse {
            original_risk: 0.62,
            new_risk: -0.1,
            risk_reduction: 0.72,
        };
        let err = SimulationResult::from_response(response, counter.issue()).unwrap_err();
        assert!(matches!(err, RiskDashError::Simulation(ref m) if m.contains("new_risk")));
    }
}
