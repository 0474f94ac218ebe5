pub mod engine;
pub mod types;

pub use engine::ScenarioEngine;
pub use types::{
    delta_bounds, AbsoluteScenario, DeltaBounds, ScenarioPhase, ScenarioSnapshot,
    SimulationResult, SimulationScenario,
};
