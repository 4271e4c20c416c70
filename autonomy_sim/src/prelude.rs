// autonomy_sim/src/prelude.rs

pub use crate::config::{MissionStep, NoiseSettings, Scenario, SimulationSettings, VehicleSettings};
pub use crate::drone::{FlightPhase, SimLink, SimulatedDrone, TruthState};
pub use crate::error::SimError;
pub use crate::runner::{run_scenario, SimReport};
pub use crate::sensors::TelemetrySynth;

pub use autonomy_core::prelude::*;
