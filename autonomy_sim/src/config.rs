// autonomy_sim/src/config.rs

//! Scenario files: everything a headless run needs, parsed from TOML.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use autonomy_core::clock::Clock;
use autonomy_core::config::AutonomyConfig;
use autonomy_core::link::VehicleLink;
use autonomy_core::mission::Mission;
use autonomy_core::types::{Goal, Pose};

use crate::error::SimError;

/// Seed used when a scenario does not pin one.
pub const DEFAULT_SEED: u64 = 42;

// =========================================================================
// == Top-Level Scenario ==
// =========================================================================

/// The root of a `scenario.toml` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub vehicle: VehicleSettings,
    #[serde(default)]
    pub noise: NoiseSettings,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    // The TOML has `[[mission]]`, one table per step.
    #[serde(default)]
    pub mission: Vec<MissionStep>,
}

impl Scenario {
    /// Loads a scenario file, with `AUTONOMY_`-prefixed environment
    /// variables layered on top (`AUTONOMY_SIMULATION__SEED=7`).
    pub fn load(path: &Path) -> Result<Self, SimError> {
        tracing::info!("Loading scenario from: {}", path.display());
        let scenario: Scenario = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AUTONOMY_").split("__"))
            .extract()?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, SimError> {
        let scenario: Scenario = toml::from_str(source)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        self.simulation.validate()?;
        self.vehicle.validate()?;
        self.noise.validate()?;
        self.autonomy.validate()?;
        for (index, step) in self.mission.iter().enumerate() {
            step.validate()
                .map_err(|msg| SimError::InvalidScenario(format!("mission step {index}: {msg}")))?;
        }

        let period = 1.0 / self.simulation.telemetry_rate_hz;
        let nominal = self.autonomy.estimator.sample_period_s;
        if (period - nominal).abs() > 1e-6 {
            tracing::warn!(
                period,
                nominal,
                "telemetry period differs from the estimator's sample period; dead reckoning will drift"
            );
        }
        Ok(())
    }

    /// Builds the mission the scenario describes.
    pub fn build_mission<L: VehicleLink, C: Clock>(&self) -> Result<Mission<L, C>, SimError> {
        self.mission
            .iter()
            .enumerate()
            .try_fold(Mission::new(), |mission, (index, step)| {
                step.append_to(mission).map_err(|msg| {
                    SimError::InvalidScenario(format!("mission step {index}: {msg}"))
                })
            })
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    /// Optional seed for the noise generator, for determinism.
    pub seed: Option<u64>,
    /// Upper bound on simulated time, in seconds.
    pub duration_seconds: f64,
    pub telemetry_rate_hz: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: None,
            duration_seconds: 60.0,
            telemetry_rate_hz: 15.0,
        }
    }
}

impl SimulationSettings {
    fn validate(&self) -> Result<(), SimError> {
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            return Err(SimError::InvalidScenario(
                "simulation.duration_seconds must be positive".to_string(),
            ));
        }
        if !(self.telemetry_rate_hz.is_finite() && self.telemetry_rate_hz > 0.0) {
            return Err(SimError::InvalidScenario(
                "simulation.telemetry_rate_hz must be positive".to_string(),
            ));
        }
        self.telemetry_period()?;
        Ok(())
    }

    pub fn seed_or_default(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    pub fn telemetry_period(&self) -> Result<Duration, SimError> {
        Duration::try_from_secs_f64(1.0 / self.telemetry_rate_hz).map_err(|e| {
            SimError::InvalidScenario(format!(
                "simulation.telemetry_rate_hz of {} gives no usable period: {e}",
                self.telemetry_rate_hz
            ))
        })
    }
}

/// Kinematic limits of the simulated quadrotor. A full-scale command on an
/// axis moves the vehicle at the matching maximum rate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleSettings {
    /// True starting pose on the ground.
    pub start: Pose,
    /// m/s
    pub max_horizontal_speed: f64,
    /// m/s
    pub max_vertical_speed: f64,
    /// rad/s
    pub max_yaw_rate: f64,
    /// Altitude the vehicle climbs to on takeoff, m.
    pub takeoff_altitude: f64,
    /// Time a takeoff or landing takes, s.
    pub transition_seconds: f64,
}

impl Default for VehicleSettings {
    fn default() -> Self {
        Self {
            start: Pose::origin(),
            max_horizontal_speed: 1.0,
            max_vertical_speed: 0.7,
            max_yaw_rate: 100f64.to_radians(),
            takeoff_altitude: 1.0,
            transition_seconds: 1.0,
        }
    }
}

impl VehicleSettings {
    fn validate(&self) -> Result<(), SimError> {
        let limits = [
            ("max_horizontal_speed", self.max_horizontal_speed),
            ("max_vertical_speed", self.max_vertical_speed),
            ("max_yaw_rate", self.max_yaw_rate),
            ("takeoff_altitude", self.takeoff_altitude),
        ];
        for (name, value) in limits {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidScenario(format!(
                    "vehicle.{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.transition_seconds.is_finite() && self.transition_seconds >= 0.0) {
            return Err(SimError::InvalidScenario(
                "vehicle.transition_seconds cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Standard deviations of the zero-mean Gaussian noise added to telemetry.
/// All zero (the default) gives perfect sensors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseSettings {
    pub velocity_mm_s: f64,
    pub yaw_deg: f64,
    pub altitude_m: f64,
    /// Noise on the detected marker centre, in detection-grid pixels.
    pub marker_px: f64,
    /// Probability that a marker in view goes undetected on a given sample.
    pub marker_dropout: f64,
}

impl NoiseSettings {
    fn validate(&self) -> Result<(), SimError> {
        let deviations = [
            ("velocity_mm_s", self.velocity_mm_s),
            ("yaw_deg", self.yaw_deg),
            ("altitude_m", self.altitude_m),
            ("marker_px", self.marker_px),
        ];
        for (name, value) in deviations {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimError::InvalidScenario(format!(
                    "noise.{name} must be a non-negative standard deviation, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.marker_dropout) {
            return Err(SimError::InvalidScenario(
                "noise.marker_dropout must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// =========================================================================
// == Mission Steps ==
// =========================================================================

/// One `[[mission]]` table. Angles are written in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")] // "takeoff" in TOML maps to `Takeoff`
pub enum MissionStep {
    Takeoff,
    Land,
    Hover { seconds: f64 },
    Wait { seconds: f64 },
    Zero,
    Go {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        yaw_deg: Option<f64>,
    },
    Forward { distance: f64 },
    Backward { distance: f64 },
    Left { distance: f64 },
    Right { distance: f64 },
    Up { distance: f64 },
    Down { distance: f64 },
    Cw { degrees: f64 },
    Ccw { degrees: f64 },
    Altitude { meters: f64 },
    Yaw { degrees: f64 },
}

impl MissionStep {
    fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Hover { seconds } | Self::Wait { seconds } => {
                delay(seconds)?;
            }
            Self::Go { x, y, z, yaw_deg } => {
                if [x, y, z, yaw_deg].iter().flatten().any(|v| !v.is_finite()) {
                    return Err("goal values must be finite".to_string());
                }
            }
            Self::Forward { distance: v }
            | Self::Backward { distance: v }
            | Self::Left { distance: v }
            | Self::Right { distance: v }
            | Self::Up { distance: v }
            | Self::Down { distance: v }
            | Self::Cw { degrees: v }
            | Self::Ccw { degrees: v }
            | Self::Altitude { meters: v }
            | Self::Yaw { degrees: v } => {
                if !v.is_finite() {
                    return Err(format!("value must be finite, got {v}"));
                }
            }
            Self::Takeoff | Self::Land | Self::Zero => {}
        }
        Ok(())
    }

    fn append_to<L: VehicleLink, C: Clock>(
        &self,
        mission: Mission<L, C>,
    ) -> Result<Mission<L, C>, String> {
        Ok(match *self {
            Self::Takeoff => mission.takeoff(),
            Self::Land => mission.land(),
            Self::Hover { seconds } => mission.hover(delay(seconds)?),
            Self::Wait { seconds } => mission.wait(delay(seconds)?),
            Self::Zero => mission.zero(),
            Self::Go { x, y, z, yaw_deg } => mission.go(Goal {
                x,
                y,
                z,
                yaw: yaw_deg.map(f64::to_radians),
                reached: false,
            }),
            Self::Forward { distance } => mission.forward(distance),
            Self::Backward { distance } => mission.backward(distance),
            Self::Left { distance } => mission.left(distance),
            Self::Right { distance } => mission.right(distance),
            Self::Up { distance } => mission.up(distance),
            Self::Down { distance } => mission.down(distance),
            Self::Cw { degrees } => mission.cw(degrees.to_radians()),
            Self::Ccw { degrees } => mission.ccw(degrees.to_radians()),
            Self::Altitude { meters } => mission.altitude(meters),
            Self::Yaw { degrees } => mission.yaw(degrees.to_radians()),
        })
    }
}

fn delay(seconds: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| format!("delay must be a representable number of seconds, got {seconds}: {e}"))
}
