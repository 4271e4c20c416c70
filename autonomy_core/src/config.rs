// autonomy_core/src/config.rs

//! Tuning constants for the estimator, the camera and the controller.
//!
//! Every struct deserializes from a partial table: missing fields keep the
//! reference values from `Default`, unknown fields are rejected.

use serde::Deserialize;
use std::time::Duration;

use crate::error::AutonomyError;
use crate::types::Pose;

/// AR.Drone 2.0 bottom camera intrinsics, calibrated on a 640x360 grid.
pub const DEFAULT_BOTTOM_CAMERA_K: [[f64; 3]; 3] = [
    [686.994766, 0.0, 329.323208],
    [0.0, 688.195055, 159.323007],
    [0.0, 0.0, 1.0],
];

/// The telemetry stream runs at 15 Hz in demo mode.
pub const DEFAULT_SAMPLE_PERIOD_S: f64 = 1.0 / 15.0;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutonomyConfig {
    pub controller: ControllerConfig,
    pub estimator: EstimatorConfig,
    pub camera: CameraConfig,
    /// Known pose of the visual marker in the world frame.
    pub marker: Pose,
}

impl AutonomyConfig {
    pub fn validate(&self) -> Result<(), AutonomyError> {
        self.controller.validate()?;
        self.estimator.validate()?;
        self.camera.validate()
    }
}

// =========================================================================
// == Controller ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisGains {
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
}

impl AxisGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub x: AxisGains,
    pub y: AxisGains,
    pub z: AxisGains,
    pub yaw: AxisGains,
    /// Meters, applied to x and y independently.
    pub position_tolerance: f64,
    /// Meters.
    pub altitude_tolerance: f64,
    /// Radians.
    pub yaw_tolerance: f64,
    /// How long every axis must stay in tolerance before the goal counts as reached.
    pub stabilization_delay_ms: u64,
    /// Altitude goals below this are raised to it.
    pub minimum_altitude_m: f64,
    /// Clamped commands at or below this magnitude are sent as zero.
    pub command_deadband: f64,
    /// Delay between detecting a reached goal and running its callback.
    pub callback_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            x: AxisGains::new(0.3, 0.0, 0.1),
            y: AxisGains::new(0.3, 0.0, 0.1),
            z: AxisGains::new(0.3, 0.0, 0.1),
            yaw: AxisGains::new(5.0, 0.0, 1.0),
            position_tolerance: 0.05,
            altitude_tolerance: 0.05,
            yaw_tolerance: 0.05,
            stabilization_delay_ms: 1000,
            minimum_altitude_m: 0.5,
            command_deadband: 0.01,
            callback_delay_ms: 10,
        }
    }
}

impl ControllerConfig {
    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn callback_delay(&self) -> Duration {
        Duration::from_millis(self.callback_delay_ms)
    }

    pub fn validate(&self) -> Result<(), AutonomyError> {
        for (name, gains) in [
            ("x", &self.x),
            ("y", &self.y),
            ("z", &self.z),
            ("yaw", &self.yaw),
        ] {
            if !(gains.kp.is_finite() && gains.ki.is_finite() && gains.kd.is_finite()) {
                return Err(AutonomyError::Configuration(format!(
                    "gains for axis '{name}' must be finite"
                )));
            }
        }
        for (name, value) in [
            ("position_tolerance", self.position_tolerance),
            ("altitude_tolerance", self.altitude_tolerance),
            ("yaw_tolerance", self.yaw_tolerance),
            ("command_deadband", self.command_deadband),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AutonomyError::Configuration(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        if !self.minimum_altitude_m.is_finite() {
            return Err(AutonomyError::Configuration(
                "minimum_altitude_m must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

// =========================================================================
// == Estimator ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    /// Fixed odometry integration period, matching the telemetry rate.
    pub sample_period_s: f64,
    /// Diagonal of the process noise Q over (x, y, yaw).
    pub process_noise: [f64; 3],
    /// Diagonal of the measurement noise R over (x, y, yaw).
    pub measurement_noise: [f64; 3],
    /// Pose the filter starts from and returns to on reset.
    pub initial_pose: Pose,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sample_period_s: DEFAULT_SAMPLE_PERIOD_S,
            process_noise: [0.0003, 0.0003, 0.0001],
            measurement_noise: [0.3, 0.3, 0.3],
            initial_pose: Pose::origin(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), AutonomyError> {
        if !self.sample_period_s.is_finite() || self.sample_period_s <= 0.0 {
            return Err(AutonomyError::Configuration(format!(
                "sample_period_s must be positive (got {})",
                self.sample_period_s
            )));
        }
        let noise = self.process_noise.iter().chain(&self.measurement_noise);
        if noise.copied().any(|v| !v.is_finite() || v < 0.0) {
            return Err(AutonomyError::Configuration(
                "noise variances must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

// =========================================================================
// == Camera ==
// =========================================================================

/// Which range the camera back-projection scales by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSource {
    /// The marker distance reported by the vision detector.
    #[default]
    MarkerDistance,
    /// The altitude reported by telemetry.
    Altitude,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Row-major 3x3 pinhole intrinsic matrix.
    pub intrinsics: [[f64; 3]; 3],
    /// Resolution of the grid detections are reported on.
    pub detection_grid: [f64; 2],
    /// Resolution of the grid the intrinsics were calibrated on.
    pub calibration_grid: [f64; 2],
    pub range_source: RangeSource,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            intrinsics: DEFAULT_BOTTOM_CAMERA_K,
            detection_grid: [1000.0, 1000.0],
            calibration_grid: [640.0, 360.0],
            range_source: RangeSource::default(),
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<(), AutonomyError> {
        let grids = self.detection_grid.iter().chain(&self.calibration_grid);
        if grids.copied().any(|v| !v.is_finite() || v <= 0.0) {
            return Err(AutonomyError::Configuration(
                "camera grid resolutions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
