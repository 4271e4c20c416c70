// autonomy_core/src/messages.rs

use crate::types::{AxisValues, Goal, VehicleState};

// =========================================================================
// == Inbound: Telemetry from the Vehicle Link ==
// =========================================================================

/// Attitude as reported by the vehicle, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Body-frame velocity as reported by the vehicle, in millimeters per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyVelocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A single marker found by the bottom camera.
///
/// Pixel values live on the detector's fixed reporting grid, whatever the
/// actual image resolution is.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarkerDetection {
    pub xc: f64,
    pub yc: f64,
    pub width: f64,
    pub height: f64,
    /// Marker orientation relative to the vehicle, in degrees.
    pub orientation_deg: f64,
    /// Range to the marker, in centimeters.
    pub distance_cm: f64,
}

impl MarkerDetection {
    /// The pixel used for back-projection.
    pub fn center(&self) -> (f64, f64) {
        (self.xc + self.width / 2.0, self.yc + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisionDetect {
    pub detections: Vec<MarkerDetection>,
}

impl VisionDetect {
    pub fn count(&self) -> usize {
        self.detections.len()
    }

    pub fn first(&self) -> Option<&MarkerDetection> {
        self.detections.first()
    }
}

/// One telemetry sample, in the units the vehicle link reports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Telemetry {
    pub attitude_deg: Attitude,
    pub velocity_mm_s: BodyVelocity,
    pub altitude_m: f64,
    pub vision: Option<VisionDetect>,
}

impl Telemetry {
    /// The first detected marker, if the camera saw any this sample.
    pub fn marker(&self) -> Option<&MarkerDetection> {
        self.vision.as_ref().and_then(VisionDetect::first)
    }
}

// =========================================================================
// == Outbound: Controller Observations ==
// =========================================================================

/// Per-tick diagnostic record emitted by the flight controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlData {
    pub state: VehicleState,
    pub goal: Goal,
    pub error: AxisValues,
    /// Regulator outputs in the world frame, before rotation and clamping.
    pub raw: AxisValues,
    /// Body-frame commands after clamping to [−1, 1] and the deadband.
    pub command: AxisValues,
    /// Whether the vehicle is currently dwelling inside the tolerance band.
    pub dwell_started: bool,
    pub reached: bool,
    pub marker_seen: bool,
    /// Actuation was skipped this tick because the estimator degenerated.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    ControlData(ControlData),
    GoalReached(VehicleState),
    GoalLeft(VehicleState),
}
