// autonomy_core/src/types.rs

use serde::Deserialize;

use crate::frames::normalize_angle;

// --- Core Nouns ---

/// A planar pose in the world-fixed frame. Meters and radians, `yaw` in (−π, π].
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            yaw: normalize_angle(yaw),
        }
    }

    pub fn origin() -> Self {
        Self::default()
    }
}

/// The controller's view of the vehicle: the filtered planar pose plus the
/// altitude and body velocity reported by the last telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    /// Altitude in meters, taken straight from telemetry.
    pub z: f64,
    pub yaw: f64,
    /// Body-frame velocity in m/s.
    pub vx: f64,
    pub vy: f64,
}

impl VehicleState {
    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            yaw: self.yaw,
        }
    }
}

/// A target for the controller. Any axis left as `None` is not controlled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Goal {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub yaw: Option<f64>,
    #[serde(skip)]
    pub reached: bool,
}

impl Goal {
    /// A goal on every axis, taken from a vehicle state.
    pub fn at(state: &VehicleState) -> Self {
        Self {
            x: Some(state.x),
            y: Some(state.y),
            z: Some(state.z),
            yaw: Some(state.yaw),
            reached: false,
        }
    }

    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.yaw = Some(yaw);
        self
    }
}

/// One scalar per controlled axis. Used for errors and commands alike.
///
/// For commands the axes map onto the vehicle link as
/// front (`x`), right (`y`), up (`z`) and clockwise (`yaw`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisValues {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
}

impl AxisValues {
    pub fn new(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self { x, y, z, yaw }
    }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            x: f(self.x),
            y: f(self.y),
            z: f(self.z),
            yaw: f(self.yaw),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0 && self.yaw == 0.0
    }
}
