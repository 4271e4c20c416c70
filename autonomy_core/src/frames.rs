// autonomy_core/src/frames.rs

//! Planar frame conventions and the small numeric helpers shared by the
//! estimator and the controller.
//!
//! The world frame is fixed at the pose the estimator was last reset to.
//! The body frame has `x` pointing forward and `y` pointing right, and yaw
//! grows clockwise when seen from above, matching the vehicle's own
//! attitude report.

use std::f64::consts::PI;

/// Wraps an angle into (−π, π].
///
/// Non-finite input is returned unchanged so callers can reject it.
pub fn normalize_angle(rad: f64) -> f64 {
    if !rad.is_finite() {
        return rad;
    }
    let wrapped = rad.sin().atan2(rad.cos());
    // atan2 yields [−π, π]; fold the lower bound onto the upper one.
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Rotates a body-frame displacement into the world frame.
pub fn body_to_world(yaw: f64, dx: f64, dy: f64) -> (f64, f64) {
    let (s, c) = yaw.sin_cos();
    (dx * c - dy * s, dx * s + dy * c)
}

/// Rotates a world-frame vector into the body frame.
pub fn world_to_body(yaw: f64, wx: f64, wy: f64) -> (f64, f64) {
    let (s, c) = yaw.sin_cos();
    (c * wx + s * wy, -s * wx + c * wy)
}

pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// Telemetry velocities arrive in millimeters per second.
pub fn mm_per_s_to_m_per_s(v: f64) -> f64 {
    v / 1000.0
}

/// Marker distances arrive in centimeters.
pub fn cm_to_m(v: f64) -> f64 {
    v / 100.0
}
