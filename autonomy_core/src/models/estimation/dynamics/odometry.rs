// autonomy_core/src/models/estimation/dynamics/odometry.rs

use nalgebra::Matrix3;

use super::{Odometry, PlanarDynamics};
use crate::frames::{body_to_world, deg_to_rad, mm_per_s_to_m_per_s, normalize_angle};
use crate::messages::Telemetry;
use crate::types::Pose;

/// Dead-reckoning from body velocity and heading deltas.
///
/// Velocities are integrated over a fixed sample period rather than measured
/// wall-clock time, since the telemetry rate is fixed and known.
#[derive(Debug, Clone)]
pub struct OdometryModel {
    pub sample_period_s: f64,
}

impl OdometryModel {
    pub fn new(sample_period_s: f64) -> Self {
        Self { sample_period_s }
    }

    /// Heading reported by a telemetry sample, normalized.
    pub fn heading(&self, telemetry: &Telemetry) -> f64 {
        normalize_angle(deg_to_rad(telemetry.attitude_deg.yaw))
    }

    /// Converts a telemetry sample into an odometry increment relative to the
    /// previously observed heading.
    pub fn control_from_telemetry(&self, telemetry: &Telemetry, last_yaw: f64) -> Odometry {
        let vx = mm_per_s_to_m_per_s(telemetry.velocity_mm_s.x);
        let vy = mm_per_s_to_m_per_s(telemetry.velocity_mm_s.y);
        Odometry {
            dx: vx * self.sample_period_s,
            dy: vy * self.sample_period_s,
            dyaw: self.heading(telemetry) - last_yaw,
        }
    }
}

impl PlanarDynamics for OdometryModel {
    fn propagate(&self, pose: &Pose, u: &Odometry) -> Pose {
        // The displacement is rotated with the heading held before this step.
        let (wx, wy) = body_to_world(pose.yaw, u.dx, u.dy);
        Pose {
            x: pose.x + wx,
            y: pose.y + wy,
            yaw: normalize_angle(pose.yaw + u.dyaw),
        }
    }

    #[rustfmt::skip]
    fn calculate_jacobian(&self, pose: &Pose, u: &Odometry) -> Matrix3<f64> {
        let (s, c) = pose.yaw.sin_cos();
        Matrix3::new(
            1.0, 0.0, -s * u.dx - c * u.dy,
            0.0, 1.0, c * u.dx - s * u.dy,
            0.0, 0.0, 1.0,
        )
    }
}
