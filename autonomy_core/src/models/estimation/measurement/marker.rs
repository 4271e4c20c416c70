// autonomy_core/src/models/estimation/measurement/marker.rs

use nalgebra::{Matrix3, Vector3};

use super::PlanarMeasurement;
use crate::frames::{normalize_angle, world_to_body};
use crate::types::Pose;

/// Observation of a marker whose world pose is known.
///
/// The measurement is the marker's pose expressed in the vehicle's body
/// frame: `[x, y, yaw]`, with yaw relative to the vehicle heading.
#[derive(Debug, Clone, Copy)]
pub struct MarkerModel {
    /// Known marker pose in the world frame.
    pub marker: Pose,
}

impl MarkerModel {
    pub fn new(marker: Pose) -> Self {
        Self { marker }
    }
}

impl PlanarMeasurement for MarkerModel {
    fn predict_measurement(&self, pose: &Pose) -> Vector3<f64> {
        let (bx, by) = world_to_body(pose.yaw, self.marker.x - pose.x, self.marker.y - pose.y);
        Vector3::new(bx, by, self.marker.yaw - pose.yaw)
    }

    #[rustfmt::skip]
    fn calculate_jacobian(&self, pose: &Pose) -> Matrix3<f64> {
        let (s, c) = pose.yaw.sin_cos();
        let dx = pose.x - self.marker.x;
        let dy = pose.y - self.marker.y;
        Matrix3::new(
            -c, -s, s * dx - c * dy,
             s, -c, c * dx + s * dy,
            0.0, 0.0, -1.0,
        )
    }

    fn innovation(&self, z: &Vector3<f64>, z_pred: &Vector3<f64>) -> Vector3<f64> {
        let mut e = z - z_pred;
        e.z = normalize_angle(normalize_angle(z.z) - normalize_angle(z_pred.z));
        e
    }
}
