// autonomy_core/src/models/perception/camera.rs

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::config::CameraConfig;
use crate::error::AutonomyError;

/// Back-projects marker detections from the bottom camera into metric
/// offsets in the camera's optical frame.
///
/// The vehicle is assumed flat (no roll or pitch), which only holds near
/// hover. No motion or orientation correction is applied.
#[derive(Debug, Clone)]
pub struct CameraProjector {
    k: Matrix3<f64>,
    k_inv: Matrix3<f64>,
    /// Per-axis factor from the detection grid to the calibration grid.
    grid_scale: Vector2<f64>,
}

impl CameraProjector {
    /// Builds the projector, failing if the intrinsic matrix cannot be inverted.
    pub fn new(config: &CameraConfig) -> Result<Self, AutonomyError> {
        config.validate()?;

        let k_rows = config.intrinsics;
        #[rustfmt::skip]
        let k = Matrix3::new(
            k_rows[0][0], k_rows[0][1], k_rows[0][2],
            k_rows[1][0], k_rows[1][1], k_rows[1][2],
            k_rows[2][0], k_rows[2][1], k_rows[2][2],
        );
        if k.iter().any(|v| !v.is_finite()) {
            return Err(AutonomyError::Configuration(
                "camera intrinsics contain non-finite values".to_string(),
            ));
        }
        let k_inv = k.try_inverse().ok_or_else(|| {
            AutonomyError::Configuration("camera intrinsic matrix is singular".to_string())
        })?;

        let grid_scale = Vector2::new(
            config.calibration_grid[0] / config.detection_grid[0],
            config.calibration_grid[1] / config.detection_grid[1],
        );

        Ok(Self {
            k,
            k_inv,
            grid_scale,
        })
    }

    pub fn intrinsics(&self) -> &Matrix3<f64> {
        &self.k
    }

    /// Pixel (on the detection grid) plus range in meters → metric (X, Y)
    /// offset in the optical frame.
    pub fn pixel_to_metric(&self, px: f64, py: f64, range_m: f64) -> Vector2<f64> {
        let pixel = Vector3::new(px * self.grid_scale.x, py * self.grid_scale.y, 1.0);
        let ray = self.k_inv * pixel * range_m;
        Vector2::new(ray.x, ray.y)
    }

    /// The inverse of `pixel_to_metric`: where a point at the given metric
    /// offset and range lands on the detection grid.
    pub fn metric_to_pixel(&self, offset: &Vector2<f64>, range_m: f64) -> Option<Vector2<f64>> {
        if range_m.abs() < f64::EPSILON {
            return None;
        }
        let pixel = self.k * Vector3::new(offset.x / range_m, offset.y / range_m, 1.0);
        if pixel.z.abs() < f64::EPSILON {
            return None;
        }
        Some(Vector2::new(
            pixel.x / pixel.z / self.grid_scale.x,
            pixel.y / pixel.z / self.grid_scale.y,
        ))
    }
}
