// autonomy_core/src/models/estimation/measurement/mod.rs

use nalgebra::{Matrix3, Vector3};
use std::fmt::Debug;

use crate::types::Pose;

// --- MEASUREMENT MODEL TRAIT ---
// The mathematical model of an observation of the planar pose. `z = h(x) + v`
pub trait PlanarMeasurement: Debug {
    /// Predicts the ideal measurement `z_pred = h(x)`.
    fn predict_measurement(&self, pose: &Pose) -> Vector3<f64>;

    /// Calculates the measurement Jacobian `H = ∂h/∂x` at `pose`.
    fn calculate_jacobian(&self, pose: &Pose) -> Matrix3<f64>;

    /// The innovation `z - z_pred`. Models with angular components wrap them here.
    fn innovation(&self, z: &Vector3<f64>, z_pred: &Vector3<f64>) -> Vector3<f64> {
        z - z_pred
    }
}

pub mod marker;
