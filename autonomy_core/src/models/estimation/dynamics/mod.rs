// autonomy_core/src/models/estimation/dynamics/mod.rs

use nalgebra::Matrix3;
use std::fmt::Debug;

use crate::types::Pose;

/// A body-frame displacement accumulated over one sample period.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Odometry {
    /// Forward displacement, meters.
    pub dx: f64,
    /// Rightward displacement, meters.
    pub dy: f64,
    /// Heading change, radians. Not wrapped.
    pub dyaw: f64,
}

/// A planar motion model used by the pose filter's prediction step.
pub trait PlanarDynamics: Debug + Send + Sync {
    /// Applies one odometry increment: `x' = f(x, u)`.
    fn propagate(&self, pose: &Pose, u: &Odometry) -> Pose;

    /// The Jacobian `G = ∂f/∂x`, evaluated at the pose the increment is applied to.
    fn calculate_jacobian(&self, pose: &Pose, u: &Odometry) -> Matrix3<f64>;
}

pub mod odometry;
