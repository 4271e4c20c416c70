// autonomy_core/src/estimation/ekf.rs

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::config::EstimatorConfig;
use crate::error::AutonomyError;
use crate::messages::Telemetry;
use crate::models::estimation::dynamics::{odometry::OdometryModel, PlanarDynamics};
use crate::models::estimation::measurement::{marker::MarkerModel, PlanarMeasurement};
use crate::types::Pose;

/// What a correction step did to the estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// `z - h(x)`, yaw wrapped.
    pub innovation: Vector3<f64>,
    /// The position shift applied to (x, y).
    pub applied: Vector2<f64>,
    /// The yaw shift the gain asked for. It is not applied: the naive yaw
    /// update proved unstable, so heading comes from odometry only.
    pub discarded_yaw: f64,
}

/// Extended Kalman filter over the planar pose `(x, y, yaw)`.
///
/// Prediction integrates body-frame odometry on every telemetry sample.
/// Correction fuses a marker observation whenever the camera sees one.
#[derive(Debug, Clone)]
pub struct PoseEkf {
    pose: Pose,
    covariance: Matrix3<f64>,
    /// The process noise covariance matrix (Q).
    process_noise_q: Matrix3<f64>,
    /// The measurement noise covariance matrix (R).
    measurement_noise_r: Matrix3<f64>,
    initial_pose: Pose,
    /// Heading seen on the previous sample. `None` until the first sample after a reset.
    last_yaw: Option<f64>,
    dynamics: OdometryModel,
}

impl PoseEkf {
    pub fn new(config: &EstimatorConfig) -> Result<Self, AutonomyError> {
        config.validate()?;

        let initial_pose = Pose::new(
            config.initial_pose.x,
            config.initial_pose.y,
            config.initial_pose.yaw,
        );
        Ok(Self {
            pose: initial_pose,
            covariance: Matrix3::identity(),
            process_noise_q: Matrix3::from_diagonal(&Vector3::from(config.process_noise)),
            measurement_noise_r: Matrix3::from_diagonal(&Vector3::from(config.measurement_noise)),
            initial_pose,
            last_yaw: None,
            dynamics: OdometryModel::new(config.sample_period_s),
        })
    }

    /// Restarts the filter at `initial` (or the configured start pose) with
    /// identity covariance, forgetting the last heading.
    pub fn reset(&mut self, initial: Option<Pose>) {
        let pose = initial.unwrap_or(self.initial_pose);
        self.pose = Pose::new(pose.x, pose.y, pose.yaw);
        self.covariance = Matrix3::identity();
        self.last_yaw = None;
        tracing::debug!(x = self.pose.x, y = self.pose.y, yaw = self.pose.yaw, "pose filter reset");
    }

    pub fn state(&self) -> Pose {
        self.pose
    }

    pub fn confidence(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    /// The prediction step.
    ///
    /// The first sample after a reset only records the heading: without a
    /// previous heading there is no yaw delta to integrate.
    pub fn predict(&mut self, telemetry: &Telemetry) {
        let Some(last_yaw) = self.last_yaw else {
            self.last_yaw = Some(self.dynamics.heading(telemetry));
            return;
        };

        let u = self.dynamics.control_from_telemetry(telemetry, last_yaw);
        self.last_yaw = Some(self.dynamics.heading(telemetry));

        // Linearize at the pose the increment is applied to.
        let g = self.dynamics.calculate_jacobian(&self.pose, &u);
        self.pose = self.dynamics.propagate(&self.pose, &u);

        // P_k+1 = G * P_k * G^T + Q
        self.covariance = g * self.covariance * g.transpose() + self.process_noise_q;
    }

    /// The correction step for a marker observation.
    ///
    /// `measured` is the marker pose in the vehicle's body frame; `marker` is
    /// its known pose in the world frame.
    pub fn correct(
        &mut self,
        measured: &Vector3<f64>,
        marker: &Pose,
    ) -> Result<Correction, AutonomyError> {
        self.update(measured, &MarkerModel::new(*marker))
    }

    /// Fuses a measurement `z` through `model`. Only x and y are corrected.
    ///
    /// On a singular innovation covariance the estimate is left untouched
    /// and `NumericDegeneracy` is returned.
    pub fn update<M: PlanarMeasurement>(
        &mut self,
        z: &Vector3<f64>,
        model: &M,
    ) -> Result<Correction, AutonomyError> {
        let z_pred = model.predict_measurement(&self.pose);
        let h_jac = model.calculate_jacobian(&self.pose);
        let y = model.innovation(z, &z_pred);

        let p = &self.covariance;
        let s = h_jac * p * h_jac.transpose() + self.measurement_noise_r;
        let s_inv = s.try_inverse().ok_or(AutonomyError::NumericDegeneracy)?;
        let k_gain = p * h_jac.transpose() * s_inv;

        let delta = k_gain * y;
        let new_p = (Matrix3::identity() - k_gain * h_jac) * p;
        if !delta.iter().chain(new_p.iter()).all(|v| v.is_finite()) {
            return Err(AutonomyError::NumericDegeneracy);
        }

        self.pose.x += delta.x;
        self.pose.y += delta.y;
        self.covariance = new_p;

        Ok(Correction {
            innovation: y,
            applied: Vector2::new(delta.x, delta.y),
            discarded_yaw: delta.z,
        })
    }
}
