// autonomy_sim/src/sensors.rs

use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use autonomy_core::config::AutonomyConfig;
use autonomy_core::frames::{normalize_angle, world_to_body};
use autonomy_core::messages::{Attitude, BodyVelocity, MarkerDetection, Telemetry, VisionDetect};
use autonomy_core::models::perception::CameraProjector;
use autonomy_core::types::Pose;

use crate::config::NoiseSettings;
use crate::drone::TruthState;
use crate::error::SimError;

/// Side of the square box reported around a detected marker, detection-grid pixels.
const MARKER_BOX_PX: f64 = 80.0;
/// Below this altitude the bottom camera cannot resolve the marker, m.
const MIN_DETECTION_ALTITUDE_M: f64 = 0.2;

/// Turns ground truth into the telemetry the vehicle would report.
///
/// All noise comes from one seeded `ChaCha8Rng`, so a run is reproducible
/// from its seed.
pub struct TelemetrySynth {
    rng: ChaCha8Rng,
    velocity_noise: Normal<f64>,
    yaw_noise: Normal<f64>,
    altitude_noise: Normal<f64>,
    marker_noise: Normal<f64>,
    marker_dropout: f64,
    camera: CameraProjector,
    detection_grid: [f64; 2],
    marker: Pose,
}

fn normal(std_dev: f64, name: &str) -> Result<Normal<f64>, SimError> {
    Normal::new(0.0, std_dev)
        .map_err(|e| SimError::InvalidScenario(format!("noise.{name}: {e}")))
}

impl TelemetrySynth {
    pub fn new(
        noise: &NoiseSettings,
        autonomy: &AutonomyConfig,
        seed: u64,
    ) -> Result<Self, SimError> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            velocity_noise: normal(noise.velocity_mm_s, "velocity_mm_s")?,
            yaw_noise: normal(noise.yaw_deg, "yaw_deg")?,
            altitude_noise: normal(noise.altitude_m, "altitude_m")?,
            marker_noise: normal(noise.marker_px, "marker_px")?,
            marker_dropout: noise.marker_dropout,
            camera: CameraProjector::new(&autonomy.camera)?,
            detection_grid: autonomy.camera.detection_grid,
            marker: autonomy.marker,
        })
    }

    pub fn sample(&mut self, truth: &TruthState) -> Telemetry {
        let yaw_deg = truth.yaw.to_degrees() + self.yaw_noise.sample(&mut self.rng);
        let velocity = BodyVelocity {
            x: truth.vx * 1000.0 + self.velocity_noise.sample(&mut self.rng),
            y: truth.vy * 1000.0 + self.velocity_noise.sample(&mut self.rng),
            z: truth.vz * 1000.0 + self.velocity_noise.sample(&mut self.rng),
        };
        let altitude = (truth.z + self.altitude_noise.sample(&mut self.rng)).max(0.0);

        Telemetry {
            attitude_deg: Attitude {
                roll: 0.0,
                pitch: 0.0,
                // The vehicle reports heading in (−180, 180].
                yaw: normalize_angle(yaw_deg.to_radians()).to_degrees(),
            },
            velocity_mm_s: velocity,
            altitude_m: altitude,
            vision: Some(VisionDetect {
                detections: self.detect_marker(truth).into_iter().collect(),
            }),
        }
    }

    /// Projects the marker into the bottom camera, if it is in view.
    pub fn detect_marker(&mut self, truth: &TruthState) -> Option<MarkerDetection> {
        if truth.z < MIN_DETECTION_ALTITUDE_M {
            return None;
        }
        let (bx, by) = world_to_body(truth.yaw, self.marker.x - truth.x, self.marker.y - truth.y);
        let center = self.camera.metric_to_pixel(&Vector2::new(bx, by), truth.z)?;

        let [width, height] = self.detection_grid;
        if !(0.0..=width).contains(&center.x) || !(0.0..=height).contains(&center.y) {
            return None;
        }
        if self.rng.gen_bool(self.marker_dropout) {
            return None;
        }

        let px = center.x + self.marker_noise.sample(&mut self.rng);
        let py = center.y + self.marker_noise.sample(&mut self.rng);
        Some(MarkerDetection {
            xc: px - MARKER_BOX_PX / 2.0,
            yc: py - MARKER_BOX_PX / 2.0,
            width: MARKER_BOX_PX,
            height: MARKER_BOX_PX,
            orientation_deg: normalize_angle(self.marker.yaw - truth.yaw).to_degrees(),
            distance_cm: truth.z * 100.0,
        })
    }
}
