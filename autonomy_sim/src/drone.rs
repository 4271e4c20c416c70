// autonomy_sim/src/drone.rs

use std::sync::{Arc, Mutex, MutexGuard};

use autonomy_core::error::LinkError;
use autonomy_core::frames::{body_to_world, normalize_angle};
use autonomy_core::link::{LinkCompletion, VehicleLink};
use autonomy_core::types::AxisValues;

use crate::config::VehicleSettings;

// =========================================================================
// == Ground Truth ==
// =========================================================================

/// The simulated vehicle's true state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TruthState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Radians, clockwise from the world x axis.
    pub yaw: f64,
    /// Body-frame velocity, m/s.
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Landed,
    TakingOff,
    Flying,
    Landing,
}

/// A takeoff or landing in progress.
struct Transition {
    from_z: f64,
    to_z: f64,
    elapsed_s: f64,
    done: LinkCompletion,
}

// =========================================================================
// == Kinematic Quadrotor ==
// =========================================================================

/// A velocity-commanded point-mass quadrotor.
///
/// Each command axis in [−1, 1] maps linearly onto the configured maximum
/// rate. Commands are ignored unless the vehicle is flying.
pub struct SimulatedDrone {
    settings: VehicleSettings,
    truth: TruthState,
    command: AxisValues,
    phase: FlightPhase,
    transition: Option<Transition>,
    connected: bool,
}

impl SimulatedDrone {
    pub fn new(settings: &VehicleSettings) -> Self {
        Self {
            settings: settings.clone(),
            truth: TruthState {
                x: settings.start.x,
                y: settings.start.y,
                yaw: settings.start.yaw,
                ..Default::default()
            },
            command: AxisValues::default(),
            phase: FlightPhase::Landed,
            transition: None,
            connected: true,
        }
    }

    pub fn truth(&self) -> TruthState {
        self.truth
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn command(&self) -> AxisValues {
        self.command
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drops the link. Every later call fails, and a pending takeoff or
    /// landing completes with `Disconnected`.
    pub fn disconnect(&mut self) {
        self.connected = false;
        if let Some(transition) = self.transition.take() {
            (transition.done)(Err(LinkError::Disconnected));
        }
        tracing::warn!("simulated link disconnected");
    }

    fn ensure_connected(&self) -> Result<(), LinkError> {
        if self.connected {
            Ok(())
        } else {
            Err(LinkError::Disconnected)
        }
    }

    pub fn set_command(&mut self, command: &AxisValues) -> Result<(), LinkError> {
        self.ensure_connected()?;
        if self.phase == FlightPhase::Flying {
            self.command = command.map(|v| v.clamp(-1.0, 1.0));
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.command = AxisValues::default();
        Ok(())
    }

    pub fn takeoff(&mut self, done: LinkCompletion) -> Result<(), LinkError> {
        self.ensure_connected()?;
        match self.phase {
            FlightPhase::Flying => done(Ok(())),
            FlightPhase::TakingOff | FlightPhase::Landing => {
                return Err(LinkError::CommandRejected(
                    "takeoff while a transition is in progress".to_string(),
                ))
            }
            FlightPhase::Landed => {
                tracing::info!("simulated takeoff");
                let altitude = self.settings.takeoff_altitude;
                self.begin_transition(FlightPhase::TakingOff, altitude, done);
            }
        }
        Ok(())
    }

    pub fn land(&mut self, done: LinkCompletion) -> Result<(), LinkError> {
        self.ensure_connected()?;
        match self.phase {
            FlightPhase::Landed => done(Ok(())),
            FlightPhase::TakingOff | FlightPhase::Landing => {
                return Err(LinkError::CommandRejected(
                    "land while a transition is in progress".to_string(),
                ))
            }
            FlightPhase::Flying => {
                tracing::info!("simulated landing");
                self.begin_transition(FlightPhase::Landing, 0.0, done);
            }
        }
        Ok(())
    }

    fn begin_transition(&mut self, phase: FlightPhase, to_z: f64, done: LinkCompletion) {
        self.phase = phase;
        self.command = AxisValues::default();
        self.transition = Some(Transition {
            from_z: self.truth.z,
            to_z,
            elapsed_s: 0.0,
            done,
        });
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> TruthState {
        if let Some(mut transition) = self.transition.take() {
            transition.elapsed_s += dt;
            let duration = self.settings.transition_seconds;
            // Tolerate the rounding of many small steps summing to `duration`.
            let finished = transition.elapsed_s + 1e-6 >= duration;
            let z = if finished {
                transition.to_z
            } else {
                let progress = transition.elapsed_s / duration;
                transition.from_z + (transition.to_z - transition.from_z) * progress
            };
            self.truth.vz = (z - self.truth.z) / dt;
            self.truth.z = z;
            self.truth.vx = 0.0;
            self.truth.vy = 0.0;

            if finished {
                self.phase = match self.phase {
                    FlightPhase::TakingOff => FlightPhase::Flying,
                    _ => FlightPhase::Landed,
                };
                self.truth.vz = 0.0;
                (transition.done)(Ok(()));
            } else {
                self.transition = Some(transition);
            }
            return self.truth;
        }

        if self.phase != FlightPhase::Flying {
            return self.truth;
        }

        let s = &self.settings;
        let vx = self.command.x * s.max_horizontal_speed;
        let vy = self.command.y * s.max_horizontal_speed;
        let vz = self.command.z * s.max_vertical_speed;
        let yaw_rate = self.command.yaw * s.max_yaw_rate;

        let (dx, dy) = body_to_world(self.truth.yaw, vx * dt, vy * dt);
        self.truth.x += dx;
        self.truth.y += dy;
        self.truth.z = (self.truth.z + vz * dt).max(0.0);
        self.truth.yaw = normalize_angle(self.truth.yaw + yaw_rate * dt);
        self.truth.vx = vx;
        self.truth.vy = vy;
        self.truth.vz = vz;
        self.truth
    }
}

// =========================================================================
// == Vehicle Link ==
// =========================================================================

/// Link to a shared [`SimulatedDrone`]; the runner keeps the other handle to step it.
#[derive(Clone)]
pub struct SimLink {
    drone: Arc<Mutex<SimulatedDrone>>,
}

impl SimLink {
    pub fn new(drone: Arc<Mutex<SimulatedDrone>>) -> Self {
        Self { drone }
    }

    pub fn drone(&self) -> MutexGuard<'_, SimulatedDrone> {
        lock(&self.drone)
    }

    pub fn disconnect(&self) {
        self.drone().disconnect();
    }
}

impl VehicleLink for SimLink {
    fn send_command(&mut self, command: &AxisValues) -> Result<(), LinkError> {
        self.drone().set_command(command)
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        self.drone().stop()
    }

    fn takeoff(&mut self, done: LinkCompletion) -> Result<(), LinkError> {
        self.drone().takeoff(done)
    }

    fn land(&mut self, done: LinkCompletion) -> Result<(), LinkError> {
        self.drone().land(done)
    }
}

/// Locks the shared drone, recovering the state if a holder panicked.
pub fn lock(drone: &Mutex<SimulatedDrone>) -> MutexGuard<'_, SimulatedDrone> {
    drone.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
