// autonomy_sim/src/runner.rs

use std::sync::{Arc, Mutex};

use autonomy_core::clock::ManualClock;
use autonomy_core::control::FlightController;
use autonomy_core::messages::ControllerEvent;
use autonomy_core::mission::MissionStatus;
use autonomy_core::types::Pose;

use crate::config::Scenario;
use crate::drone::{lock, SimLink, SimulatedDrone, TruthState};
use crate::error::SimError;
use crate::sensors::TelemetrySynth;

/// Summary of one simulated run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    pub seed: u64,
    /// Whether every mission step finished before the time limit.
    pub completed: bool,
    pub steps_completed: usize,
    pub ticks: u64,
    pub elapsed_s: f64,
    pub goals_reached: usize,
    pub goals_left: usize,
    /// Samples that carried a marker detection.
    pub marker_fixes: usize,
    /// Control ticks that skipped actuation.
    pub degraded_ticks: usize,
    pub truth: TruthState,
    pub estimate: Pose,
}

impl SimReport {
    /// Horizontal distance between the final estimate and the truth, m.
    pub fn position_error(&self) -> f64 {
        (self.estimate.x - self.truth.x).hypot(self.estimate.y - self.truth.y)
    }
}

/// Runs a scenario to completion on a simulated clock.
///
/// Each tick advances the clock by one telemetry period, steps the drone,
/// delivers the resulting telemetry to the controller and then polls the
/// mission. The run ends when the mission completes or the duration runs
/// out; a failed mission is returned as an error.
pub fn run_scenario(scenario: &Scenario) -> Result<SimReport, SimError> {
    scenario.validate()?;

    let seed = scenario.simulation.seed_or_default();
    let period = scenario.simulation.telemetry_period()?;
    let max_ticks =
        (scenario.simulation.duration_seconds * scenario.simulation.telemetry_rate_hz).ceil() as u64;

    let clock = ManualClock::new();
    let drone = Arc::new(Mutex::new(SimulatedDrone::new(&scenario.vehicle)));
    let mut controller =
        FlightController::new(&scenario.autonomy, SimLink::new(drone.clone()), clock.clone())?;
    let events = controller.subscribe();
    let mut sensors = TelemetrySynth::new(&scenario.noise, &scenario.autonomy, seed)?;
    let mut mission = scenario.build_mission()?.start();

    tracing::info!(seed, steps = scenario.mission.len(), "simulation started");

    let mut report = SimReport {
        seed,
        completed: false,
        steps_completed: 0,
        ticks: 0,
        elapsed_s: 0.0,
        goals_reached: 0,
        goals_left: 0,
        marker_fixes: 0,
        degraded_ticks: 0,
        truth: lock(&drone).truth(),
        estimate: controller.estimator().state(),
    };

    for _ in 0..max_ticks {
        clock.advance(period);
        let truth = lock(&drone).step(period.as_secs_f64());
        let telemetry = sensors.sample(&truth);
        if telemetry.marker().is_some() {
            report.marker_fixes += 1;
        }

        controller.on_telemetry(&telemetry)?;
        report.ticks += 1;

        for event in events.try_iter() {
            match event {
                ControllerEvent::GoalReached(_) => report.goals_reached += 1,
                ControllerEvent::GoalLeft(_) => report.goals_left += 1,
                ControllerEvent::ControlData(data) => {
                    if data.degraded {
                        report.degraded_ticks += 1;
                    }
                }
            }
        }

        match mission.poll(&mut controller) {
            MissionStatus::Running => {}
            MissionStatus::Completed => {
                report.completed = true;
                break;
            }
            MissionStatus::Failed(err) => return Err(err.into()),
        }
    }

    report.steps_completed = mission.completed_steps();
    report.elapsed_s = clock.elapsed().as_secs_f64();
    report.truth = lock(&drone).truth();
    report.estimate = controller.estimator().state();

    if report.completed {
        tracing::info!(
            elapsed_s = report.elapsed_s,
            position_error = report.position_error(),
            "mission completed"
        );
    } else {
        tracing::warn!(
            elapsed_s = report.elapsed_s,
            steps_completed = report.steps_completed,
            "time limit reached before the mission completed"
        );
    }
    Ok(report)
}
