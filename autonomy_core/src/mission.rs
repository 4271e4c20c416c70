// autonomy_core/src/mission.rs

//! Scripted missions: an ordered list of steps run strictly one after another.
//!
//! A [`Mission`] only records steps. [`Mission::start`] turns it into a
//! [`MissionRunner`], which the caller polls once per telemetry tick with
//! the controller it drives. Goal steps finish through the controller's
//! completion callback, takeoff and landing through the link's completion,
//! and timed steps through the controller's clock.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::control::{FlightController, GoalCallback};
use crate::error::{AutonomyError, LinkError, MissionError};
use crate::link::{LinkCompletion, VehicleLink};
use crate::types::Goal;

/// A synchronous step with full access to the controller.
pub type Task<L, C> =
    Box<dyn FnOnce(&mut FlightController<L, C>) -> Result<(), AutonomyError> + Send>;

/// A step that finishes when it calls the completion it is handed, possibly
/// from another thread or a later callback.
pub type AsyncTask<L, C> = Box<
    dyn FnOnce(&mut FlightController<L, C>, LinkCompletion) -> Result<(), AutonomyError> + Send,
>;

// =========================================================================
// == Steps ==
// =========================================================================

/// Goal steps expressed relative to the vehicle, or on a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mover {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
    Cw,
    Ccw,
    Altitude,
    Yaw,
}

impl Mover {
    fn label(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
            Self::Cw => "cw",
            Self::Ccw => "ccw",
            Self::Altitude => "altitude",
            Self::Yaw => "yaw",
        }
    }

    fn apply<L: VehicleLink, C: Clock>(
        self,
        controller: &mut FlightController<L, C>,
        value: f64,
        done: GoalCallback,
    ) -> Result<(), AutonomyError> {
        let done = Some(done);
        match self {
            Self::Forward => controller.forward(value, done),
            Self::Backward => controller.backward(value, done),
            Self::Left => controller.left(value, done),
            Self::Right => controller.right(value, done),
            Self::Up => controller.up(value, done),
            Self::Down => controller.down(value, done),
            Self::Cw => controller.cw(value, done),
            Self::Ccw => controller.ccw(value, done),
            Self::Altitude => controller.altitude(value, done),
            Self::Yaw => controller.yaw(value, done),
        }
    }
}

enum Step<L: VehicleLink, C: Clock> {
    Takeoff,
    Land,
    Hover(Duration),
    Wait(Duration),
    Zero,
    Go(Goal),
    Move(Mover, f64),
    Task(Task<L, C>),
    AsyncTask(AsyncTask<L, C>),
}

impl<L: VehicleLink, C: Clock> Step<L, C> {
    fn label(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Land => "land",
            Self::Hover(_) => "hover",
            Self::Wait(_) => "wait",
            Self::Zero => "zero",
            Self::Go(_) => "go",
            Self::Move(mover, _) => mover.label(),
            Self::Task(_) => "task",
            Self::AsyncTask(_) => "task_async",
        }
    }
}

// =========================================================================
// == Builder ==
// =========================================================================

/// Fluent mission builder. Nothing runs until the mission is started and polled.
pub struct Mission<L: VehicleLink, C: Clock = SystemClock> {
    steps: Vec<Step<L, C>>,
}

impl<L: VehicleLink, C: Clock> Default for Mission<L, C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<L: VehicleLink, C: Clock> Mission<L, C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, step: Step<L, C>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn takeoff(self) -> Self {
        self.push(Step::Takeoff)
    }

    pub fn land(self) -> Self {
        self.push(Step::Land)
    }

    /// Holds the current pose for `delay`.
    pub fn hover(self, delay: Duration) -> Self {
        self.push(Step::Hover(delay))
    }

    /// Does nothing for `delay`; whatever goal is active stays active.
    pub fn wait(self, delay: Duration) -> Self {
        self.push(Step::Wait(delay))
    }

    /// Re-zeroes the pose estimate. Completes immediately.
    pub fn zero(self) -> Self {
        self.push(Step::Zero)
    }

    pub fn go(self, goal: Goal) -> Self {
        self.push(Step::Go(goal))
    }

    pub fn forward(self, distance: f64) -> Self {
        self.push(Step::Move(Mover::Forward, distance))
    }

    pub fn backward(self, distance: f64) -> Self {
        self.push(Step::Move(Mover::Backward, distance))
    }

    pub fn left(self, distance: f64) -> Self {
        self.push(Step::Move(Mover::Left, distance))
    }

    pub fn right(self, distance: f64) -> Self {
        self.push(Step::Move(Mover::Right, distance))
    }

    pub fn up(self, distance: f64) -> Self {
        self.push(Step::Move(Mover::Up, distance))
    }

    pub fn down(self, distance: f64) -> Self {
        self.push(Step::Move(Mover::Down, distance))
    }

    pub fn cw(self, angle: f64) -> Self {
        self.push(Step::Move(Mover::Cw, angle))
    }

    pub fn ccw(self, angle: f64) -> Self {
        self.push(Step::Move(Mover::Ccw, angle))
    }

    pub fn altitude(self, altitude: f64) -> Self {
        self.push(Step::Move(Mover::Altitude, altitude))
    }

    pub fn yaw(self, angle: f64) -> Self {
        self.push(Step::Move(Mover::Yaw, angle))
    }

    pub fn task(
        self,
        task: impl FnOnce(&mut FlightController<L, C>) -> Result<(), AutonomyError> + Send + 'static,
    ) -> Self {
        self.push(Step::Task(Box::new(task)))
    }

    /// Runs `task` with a completion; the mission waits until it is called.
    /// Dropping the completion uncalled fails the mission as abandoned.
    pub fn task_async(
        self,
        task: impl FnOnce(&mut FlightController<L, C>, LinkCompletion) -> Result<(), AutonomyError>
            + Send
            + 'static,
    ) -> Self {
        self.push(Step::AsyncTask(Box::new(task)))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.steps.iter().map(Step::label).collect()
    }

    pub fn start(self) -> MissionRunner<L, C> {
        MissionRunner {
            steps: self.steps.into(),
            index: 0,
            label: "",
            progress: Progress::Ready,
        }
    }
}

// =========================================================================
// == Runner ==
// =========================================================================

#[derive(Debug, Clone)]
pub enum MissionStatus {
    Running,
    Completed,
    Failed(MissionError),
}

enum Progress {
    /// Nothing in flight; the next step starts on the next poll.
    Ready,
    Awaiting(Receiver<Result<(), LinkError>>),
    Until(Instant),
    Completed,
    Failed(MissionError),
}

pub struct MissionRunner<L: VehicleLink, C: Clock = SystemClock> {
    steps: VecDeque<Step<L, C>>,
    /// Index of the step in flight (or the next one when `Ready`).
    index: usize,
    label: &'static str,
    progress: Progress,
}

impl<L: VehicleLink, C: Clock> MissionRunner<L, C> {
    /// Steps that have finished successfully.
    pub fn completed_steps(&self) -> usize {
        self.index
    }

    /// Steps not yet started.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// The step in flight, by index and name.
    pub fn current(&self) -> Option<(usize, &'static str)> {
        match self.progress {
            Progress::Awaiting(_) | Progress::Until(_) => Some((self.index, self.label)),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.progress, Progress::Completed | Progress::Failed(_))
    }

    /// Advances the mission as far as it can go without waiting.
    ///
    /// Once the mission has completed or failed, every later poll reports
    /// the same outcome.
    pub fn poll(&mut self, controller: &mut FlightController<L, C>) -> MissionStatus {
        loop {
            match std::mem::replace(&mut self.progress, Progress::Ready) {
                Progress::Completed => {
                    self.progress = Progress::Completed;
                    return MissionStatus::Completed;
                }
                Progress::Failed(err) => {
                    self.progress = Progress::Failed(err.clone());
                    return MissionStatus::Failed(err);
                }
                Progress::Ready => match self.steps.pop_front() {
                    None => {
                        tracing::info!(steps = self.index, "mission completed");
                        self.progress = Progress::Completed;
                    }
                    Some(step) => {
                        self.label = step.label();
                        tracing::info!(
                            index = self.index,
                            step = self.label,
                            "mission step started"
                        );
                        self.progress = self.begin(step, controller);
                    }
                },
                Progress::Awaiting(rx) => match rx.try_recv() {
                    Ok(Ok(())) => self.advance(),
                    Ok(Err(source)) => {
                        self.fail(MissionError::LinkFailed {
                            index: self.index,
                            step: self.label,
                            source,
                        });
                    }
                    Err(TryRecvError::Empty) => {
                        self.progress = Progress::Awaiting(rx);
                        return MissionStatus::Running;
                    }
                    Err(TryRecvError::Disconnected) => {
                        self.fail(MissionError::Abandoned {
                            index: self.index,
                            step: self.label,
                        });
                    }
                },
                Progress::Until(deadline) => {
                    if controller.clock().now() >= deadline {
                        self.advance();
                    } else {
                        self.progress = Progress::Until(deadline);
                        return MissionStatus::Running;
                    }
                }
            }
        }
    }

    fn begin(&mut self, step: Step<L, C>, controller: &mut FlightController<L, C>) -> Progress {
        let (tx, rx) = channel();
        let result = match step {
            Step::Takeoff => {
                let started = controller.link_mut().takeoff(Box::new(move |r| {
                    let _ = tx.send(r);
                }));
                return match started {
                    Ok(()) => Progress::Awaiting(rx),
                    Err(source) => self.failure(MissionError::LinkFailed {
                        index: self.index,
                        step: self.label,
                        source,
                    }),
                };
            }
            Step::Land => {
                let started = controller.link_mut().land(Box::new(move |r| {
                    let _ = tx.send(r);
                }));
                return match started {
                    Ok(()) => Progress::Awaiting(rx),
                    Err(source) => self.failure(MissionError::LinkFailed {
                        index: self.index,
                        step: self.label,
                        source,
                    }),
                };
            }
            Step::Hover(delay) => deadline(controller.clock(), delay).and_then(|until| {
                controller.hover(None).map(|()| Progress::Until(until))
            }),
            Step::Wait(delay) => deadline(controller.clock(), delay).map(Progress::Until),
            Step::Zero => controller.zero(None).map(|()| self.next()),
            Step::Go(goal) => controller
                .set_goal(goal, Some(goal_done(tx)))
                .map(|()| Progress::Awaiting(rx)),
            Step::Move(mover, value) => mover
                .apply(controller, value, goal_done(tx))
                .map(|()| Progress::Awaiting(rx)),
            Step::Task(task) => task(controller).map(|()| self.next()),
            Step::AsyncTask(task) => {
                let done: LinkCompletion = Box::new(move |r| {
                    let _ = tx.send(r);
                });
                task(controller, done).map(|()| Progress::Awaiting(rx))
            }
        };

        result.unwrap_or_else(|source| {
            self.failure(MissionError::StepFailed {
                index: self.index,
                step: self.label,
                source,
            })
        })
    }

    /// The step finished; move on to the next one.
    fn next(&mut self) -> Progress {
        self.index += 1;
        Progress::Ready
    }

    fn advance(&mut self) {
        self.progress = self.next();
    }

    fn failure(&mut self, err: MissionError) -> Progress {
        tracing::warn!(error = %err, "mission aborted");
        self.steps.clear();
        Progress::Failed(err)
    }

    fn fail(&mut self, err: MissionError) {
        self.progress = self.failure(err);
    }
}

fn deadline<C: Clock>(clock: &C, delay: Duration) -> Result<Instant, AutonomyError> {
    clock
        .now()
        .checked_add(delay)
        .ok_or(AutonomyError::DelayOutOfRange(delay))
}

fn goal_done(tx: std::sync::mpsc::Sender<Result<(), LinkError>>) -> GoalCallback {
    Box::new(move |_| {
        let _ = tx.send(Ok(()));
    })
}
