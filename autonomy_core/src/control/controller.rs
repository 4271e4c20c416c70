// autonomy_core/src/control/controller.rs

use nalgebra::Vector3;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::{AutonomyConfig, ControllerConfig, RangeSource};
use crate::control::pid::Pid;
use crate::error::AutonomyError;
use crate::estimation::PoseEkf;
use crate::frames::{cm_to_m, deg_to_rad, mm_per_s_to_m_per_s, normalize_angle, world_to_body};
use crate::link::VehicleLink;
use crate::messages::{ControlData, ControllerEvent, MarkerDetection, Telemetry};
use crate::models::perception::CameraProjector;
use crate::types::{AxisValues, Goal, Pose, VehicleState};

/// Invoked with the vehicle state once a goal has been held long enough.
pub type GoalCallback = Box<dyn FnOnce(VehicleState) + Send>;

/// The four single-axis regulators, one per controlled axis.
#[derive(Debug, Clone)]
struct Regulators {
    x: Pid,
    y: Pid,
    z: Pid,
    yaw: Pid,
}

impl Regulators {
    fn new(config: &ControllerConfig) -> Self {
        Self {
            x: Pid::new(config.x),
            y: Pid::new(config.y),
            z: Pid::new(config.z),
            yaw: Pid::new(config.yaw),
        }
    }

    fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.z.reset();
        self.yaw.reset();
    }

    fn command(&mut self, error: &AxisValues, now: Instant) -> AxisValues {
        AxisValues {
            x: self.x.command_at(error.x, now),
            y: self.y.command_at(error.y, now),
            z: self.z.command_at(error.z, now),
            yaw: self.yaw.command_at(error.yaw, now),
        }
    }
}

/// A completion callback waiting for its due time.
struct Deferred {
    due: Instant,
    state: VehicleState,
    callback: GoalCallback,
}

/// Drives the vehicle toward a goal pose.
///
/// Each telemetry sample runs one pass: predict (and maybe correct) the
/// pose, compute the per-axis error against the goal, update the goal
/// hysteresis, and send clamped body-frame commands to the vehicle link.
pub struct FlightController<L: VehicleLink, C: Clock = SystemClock> {
    config: ControllerConfig,
    link: L,
    clock: C,
    regulators: Regulators,
    ekf: PoseEkf,
    camera: CameraProjector,
    range_source: RangeSource,
    /// Known marker pose in the world frame.
    marker: Pose,

    enabled: bool,
    goal: Option<Goal>,
    callback: Option<GoalCallback>,
    deferred: Vec<Deferred>,
    /// The last known state, `None` until the first telemetry sample.
    state: Option<VehicleState>,
    /// When the vehicle entered the tolerance band, if it is inside it.
    dwell_since: Option<Instant>,

    subscribers: Vec<Sender<ControllerEvent>>,
}

impl<L: VehicleLink, C: Clock> FlightController<L, C> {
    pub fn new(config: &AutonomyConfig, link: L, clock: C) -> Result<Self, AutonomyError> {
        config.validate()?;

        Ok(Self {
            config: config.controller.clone(),
            link,
            clock,
            regulators: Regulators::new(&config.controller),
            ekf: PoseEkf::new(&config.estimator)?,
            camera: CameraProjector::new(&config.camera)?,
            range_source: config.camera.range_source,
            marker: config.marker,
            enabled: false,
            goal: None,
            callback: None,
            deferred: Vec::new(),
            state: None,
            dwell_since: None,
            subscribers: Vec::new(),
        })
    }

    // --- Accessors ---

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The last known vehicle state.
    pub fn state(&self) -> Option<VehicleState> {
        self.state
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    pub fn estimator(&self) -> &PoseEkf {
        &self.ekf
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Opens a new observation stream. Dropped receivers are pruned on the next emit.
    pub fn subscribe(&mut self) -> Receiver<ControllerEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    // --- Lifecycle ---

    /// Turns control on with fresh regulators, so no integral carries over
    /// from a previous goal.
    pub fn enable(&mut self) {
        self.regulators.reset();
        self.enabled = true;
        tracing::info!("flight controller enabled");
    }

    /// Turns control off and tells the vehicle to stop. Any pending goal
    /// callback is dropped without being called.
    pub fn disable(&mut self) -> Result<(), AutonomyError> {
        self.enabled = false;
        self.callback = None;
        self.deferred.clear();
        tracing::info!("flight controller disabled");
        self.link.stop()?;
        Ok(())
    }

    /// Replaces the goal and re-enables control.
    ///
    /// Yaw is wrapped into (−π, π] and altitude raised to the configured
    /// floor. A goal with non-finite values is rejected and the previous
    /// goal stays active, as it does when the link fails to stop.
    pub fn set_goal(
        &mut self,
        goal: Goal,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        let goal = self.prepare_goal(goal)?;

        // A failed stop leaves the active goal, its callback and the enabled
        // flag as they were.
        self.link.stop()?;
        self.enabled = false;
        self.callback = None;
        self.deferred.clear();
        tracing::info!(
            x = ?goal.x,
            y = ?goal.y,
            z = ?goal.z,
            yaw = ?goal.yaw,
            "new goal"
        );
        self.goal = Some(goal);
        self.callback = callback;
        self.dwell_since = None;
        self.enable();
        Ok(())
    }

    fn prepare_goal(&self, mut goal: Goal) -> Result<Goal, AutonomyError> {
        for (axis, value) in [("x", goal.x), ("y", goal.y), ("z", goal.z), ("yaw", goal.yaw)] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(AutonomyError::InvalidGoal(format!(
                        "axis '{axis}' is not finite ({v})"
                    )));
                }
            }
        }
        goal.yaw = goal.yaw.map(normalize_angle);
        goal.z = goal.z.map(|z| z.max(self.config.minimum_altitude_m));
        goal.reached = false;
        Ok(goal)
    }

    // --- Derived Goals ---

    fn current(&self) -> Result<VehicleState, AutonomyError> {
        self.state.ok_or(AutonomyError::PoseUnavailable)
    }

    /// Holds the current pose.
    pub fn hover(&mut self, callback: Option<GoalCallback>) -> Result<(), AutonomyError> {
        let state = self.current()?;
        self.set_goal(Goal::at(&state), callback)
    }

    /// Moves `distance` meters along the current heading.
    pub fn forward(
        &mut self,
        distance: f64,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        let state = self.current()?;
        let (s, c) = state.yaw.sin_cos();
        let goal = Goal::at(&state)
            .with_x(state.x + distance * c)
            .with_y(state.y + distance * s);
        self.set_goal(goal, callback)
    }

    pub fn backward(
        &mut self,
        distance: f64,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        self.forward(-distance, callback)
    }

    /// Moves `distance` meters perpendicular to the heading, to the right.
    pub fn right(
        &mut self,
        distance: f64,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        let state = self.current()?;
        let (s, c) = state.yaw.sin_cos();
        let goal = Goal::at(&state)
            .with_x(state.x - distance * s)
            .with_y(state.y + distance * c);
        self.set_goal(goal, callback)
    }

    pub fn left(
        &mut self,
        distance: f64,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        self.right(-distance, callback)
    }

    pub fn up(&mut self, distance: f64, callback: Option<GoalCallback>) -> Result<(), AutonomyError> {
        let state = self.current()?;
        self.set_goal(Goal::at(&state).with_z(state.z + distance), callback)
    }

    pub fn down(
        &mut self,
        distance: f64,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        self.up(-distance, callback)
    }

    /// Holds position at an absolute altitude.
    pub fn altitude(
        &mut self,
        altitude: f64,
        callback: Option<GoalCallback>,
    ) -> Result<(), AutonomyError> {
        let state = self.current()?;
        self.set_goal(Goal::at(&state).with_z(altitude), callback)
    }

    /// Holds position at an absolute heading, radians.
    pub fn yaw(&mut self, yaw: f64, callback: Option<GoalCallback>) -> Result<(), AutonomyError> {
        let state = self.current()?;
        self.set_goal(Goal::at(&state).with_yaw(yaw), callback)
    }

    /// Turns clockwise by `angle` radians.
    pub fn cw(&mut self, angle: f64, callback: Option<GoalCallback>) -> Result<(), AutonomyError> {
        let state = self.current()?;
        self.set_goal(Goal::at(&state).with_yaw(state.yaw + angle), callback)
    }

    pub fn ccw(&mut self, angle: f64, callback: Option<GoalCallback>) -> Result<(), AutonomyError> {
        self.cw(-angle, callback)
    }

    /// Re-zeroes the pose estimate at the origin and hovers there.
    pub fn zero(&mut self, callback: Option<GoalCallback>) -> Result<(), AutonomyError> {
        self.current()?;
        self.ekf.reset(Some(Pose::origin()));
        if let Some(state) = self.state.as_mut() {
            state.x = 0.0;
            state.y = 0.0;
            state.yaw = 0.0;
        }
        tracing::info!("pose estimate re-zeroed");
        self.hover(callback)
    }

    // --- Tick ---

    /// Runs completion callbacks whose delay has elapsed. Returns how many ran.
    pub fn poll_deferred(&mut self) -> usize {
        let now = self.clock.now();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|d| d.due <= now);
        self.deferred = pending;

        let fired = due.len();
        for d in due {
            (d.callback)(d.state);
        }
        fired
    }

    /// Processes one telemetry sample.
    ///
    /// Returns the diagnostic record when control ran this tick. A link
    /// failure is returned to the caller and leaves the controller enabled.
    pub fn on_telemetry(
        &mut self,
        telemetry: &Telemetry,
    ) -> Result<Option<ControlData>, AutonomyError> {
        // Callbacks detected on earlier ticks run first, never in the tick
        // that detected them.
        self.poll_deferred();

        self.ekf.predict(telemetry);

        let marker = telemetry.marker().copied();
        let mut degraded = false;
        if let Some(detection) = marker {
            match self.correct_with(&detection, telemetry.altitude_m) {
                Ok(()) => {}
                Err(AutonomyError::NumericDegeneracy) => {
                    tracing::warn!("marker correction degenerate, skipping actuation this tick");
                    degraded = true;
                }
                Err(e) => return Err(e),
            }
        }

        let pose = self.ekf.state();
        let state = VehicleState {
            x: pose.x,
            y: pose.y,
            z: telemetry.altitude_m,
            yaw: pose.yaw,
            vx: mm_per_s_to_m_per_s(telemetry.velocity_mm_s.x),
            vy: mm_per_s_to_m_per_s(telemetry.velocity_mm_s.y),
        };
        self.state = Some(state);

        if !self.enabled {
            return Ok(None);
        }
        self.control(state, marker.is_some(), degraded)
    }

    fn correct_with(
        &mut self,
        detection: &MarkerDetection,
        altitude_m: f64,
    ) -> Result<(), AutonomyError> {
        let range = match self.range_source {
            RangeSource::MarkerDistance => cm_to_m(detection.distance_cm),
            RangeSource::Altitude => altitude_m,
        };
        let (px, py) = detection.center();
        let offset = self.camera.pixel_to_metric(px, py, range);
        let measured = Vector3::new(
            offset.x,
            offset.y,
            normalize_angle(deg_to_rad(detection.orientation_deg)),
        );

        let correction = self.ekf.correct(&measured, &self.marker)?;
        tracing::trace!(
            dx = correction.applied.x,
            dy = correction.applied.y,
            discarded_yaw = correction.discarded_yaw,
            "marker correction"
        );
        Ok(())
    }

    fn control(
        &mut self,
        state: VehicleState,
        marker_seen: bool,
        mut degraded: bool,
    ) -> Result<Option<ControlData>, AutonomyError> {
        let Some(goal) = self.goal else {
            return Ok(None);
        };
        let now = self.clock.now();

        let error = AxisValues {
            x: goal.x.map_or(0.0, |gx| gx - state.x),
            y: goal.y.map_or(0.0, |gy| gy - state.y),
            z: goal.z.map_or(0.0, |gz| gz - state.z),
            yaw: goal.yaw.map_or(0.0, |gyaw| normalize_angle(gyaw - state.yaw)),
        };

        self.update_hysteresis(&error, state, now);

        let raw = self.regulators.command(&error, now);
        let (front, right) = world_to_body(state.yaw, raw.x, raw.y);
        let deadband = self.config.command_deadband;
        let command = AxisValues::new(front, right, raw.z, raw.yaw)
            .map(|v| v.clamp(-1.0, 1.0))
            .map(|v| if v.abs() <= deadband { 0.0 } else { v });

        if ![command.x, command.y, command.z, command.yaw].iter().all(|v| v.is_finite()) {
            tracing::warn!(?command, "non-finite command, skipping actuation this tick");
            degraded = true;
        }

        let sent = if degraded {
            Ok(())
        } else if command.is_zero() {
            self.link.stop()
        } else {
            self.link.send_command(&command)
        };

        let data = ControlData {
            state,
            goal: self.goal.unwrap_or(goal),
            error,
            raw,
            command,
            dwell_started: self.dwell_since.is_some(),
            reached: self.goal.is_some_and(|g| g.reached),
            marker_seen,
            degraded,
        };
        tracing::trace!(?data, "control tick");
        self.emit(ControllerEvent::ControlData(data.clone()));

        sent?;
        Ok(Some(data))
    }

    fn update_hysteresis(&mut self, error: &AxisValues, state: VehicleState, now: Instant) {
        let position_tol = self.config.position_tolerance;
        let within = error.x.abs() <= position_tol
            && error.y.abs() <= position_tol
            && error.z.abs() <= self.config.altitude_tolerance
            && error.yaw.abs() <= self.config.yaw_tolerance;

        let stabilization_delay = self.config.stabilization_delay();
        let callback_delay = self.config.callback_delay();
        let Some(goal) = self.goal.as_mut() else {
            return;
        };

        if within {
            let dwell_since = self.dwell_since;
            match dwell_since {
                None => self.dwell_since = Some(now),
                Some(since) if !goal.reached && now.duration_since(since) > stabilization_delay => {
                    goal.reached = true;
                    tracing::info!(x = state.x, y = state.y, z = state.z, yaw = state.yaw, "goal reached");
                    if let Some(callback) = self.callback.take() {
                        self.deferred.push(Deferred {
                            due: now + callback_delay,
                            state,
                            callback,
                        });
                    }
                    self.emit(ControllerEvent::GoalReached(state));
                }
                Some(_) => {}
            }
        } else {
            self.dwell_since = None;
            if goal.reached {
                goal.reached = false;
                tracing::info!(x = state.x, y = state.y, z = state.z, yaw = state.yaw, "goal left");
                self.emit(ControllerEvent::GoalLeft(state));
            }
        }
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AxisGains;
    use crate::error::LinkError;
    use crate::link::LinkCompletion;
    use crate::messages::{Attitude, VisionDetect};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct MockLink {
        commands: Vec<AxisValues>,
        stops: usize,
        fail: bool,
    }

    impl VehicleLink for MockLink {
        fn send_command(&mut self, command: &AxisValues) -> Result<(), LinkError> {
            if self.fail {
                return Err(LinkError::Disconnected);
            }
            self.commands.push(*command);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), LinkError> {
            if self.fail {
                return Err(LinkError::Disconnected);
            }
            self.stops += 1;
            Ok(())
        }

        fn takeoff(&mut self, done: LinkCompletion) -> Result<(), LinkError> {
            done(Ok(()));
            Ok(())
        }

        fn land(&mut self, done: LinkCompletion) -> Result<(), LinkError> {
            done(Ok(()));
            Ok(())
        }
    }

    type TestController = FlightController<MockLink, ManualClock>;

    fn controller_with(config: AutonomyConfig) -> (TestController, ManualClock) {
        let clock = ManualClock::new();
        let ctrl = FlightController::new(&config, MockLink::default(), clock.clone()).unwrap();
        (ctrl, clock)
    }

    fn controller() -> (TestController, ManualClock) {
        controller_with(AutonomyConfig::default())
    }

    fn at_altitude(altitude_m: f64) -> Telemetry {
        Telemetry {
            altitude_m,
            ..Default::default()
        }
    }

    fn place(ctrl: &mut TestController, x: f64, y: f64, z: f64, yaw: f64) {
        ctrl.state = Some(VehicleState {
            x,
            y,
            z,
            yaw,
            ..Default::default()
        });
    }

    fn counter() -> (Arc<AtomicUsize>, GoalCallback) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        (
            calls,
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn reached_and_left(rx: &Receiver<ControllerEvent>) -> (usize, usize) {
        rx.try_iter().fold((0, 0), |(r, l), event| match event {
            ControllerEvent::GoalReached(_) => (r + 1, l),
            ControllerEvent::GoalLeft(_) => (r, l + 1),
            ControllerEvent::ControlData(_) => (r, l),
        })
    }

    fn goal_xyz_yaw(ctrl: &TestController) -> (f64, f64, f64, f64) {
        let goal = ctrl.goal().unwrap();
        (
            goal.x.unwrap(),
            goal.y.unwrap(),
            goal.z.unwrap(),
            goal.yaw.unwrap(),
        )
    }

    // --- Lifecycle ---

    #[test]
    fn disabling_the_controller_stops_the_drone() {
        let (mut ctrl, _) = controller();
        ctrl.disable().unwrap();
        assert_eq!(ctrl.link().stops, 1);
        assert!(!ctrl.is_enabled());
    }

    #[test]
    fn disabled_controller_tracks_state_without_actuating() {
        let (mut ctrl, _) = controller();
        let out = ctrl.on_telemetry(&at_altitude(1.2)).unwrap();
        assert!(out.is_none());
        assert_eq!(ctrl.state().unwrap().z, 1.2);
        assert!(ctrl.link().commands.is_empty());
        assert_eq!(ctrl.link().stops, 0);
    }

    #[test]
    fn set_goal_enables_with_normalized_yaw() {
        let (mut ctrl, _) = controller();
        ctrl.set_goal(Goal::default().with_yaw(3.0 * PI / 2.0), None)
            .unwrap();
        assert!(ctrl.is_enabled());
        assert_abs_diff_eq!(ctrl.goal().unwrap().yaw.unwrap(), -PI / 2.0, epsilon = 1e-12);
        assert!(!ctrl.goal().unwrap().reached);
    }

    #[test]
    fn non_finite_goal_is_rejected_and_previous_goal_kept() {
        let (mut ctrl, _) = controller();
        ctrl.set_goal(Goal::default().with_x(1.0), None).unwrap();
        let err = ctrl.set_goal(Goal::default().with_yaw(f64::NAN), None);
        assert!(matches!(err, Err(AutonomyError::InvalidGoal(_))));
        assert_eq!(ctrl.goal().unwrap().x, Some(1.0));
        assert!(ctrl.is_enabled());
    }

    #[test]
    fn relative_goals_need_a_pose() {
        let (mut ctrl, _) = controller();
        assert!(matches!(
            ctrl.forward(1.0, None),
            Err(AutonomyError::PoseUnavailable)
        ));
        assert!(ctrl.goal().is_none());
    }

    #[test]
    fn failed_zero_leaves_the_estimator_alone() {
        let mut config = AutonomyConfig::default();
        config.estimator.initial_pose = Pose::new(1.0, -2.0, 0.5);
        let (mut ctrl, _) = controller_with(config);
        assert!(matches!(ctrl.zero(None), Err(AutonomyError::PoseUnavailable)));
        assert_eq!(ctrl.estimator().state(), Pose::new(1.0, -2.0, 0.5));
        assert!(ctrl.goal().is_none());
    }

    // --- Derived Goals ---

    #[test]
    fn hover_assigns_current_state_as_goal() {
        let (mut ctrl, _) = controller();
        place(&mut ctrl, 1.0, 2.0, 3.0, 0.0);
        ctrl.hover(None).unwrap();
        assert_eq!(goal_xyz_yaw(&ctrl), (1.0, 2.0, 3.0, 0.0));
    }

    #[test]
    fn forward_follows_heading() {
        let (mut ctrl, _) = controller();
        place(&mut ctrl, 0.0, 0.0, 1.0, 0.0);
        ctrl.forward(2.0, None).unwrap();
        assert_eq!(goal_xyz_yaw(&ctrl), (2.0, 0.0, 1.0, 0.0));

        place(&mut ctrl, 0.0, 0.0, 1.0, PI / 2.0);
        ctrl.forward(1.0, None).unwrap();
        let (x, y, z, yaw) = goal_xyz_yaw(&ctrl);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(z, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(yaw, PI / 2.0, epsilon = 1e-3);

        place(&mut ctrl, 0.0, 0.0, 1.0, PI / 4.0);
        ctrl.forward(1.0, None).unwrap();
        let (x, y, _, _) = goal_xyz_yaw(&ctrl);
        assert_abs_diff_eq!(x, y, epsilon = 1e-9);

        place(&mut ctrl, 0.0, 0.0, 1.0, -PI / 4.0);
        ctrl.forward(1.0, None).unwrap();
        let (x, y, _, _) = goal_xyz_yaw(&ctrl);
        assert_abs_diff_eq!(x, -y, epsilon = 1e-9);
    }

    #[test]
    fn right_is_perpendicular_to_heading() {
        let (mut ctrl, _) = controller();
        place(&mut ctrl, 0.0, 0.0, 1.0, 0.0);
        ctrl.right(1.0, None).unwrap();
        let (x, y, _, _) = goal_xyz_yaw(&ctrl);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 1.0, epsilon = 1e-12);

        place(&mut ctrl, 0.0, 0.0, 1.0, PI / 2.0);
        ctrl.right(1.0, None).unwrap();
        let (x, y, _, _) = goal_xyz_yaw(&ctrl);
        assert_abs_diff_eq!(x, -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-9);

        place(&mut ctrl, 0.0, 0.0, 1.0, PI / 4.0);
        ctrl.right(1.0, None).unwrap();
        let (x, y, _, _) = goal_xyz_yaw(&ctrl);
        assert_abs_diff_eq!(x, -y, epsilon = 1e-9);
    }

    #[test]
    fn opposite_movers_agree_for_any_heading() {
        let (mut ctrl, _) = controller();
        for i in 0..12 {
            let yaw = -PI + 0.1 + i as f64 * 0.5;
            place(&mut ctrl, 0.4, -1.1, 2.0, yaw);

            ctrl.backward(0.7, None).unwrap();
            let backward = *ctrl.goal().unwrap();
            ctrl.forward(-0.7, None).unwrap();
            assert_eq!(backward, *ctrl.goal().unwrap());

            ctrl.left(1.3, None).unwrap();
            let left = *ctrl.goal().unwrap();
            ctrl.right(-1.3, None).unwrap();
            assert_eq!(left, *ctrl.goal().unwrap());

            ctrl.down(0.4, None).unwrap();
            let down = *ctrl.goal().unwrap();
            ctrl.up(-0.4, None).unwrap();
            assert_eq!(down, *ctrl.goal().unwrap());

            ctrl.ccw(0.3, None).unwrap();
            let ccw = *ctrl.goal().unwrap();
            ctrl.cw(-0.3, None).unwrap();
            assert_eq!(ccw, *ctrl.goal().unwrap());
        }
    }

    #[test]
    fn up_and_altitude() {
        let (mut ctrl, _) = controller();
        place(&mut ctrl, 1.0, 2.0, 3.0, 0.0);
        ctrl.up(1.0, None).unwrap();
        assert_eq!(goal_xyz_yaw(&ctrl), (1.0, 2.0, 4.0, 0.0));

        place(&mut ctrl, 0.0, 0.0, 1.0, 0.0);
        ctrl.altitude(3.0, None).unwrap();
        assert_eq!(goal_xyz_yaw(&ctrl), (0.0, 0.0, 3.0, 0.0));
    }

    #[test]
    fn cannot_go_below_minimum_altitude() {
        let (mut ctrl, _) = controller();
        place(&mut ctrl, 0.0, 0.0, 1.0, 0.0);
        ctrl.down(1.0, None).unwrap();
        assert_eq!(goal_xyz_yaw(&ctrl), (0.0, 0.0, 0.5, 0.0));

        ctrl.altitude(0.1, None).unwrap();
        assert_eq!(ctrl.goal().unwrap().z, Some(0.5));
    }

    #[test]
    fn cw_turns_and_wraps() {
        let (mut ctrl, _) = controller();
        place(&mut ctrl, 0.0, 0.0, 1.0, 3.0);
        ctrl.cw(PI / 2.0, None).unwrap();
        let yaw = ctrl.goal().unwrap().yaw.unwrap();
        assert_abs_diff_eq!(yaw, 3.0 + PI / 2.0 - 2.0 * PI, epsilon = 1e-12);
        assert!(yaw > -PI && yaw <= PI);
    }

    #[test]
    fn zero_resets_the_estimator_and_hovers_at_origin() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        clock.advance(Duration::from_millis(66));
        let moving = Telemetry {
            velocity_mm_s: crate::messages::BodyVelocity {
                x: 900.0,
                y: 0.0,
                z: 0.0,
            },
            ..at_altitude(1.0)
        };
        ctrl.on_telemetry(&moving).unwrap();
        assert!(ctrl.estimator().state().x > 0.0);

        ctrl.zero(None).unwrap();
        assert_eq!(ctrl.estimator().state(), Pose::origin());
        assert_eq!(*ctrl.estimator().confidence(), nalgebra::Matrix3::identity());
        assert_eq!(goal_xyz_yaw(&ctrl), (0.0, 0.0, 1.0, 0.0));
    }

    // --- Goal Hysteresis ---

    /// Takes one sample at `altitude`, then advances the clock by 100 ms.
    fn tick(ctrl: &mut TestController, clock: &ManualClock, altitude: f64) -> ControlData {
        let data = ctrl.on_telemetry(&at_altitude(altitude)).unwrap().unwrap();
        clock.advance(Duration::from_millis(100));
        data
    }

    #[test]
    fn goal_reached_fires_once_after_stabilization_delay() {
        let (mut ctrl, clock) = controller();
        let rx = ctrl.subscribe();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        let (calls, callback) = counter();
        ctrl.hover(Some(callback)).unwrap();

        // Dwell starts on the first tick in tolerance (t = 0) and must
        // exceed 1000 ms, so ticks at 0..=1000 ms do not reach the goal.
        for _ in 0..=10 {
            let data = tick(&mut ctrl, &clock, 1.0);
            assert!(data.dwell_started);
            assert!(!data.reached);
        }
        assert_eq!(reached_and_left(&rx), (0, 0));

        // t = 1100 ms: reached, but the callback is deferred past this tick.
        let data = tick(&mut ctrl, &clock, 1.0);
        assert!(data.reached);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(reached_and_left(&rx), (1, 0));

        // Holding on does not fire again; the callback runs on the next tick.
        for _ in 0..10 {
            tick(&mut ctrl, &clock, 1.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(reached_and_left(&rx), (0, 0));
        assert!(ctrl.goal().unwrap().reached);
    }

    #[test]
    fn poll_deferred_runs_due_callbacks_between_ticks() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        let (calls, callback) = counter();
        ctrl.hover(Some(callback)).unwrap();
        for _ in 0..12 {
            tick(&mut ctrl, &clock, 1.0);
        }
        assert!(ctrl.goal().unwrap().reached);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctrl.poll_deferred(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drifting_out_before_the_delay_restarts_the_dwell() {
        let (mut ctrl, clock) = controller();
        let rx = ctrl.subscribe();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.hover(None).unwrap();

        for _ in 0..6 {
            tick(&mut ctrl, &clock, 1.0);
        }
        // Out of tolerance at 600 ms: no reached, and nothing to leave yet.
        let data = tick(&mut ctrl, &clock, 1.3);
        assert!(!data.dwell_started);
        assert_eq!(reached_and_left(&rx), (0, 0));

        // Back in at 700 ms; a full delay is needed from here on.
        for _ in 0..11 {
            let data = tick(&mut ctrl, &clock, 1.0);
            assert!(!data.reached);
        }
        assert_eq!(reached_and_left(&rx), (0, 0));
        let data = tick(&mut ctrl, &clock, 1.0);
        assert!(data.reached);
        assert_eq!(reached_and_left(&rx), (1, 0));
    }

    #[test]
    fn goal_left_fires_once_per_departure() {
        let (mut ctrl, clock) = controller();
        let rx = ctrl.subscribe();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.hover(None).unwrap();
        for _ in 0..12 {
            tick(&mut ctrl, &clock, 1.0);
        }
        assert_eq!(reached_and_left(&rx), (1, 0));

        for _ in 0..5 {
            let data = tick(&mut ctrl, &clock, 1.4);
            assert!(!data.reached);
        }
        assert_eq!(reached_and_left(&rx), (0, 1));
        assert!(!ctrl.goal().unwrap().reached);

        // Settling again re-arms both events.
        for _ in 0..12 {
            tick(&mut ctrl, &clock, 1.0);
        }
        tick(&mut ctrl, &clock, 1.4);
        assert_eq!(reached_and_left(&rx), (1, 1));
    }

    #[test]
    fn new_goal_discards_pending_callback() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        let (first_calls, first) = counter();
        ctrl.hover(Some(first)).unwrap();
        tick(&mut ctrl, &clock, 1.0);

        let (second_calls, second) = counter();
        ctrl.hover(Some(second)).unwrap();
        for _ in 0..15 {
            tick(&mut ctrl, &clock, 1.0);
        }
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disable_discards_deferred_callback() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        let (calls, callback) = counter();
        ctrl.hover(Some(callback)).unwrap();
        for _ in 0..12 {
            tick(&mut ctrl, &clock, 1.0);
        }
        assert!(ctrl.goal().unwrap().reached);
        ctrl.disable().unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(ctrl.poll_deferred(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // --- Actuation ---

    #[test]
    fn commands_are_clamped_and_rotated_into_body_frame() {
        let mut config = AutonomyConfig::default();
        config.estimator.initial_pose = Pose::new(0.0, 0.0, PI / 2.0);
        let (mut ctrl, clock) = controller_with(config);
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.set_goal(Goal::default().with_x(100.0).with_z(40.0), None)
            .unwrap();

        let data = tick(&mut ctrl, &clock, 1.0);
        // Facing +y, a goal far along +x lies to the vehicle's left.
        assert!(data.raw.x > 1.0);
        assert_abs_diff_eq!(data.command.x, 0.0, epsilon = 1e-9);
        assert_eq!(data.command.y, -1.0);
        assert_eq!(data.command.z, 1.0);
        for cmd in &ctrl.link().commands {
            for v in [cmd.x, cmd.y, cmd.z, cmd.yaw] {
                assert!((-1.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn yaw_error_takes_the_short_way_across_the_seam() {
        let mut config = AutonomyConfig::default();
        config.estimator.initial_pose = Pose::new(0.0, 0.0, -3.0);
        let (mut ctrl, clock) = controller_with(config);
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.yaw(3.0, None).unwrap();

        let data = tick(&mut ctrl, &clock, 1.0);
        assert_abs_diff_eq!(data.error.yaw, 6.0 - 2.0 * PI, epsilon = 1e-9);
        assert!(data.error.yaw > -PI && data.error.yaw <= PI);
        // Turning counter-clockwise by 0.28 rad beats clockwise by 6 rad.
        assert!(data.raw.yaw < 0.0);
        assert!(data.command.yaw < 0.0);
    }

    #[test]
    fn negligible_commands_become_a_stop() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.hover(None).unwrap();
        let stops_before = ctrl.link().stops;
        let data = tick(&mut ctrl, &clock, 1.02);
        // 0.3 * 0.02 is inside the deadband.
        assert!(data.command.is_zero());
        assert_eq!(ctrl.link().stops, stops_before + 1);
        assert!(ctrl.link().commands.is_empty());
    }

    #[test]
    fn re_enabling_clears_regulator_memory() {
        let mut config = AutonomyConfig::default();
        config.controller.z = AxisGains::new(0.3, 0.5, 0.2);
        let (mut ctrl, clock) = controller_with(config);
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.hover(None).unwrap();

        // A large altitude error winds up the integrator.
        for _ in 0..10 {
            tick(&mut ctrl, &clock, 3.0);
        }
        assert!(ctrl.regulators.z.integral().abs() > 0.5);

        ctrl.disable().unwrap();
        ctrl.enable();
        assert_eq!(ctrl.regulators.z.integral(), 0.0);

        let data = tick(&mut ctrl, &clock, 1.0);
        assert_eq!(data.error.z, 0.0);
        assert_eq!(data.raw.z, 0.0);

        let data = tick(&mut ctrl, &clock, 1.5);
        // Second call after reset: proportional plus the fresh integral and derivative only.
        let expected = 0.3 * -0.5 + 0.5 * (-0.5 * 0.1) + 0.2 * (-0.5 / 0.1);
        assert_abs_diff_eq!(data.raw.z, expected, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_correction_skips_actuation() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.set_goal(Goal::default().with_z(2.0), None).unwrap();
        let stops_before = ctrl.link().stops;

        let corrupt = Telemetry {
            vision: Some(VisionDetect {
                detections: vec![MarkerDetection {
                    xc: 500.0,
                    yc: 500.0,
                    distance_cm: f64::NAN,
                    ..Default::default()
                }],
            }),
            ..at_altitude(1.0)
        };
        let data = ctrl.on_telemetry(&corrupt).unwrap().unwrap();
        assert!(data.degraded);
        assert!(data.marker_seen);
        assert!(ctrl.link().commands.is_empty());
        assert_eq!(ctrl.link().stops, stops_before);
        assert!(ctrl.estimator().state().x.is_finite());

        clock.advance(Duration::from_millis(100));
        let data = ctrl.on_telemetry(&at_altitude(1.0)).unwrap().unwrap();
        assert!(!data.degraded);
        assert_eq!(ctrl.link().commands.len(), 1);
    }

    #[test]
    fn marker_under_the_vehicle_keeps_the_estimate_at_the_origin() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.hover(None).unwrap();

        // Principal point on the 1000x1000 grid, offset by half the marker box.
        let detection = MarkerDetection {
            xc: 329.323208 * 1000.0 / 640.0 - 20.0,
            yc: 159.323007 * 1000.0 / 360.0 - 20.0,
            width: 40.0,
            height: 40.0,
            orientation_deg: 0.0,
            distance_cm: 100.0,
        };
        let sample = Telemetry {
            attitude_deg: Attitude::default(),
            vision: Some(VisionDetect {
                detections: vec![detection],
            }),
            ..at_altitude(1.0)
        };
        let data = ctrl.on_telemetry(&sample).unwrap().unwrap();
        clock.advance(Duration::from_millis(100));
        assert!(data.marker_seen);
        assert_abs_diff_eq!(data.state.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(data.state.y, 0.0, epsilon = 1e-9);
        assert!(ctrl.estimator().confidence()[(0, 0)] < 1.0);
    }

    #[test]
    fn link_failure_is_reported_and_control_stays_enabled() {
        let (mut ctrl, _) = controller();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.set_goal(Goal::default().with_z(2.0), None).unwrap();
        ctrl.link_mut().fail = true;

        let result = ctrl.on_telemetry(&at_altitude(1.0));
        assert!(matches!(
            result,
            Err(AutonomyError::Link(LinkError::Disconnected))
        ));
        assert!(ctrl.is_enabled());
    }

    #[test]
    fn failed_stop_on_new_goal_keeps_the_active_goal() {
        let (mut ctrl, clock) = controller();
        ctrl.on_telemetry(&at_altitude(2.0)).unwrap();
        let (calls, callback) = counter();
        ctrl.set_goal(Goal::default().with_z(2.0), Some(callback))
            .unwrap();
        ctrl.link_mut().fail = true;

        let result = ctrl.set_goal(Goal::default().with_z(3.0), None);
        assert!(matches!(
            result,
            Err(AutonomyError::Link(LinkError::Disconnected))
        ));
        assert!(ctrl.is_enabled());
        assert_eq!(ctrl.goal().unwrap().z, Some(2.0));

        // The kept callback still fires once the old goal is held.
        ctrl.link_mut().fail = false;
        for _ in 0..15 {
            tick(&mut ctrl, &clock, 2.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn control_data_is_emitted_every_enabled_tick() {
        let (mut ctrl, clock) = controller();
        let rx = ctrl.subscribe();
        ctrl.on_telemetry(&at_altitude(1.0)).unwrap();
        ctrl.set_goal(Goal::default().with_z(1.5), None).unwrap();
        for _ in 0..5 {
            tick(&mut ctrl, &clock, 1.0);
        }
        let samples: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                ControllerEvent::ControlData(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(samples.len(), 5);
        assert!(samples.iter().all(|d| !d.marker_seen));
        assert_abs_diff_eq!(samples[0].error.z, 0.5, epsilon = 1e-12);
    }
}
