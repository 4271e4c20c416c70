// autonomy_core/src/link.rs

use crate::error::LinkError;
use crate::types::AxisValues;

/// Called once when an asynchronous link operation (takeoff, land) finishes.
pub type LinkCompletion = Box<dyn FnOnce(Result<(), LinkError>) + Send>;

/// The actuation side of the vehicle link.
///
/// Telemetry travels the other way and is pushed into the controller by
/// whoever owns the link (see `ControllerHandle::deliver`).
pub trait VehicleLink: Send {
    /// Sends the four normalized axis commands, each in [−1, 1]:
    /// front (`x`), right (`y`), up (`z`) and clockwise (`yaw`).
    fn send_command(&mut self, command: &AxisValues) -> Result<(), LinkError>;

    /// Zeroes all axes so the vehicle hovers in place.
    fn stop(&mut self) -> Result<(), LinkError>;

    /// Starts a takeoff. `done` fires once the vehicle is airborne.
    fn takeoff(&mut self, done: LinkCompletion) -> Result<(), LinkError>;

    /// Starts a landing. `done` fires once the vehicle is on the ground.
    fn land(&mut self, done: LinkCompletion) -> Result<(), LinkError>;
}
