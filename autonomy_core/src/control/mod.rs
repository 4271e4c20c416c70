// autonomy_core/src/control/mod.rs

pub mod controller;
pub mod handle;
pub mod pid;

pub use controller::{FlightController, GoalCallback};
pub use handle::{ControllerHandle, Delivery};
pub use pid::Pid;
