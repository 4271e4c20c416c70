// autonomy_core/src/lib.rs

// Pose estimation, goal tracking and mission sequencing for a quadrotor.
// Nothing in this crate performs I/O: telemetry comes in through
// `FlightController::on_telemetry`, commands leave through `VehicleLink`.
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod estimation;
pub mod frames;
pub mod link;
pub mod messages;
pub mod mission;
pub mod models;
pub mod prelude;
pub mod types;
