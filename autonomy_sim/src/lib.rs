// autonomy_sim/src/lib.rs

// This prelude is for convenience for code that drives the simulator.
pub mod prelude;

pub mod cli;
pub mod config;
pub mod drone;
pub mod error;
pub mod runner;
pub mod sensors;
