// autonomy_core/src/estimation/mod.rs

pub mod ekf;

pub use ekf::{Correction, PoseEkf};
