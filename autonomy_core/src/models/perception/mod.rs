// autonomy_core/src/models/perception/mod.rs

pub mod camera;

pub use camera::CameraProjector;
