// autonomy_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::link::{LinkCompletion, VehicleLink};
pub use crate::models::estimation::dynamics::PlanarDynamics;
pub use crate::models::estimation::measurement::PlanarMeasurement;

// --- Core Data Structures ---
pub use crate::messages::{
    Attitude, BodyVelocity, ControlData, ControllerEvent, MarkerDetection, Telemetry,
    VisionDetect,
};
pub use crate::types::{AxisValues, Goal, Pose, VehicleState};

// --- Configuration & Errors ---
pub use crate::config::{
    AutonomyConfig, AxisGains, CameraConfig, ControllerConfig, EstimatorConfig, RangeSource,
};
pub use crate::error::{AutonomyError, LinkError, MissionError};

// --- Estimation & Control ---
pub use crate::control::{ControllerHandle, Delivery, FlightController, GoalCallback, Pid};
pub use crate::estimation::{Correction, PoseEkf};
pub use crate::mission::{Mission, MissionRunner, MissionStatus};

// --- Concrete Model Implementations ---
pub use crate::models::estimation::dynamics::odometry::OdometryModel;
pub use crate::models::estimation::measurement::marker::MarkerModel;
pub use crate::models::perception::CameraProjector;
