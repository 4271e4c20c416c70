// autonomy_core/src/error.rs

use thiserror::Error;

/// Failures reported by a vehicle link.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("vehicle link disconnected")]
    Disconnected,
    #[error("vehicle rejected command: {0}")]
    CommandRejected(String),
}

#[derive(Debug, Clone, Error)]
pub enum AutonomyError {
    /// Unusable configuration, e.g. a singular camera calibration. Fatal at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The innovation covariance could not be inverted; the correction was skipped.
    #[error("innovation covariance is singular, correction skipped")]
    NumericDegeneracy,

    /// The goal was rejected and the previous goal stays active.
    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    /// A relative goal was requested before any telemetry produced a pose.
    #[error("no pose estimate available yet")]
    PoseUnavailable,

    /// A timed step's delay cannot be added to the current time.
    #[error("delay of {0:?} is too long to schedule")]
    DelayOutOfRange(std::time::Duration),

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Raised when a mission step fails. The remaining steps never run.
#[derive(Debug, Clone, Error)]
pub enum MissionError {
    #[error("mission step {index} ({step}) failed: {source}")]
    StepFailed {
        index: usize,
        step: &'static str,
        #[source]
        source: AutonomyError,
    },
    #[error("mission step {index} ({step}) failed on the vehicle link: {source}")]
    LinkFailed {
        index: usize,
        step: &'static str,
        #[source]
        source: LinkError,
    },
    /// The step's completion was discarded before it fired, e.g. because
    /// the controller was disabled or given another goal from outside.
    #[error("mission step {index} ({step}) was abandoned before completing")]
    Abandoned { index: usize, step: &'static str },
}
