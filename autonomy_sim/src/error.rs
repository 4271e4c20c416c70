// autonomy_sim/src/error.rs

use autonomy_core::error::{AutonomyError, MissionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// The scenario file (or its environment overrides) could not be read.
    #[error("failed to load scenario: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    /// The scenario parsed but holds values the simulation cannot run with.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error(transparent)]
    Autonomy(#[from] AutonomyError),

    #[error("mission failed: {0}")]
    Mission(#[from] MissionError),
}

impl From<figment::Error> for SimError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
