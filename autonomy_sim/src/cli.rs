// autonomy_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Headless flight simulator for the autonomy core.
///
/// Loads a scenario, flies its mission against a simulated quadrotor and
/// prints a summary of the run.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/square.toml")]
    pub scenario: PathBuf,

    /// Overrides the scenario's noise seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Overrides the scenario's time limit, in seconds.
    #[arg(long)]
    pub duration: Option<f64>,
}

impl Cli {
    /// Applies the command-line overrides to a loaded scenario.
    pub fn apply(&self, scenario: &mut crate::config::Scenario) {
        if let Some(seed) = self.seed {
            scenario.simulation.seed = Some(seed);
        }
        if let Some(duration) = self.duration {
            scenario.simulation.duration_seconds = duration;
        }
    }
}
