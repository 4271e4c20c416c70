// autonomy_sim/src/main.rs

use clap::Parser;

use autonomy_sim::cli::Cli;
use autonomy_sim::config::Scenario;
use autonomy_sim::runner::run_scenario;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut scenario = Scenario::load(&cli.scenario)?;
    cli.apply(&mut scenario);
    scenario.validate()?;

    let report = run_scenario(&scenario)?;

    println!("seed:             {}", report.seed);
    println!("completed:        {}", report.completed);
    println!("steps completed:  {}/{}", report.steps_completed, scenario.mission.len());
    println!("simulated time:   {:.2} s ({} ticks)", report.elapsed_s, report.ticks);
    println!(
        "goals reached:    {} (left {})",
        report.goals_reached, report.goals_left
    );
    println!("marker fixes:     {}", report.marker_fixes);
    println!("degraded ticks:   {}", report.degraded_ticks);
    println!(
        "final truth:      x={:.3} y={:.3} z={:.3} yaw={:.1}°",
        report.truth.x,
        report.truth.y,
        report.truth.z,
        report.truth.yaw.to_degrees()
    );
    println!(
        "final estimate:   x={:.3} y={:.3} yaw={:.1}° (error {:.3} m)",
        report.estimate.x,
        report.estimate.y,
        report.estimate.yaw.to_degrees(),
        report.position_error()
    );

    if !report.completed {
        return Err("mission did not complete within the time limit".into());
    }
    Ok(())
}
