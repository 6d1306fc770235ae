use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use paddysim::{logging, scenario::ScenarioLoader};

#[derive(Debug, Parser)]
#[command(author, version, about = "Smallholder rice-farming simulation runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/delta_smallholders.yaml")]
    scenario: PathBuf,

    /// Override step count (uses scenario default when omitted)
    #[arg(long)]
    steps: Option<u64>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the log level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let mut scenario = loader.load(&cli.scenario)?;
    scenario.config.max_steps = scenario.steps(cli.steps);
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }
    if let Some(level) = cli.log_level {
        scenario.config.logging.level = level;
    }
    logging::init(&scenario.config.logging)?;

    info!(
        scenario = %scenario.name,
        steps = scenario.config.max_steps,
        seed = scenario.seed,
        "starting run"
    );
    let mut engine = scenario
        .build_engine()
        .with_context(|| format!("Failed to set up scenario '{}'", scenario.name))?;
    let report = engine.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Scenario '{}' completed for {} steps. Farmers: {} | total capital: {:.2} BDT | total debt: {:.2} BDT | harvests: {}",
            report.scenario,
            report.steps,
            report.farmers.len(),
            report.total_capital_bdt,
            report.total_debt_bdt,
            report.harvests
        );
    }
    Ok(())
}
