use planner_rust::config::{Cli, Config};
use planner_rust::planner::{solve, SolveOptions};
use planner_rust::scenario::Scenario;
use planner_rust::stat::Stats;

use std::fs::File;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{error, info, Level};

#[derive(Serialize)]
struct RunReport<'a> {
    scenario: &'a str,
    seed: usize,
    timed_out: bool,
    plans: Vec<PlanReport>,
    stats: &'a Stats,
}

#[derive(Serialize)]
struct PlanReport {
    score: usize,
    actions: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = std::fs::read_to_string(config_file)?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed as u64);
    let problem = Scenario::from_config(&config)?.build(&mut rng);
    problem.validate().context("invalid planning problem")?;

    let options = SolveOptions {
        max_solutions: config.max_solutions,
        timeout: config.timeout_ms.map(Duration::from_millis),
        cancel: None,
    };
    let report = solve(&problem, &options)?;

    if report.plans.is_empty() {
        error!("no solution found for scenario {}", config.scenario);
    }
    for ranked in &report.plans {
        assert!(problem.is_valid_plan(&ranked.plan));
        info!(
            "plan with score {} ({} steps): {}",
            ranked.score,
            ranked.plan.len(),
            ranked.plan
        );
    }

    if let Some(output_path) = config.output_path.as_ref() {
        let run_report = RunReport {
            scenario: &config.scenario,
            seed: config.seed,
            timed_out: report.timed_out,
            plans: report
                .plans
                .iter()
                .map(|ranked| PlanReport {
                    score: ranked.score,
                    actions: ranked.plan.encodings(),
                })
                .collect(),
            stats: &report.stats,
        };
        serde_json::to_writer_pretty(File::create(output_path)?, &run_report)?;
        info!("wrote result to {output_path}");
    }

    Ok(())
}
