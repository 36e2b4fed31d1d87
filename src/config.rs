use anyhow::anyhow;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(
    name = "Rust Planner",
    about = "Anytime window-constrained planning search implemented in Rust.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(
        long,
        help = "Scenario to solve (blocksworld, random-blocksworld, dockworker)"
    )]
    pub scenario: Option<String>,

    #[arg(long, help = "Number of blocks for blocks-world instances")]
    pub num_blocks: Option<usize>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<usize>,

    #[arg(long, help = "Maximum number of solution candidates to collect")]
    pub max_solutions: Option<usize>,

    #[arg(long, help = "Search timeout in milliseconds")]
    pub timeout_ms: Option<u64>,

    #[arg(long, help = "Path to the JSON result file")]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scenario: String,
    pub num_blocks: usize,
    pub seed: usize,
    pub max_solutions: usize,
    pub timeout_ms: Option<u64>,
    pub output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scenario: "blocksworld".to_string(),
            num_blocks: 4,
            seed: 0,
            max_solutions: 1,
            timeout_ms: None,
            output_path: None,
        }
    }
}

impl Config {
    pub fn from_yaml_str(config_str: &str) -> anyhow::Result<Config> {
        Ok(serde_yaml::from_str(config_str)?)
    }

    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Config> {
        if let Some(scenario) = cli.scenario.as_ref() {
            self.scenario = scenario.clone();
        }
        if let Some(num_blocks) = cli.num_blocks {
            self.num_blocks = num_blocks;
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(max_solutions) = cli.max_solutions {
            self.max_solutions = max_solutions;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.timeout_ms = Some(timeout_ms);
        }
        if let Some(output_path) = cli.output_path.as_ref() {
            self.output_path = Some(output_path.clone());
        }
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.scenario.as_str() {
            "blocksworld" | "random-blocksworld" | "dockworker" => {}
            other => return Err(anyhow!("unknown scenario {other}")),
        }
        if !(2..=26).contains(&self.num_blocks) {
            return Err(anyhow!(
                "blocks-world instances need between 2 and 26 blocks, got {}",
                self.num_blocks
            ));
        }
        if self.max_solutions == 0 {
            return Err(anyhow!("max_solutions must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_config_overrides_defaults() {
        let config = Config::from_yaml_str("scenario: dockworker\nmax_solutions: 3\n").unwrap();
        assert_eq!(config.scenario, "dockworker");
        assert_eq!(config.max_solutions, 3);
        assert_eq!(config.num_blocks, 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.num_blocks = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scenario = "sokoban".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_solutions = 0;
        assert!(config.validate().is_err());
    }
}
