use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use rollout::AbortPolicy;
use std::path::PathBuf;

use crate::paths::ENV_CONFIG;

#[derive(Parser)]
#[command(name = "zonepush")]
#[command(version)]
#[command(about = "Push security zone configuration to a fleet of Junos firewalls", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Rollout file (YAML, TOML or JSON)
    #[arg(short, long, env = ENV_CONFIG, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render, validate and commit the configuration on every host (default)
    Apply(ApplyArgs),

    /// Open and close a session with every host without changing anything
    Check(CheckArgs),

    /// Print the candidate configuration without contacting any host
    Render,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// Number of hosts processed in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// What to do when a host fails
    #[arg(short, long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Default)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Validate on every host, then roll back instead of committing
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Stop at the first failed host
    FailFast,
    /// Try every host, fail at the end if any failed
    BestEffort,
}

impl From<PolicyArg> for AbortPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FailFast => Self::FailFast,
            PolicyArg::BestEffort => Self::BestEffort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["zonepush"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from([
            "zonepush",
            "apply",
            "--jobs",
            "4",
            "--policy",
            "best-effort",
            "--dry-run",
        ])
        .unwrap();
        let Some(Command::Apply(args)) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.run.jobs, Some(4));
        assert!(matches!(args.run.policy, Some(PolicyArg::BestEffort)));
        assert!(args.dry_run);
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["zonepush", "check", "-c", "fleet.toml", "-vv"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("fleet.toml")));
        assert_eq!(cli.verbose, 2);
    }
}
