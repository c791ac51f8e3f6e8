//! Command implementations for zonepush

pub mod apply;
pub mod check;
pub mod render;

use anyhow::Result;
use colored::Colorize;
use rollout::{
    FleetOrchestrator, LogReporter, RolloutContext, RolloutOptions, RunReport, SetRenderer,
    Transport, TxState,
};

use crate::Context;
use crate::cli::RunArgs;
use crate::config::{ConfigFile, Overrides};
use crate::paths;
use crate::reporter::ConsoleReporter;
use crate::ui;

/// What a fleet run does on each host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Run {
    Apply,
    Check,
}

/// Locate and parse the rollout file.
pub fn load_config(ctx: &Context) -> Result<ConfigFile> {
    let path = paths::config_path(ctx.config.as_deref())?;
    log::info!("Loading {}", path.display());
    ConfigFile::load(&path)
}

/// Merge command-line flags into the file's settings.
pub fn overrides(args: &RunArgs, dry_run: bool) -> Overrides {
    Overrides {
        jobs: args.jobs,
        policy: args.policy.map(Into::into),
        dry_run,
    }
}

/// Drive the fleet and print the result. Returns whether the run succeeded.
pub fn execute(
    ctx: &Context,
    run: Run,
    args: &RunArgs,
    context: &RolloutContext,
    options: RolloutOptions,
    transport: &dyn Transport,
) -> Result<bool> {
    let renderer = SetRenderer;

    let report = if args.json {
        let orchestrator =
            FleetOrchestrator::new(transport, &renderer, &LogReporter).with_options(options);
        drive(&orchestrator, run, context)
    } else {
        let reporter = ConsoleReporter::new(context.inventory().len(), ctx.quiet);
        let orchestrator =
            FleetOrchestrator::new(transport, &renderer, &reporter).with_options(options);
        let report = drive(&orchestrator, run, context);
        reporter.finish();
        report
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(ctx, run, &report);
    }

    Ok(report.is_success())
}

fn drive(orchestrator: &FleetOrchestrator<'_>, run: Run, context: &RolloutContext) -> RunReport {
    match run {
        Run::Apply => orchestrator.run(context),
        Run::Check => orchestrator.check(context),
    }
}

fn print_summary(ctx: &Context, run: Run, report: &RunReport) {
    if !ctx.quiet {
        ui::header("Summary");

        for result in &report.results {
            println!(
                "  {} {} {}",
                ui::state_symbol(result.state),
                result.host.name().bold(),
                format!("{} ({} ms)", result.state, result.duration_ms).dimmed()
            );
            if let Some(cause) = &result.cause {
                ui::dim(&cause.to_string());
            }
            if let Some(diff) = &result.diff {
                for line in diff.lines() {
                    ui::dim(line);
                }
            }
        }
        for host in &report.skipped {
            println!("  {} {} {}", "⊘".dimmed(), host.name(), "skipped".dimmed());
        }

        println!();
        match run {
            Run::Apply => {
                ui::kv("Committed", &report.count(TxState::Committed).to_string());
                ui::kv("Rolled back", &report.count(TxState::RolledBack).to_string());
            }
            Run::Check => ui::kv("Reachable", &report.count(TxState::Idle).to_string()),
        }
        ui::kv("Failed", &report.count(TxState::Failed).to_string());
        ui::kv("Skipped", &report.skipped.len().to_string());
        println!();
    }

    if let Some(host) = &report.aborted_by {
        ui::warn(&format!("Run aborted after {host} failed"));
    }
    if report.is_success() {
        ui::success(match run {
            Run::Apply => "Rollout complete",
            Run::Check => "All hosts reachable",
        });
    } else {
        ui::error(match run {
            Run::Apply => "Rollout failed",
            Run::Check => "Some hosts are unreachable",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout::{
        AbortPolicy, Configuration, ConnectionErrorKind, Credentials, Host, MockTransport,
        SecurityZone,
    };

    fn quiet() -> Context {
        Context {
            quiet: true,
            config: None,
        }
    }

    fn fleet(names: &[&str]) -> RolloutContext {
        let inventory = names
            .iter()
            .map(|n| Host::new(*n, "192.0.2.1").unwrap())
            .collect();
        let zone = SecurityZone::new("trust", false, None, vec!["ge-0/0/0".to_string()]).unwrap();
        RolloutContext::new(
            Credentials::new("admin", Some("secret".to_string()), None).unwrap(),
            inventory,
            Configuration::new(vec![zone]).unwrap(),
        )
    }

    #[test]
    fn test_apply_success_returns_true() {
        let transport = MockTransport::new();
        let args = RunArgs::default();
        let ok = execute(
            &quiet(),
            Run::Apply,
            &args,
            &fleet(&["fw1", "fw2"]),
            RolloutOptions::default(),
            &transport,
        )
        .unwrap();

        assert!(ok);
        assert_eq!(transport.calls("fw2").commit, 1);
    }

    #[test]
    fn test_failed_host_returns_false() {
        let transport = MockTransport::new();
        transport.configure("fw1", |d| d.connect_error = Some(ConnectionErrorKind::AuthFailed));
        let args = RunArgs {
            json: true,
            ..Default::default()
        };
        let options = RolloutOptions {
            policy: AbortPolicy::BestEffort,
            ..Default::default()
        };

        let ok = execute(&quiet(), Run::Apply, &args, &fleet(&["fw1", "fw2"]), options, &transport)
            .unwrap();

        assert!(!ok);
        assert_eq!(transport.calls("fw2").commit, 1);
    }

    #[test]
    fn test_check_does_not_load() {
        let transport = MockTransport::new();
        let ok = execute(
            &quiet(),
            Run::Check,
            &RunArgs::default(),
            &fleet(&["fw1"]),
            RolloutOptions::default(),
            &transport,
        )
        .unwrap();

        assert!(ok);
        assert_eq!(transport.calls("fw1").load, 0);
        assert_eq!(transport.calls("fw1").close, 1);
    }

    #[test]
    fn test_overrides_from_flags() {
        let args = RunArgs {
            jobs: Some(8),
            policy: Some(crate::cli::PolicyArg::BestEffort),
            json: false,
        };
        let overrides = overrides(&args, true);
        assert_eq!(overrides.jobs, Some(8));
        assert_eq!(overrides.policy, Some(AbortPolicy::BestEffort));
        assert!(overrides.dry_run);
    }
}
