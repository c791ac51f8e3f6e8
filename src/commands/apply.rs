//! `zonepush apply`: push the zones to every host.

use anyhow::{Context as _, Result};
use junos::NetconfTransport;

use super::Run;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<bool> {
    let file = super::load_config(ctx)?;
    let context = file.to_context().context("Invalid rollout file")?;
    let options = file
        .settings
        .rollout_options(super::overrides(&args.run, args.dry_run));

    if !args.run.json && !ctx.quiet {
        ui::header("Applying security zones");
        ui::kv("Hosts", &context.inventory().len().to_string());
        ui::kv("Zones", &context.configuration().zones().len().to_string());
        ui::kv("Policy", &options.policy.to_string());
        ui::kv("Jobs", &options.jobs.to_string());
        if args.dry_run {
            ui::warn("Dry run - candidates are validated, then rolled back");
        }
        println!();
    }

    let transport = NetconfTransport::new(file.settings.ssh_options());
    super::execute(ctx, Run::Apply, &args.run, &context, options, &transport)
}
