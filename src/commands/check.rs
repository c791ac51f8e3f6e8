//! `zonepush check`: confirm every host accepts a NETCONF session.

use anyhow::{Context as _, Result};
use junos::NetconfTransport;

use super::Run;
use crate::Context;
use crate::cli::CheckArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &CheckArgs) -> Result<bool> {
    let file = super::load_config(ctx)?;
    let context = file.to_context().context("Invalid rollout file")?;
    let options = file
        .settings
        .rollout_options(super::overrides(&args.run, false));

    if !args.run.json && !ctx.quiet {
        ui::header("Checking connectivity");
        ui::kv("Hosts", &context.inventory().len().to_string());
        println!();
    }

    let transport = NetconfTransport::new(file.settings.ssh_options());
    super::execute(ctx, Run::Check, &args.run, &context, options, &transport)
}
