//! `zonepush render`: print the candidate without contacting any host.

use anyhow::{Context as _, Result};
use rollout::{Renderer, SetRenderer};

use crate::Context;

pub fn run(ctx: &Context) -> Result<bool> {
    let file = super::load_config(ctx)?;
    let context = file.to_context().context("Invalid rollout file")?;
    let text = SetRenderer
        .render(context.configuration())
        .context("Could not render configuration")?;

    print!("{text}");
    Ok(true)
}
