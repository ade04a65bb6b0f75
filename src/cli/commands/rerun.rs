//! Rerun Command
//!
//! Relaunch or deep-research an existing case; edits survive the rerun.

use std::path::PathBuf;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, cancel_on_interrupt, read_images};
use crate::types::{ImageDomain, Result, RunMode};

pub async fn run(
    case_id: &str,
    mode: RunMode,
    images: &[PathBuf],
    domain: ImageDomain,
    format: &str,
) -> Result<()> {
    let ctx = CommandContext::load()?;
    let new_images = read_images(images, domain)?;

    let orchestrator = ctx.orchestrator(mode)?;
    let cancel = cancel_on_interrupt();
    let outcome = ctx
        .service()
        .rerun(&orchestrator, case_id, mode, new_images, &cancel)
        .await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&outcome.version)?);
        return Ok(());
    }

    let out = Output::new();
    out.version(&outcome.version);
    println!();
    out.warnings(outcome.warnings());
    out.success(&format!(
        "Version {} committed ({} mode, {} credits charged)",
        outcome.version.number, mode, outcome.credits_charged
    ));
    Ok(())
}
