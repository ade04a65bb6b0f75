//! Analyze Command
//!
//! Analyze a new case (simple or full mode) and store it as version 1.

use std::path::PathBuf;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, cancel_on_interrupt, read_case_text, read_images};
use crate::types::{CaseInput, ImageDomain, Result, RunMode};

pub struct AnalyzeOptions {
    pub text: Option<String>,
    pub file: Option<PathBuf>,
    pub images: Vec<PathBuf>,
    pub domain: ImageDomain,
    pub mode: RunMode,
    pub title: Option<String>,
    pub format: String,
}

pub async fn run(options: AnalyzeOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let case_text = read_case_text(options.text, options.file.as_deref())?;
    let input = CaseInput {
        case_text,
        images: read_images(&options.images, options.domain)?,
    };

    let orchestrator = ctx.orchestrator(options.mode)?;
    let cancel = cancel_on_interrupt();
    let outcome = ctx
        .service()
        .analyze(&orchestrator, input, options.title, options.mode, &cancel)
        .await?;

    if options.format == "json" {
        println!("{}", serde_json::to_string_pretty(&outcome.version)?);
        return Ok(());
    }

    let out = Output::new();
    out.version(&outcome.version);
    println!();
    out.warnings(outcome.warnings());
    out.success(&format!(
        "Case {} analyzed ({} credit{} charged)",
        outcome.case_id,
        outcome.credits_charged,
        if outcome.credits_charged == 1 { "" } else { "s" }
    ));
    Ok(())
}
