//! Edit Command
//!
//! Record, apply and update clinician addenda.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{CanonicalSectionId, Result};

/// Log an addendum; with `apply` it is committed immediately as a new version
pub fn record(case_id: &str, section: CanonicalSectionId, text: &str, apply: bool) -> Result<()> {
    let service = CommandContext::load()?.service();
    let out = Output::new();

    if apply {
        let version = service.apply_edit(case_id, section, text)?;
        out.success(&format!(
            "Edit to {} applied as version {}",
            section.title(),
            version.number
        ));
    } else {
        let record = service.record_edit(case_id, section, text)?;
        out.success(&format!("Edit {} recorded for {}", record.id, section.title()));
        out.info("It will be merged into the next relaunch or deep run");
    }
    Ok(())
}

pub fn update(case_id: &str, id: &str, text: &str) -> Result<()> {
    let record = CommandContext::load()?.service().update_edit(case_id, id, text)?;
    Output::new().success(&format!(
        "Edit {} updated ({})",
        record.id,
        record.section_type.title()
    ));
    Ok(())
}

/// List the modification log of a case
pub fn list(case_id: &str) -> Result<()> {
    let history = CommandContext::load()?.service().history(case_id)?;
    let out = Output::new();

    if history.modifications().is_empty() {
        out.info("No edits recorded");
        return Ok(());
    }

    out.header("Edits");
    for record in history.modifications() {
        println!(
            "{}  v{}  {}  {}",
            record.id,
            record.version_at_creation,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.section_type.title()
        );
        println!("    {}", record.added_text.replace('\n', "\n    "));
    }
    Ok(())
}
