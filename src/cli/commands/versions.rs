//! Versions Command
//!
//! List the version history of a case and restore older versions.

use console::style;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::Result;

pub fn list(case_id: &str) -> Result<()> {
    let history = CommandContext::load()?.service().history(case_id)?;
    let out = Output::new();

    if history.versions().is_empty() {
        out.info("No versions yet");
        return Ok(());
    }

    out.header(&format!("Versions of {}", case_id));
    let current = history.current_number();
    for version in history.versions() {
        let marker = if version.number == current {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        let degraded = version.result.degraded_sections().len();
        println!(
            "{} v{:<3} {:<12} {}  {} sections, {} references{}",
            marker,
            version.number,
            version.kind.as_str(),
            version.created_at.format("%Y-%m-%d %H:%M"),
            version.result.sections.len(),
            version.result.references.len(),
            if degraded > 0 {
                format!(", {} degraded", degraded)
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

/// Point the case at an older version; later versions are kept
pub fn restore(case_id: &str, number: u32) -> Result<()> {
    let version = CommandContext::load()?.service().restore(case_id, number)?;
    Output::new().success(&format!(
        "Case {} restored to version {} ({})",
        case_id, version.number, version.kind
    ));
    Ok(())
}
