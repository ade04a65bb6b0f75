//! Show Command
//!
//! List stored cases, or print one version of a case.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{CaseError, Result};

pub fn run(case_id: Option<&str>, version: Option<u32>, format: &str) -> Result<()> {
    let service = CommandContext::load()?.service();

    let Some(case_id) = case_id else {
        return list_cases(&service.list_cases()?, format);
    };

    let history = service.history(case_id)?;
    let selected = match version {
        Some(number) => history.version(number),
        None => history.current(),
    }
    .ok_or_else(|| match version {
        Some(number) => CaseError::NotFound(format!("version {} of case {}", number, case_id)),
        None => CaseError::NotFound(format!("case {} has no version", case_id)),
    })?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(selected)?);
    } else {
        let record = service.case(case_id)?;
        let out = Output::new();
        if let Some(title) = &record.title {
            out.info(title);
        }
        out.version(selected);
    }
    Ok(())
}

fn list_cases(cases: &[crate::storage::CaseSummary], format: &str) -> Result<()> {
    if format == "json" {
        let rows: Vec<_> = cases
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "title": c.title,
                    "current_version": c.current_version,
                    "version_count": c.version_count,
                    "created_at": c.created_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let out = Output::new();
    if cases.is_empty() {
        out.info("No cases yet. Run 'casewise analyze' to create one.");
        return Ok(());
    }

    out.header("Cases");
    for case in cases {
        println!(
            "{}  {}  v{}/{}  {}",
            case.id,
            case.created_at.format("%Y-%m-%d"),
            case.current_version.unwrap_or(0),
            case.version_count,
            case.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}
