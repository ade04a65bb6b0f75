use console::style;

use crate::pipeline::PipelineWarning;
use crate::types::{Reference, Version};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Full report: sections, image findings and references
    pub fn version(&self, version: &Version) {
        self.header(&format!(
            "Version {} ({}, {})",
            version.number,
            version.kind,
            version.created_at.format("%Y-%m-%d %H:%M UTC")
        ));

        for section in &version.result.sections {
            self.section(section.section_type.title());
            if section.degraded {
                println!("{}", style(&section.content).dim().italic());
            } else {
                println!("{}", section.content.trim());
            }
        }

        if !version.result.image_analyses.is_empty() {
            self.section("Image findings");
            for (i, finding) in version.result.image_analyses.iter().enumerate() {
                println!("{}. {}", i + 1, finding.trim());
            }
        }

        if !version.result.references.is_empty() {
            self.section("References");
            for reference in &version.result.references {
                println!("{}", format_reference(reference));
            }
        }
    }

    pub fn warnings(&self, warnings: &[PipelineWarning]) {
        for warning in warnings {
            self.warning(&warning.to_string());
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

/// `[n] Authors. Title. Journal (year). url`
fn format_reference(reference: &Reference) -> String {
    let mut line = format!("[{}] ", reference.label);
    if !reference.authors.is_empty() {
        line.push_str(&format!("{}. ", reference.authors.join(", ")));
    }
    line.push_str(reference.title.trim_end_matches('.'));
    line.push('.');
    match (&reference.journal, reference.year) {
        (Some(journal), Some(year)) => line.push_str(&format!(" {} ({}).", journal, year)),
        (Some(journal), None) => line.push_str(&format!(" {}.", journal)),
        (None, Some(year)) => line.push_str(&format!(" ({}).", year)),
        (None, None) => {}
    }
    line.push(' ');
    line.push_str(&reference.url);
    line
}
