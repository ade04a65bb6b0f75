//! Version & Merge Engine
//!
//! A case moves through `NoVersion → V1 → V2 → …` while a side log of
//! [`ModificationRecord`]s accumulates clinician addenda. Reruns are reconciled
//! against that log with the merge rule: a section with at least one
//! modification record keeps the content of the current version, every other
//! section takes the freshly generated content.

pub mod service;

pub use service::{CaseService, RunOutcome};

use chrono::Utc;
use tracing::{debug, info};

use crate::types::{
    AnalysisResult, CanonicalSectionId, CaseError, ModificationRecord, PriorState, Result,
    Section, Version, VersionKind,
};

/// Versions, current pointer and modification log of one case
#[derive(Debug, Clone, Default)]
pub struct CaseHistory {
    versions: Vec<Version>,
    current: Option<u32>,
    modifications: Vec<ModificationRecord>,
}

impl CaseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts. A dangling `current` falls back to the
    /// newest version.
    pub fn from_parts(
        mut versions: Vec<Version>,
        current: Option<u32>,
        modifications: Vec<ModificationRecord>,
    ) -> Self {
        versions.sort_by_key(|v| v.number);
        let current = current
            .filter(|n| versions.iter().any(|v| v.number == *n))
            .or_else(|| versions.last().map(|v| v.number));
        Self {
            versions,
            current,
            modifications,
        }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn modifications(&self) -> &[ModificationRecord] {
        &self.modifications
    }

    pub fn current(&self) -> Option<&Version> {
        self.current.and_then(|n| self.version(n))
    }

    /// Active version number, 0 before the first version
    pub fn current_number(&self) -> u32 {
        self.current.unwrap_or(0)
    }

    pub fn version(&self, number: u32) -> Option<&Version> {
        self.versions.iter().find(|v| v.number == number)
    }

    /// Highest number ever created, 0 when empty
    pub fn latest_number(&self) -> u32 {
        self.versions.iter().map(|v| v.number).max().unwrap_or(0)
    }

    /// Section ids with at least one modification record
    pub fn edited_sections(&self) -> Vec<CanonicalSectionId> {
        let mut ids: Vec<_> = self.modifications.iter().map(|m| m.section_type).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// State consumed by a relaunch or deep run
    pub fn prior_state(&self) -> Option<PriorState> {
        self.current().map(|v| PriorState {
            result: v.result.clone(),
            modifications: self.modifications.clone(),
        })
    }

    /// Append a modification record without creating a version
    pub fn record_manual_edit(
        &mut self,
        section: CanonicalSectionId,
        text: &str,
    ) -> Result<ModificationRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CaseError::validation("added_text", "edit text must not be empty"));
        }
        let record = ModificationRecord::new(section, text, self.current_number());
        debug!(section = %section, id = %record.id, "Recorded manual edit");
        self.modifications.push(record.clone());
        Ok(record)
    }

    /// Replace the text of an existing modification record
    pub fn update_modification(&mut self, id: &str, text: &str) -> Result<&ModificationRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CaseError::validation("added_text", "edit text must not be empty"));
        }
        let record = self
            .modifications
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CaseError::NotFound(format!("modification {}", id)))?;
        record.added_text = text.to_string();
        record.timestamp = Utc::now();
        Ok(record)
    }

    /// Record an edit and commit it immediately as a `ManualEdit` version whose
    /// section content carries the addendum.
    pub fn apply_manual_edit(
        &mut self,
        section: CanonicalSectionId,
        text: &str,
    ) -> Result<&Version> {
        let mut result = self
            .current()
            .map(|v| v.result.clone())
            .ok_or_else(|| CaseError::validation("version", "no version to edit yet"))?;
        let record = self.record_manual_edit(section, text)?;

        match result.sections.iter_mut().find(|s| s.section_type == section) {
            Some(existing) if existing.degraded => {
                *existing = Section::new(section, record.added_text.clone());
            }
            Some(existing) => {
                existing.content = format!("{}\n\n{}", existing.content.trim_end(), record.added_text);
            }
            None => result.sections.push(Section::new(section, record.added_text.clone())),
        }

        Ok(self.commit(VersionKind::ManualEdit, result))
    }

    /// Emit the next version from `fresh` and make it current.
    ///
    /// Relaunch and deep commits apply the merge rule against the current
    /// version; initial and manual-edit commits store `fresh` as is.
    pub fn commit(&mut self, kind: VersionKind, fresh: AnalysisResult) -> &Version {
        let mut result = match self.current() {
            Some(current) if kind.merges_edits() => merge(current, fresh, &self.edited_sections()),
            _ => fresh,
        };
        result.normalize_sections();

        let number = self.latest_number() + 1;
        info!(number, kind = %kind, "Committing case version");
        self.versions.push(Version {
            number,
            kind,
            result,
            modification_history: self.modifications.clone(),
            created_at: Utc::now(),
        });
        self.current = Some(number);
        &self.versions[self.versions.len() - 1]
    }

    /// Point the case at version `number`; history is never shrunk or renumbered
    pub fn restore(&mut self, number: u32) -> Result<&Version> {
        if self.version(number).is_none() {
            return Err(CaseError::NotFound(format!("version {}", number)));
        }
        info!(number, "Restoring case version");
        self.current = Some(number);
        self.current()
            .ok_or_else(|| CaseError::NotFound(format!("version {}", number)))
    }
}

/// Edited sections keep `current` content; everything else comes from `fresh`.
///
/// `current` is the active version, which after a restore is not necessarily the
/// highest-numbered one. The merged result is still stored under the next free number.
fn merge(current: &Version, mut fresh: AnalysisResult, edited: &[CanonicalSectionId]) -> AnalysisResult {
    for id in edited {
        let Some(kept) = current.result.section(*id) else {
            continue;
        };
        match fresh.sections.iter_mut().find(|s| s.section_type == *id) {
            Some(section) => *section = kept.clone(),
            None => fresh.sections.push(kept.clone()),
        }
    }
    fresh
}
