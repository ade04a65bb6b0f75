//! Version snapshots and the manual modification log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::{AnalysisResult, CanonicalSectionId, RunMode};
use super::utils::ParseWithDefault;

/// How a version came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    Initial,
    Relaunch,
    Deep,
    ManualEdit,
}

impl VersionKind {
    /// Kind of version a run mode produces
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Simple | RunMode::Full => Self::Initial,
            RunMode::Relaunch => Self::Relaunch,
            RunMode::Deep => Self::Deep,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Relaunch => "relaunch",
            Self::Deep => "deep",
            Self::ManualEdit => "manual_edit",
        }
    }

    /// Whether committing this kind reconciles against the modification log
    pub fn merges_edits(&self) -> bool {
        matches!(self, Self::Relaunch | Self::Deep)
    }
}

impl std::fmt::Display for VersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ParseWithDefault for VersionKind {
    fn type_name() -> &'static str {
        "VersionKind"
    }

    fn default_value() -> Self {
        VersionKind::Initial
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(VersionKind::Initial),
            "relaunch" => Some(VersionKind::Relaunch),
            "deep" => Some(VersionKind::Deep),
            "manual_edit" => Some(VersionKind::ManualEdit),
            _ => None,
        }
    }
}

/// Human-authored addendum to one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub id: String,
    pub section_type: CanonicalSectionId,
    pub added_text: String,
    pub timestamp: DateTime<Utc>,
    /// Active version number when the edit was made (0 before any version)
    pub version_at_creation: u32,
}

impl ModificationRecord {
    pub fn new(
        section_type: CanonicalSectionId,
        added_text: impl Into<String>,
        version_at_creation: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            section_type,
            added_text: added_text.into(),
            timestamp: Utc::now(),
            version_at_creation,
        }
    }
}

/// Immutable, numbered snapshot of a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub number: u32,
    pub kind: VersionKind,
    pub result: AnalysisResult,
    pub modification_history: Vec<ModificationRecord>,
    pub created_at: DateTime<Utc>,
}
