//! Analysis result records shared by every pipeline stage.

use serde::{Deserialize, Serialize};

// =============================================================================
// Canonical Sections
// =============================================================================

/// Fixed, ordered categories a clinical analysis always contains.
///
/// The declaration order is the canonical output order. `RareDisease` is the optional
/// 8th section and is never part of [`CanonicalSectionId::REQUIRED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalSectionId {
    ClinicalContext,
    KeyData,
    DiagnosticHypotheses,
    ComplementaryExams,
    TherapeuticDecisions,
    PrognosisFollowUp,
    PatientExplanations,
    RareDisease,
}

impl CanonicalSectionId {
    /// The seven sections every result carries, in canonical order
    pub const REQUIRED: [CanonicalSectionId; 7] = [
        Self::ClinicalContext,
        Self::KeyData,
        Self::DiagnosticHypotheses,
        Self::ComplementaryExams,
        Self::TherapeuticDecisions,
        Self::PrognosisFollowUp,
        Self::PatientExplanations,
    ];

    /// Every section id including the optional rare-disease section
    pub const ALL: [CanonicalSectionId; 8] = [
        Self::ClinicalContext,
        Self::KeyData,
        Self::DiagnosticHypotheses,
        Self::ComplementaryExams,
        Self::TherapeuticDecisions,
        Self::PrognosisFollowUp,
        Self::PatientExplanations,
        Self::RareDisease,
    ];

    /// Marker tag the reasoning model is instructed to emit (`TAG:` at line start)
    pub fn marker(&self) -> &'static str {
        match self {
            Self::ClinicalContext => "CLINICAL_CONTEXT",
            Self::KeyData => "KEY_DATA",
            Self::DiagnosticHypotheses => "DIAGNOSTIC_HYPOTHESES",
            Self::ComplementaryExams => "COMPLEMENTARY_EXAMS",
            Self::TherapeuticDecisions => "THERAPEUTIC_DECISIONS",
            Self::PrognosisFollowUp => "PROGNOSIS_FOLLOWUP",
            Self::PatientExplanations => "PATIENT_EXPLANATIONS",
            Self::RareDisease => "RARE_DISEASE",
        }
    }

    /// Human-readable title
    pub fn title(&self) -> &'static str {
        match self {
            Self::ClinicalContext => "Clinical context",
            Self::KeyData => "Key data",
            Self::DiagnosticHypotheses => "Diagnostic hypotheses",
            Self::ComplementaryExams => "Complementary exams",
            Self::TherapeuticDecisions => "Therapeutic decisions",
            Self::PrognosisFollowUp => "Prognosis and follow-up",
            Self::PatientExplanations => "Patient explanations",
            Self::RareDisease => "Rare disease screening",
        }
    }

    /// Heading titles accepted by the loosest matcher
    pub fn heading_aliases(&self) -> &'static [&'static str] {
        match self {
            Self::ClinicalContext => &["clinical context", "context", "case summary"],
            Self::KeyData => &["key data", "key findings", "key clinical data"],
            Self::DiagnosticHypotheses => &[
                "diagnostic hypotheses",
                "differential diagnosis",
                "differential diagnoses",
            ],
            Self::ComplementaryExams => &[
                "complementary exams",
                "additional investigations",
                "further investigations",
            ],
            Self::TherapeuticDecisions => &["therapeutic decisions", "treatment", "management"],
            Self::PrognosisFollowUp => &["prognosis and follow-up", "prognosis", "follow-up"],
            Self::PatientExplanations => &[
                "patient explanations",
                "explanations for the patient",
                "patient information",
            ],
            Self::RareDisease => &["rare disease screening", "rare diseases", "rare disease"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicalContext => "clinical_context",
            Self::KeyData => "key_data",
            Self::DiagnosticHypotheses => "diagnostic_hypotheses",
            Self::ComplementaryExams => "complementary_exams",
            Self::TherapeuticDecisions => "therapeutic_decisions",
            Self::PrognosisFollowUp => "prognosis_follow_up",
            Self::PatientExplanations => "patient_explanations",
            Self::RareDisease => "rare_disease",
        }
    }

    /// Position in canonical order
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for CanonicalSectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CanonicalSectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized || id.marker().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| {
                format!(
                    "Unknown section: {}. Valid values: {}",
                    s,
                    Self::ALL.map(|id| id.as_str()).join(", ")
                )
            })
    }
}

/// One structured section of an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_type: CanonicalSectionId,
    pub content: String,
    /// Placeholder content substituted because no matcher located the section
    #[serde(default)]
    pub degraded: bool,
}

impl Section {
    pub fn new(section_type: CanonicalSectionId, content: impl Into<String>) -> Self {
        Self {
            section_type,
            content: content.into(),
            degraded: false,
        }
    }

    pub fn placeholder(section_type: CanonicalSectionId) -> Self {
        Self {
            section_type,
            content: crate::constants::pipeline::SECTION_PLACEHOLDER.to_string(),
            degraded: true,
        }
    }
}

// =============================================================================
// References
// =============================================================================

/// Candidate bibliographic item returned by the research stage, before labeling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Raw output of the research stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub answer_text: String,
    #[serde(default)]
    pub source_entries: Vec<SourceEntry>,
    /// Bare citation URLs, used only when `source_entries` is empty
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Labeled, citable reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// 1-based numeric label, contiguous across a result
    pub label: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub enriched: bool,
}

impl Reference {
    /// Whether any enrichable metadata field is still empty
    pub fn has_gaps(&self) -> bool {
        self.authors.is_empty() || self.journal.is_none() || self.year.is_none()
    }
}

// =============================================================================
// Analysis Result
// =============================================================================

/// Output of one successful pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sections: Vec<Section>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub research_report: Option<ResearchReport>,
    #[serde(default)]
    pub image_analyses: Vec<String>,
}

impl AnalysisResult {
    pub fn section(&self, id: CanonicalSectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.section_type == id)
    }

    pub fn section_content(&self, id: CanonicalSectionId) -> Option<&str> {
        self.section(id).map(|s| s.content.as_str())
    }

    /// Sections that fell back to placeholder content
    pub fn degraded_sections(&self) -> Vec<CanonicalSectionId> {
        self.sections
            .iter()
            .filter(|s| s.degraded)
            .map(|s| s.section_type)
            .collect()
    }

    /// Restore canonical order and drop duplicate ids (first occurrence wins).
    ///
    /// Required ids that are missing get placeholder content.
    pub fn normalize_sections(&mut self) {
        let mut normalized = Vec::with_capacity(CanonicalSectionId::ALL.len());
        for id in CanonicalSectionId::ALL {
            match self.sections.iter().find(|s| s.section_type == id) {
                Some(section) => normalized.push(section.clone()),
                None if id != CanonicalSectionId::RareDisease => {
                    normalized.push(Section::placeholder(id))
                }
                None => {}
            }
        }
        self.sections = normalized;
    }
}

// =============================================================================
// Run Modes & Stages
// =============================================================================

/// Which pipeline stages a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Images + reasoning
    #[default]
    Simple,
    /// Images + reasoning + research + references
    Full,
    /// New images + reasoning seeded with prior sections and edits; references reused
    Relaunch,
    /// Images + reasoning + seeded research + fresh references
    Deep,
}

impl RunMode {
    pub fn uses_research(&self) -> bool {
        matches!(self, Self::Full | Self::Deep)
    }

    /// Modes that operate on an existing case version
    pub fn requires_prior(&self) -> bool {
        matches!(self, Self::Relaunch | Self::Deep)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Simple => write!(f, "simple"),
            RunMode::Full => write!(f, "full"),
            RunMode::Relaunch => write!(f, "relaunch"),
            RunMode::Deep => write!(f, "deep"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(RunMode::Simple),
            "full" => Ok(RunMode::Full),
            "relaunch" => Ok(RunMode::Relaunch),
            "deep" => Ok(RunMode::Deep),
            _ => Err(format!(
                "Unknown run mode: {}. Valid values: simple, full, relaunch, deep",
                s
            )),
        }
    }
}

/// Pipeline stage identifiers used in errors, warnings and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validation,
    CreditCheck,
    ImageAnalysis,
    Reasoning,
    SectionParsing,
    Research,
    ReferenceExtraction,
    Enrichment,
    RareDisease,
    Versioning,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::CreditCheck => "credit check",
            Self::ImageAnalysis => "image analysis",
            Self::Reasoning => "reasoning",
            Self::SectionParsing => "section parsing",
            Self::Research => "research",
            Self::ReferenceExtraction => "reference extraction",
            Self::Enrichment => "enrichment",
            Self::RareDisease => "rare disease screening",
            Self::Versioning => "versioning",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        for (i, id) in CanonicalSectionId::ALL.iter().enumerate() {
            assert_eq!(id.ordinal(), i);
        }
        assert!(!CanonicalSectionId::REQUIRED.contains(&CanonicalSectionId::RareDisease));
    }

    #[test]
    fn test_section_id_from_str() {
        assert_eq!(
            "diagnostic_hypotheses".parse::<CanonicalSectionId>(),
            Ok(CanonicalSectionId::DiagnosticHypotheses)
        );
        assert_eq!(
            "Key Data".parse::<CanonicalSectionId>(),
            Ok(CanonicalSectionId::KeyData)
        );
        assert_eq!(
            "PROGNOSIS_FOLLOWUP".parse::<CanonicalSectionId>(),
            Ok(CanonicalSectionId::PrognosisFollowUp)
        );
        assert!("vitals".parse::<CanonicalSectionId>().is_err());
    }

    #[test]
    fn test_normalize_sections_restores_order() {
        let mut result = AnalysisResult {
            sections: vec![
                Section::new(CanonicalSectionId::KeyData, "b"),
                Section::new(CanonicalSectionId::ClinicalContext, "a"),
                Section::new(CanonicalSectionId::KeyData, "duplicate"),
            ],
            ..Default::default()
        };
        result.normalize_sections();

        assert_eq!(result.sections.len(), 7);
        assert_eq!(result.sections[0].content, "a");
        assert_eq!(result.sections[1].content, "b");
        assert_eq!(result.degraded_sections().len(), 5);
    }

    #[test]
    fn test_run_mode_stages() {
        assert!(!RunMode::Simple.uses_research());
        assert!(RunMode::Full.uses_research());
        assert!(!RunMode::Relaunch.uses_research());
        assert!(RunMode::Deep.uses_research());
        assert!(RunMode::Relaunch.requires_prior());
        assert!(!RunMode::Full.requires_prior());
        assert_eq!("DEEP".parse::<RunMode>(), Ok(RunMode::Deep));
    }
}
