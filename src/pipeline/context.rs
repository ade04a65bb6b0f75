//! Per-run call log and warnings
//!
//! Every outbound model call made by one run is recorded here, together with the
//! non-fatal conditions the run degraded on. A context lives exactly as long as its
//! run; nothing is shared between runs.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{CanonicalSectionId, PipelineStage, RunMode};

/// Non-fatal condition collected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// No matcher located the section; placeholder content was used
    ParseDegraded { section: CanonicalSectionId },
    /// One image failed; its slot holds the placeholder
    ImageAnalysis { index: usize, message: String },
    /// Enrichment failed; references were kept as extracted
    Enrichment { message: String },
    /// A bracketed citation points outside the reference list
    DanglingCitation { number: u32 },
    /// Rare-disease screening failed; the section was omitted
    RareDisease { message: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseDegraded { section } => write!(f, "section {} not located", section),
            Self::ImageAnalysis { index, message } => {
                write!(f, "image {} analysis failed: {}", index, message)
            }
            Self::Enrichment { message } => write!(f, "enrichment skipped: {}", message),
            Self::DanglingCitation { number } => {
                write!(f, "citation [{}] has no matching reference", number)
            }
            Self::RareDisease { message } => write!(f, "rare disease screening failed: {}", message),
        }
    }
}

/// One outbound model call
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub stage: PipelineStage,
    pub endpoint: String,
    pub model: String,
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub elapsed_ms: u64,
    pub success: bool,
}

/// Started call, finished with [`PendingCall::finish`]
#[derive(Debug)]
pub struct PendingCall {
    stage: PipelineStage,
    endpoint: String,
    model: String,
    prompt_chars: usize,
    started: Instant,
}

impl PendingCall {
    pub fn start(
        stage: PipelineStage,
        endpoint: &str,
        model: &str,
        prompt_chars: usize,
    ) -> Self {
        Self {
            stage,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            prompt_chars,
            started: Instant::now(),
        }
    }

    /// Close the call; `response_chars` is `None` on failure
    pub fn finish(self, response_chars: Option<usize>) -> CallRecord {
        CallRecord {
            stage: self.stage,
            endpoint: self.endpoint,
            model: self.model,
            prompt_chars: self.prompt_chars,
            response_chars: response_chars.unwrap_or(0),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            success: response_chars.is_some(),
        }
    }
}

/// State owned by a single pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub calls: Vec<CallRecord>,
    pub warnings: Vec<PipelineWarning>,
}

impl RunContext {
    pub fn new(mode: RunMode) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            started_at: Utc::now(),
            calls: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record_call(&mut self, call: CallRecord) {
        self.calls.push(call);
    }

    pub fn warn(&mut self, warning: PipelineWarning) {
        tracing::warn!(run_id = %self.run_id, "{}", warning);
        self.warnings.push(warning);
    }

    /// Calls made for one stage, in issue order
    pub fn calls_for(&self, stage: PipelineStage) -> Vec<&CallRecord> {
        self.calls.iter().filter(|c| c.stage == stage).collect()
    }

    pub fn total_elapsed_ms(&self) -> u64 {
        self.calls.iter().map(|c| c.elapsed_ms).sum()
    }
}
