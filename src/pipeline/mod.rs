//! Case Analysis Pipeline
//!
//! The [`Orchestrator`] sequences the model calls of one run:
//!
//! ```text
//! images ──► reasoning ──► section parsing ──► research ──► references ──► enrichment
//! (pool)     (seeded in                        (Full/Deep)  (extract)      (best effort)
//!             Relaunch)
//! ```
//!
//! | Mode | Images | Reasoning | Research | References |
//! |------|--------|-----------|----------|------------|
//! | Simple | all | plain | - | none |
//! | Full | all | plain | plain | extract + enrich |
//! | Relaunch | new only | seeded | - | prior, unchanged |
//! | Deep | all | plain | seeded | extract + enrich |
//!
//! Reasoning and research failures abort the run; image, enrichment and
//! rare-disease failures degrade it and are reported as [`PipelineWarning`]s.
//! The orchestrator never retries.

pub mod context;
pub mod enrichment;
pub mod images;
pub mod references;
pub mod sections;

#[cfg(test)]
pub(crate) mod mocks;

pub use context::{CallRecord, PipelineWarning, RunContext};
pub use images::{ImageAnalyzer, ImageBatch};
pub use sections::{MatcherKind, SectionMatch};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::ai::PromptTemplates;
use crate::ai::provider::{
    SharedEnricher, SharedResearchModel, SharedTextModel, SharedVisionModel,
    create_enricher, create_research_model, create_text_model, create_vision_model,
};
use crate::ai::timeout::{TimeoutConfig, guarded_call};
use crate::config::{Config, PipelineConfig};
use crate::types::{
    AnalysisResult, CanonicalSectionId, CaseError, CaseInput, PipelineStage, PriorState,
    ResearchReport, Result, RunMode, Section, ValidationError, ValidationErrorKind,
    truncate_chars,
};
use context::PendingCall;

/// Characters of case text sent to the enricher as topic context
const ENRICHMENT_CONTEXT_CHARS: usize = 1_000;

/// Model endpoints a run may call
#[derive(Clone)]
pub struct Endpoints {
    pub reasoning: SharedTextModel,
    pub vision: SharedVisionModel,
    /// Required by Full and Deep runs
    pub research: Option<SharedResearchModel>,
    /// `None` disables enrichment
    pub enricher: Option<SharedEnricher>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub image_concurrency: usize,
    pub timeouts: TimeoutConfig,
    pub rare_disease_screening: bool,
}

impl From<&PipelineConfig> for OrchestratorOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            image_concurrency: config.image_concurrency,
            timeouts: config.timeouts(),
            rare_disease_screening: config.rare_disease_screening,
        }
    }
}

/// Result of a successful run with its call log and warnings
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: AnalysisResult,
    pub context: RunContext,
}

pub struct Orchestrator {
    endpoints: Endpoints,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(endpoints: Endpoints, options: OrchestratorOptions) -> Self {
        Self { endpoints, options }
    }

    /// Build the endpoints `mode` needs from configuration.
    ///
    /// The research client is only constructed for modes that call it, so a
    /// missing research API key does not block Simple or Relaunch runs.
    pub fn from_config(config: &Config, mode: RunMode) -> Result<Self> {
        let research = if mode.uses_research() {
            Some(create_research_model(&config.research)?)
        } else {
            None
        };
        let enricher = if mode.uses_research() {
            create_enricher(&config.enrichment)?
        } else {
            None
        };

        Ok(Self::new(
            Endpoints {
                reasoning: create_text_model(&config.reasoning)?,
                vision: create_vision_model(&config.vision)?,
                research,
                enricher,
            },
            OrchestratorOptions::from(&config.pipeline),
        ))
    }

    /// Execute one run.
    ///
    /// `prior` is required for Relaunch and Deep. The prior state is only read;
    /// versioning the result is the caller's job.
    #[instrument(skip_all, fields(mode = %mode, images = input.images.len()))]
    pub async fn run(
        &self,
        input: &CaseInput,
        mode: RunMode,
        prior: Option<&PriorState>,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun> {
        input.validate()?;
        let prior = match (mode.requires_prior(), prior) {
            (true, None) => {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingField,
                    format!("{} mode requires a prior analysis", mode),
                )
                .with_field("prior")
                .into());
            }
            (_, prior) => prior,
        };
        let research = self.endpoints.research.clone();
        if mode.uses_research() && research.is_none() {
            return Err(CaseError::Config(format!(
                "{} mode requires a research endpoint",
                mode
            )));
        }

        let mut ctx = RunContext::new(mode);
        info!(run_id = %ctx.run_id, "Starting case analysis");

        // Images
        let reuse: &[String] = match (mode, prior) {
            (RunMode::Relaunch, Some(p)) => &p.result.image_analyses,
            _ => &[],
        };
        let analyzer = ImageAnalyzer::new(
            self.endpoints.vision.clone(),
            self.options.image_concurrency,
            self.options.timeouts.image,
        );
        let batch = analyzer.analyze_all(&input.images, reuse, cancel).await?;
        for call in batch.calls {
            ctx.record_call(call);
        }
        for (index, message) in batch.failures {
            ctx.warn(PipelineWarning::ImageAnalysis { index, message });
        }
        let image_analyses = batch.analyses;

        // Reasoning
        let prompt = match (mode, prior) {
            (RunMode::Relaunch, Some(p)) => PromptTemplates::relaunch_reasoning(
                &input.case_text,
                &image_analyses,
                &p.result.sections,
                &p.modifications,
            ),
            _ => PromptTemplates::reasoning(&input.case_text, &image_analyses),
        };
        let raw = self
            .complete(PipelineStage::Reasoning, &prompt, &mut ctx, cancel)
            .await?;

        let mut sections = Vec::with_capacity(CanonicalSectionId::ALL.len());
        for matched in sections::parse_detailed(&raw) {
            if matched.matched_by.is_none() {
                ctx.warn(PipelineWarning::ParseDegraded {
                    section: matched.section.section_type,
                });
            }
            sections.push(matched.section);
        }

        // Research and references
        let (research_report, references) = match (mode, prior) {
            (RunMode::Full | RunMode::Deep, _) => {
                let prompt = match (mode, prior) {
                    (RunMode::Deep, Some(p)) => PromptTemplates::deep_research(
                        &input.case_text,
                        &p.result.sections,
                        &p.modifications,
                    ),
                    _ => PromptTemplates::research(&input.case_text, &sections),
                };
                let endpoint = research.as_ref().ok_or_else(|| {
                    CaseError::Config(format!("{} mode requires a research endpoint", mode))
                })?;
                let report = self.research(endpoint, &prompt, &mut ctx, cancel).await?;

                let extracted = references::extract(&report);
                debug!(count = extracted.len(), "References extracted");
                let outcome = enrichment::enrich(
                    self.endpoints.enricher.as_ref(),
                    extracted,
                    truncate_chars(&input.case_text, ENRICHMENT_CONTEXT_CHARS),
                    self.options.timeouts.enrichment,
                    cancel,
                )
                .await?;
                if let Some(call) = outcome.call {
                    ctx.record_call(call);
                }
                if let Some(message) = outcome.error {
                    ctx.warn(PipelineWarning::Enrichment { message });
                }
                references::check_labels(&outcome.references)?;
                (Some(report), outcome.references)
            }
            (RunMode::Relaunch, Some(p)) => (
                p.result.research_report.clone(),
                p.result.references.clone(),
            ),
            _ => (None, Vec::new()),
        };

        // Rare-disease screening
        if self.options.rare_disease_screening
            && !sections
                .iter()
                .any(|s| s.section_type == CanonicalSectionId::RareDisease)
        {
            match self.screen_rare_disease(input, &sections, &mut ctx, cancel).await {
                Ok(section) => sections.push(section),
                Err(e @ CaseError::Cancelled { .. }) => return Err(e),
                Err(e) => ctx.warn(PipelineWarning::RareDisease {
                    message: e.to_string(),
                }),
            }
        }

        if mode != RunMode::Simple {
            for number in references::dangling_citations(&sections, references.len()) {
                ctx.warn(PipelineWarning::DanglingCitation { number });
            }
        }

        let mut result = AnalysisResult {
            sections,
            references,
            research_report,
            image_analyses,
        };
        result.normalize_sections();

        info!(
            run_id = %ctx.run_id,
            calls = ctx.calls.len(),
            model_ms = ctx.total_elapsed_ms(),
            warnings = ctx.warnings.len(),
            references = result.references.len(),
            "Case analysis complete"
        );
        Ok(PipelineRun {
            result,
            context: ctx,
        })
    }

    /// Reasoning call; any failure or an empty answer is fatal for `stage`
    async fn complete(
        &self,
        stage: PipelineStage,
        prompt: &str,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let endpoint = &self.endpoints.reasoning;
        let timeout = self.options.timeouts.reasoning;
        let call = PendingCall::start(stage, endpoint.name(), endpoint.model(), prompt.len());

        let result = guarded_call(stage, timeout, cancel, endpoint.complete(prompt))
            .await
            .and_then(|text| non_empty(stage, text));
        ctx.record_call(call.finish(result.as_ref().ok().map(|t| t.len())));
        result.map_err(|e| attribute(stage, e))
    }

    async fn research(
        &self,
        endpoint: &SharedResearchModel,
        prompt: &str,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<ResearchReport> {
        let stage = PipelineStage::Research;
        let call = PendingCall::start(stage, endpoint.name(), endpoint.model(), prompt.len());

        let result = guarded_call(
            stage,
            self.options.timeouts.research,
            cancel,
            endpoint.research(prompt),
        )
        .await
        .and_then(|report| {
            if report.answer_text.trim().is_empty() {
                Err(CaseError::upstream(stage, "empty research answer"))
            } else {
                Ok(report)
            }
        });
        ctx.record_call(call.finish(result.as_ref().ok().map(|r| r.answer_text.len())));
        result.map_err(|e| attribute(stage, e))
    }

    async fn screen_rare_disease(
        &self,
        input: &CaseInput,
        sections: &[Section],
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<Section> {
        let prompt = PromptTemplates::rare_disease(&input.case_text, sections);
        let raw = self
            .complete(PipelineStage::RareDisease, &prompt, ctx, cancel)
            .await?;

        let located = sections::parse_detailed(&raw).into_iter().find(|m| {
            m.section.section_type == CanonicalSectionId::RareDisease && m.matched_by.is_some()
        });
        Ok(match located {
            Some(m) => m.section,
            // Answer without the marker: the whole text is the screening
            None => Section::new(CanonicalSectionId::RareDisease, raw.trim()),
        })
    }
}

fn non_empty(stage: PipelineStage, text: String) -> Result<String> {
    if text.trim().is_empty() {
        Err(CaseError::upstream(stage, "empty model response"))
    } else {
        Ok(text)
    }
}

/// Attribute a raw endpoint failure to the stage it happened in
fn attribute(stage: PipelineStage, err: CaseError) -> CaseError {
    match err {
        CaseError::Cancelled { .. } | CaseError::UpstreamModel { .. } => err,
        other => CaseError::upstream(stage, other.to_string()),
    }
}
