//! Scripted endpoints for orchestrator and service tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Endpoints, Orchestrator, OrchestratorOptions};
use crate::ai::provider::{Endpoint, ReferenceEnricher, ResearchModel, TextModel, VisionModel};
use crate::ai::timeout::TimeoutConfig;
use crate::types::{
    CanonicalSectionId, CaseImage, ErrorCategory, ModelError, Reference, ResearchReport, Result,
    SourceEntry,
};

type Reply = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

pub struct MockText {
    reply: Reply,
    pub prompts: Mutex<Vec<String>>,
}

impl MockText {
    pub fn from_fn(reply: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// All seven markers with content `"{tag} {section}"`; answers rare-disease
    /// prompts with a `RARE_DISEASE:` block
    pub fn well_formed(tag: &'static str) -> Self {
        Self::from_fn(move |prompt| {
            if prompt.contains("rare and orphan diseases") {
                return Ok("RARE_DISEASE:\nFabry disease should be excluded.".to_string());
            }
            Ok(marked_text(tag))
        })
    }

    pub fn failing() -> Self {
        Self::from_fn(|_| Err(ModelError::new(ErrorCategory::Unavailable, "reasoning down").into()))
    }

    pub fn prompt_log(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

pub fn marked_text(tag: &str) -> String {
    CanonicalSectionId::REQUIRED
        .iter()
        .map(|id| format!("{}:\n{} {}", id.marker(), tag, id.as_str()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl Endpoint for MockText {
    fn name(&self) -> &str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock-reasoning"
    }
}

#[async_trait]
impl TextModel for MockText {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.reply)(prompt)
    }
}

/// Answers `"finding {first byte}"`; fails for bytes in `fail_on`
#[derive(Default)]
pub struct MockVision {
    pub fail_on: Vec<u8>,
    pub calls: AtomicUsize,
}

impl MockVision {
    pub fn failing_on(fail_on: Vec<u8>) -> Self {
        Self {
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Endpoint for MockVision {
    fn name(&self) -> &str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock-vision"
    }
}

#[async_trait]
impl VisionModel for MockVision {
    async fn analyze_image(&self, image: &CaseImage) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = image.bytes.first().copied().unwrap_or_default();
        if self.fail_on.contains(&id) {
            return Err(ModelError::new(ErrorCategory::Unavailable, "vision down").into());
        }
        Ok(format!("finding {}", id))
    }
}

/// Returns `entries` distinct sources; `fail` makes every call fail
pub struct MockResearch {
    pub entries: usize,
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl MockResearch {
    pub fn with_entries(entries: usize) -> Self {
        Self {
            entries,
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_entries(0)
        }
    }

    pub fn prompt_log(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Endpoint for MockResearch {
    fn name(&self) -> &str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock-research"
    }
}

#[async_trait]
impl ResearchModel for MockResearch {
    async fn research(&self, prompt: &str) -> Result<ResearchReport> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(ModelError::new(ErrorCategory::Network, "research down").into());
        }
        Ok(ResearchReport {
            answer_text: "Evidence supports the leading hypothesis [1].".to_string(),
            source_entries: (1..=self.entries)
                .map(|i| SourceEntry {
                    title: format!("Study {}", i),
                    url: format!("https://journal.example/{}", i),
                    date: Some(format!("20{:02}-01-15", 10 + i)),
                })
                .collect(),
            citations: vec![],
        })
    }
}

pub enum EnricherBehavior {
    Fill,
    Fail,
    Hang,
}

pub struct MockEnricher(pub EnricherBehavior);

impl Endpoint for MockEnricher {
    fn name(&self) -> &str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock-enricher"
    }
}

#[async_trait]
impl ReferenceEnricher for MockEnricher {
    async fn enrich(&self, references: &[Reference], _context: &str) -> Result<Vec<Reference>> {
        match self.0 {
            EnricherBehavior::Fill => Ok(references
                .iter()
                .map(|r| Reference {
                    authors: vec!["Doe J".to_string()],
                    journal: Some("Lancet".to_string()),
                    ..r.clone()
                })
                .collect()),
            EnricherBehavior::Fail => {
                Err(ModelError::new(ErrorCategory::RateLimit, "enrichment down").into())
            }
            EnricherBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(references.to_vec())
            }
        }
    }
}

pub fn test_options() -> OrchestratorOptions {
    OrchestratorOptions {
        image_concurrency: 3,
        timeouts: TimeoutConfig {
            reasoning: Duration::from_secs(2),
            research: Duration::from_secs(2),
            image: Duration::from_secs(2),
            enrichment: Duration::from_millis(100),
        },
        rare_disease_screening: false,
    }
}

/// Orchestrator over the given mocks
pub fn orchestrator(
    reasoning: Arc<MockText>,
    vision: Arc<MockVision>,
    research: Arc<MockResearch>,
    enricher: Option<EnricherBehavior>,
) -> Orchestrator {
    Orchestrator::new(
        Endpoints {
            reasoning,
            vision,
            research: Some(research),
            enricher: enricher.map(|b| Arc::new(MockEnricher(b)) as _),
        },
        test_options(),
    )
}
