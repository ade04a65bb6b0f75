//! Reference Enricher
//!
//! Best-effort bibliographic metadata. The endpoint's answer is only ever used to
//! fill gaps: `label`, `title` and `url` never change, and a failed or timed-out
//! call returns the references exactly as they were.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::context::{CallRecord, PendingCall};
use crate::ai::provider::{Endpoint, SharedEnricher};
use crate::ai::timeout::guarded_call;
use crate::types::{CaseError, PipelineStage, Reference, Result};

/// Enriched references plus the call record and, on failure, the reason
#[derive(Debug)]
pub struct EnrichmentOutcome {
    pub references: Vec<Reference>,
    pub call: Option<CallRecord>,
    pub error: Option<String>,
}

/// Fill `authors`, `journal` and `year` gaps from `enriched`, matched by label.
///
/// `enriched` is set only on references that actually gained a field.
pub fn merge_metadata(original: &[Reference], enriched: &[Reference]) -> Vec<Reference> {
    original
        .iter()
        .map(|reference| {
            let mut merged = reference.clone();
            let Some(source) = enriched.iter().find(|e| e.label == reference.label) else {
                return merged;
            };

            let mut gained = false;
            if merged.authors.is_empty() && !source.authors.is_empty() {
                merged.authors = source.authors.clone();
                gained = true;
            }
            if merged.journal.is_none()
                && let Some(journal) = source.journal.as_ref().filter(|j| !j.trim().is_empty())
            {
                merged.journal = Some(journal.clone());
                gained = true;
            }
            if merged.year.is_none() && source.year.is_some() {
                merged.year = source.year;
                gained = true;
            }
            if gained {
                merged.enriched = true;
            }
            merged
        })
        .collect()
}

/// Enrich `references` through `enricher`, bounded by `timeout`.
///
/// Never fails except on cancellation.
#[instrument(skip_all, fields(references = references.len()))]
pub async fn enrich(
    enricher: Option<&SharedEnricher>,
    references: Vec<Reference>,
    context: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<EnrichmentOutcome> {
    let Some(enricher) = enricher else {
        return Ok(EnrichmentOutcome {
            references,
            call: None,
            error: None,
        });
    };
    if references.is_empty() || !references.iter().any(Reference::has_gaps) {
        return Ok(EnrichmentOutcome {
            references,
            call: None,
            error: None,
        });
    }

    let pending = PendingCall::start(
        PipelineStage::Enrichment,
        enricher.name(),
        enricher.model(),
        context.len(),
    );
    let result = guarded_call(
        PipelineStage::Enrichment,
        timeout,
        cancel,
        enricher.enrich(&references, context),
    )
    .await;

    match result {
        Ok(enriched) => {
            let merged = merge_metadata(&references, &enriched);
            let gained = merged.iter().filter(|r| r.enriched).count();
            info!(gained, total = merged.len(), "References enriched");
            Ok(EnrichmentOutcome {
                references: merged,
                call: Some(pending.finish(Some(enriched.len()))),
                error: None,
            })
        }
        Err(e @ CaseError::Cancelled { .. }) => Err(e),
        Err(e) => {
            warn!(error = %e, "Reference enrichment failed, keeping extracted references");
            Ok(EnrichmentOutcome {
                references,
                call: Some(pending.finish(None)),
                error: Some(e.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ReferenceEnricher;
    use crate::types::{ErrorCategory, ModelError};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn reference(label: &str) -> Reference {
        Reference {
            label: label.to_string(),
            title: format!("Study {}", label),
            url: format!("https://example.org/{}", label),
            date: None,
            year: None,
            authors: vec![],
            journal: None,
            enriched: false,
        }
    }

    enum Behavior {
        Fill,
        Fail,
        Hang,
        Rewrite,
    }

    struct MockEnricher(Behavior);

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
                Behavior::Fill => Ok(references
                    .iter()
                    .map(|r| Reference {
                        authors: vec!["Doe J".to_string()],
                        journal: Some("NEJM".to_string()),
                        year: Some(2020),
                        ..r.clone()
                    })
                    .collect()),
                Behavior::Fail => {
                    Err(ModelError::new(ErrorCategory::RateLimit, "slow down").into())
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(references.to_vec())
                }
                Behavior::Rewrite => Ok(references
                    .iter()
                    .map(|r| Reference {
                        title: "Hijacked".to_string(),
                        url: "https://evil.example".to_string(),
                        ..r.clone()
                    })
                    .collect()),
            }
        }
    }

    async fn run(behavior: Behavior, refs: Vec<Reference>) -> EnrichmentOutcome {
        let enricher: SharedEnricher = Arc::new(MockEnricher(behavior));
        enrich(
            Some(&enricher),
            refs,
            "context",
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_fills_gaps() {
        let mut known = reference("2");
        known.journal = Some("Lancet".to_string());
        let outcome = run(Behavior::Fill, vec![reference("1"), known]).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.references[0].journal.as_deref(), Some("NEJM"));
        assert_eq!(outcome.references[1].journal.as_deref(), Some("Lancet"));
        assert_eq!(outcome.references[1].year, Some(2020));
        assert!(outcome.references.iter().all(|r| r.enriched));
    }

    #[tokio::test]
    async fn test_failure_returns_input_unchanged() {
        let refs = vec![reference("1"), reference("2")];
        let outcome = run(Behavior::Fail, refs.clone()).await;
        assert_eq!(outcome.references, refs);
        assert!(outcome.error.is_some());
        assert!(!outcome.call.unwrap().success);
    }

    #[tokio::test]
    async fn test_timeout_returns_input_unchanged() {
        let refs = vec![reference("1")];
        let outcome = run(Behavior::Hang, refs.clone()).await;
        assert_eq!(outcome.references, refs);
        assert!(outcome.error.unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_identity_fields_never_change() {
        let refs = vec![reference("1")];
        let outcome = run(Behavior::Rewrite, refs.clone()).await;
        assert_eq!(outcome.references, refs);
        assert!(!outcome.references[0].enriched);
    }

    #[tokio::test]
    async fn test_disabled_enricher_is_noop() {
        let refs = vec![reference("1")];
        let outcome = enrich(
            None,
            refs.clone(),
            "context",
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.references, refs);
        assert!(outcome.call.is_none());
    }

    #[test]
    fn test_merge_ignores_unknown_labels() {
        let original = vec![reference("1")];
        let mut stray = reference("7");
        stray.journal = Some("Ghost".to_string());
        let merged = merge_metadata(&original, &[stray]);
        assert_eq!(merged, original);
    }
}
