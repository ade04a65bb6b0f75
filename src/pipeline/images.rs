//! Image Analyzer
//!
//! Fans the case images out to the vision endpoint with bounded concurrency.
//! Results land in the slot of their original index whatever order they finish in,
//! and a failed image degrades only its own slot.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::context::{CallRecord, PendingCall};
use crate::ai::provider::{Endpoint, SharedVisionModel};
use crate::ai::timeout::guarded_call;
use crate::constants::pipeline::{IMAGE_PLACEHOLDER, MAX_IMAGE_CONCURRENCY};
use crate::types::{CaseError, CaseImage, PipelineStage, Result};

/// Outcome of one batch, in original image order
#[derive(Debug, Default)]
pub struct ImageBatch {
    pub analyses: Vec<String>,
    pub calls: Vec<CallRecord>,
    /// `(index, message)` for every slot that holds the placeholder
    pub failures: Vec<(usize, String)>,
}

pub struct ImageAnalyzer {
    vision: SharedVisionModel,
    concurrency: usize,
    timeout: Duration,
}

impl ImageAnalyzer {
    pub fn new(vision: SharedVisionModel, concurrency: usize, timeout: Duration) -> Self {
        Self {
            vision,
            concurrency: concurrency.clamp(1, MAX_IMAGE_CONCURRENCY),
            timeout,
        }
    }

    /// Analyze `images`, reusing `reuse[i]` for every index below `reuse.len()`.
    ///
    /// Only cancellation fails the batch; any other per-image error becomes a
    /// placeholder slot reported in [`ImageBatch::failures`].
    #[instrument(skip_all, fields(images = images.len(), reused = reuse.len().min(images.len())))]
    pub async fn analyze_all(
        &self,
        images: &[CaseImage],
        reuse: &[String],
        cancel: &CancellationToken,
    ) -> Result<ImageBatch> {
        let reused = reuse.len().min(images.len());
        let mut slots: Vec<Option<String>> = vec![None; images.len()];
        for (slot, text) in slots.iter_mut().zip(reuse) {
            *slot = Some(text.clone());
        }

        let mut batch = ImageBatch::default();
        let pending = images.len() - reused;
        if pending > 0 {
            info!(
                pending,
                concurrency = self.concurrency,
                "Analyzing case images"
            );
        }

        let mut stream = futures::stream::iter(images.iter().enumerate().skip(reused))
            .map(|(index, image)| {
                let vision = self.vision.clone();
                let timeout = self.timeout;
                async move {
                    let call = PendingCall::start(
                        PipelineStage::ImageAnalysis,
                        vision.name(),
                        vision.model(),
                        image.bytes.len(),
                    );
                    let result = guarded_call(
                        PipelineStage::ImageAnalysis,
                        timeout,
                        cancel,
                        vision.analyze_image(image),
                    )
                    .await
                    .and_then(|text| {
                        if text.trim().is_empty() {
                            Err(CaseError::ImageAnalysis {
                                index,
                                message: "empty analysis".to_string(),
                            })
                        } else {
                            Ok(text)
                        }
                    });
                    let record = call.finish(result.as_ref().ok().map(|t| t.len()));
                    (index, result, record)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((index, result, record)) = stream.next().await {
            batch.calls.push(record);
            match result {
                Ok(text) => {
                    debug!(index, chars = text.len(), "Image analyzed");
                    slots[index] = Some(text);
                }
                Err(e @ CaseError::Cancelled { .. }) => return Err(e),
                Err(e) => batch.failures.push((index, e.to_string())),
            }
        }

        if cancel.is_cancelled() {
            return Err(CaseError::Cancelled {
                stage: PipelineStage::ImageAnalysis,
            });
        }

        batch.failures.sort_by_key(|(index, _)| *index);
        batch.analyses = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string()))
            .collect();
        Ok(batch)
    }
}
