//! Unified Timeout & Cancellation
//!
//! Every outbound model call goes through [`guarded_call`], which races the call
//! against its stage timeout and the run's [`CancellationToken`]:
//!
//! ```ignore
//! use crate::ai::timeout::{TimeoutConfig, guarded_call};
//!
//! let config = TimeoutConfig::default();
//! let text = guarded_call(
//!     PipelineStage::Reasoning,
//!     config.reasoning,
//!     &cancel,
//!     reasoning.complete(&prompt),
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::constants::network as net_constants;
use crate::types::{CaseError, PipelineStage, Result};

/// Per-stage timeouts for model calls
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Reasoning endpoint (whole-case call; timeout fails the run)
    pub reasoning: Duration,
    /// Research endpoint (whole-case call; timeout fails the run)
    pub research: Duration,
    /// Vision endpoint, per image (timeout fails only that slot)
    pub image: Duration,
    /// Enrichment endpoint (timeout is swallowed)
    pub enrichment: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            reasoning: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            research: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            image: Duration::from_secs(net_constants::IMAGE_TIMEOUT_SECS),
            enrichment: Duration::from_secs(net_constants::ENRICHMENT_TIMEOUT_SECS),
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(CaseError::timeout(operation_name, timeout)),
    }
}

/// Execute a stage call bounded by `timeout` and abandoned when `cancel` fires.
///
/// Cancellation wins over a result that completes in the same poll, so late results
/// of an abandoned run are never observed.
pub async fn guarded_call<T, F>(
    stage: PipelineStage,
    timeout: Duration,
    cancel: &CancellationToken,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(CaseError::Cancelled { stage });
    }

    let operation = stage.to_string();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CaseError::Cancelled { stage }),
        result = with_timeout(timeout, future, &operation) => result,
    }
}
