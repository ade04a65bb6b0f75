//! Model Endpoint Abstraction
//!
//! The pipeline consumes four collaborator endpoints, each behind its own trait:
//!
//! - [`VisionModel`]: `(image bytes, domain hint) -> free text`
//! - [`TextModel`]: reasoning, `(prompt) -> free text with section markers`
//! - [`ResearchModel`]: `(prompt) -> answer text + source entries`
//! - [`ReferenceEnricher`]: `(references, context) -> references (best effort)`
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible chat completions (reasoning, vision, enrichment)
//! - `sonar`: search-augmented chat completions returning sources (research)

mod openai;
mod sonar;

pub use openai::OpenAiProvider;
pub use sonar::SonarProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{CaseError, CaseImage, Reference, ResearchReport, Result};

// =============================================================================
// Endpoint Traits
// =============================================================================

/// Identity shared by every endpoint, recorded in the per-run call log
pub trait Endpoint: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;
}

/// Free-text reasoning endpoint
#[async_trait]
pub trait TextModel: Endpoint {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Per-image vision endpoint
#[async_trait]
pub trait VisionModel: Endpoint {
    async fn analyze_image(&self, image: &CaseImage) -> Result<String>;
}

/// Research endpoint returning an answer with its sources
#[async_trait]
pub trait ResearchModel: Endpoint {
    async fn research(&self, prompt: &str) -> Result<ResearchReport>;
}

/// Best-effort bibliographic metadata endpoint
#[async_trait]
pub trait ReferenceEnricher: Endpoint {
    /// Return references carrying whatever metadata the endpoint could find.
    ///
    /// Callers match results back by label and only take gap-filling fields.
    async fn enrich(&self, references: &[Reference], context: &str) -> Result<Vec<Reference>>;
}

pub type SharedTextModel = Arc<dyn TextModel>;
pub type SharedVisionModel = Arc<dyn VisionModel>;
pub type SharedResearchModel = Arc<dyn ResearchModel>;
pub type SharedEnricher = Arc<dyn ReferenceEnricher>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one model endpoint
///
/// API keys are never serialized and are redacted in debug output. Each provider
/// converts the key to `SecretString` internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai", "sonar", or "none" (enrichment only)
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom or self-hosted endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_max_tokens() -> usize {
    4096
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: 300,
            temperature: 0.2,
            api_key: None,
            api_base: None,
            max_tokens: 4096,
        }
    }
}

impl ProviderConfig {
    pub fn sonar() -> Self {
        Self {
            provider: "sonar".to_string(),
            ..Self::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.provider == "none"
    }
}

// =============================================================================
// Factories
// =============================================================================

fn unknown_provider(role: &str, provider: &str, supported: &str) -> CaseError {
    CaseError::Config(format!(
        "Unknown {} provider: {}. Supported: {}",
        role, provider, supported
    ))
}

pub fn create_text_model(config: &ProviderConfig) -> Result<SharedTextModel> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "sonar" => Ok(Arc::new(SonarProvider::new(config.clone())?)),
        other => Err(unknown_provider("reasoning", other, "openai, sonar")),
    }
}

pub fn create_vision_model(config: &ProviderConfig) -> Result<SharedVisionModel> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        other => Err(unknown_provider("vision", other, "openai")),
    }
}

pub fn create_research_model(config: &ProviderConfig) -> Result<SharedResearchModel> {
    match config.provider.as_str() {
        "sonar" => Ok(Arc::new(SonarProvider::new(config.clone())?)),
        other => Err(unknown_provider("research", other, "sonar")),
    }
}

/// `None` when enrichment is disabled (`provider = "none"`)
pub fn create_enricher(config: &ProviderConfig) -> Result<Option<SharedEnricher>> {
    match config.provider.as_str() {
        "none" => Ok(None),
        "openai" => {
            let enricher: SharedEnricher = Arc::new(OpenAiProvider::new(config.clone())?);
            Ok(Some(enricher))
        }
        other => Err(unknown_provider("enrichment", other, "openai, none")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..ProviderConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..ProviderConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ProviderConfig {
            provider: "telepathy".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            create_text_model(&config),
            Err(CaseError::Config(_))
        ));
        assert!(matches!(
            create_research_model(&ProviderConfig::default()),
            Err(CaseError::Config(_))
        ));
    }

    #[test]
    fn test_disabled_enricher() {
        let config = ProviderConfig {
            provider: "none".to_string(),
            ..ProviderConfig::default()
        };
        assert!(config.is_disabled());
        assert!(create_enricher(&config).unwrap().is_none());
    }
}
