//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/casewise/) and project (.casewise/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::provider::ProviderConfig;
use crate::ai::timeout::TimeoutConfig;
use crate::constants::{credits, network, pipeline, storage};
use crate::types::{CaseError, Result, RunMode};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Reasoning endpoint (free text with section markers)
    pub reasoning: ProviderConfig,

    /// Vision endpoint (one call per image)
    pub vision: ProviderConfig,

    /// Research endpoint (answer + sources)
    pub research: ProviderConfig,

    /// Reference enrichment endpoint; `provider = "none"` disables it
    pub enrichment: ProviderConfig,

    pub pipeline: PipelineConfig,

    pub credits: CreditsConfig,

    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            reasoning: ProviderConfig::default(),
            vision: ProviderConfig {
                timeout_secs: network::IMAGE_TIMEOUT_SECS,
                max_tokens: 1024,
                ..ProviderConfig::default()
            },
            research: ProviderConfig::sonar(),
            enrichment: ProviderConfig {
                model: Some("gpt-4o-mini".to_string()),
                timeout_secs: network::ENRICHMENT_TIMEOUT_SECS,
                temperature: 0.0,
                max_tokens: 2048,
                ..ProviderConfig::default()
            },
            pipeline: PipelineConfig::default(),
            credits: CreditsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `CaseError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        for (name, provider) in [
            ("reasoning", &self.reasoning),
            ("vision", &self.vision),
            ("research", &self.research),
            ("enrichment", &self.enrichment),
        ] {
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(CaseError::Config(format!(
                    "{} temperature must be between 0.0 and 2.0, got {}",
                    name, provider.temperature
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(CaseError::Config(format!(
                    "{} timeout_secs must be greater than 0",
                    name
                )));
            }
        }

        if !(1..=pipeline::MAX_IMAGE_CONCURRENCY).contains(&self.pipeline.image_concurrency) {
            return Err(CaseError::Config(format!(
                "pipeline.image_concurrency must be between 1 and {}, got {}",
                pipeline::MAX_IMAGE_CONCURRENCY,
                self.pipeline.image_concurrency
            )));
        }

        if self.credits.user_id.trim().is_empty() {
            return Err(CaseError::Config(
                "credits.user_id must not be empty".to_string(),
            ));
        }

        if self.storage.pool_size == 0 {
            return Err(CaseError::Config(
                "storage.pool_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent vision calls
    pub image_concurrency: usize,

    /// Whole-call timeouts per stage, in seconds
    pub reasoning_timeout_secs: u64,
    pub research_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub enrichment_timeout_secs: u64,

    /// Run the extra rare-disease reasoning call after the main sections
    pub rare_disease_screening: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_concurrency: pipeline::DEFAULT_IMAGE_CONCURRENCY,
            reasoning_timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            research_timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            image_timeout_secs: network::IMAGE_TIMEOUT_SECS,
            enrichment_timeout_secs: network::ENRICHMENT_TIMEOUT_SECS,
            rare_disease_screening: false,
        }
    }
}

impl PipelineConfig {
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            reasoning: Duration::from_secs(self.reasoning_timeout_secs.max(1)),
            research: Duration::from_secs(self.research_timeout_secs.max(1)),
            image: Duration::from_secs(self.image_timeout_secs.max(1)),
            enrichment: Duration::from_secs(self.enrichment_timeout_secs.max(1)),
        }
    }
}

// =============================================================================
// Credits Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Ledger account debited by local runs
    pub user_id: String,

    /// Balance granted by `casewise init`
    pub initial_grant: u32,

    pub simple_cost: u32,
    pub full_cost: u32,
    pub relaunch_cost: u32,
    pub deep_cost: u32,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            initial_grant: 20,
            simple_cost: credits::SIMPLE_COST,
            full_cost: credits::FULL_COST,
            relaunch_cost: credits::RELAUNCH_COST,
            deep_cost: credits::DEEP_COST,
        }
    }
}

impl CreditsConfig {
    pub fn cost(&self, mode: RunMode) -> u32 {
        match mode {
            RunMode::Simple => self.simple_cost,
            RunMode::Full => self.full_cost,
            RunMode::Relaunch => self.relaunch_cost,
            RunMode::Deep => self.deep_cost,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to `.casewise/cases.db`
    pub database_path: Option<PathBuf>,

    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            pool_size: 4,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            PathBuf::from(storage::DATA_DIR).join(storage::DATABASE_FILE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.research.provider, "sonar");
        assert_eq!(config.vision.timeout_secs, network::IMAGE_TIMEOUT_SECS);
        assert!(!config.pipeline.rare_disease_screening);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.reasoning.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.image_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vision.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cost_per_mode() {
        let costs = CreditsConfig::default();
        assert_eq!(costs.cost(RunMode::Simple), credits::SIMPLE_COST);
        assert_eq!(costs.cost(RunMode::Deep), credits::DEEP_COST);
    }

    #[test]
    fn test_storage_path_default() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.resolved_path(),
            PathBuf::from(".casewise").join("cases.db")
        );
    }
}
