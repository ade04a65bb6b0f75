//! Search-Augmented Research Provider
//!
//! Client for Perplexity-style "sonar" chat completions, which answer with
//! web-grounded text plus the sources they consulted. The response carries
//! `search_results` (title, url, date) and a bare `citations` URL list; both are
//! surfaced in the [`ResearchReport`] so reference extraction can prefer the
//! richer one.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{Endpoint, ProviderConfig, ResearchModel, TextModel};
use crate::types::{
    CaseError, ErrorCategory, ErrorClassifier, ModelError, ResearchReport, Result, SourceEntry,
};

const DEFAULT_API_BASE: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar-pro";
const PROVIDER: &str = "sonar";

const SYSTEM_PROMPT: &str = "You are a medical research assistant. Ground every claim in \
     peer-reviewed literature or official guidelines and cite sources with bracketed \
     numbers such as [1].";

pub struct SonarProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for SonarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl SonarProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("PERPLEXITY_API_KEY").ok())
            .ok_or_else(|| {
                CaseError::Config(
                    "Research API key not found. Set PERPLEXITY_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CaseError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: config
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    async fn send(&self, prompt: &str) -> Result<SonarResponse> {
        let start_time = Instant::now();
        let request = SonarRequest {
            model: self.model.clone(),
            messages: vec![
                SonarMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                SonarMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("Research API error ({}): {}", status, body),
                PROVIDER,
            )
            .into());
        }

        let body: SonarResponse = response
            .json()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER))?;

        debug!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            search_results = body.search_results.len(),
            citations = body.citations.len(),
            "Received research response"
        );
        Ok(body)
    }
}

impl Endpoint for SonarProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ResearchModel for SonarProvider {
    async fn research(&self, prompt: &str) -> Result<ResearchReport> {
        info!("Researching with {} (model: {})", PROVIDER, self.model);
        let response = self.send(prompt).await?;
        response.into_report()
    }
}

#[async_trait]
impl TextModel for SonarProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt).await?;
        Ok(response.into_report()?.answer_text)
    }
}

#[derive(Debug, Serialize)]
struct SonarRequest {
    model: String,
    messages: Vec<SonarMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct SonarMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct SonarResponse {
    choices: Vec<SonarChoice>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SonarChoice {
    message: SonarResponseMessage,
}

#[derive(Debug, Deserialize)]
struct SonarResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    date: Option<String>,
}

impl SonarResponse {
    /// Convert to a report; an empty answer is an unusable shape
    fn into_report(self) -> Result<ResearchReport> {
        let answer_text = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                CaseError::from(ModelError::with_provider(
                    ErrorCategory::ParseError,
                    "No content in research response",
                    PROVIDER,
                ))
            })?;

        let source_entries = self
            .search_results
            .into_iter()
            .map(|r| SourceEntry {
                title: r.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| r.url.clone()),
                url: r.url,
                date: r.date.filter(|d| !d.trim().is_empty()),
            })
            .collect();

        Ok(ResearchReport {
            answer_text,
            source_entries,
            citations: self.citations,
        })
    }
}
