//! OpenAI API Provider
//!
//! Chat Completions client used for three endpoints: free-text reasoning,
//! per-image vision analysis (base64 data URLs) and JSON-mode reference enrichment.
//! Any OpenAI-compatible server works through `api_base`.

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{Endpoint, ProviderConfig, ReferenceEnricher, TextModel, VisionModel};
use crate::ai::json_repair::extract_json_from_response;
use crate::ai::prompt::PromptTemplates;
use crate::types::{
    CaseError, CaseImage, ErrorCategory, ErrorClassifier, ModelError, Reference, Result,
    json_i64, json_string, json_string_array,
};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const PROVIDER: &str = "openai";

const SYSTEM_PROMPT: &str = "You are a senior physician assisting colleagues with clinical case \
     analysis. Be precise, evidence-based and explicit about uncertainty.";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                CaseError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CaseError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_request(&self, user_content: MessageContent, json_mode: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }

    /// Send a chat completion request and return the first choice's text
    async fn send(&self, request: &ChatCompletionRequest) -> Result<String> {
        let start_time = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("OpenAI API error ({}): {}", status, body),
                PROVIDER,
            )
            .into());
        }

        let response_body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER))?;

        debug!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Received response from OpenAI"
        );

        response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ModelError::with_provider(
                    ErrorCategory::ParseError,
                    "No content in OpenAI response",
                    PROVIDER,
                )
                .into()
            })
    }
}

impl Endpoint for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextModel for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        info!(
            "Generating with OpenAI (model: {}, temperature: {})",
            self.model, self.temperature
        );
        let request = self.build_request(MessageContent::Text(prompt.to_string()), false);
        self.send(&request).await
    }
}

#[async_trait]
impl VisionModel for OpenAiProvider {
    async fn analyze_image(&self, image: &CaseImage) -> Result<String> {
        debug!(
            domain = image.domain.as_str(),
            bytes = image.bytes.len(),
            "Analyzing image with OpenAI vision"
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        let data_url = format!("data:{};base64,{}", image.mime_type, encoded);

        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: PromptTemplates::image_analysis(image.domain),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrlContent {
                    url: data_url,
                    detail: "high".to_string(),
                },
            },
        ]);
        let request = self.build_request(content, false);
        self.send(&request).await
    }
}

#[async_trait]
impl ReferenceEnricher for OpenAiProvider {
    async fn enrich(&self, references: &[Reference], context: &str) -> Result<Vec<Reference>> {
        let prompt = PromptTemplates::reference_enrichment(references, context)?;
        let request = self.build_request(MessageContent::Text(prompt), true);
        let raw = self.send(&request).await?;
        let value = extract_json_from_response(&raw)?;
        Ok(apply_enrichment_response(references, &value))
    }
}

/// Copy metadata from an enrichment response onto the references it names.
///
/// Items are matched by label; unknown labels are ignored and references without
/// a matching item are returned as-is.
fn apply_enrichment_response(references: &[Reference], response: &Value) -> Vec<Reference> {
    let items = response
        .get("references")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    references
        .iter()
        .map(|reference| {
            let mut updated = reference.clone();
            let item = items.iter().find(|item| {
                json_string(item, "label").as_deref() == Some(reference.label.as_str())
                    || json_i64(item, "label").map(|l| l.to_string()).as_deref()
                        == Some(reference.label.as_str())
            });
            if let Some(item) = item {
                let authors = json_string_array(item, "authors");
                if !authors.is_empty() {
                    updated.authors = authors;
                }
                if let Some(journal) = json_string(item, "journal").filter(|j| !j.trim().is_empty())
                {
                    updated.journal = Some(journal);
                }
                if let Some(year) = json_i64(item, "year").and_then(|y| i32::try_from(y).ok()) {
                    updated.year = Some(year);
                }
            }
            updated
        })
        .collect()
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlContent },
}

#[derive(Debug, Serialize)]
struct ImageUrlContent {
    url: String,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    #[test]
    fn test_apply_enrichment_matches_by_label() {
        let refs = vec![reference("1"), reference("2")];
        let response = json!({
            "references": [
                {"label": 2, "authors": ["Doe J", "Roe R"], "journal": "Lancet", "year": "2019"},
                {"label": "9", "journal": "Ghost"}
            ]
        });

        let updated = apply_enrichment_response(&refs, &response);
        assert_eq!(updated[0], refs[0]);
        assert_eq!(updated[1].authors, vec!["Doe J", "Roe R"]);
        assert_eq!(updated[1].journal.as_deref(), Some("Lancet"));
        assert_eq!(updated[1].year, Some(2019));
        assert_eq!(updated[1].title, "Study 2");
    }

    #[test]
    fn test_apply_enrichment_tolerates_missing_array() {
        let refs = vec![reference("1")];
        let updated = apply_enrichment_response(&refs, &json!({"unexpected": true}));
        assert_eq!(updated, refs);
    }

    #[test]
    fn test_vision_request_serializes_image_part() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "describe".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrlContent {
                    url: "data:image/png;base64,AAAA".to_string(),
                    detail: "high".to_string(),
                },
            },
        ]);
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value[0]["type"], "text");
        assert_eq!(value[1]["type"], "image_url");
        assert_eq!(value[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
