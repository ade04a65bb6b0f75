//! AI Integration Layer
//!
//! Model endpoint traits and clients, prompt construction, JSON repair for
//! structured responses, and the timeout/cancellation guard every call goes through.

pub mod json_repair;
pub mod prompt;
pub mod provider;
pub mod timeout;

pub use json_repair::{JsonRepairer, extract_json_from_response};
pub use prompt::{PromptBuilder, PromptSection, PromptTemplates};
pub use provider::{
    Endpoint, OpenAiProvider, ProviderConfig, ReferenceEnricher, ResearchModel,
    SharedEnricher, SharedResearchModel, SharedTextModel, SharedVisionModel, SonarProvider,
    TextModel, VisionModel, create_enricher, create_research_model, create_text_model,
    create_vision_model,
};
pub use timeout::{TimeoutConfig, guarded_call, with_timeout};
