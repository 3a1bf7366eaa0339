//! Language-model collaborator: the [`ChatModel`] seam and its
//! edgequake-llm implementation.
//!
//! The pipeline only ever needs "prompt in, text out" at deterministic
//! sampling, so that is the whole trait. Fronting
//! [`edgequake_llm::LLMProvider`] with our own object-safe trait keeps the
//! orchestrator testable with a scripted mock while production code rides the
//! provider factory's auto-detection (OpenAI / Anthropic / Gemini / Groq /
//! Ollama / …).
//!
//! Two logical roles are resolved independently: the **anchor** model
//! (screening/classification, typically a fixed larger tier) and the **main**
//! model (bulk per-chunk extraction). Both default to the same fallback chain:
//!
//! 1. Pre-built [`ChatModel`] on the config — tests, custom middleware.
//! 2. Named provider + model via [`ProviderFactory::create_llm_provider`].
//! 3. `DSX_LLM_PROVIDER` + `DSX_MODEL` environment pair.
//! 4. Full auto-detection via [`ProviderFactory::from_env`].

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Fallback main model when only an API key is configured.
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
/// Fallback anchor model; classification benefits from the stronger tier.
const DEFAULT_ANCHOR_MODEL: &str = "gpt-4o";

/// A blocking-request/response completion capability.
///
/// One call, one text completion. No streaming, no tool use. Implementations
/// must be safe to share across document workers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Issue one completion for the given system + user messages.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ExtractError>;

    /// Identifier recorded in the per-document metadata snapshot.
    fn model_name(&self) -> &str;
}

/// [`ChatModel`] backed by an edgequake-llm provider.
pub struct EdgequakeChat {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl EdgequakeChat {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for EdgequakeChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ExtractError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ExtractError::LlmApiError {
                message: format!("{e}"),
            })?;
        debug!(
            model = %self.model,
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "completion received"
        );
        Ok(response.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Instantiate a named provider with the given model.
fn create_chat_model(
    provider_name: &str,
    model: &str,
    config: &ExtractionConfig,
) -> Result<Arc<dyn ChatModel>, ExtractError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(EdgequakeChat::new(
        provider,
        model,
        config.temperature,
        config.max_tokens,
    )))
}

/// Auto-detect a provider from the environment.
fn auto_detect(model: &str, config: &ExtractionConfig) -> Result<Arc<dyn ChatModel>, ExtractError> {
    // Honour the explicit environment pair before full auto-detection so the
    // model choice survives when multiple API keys are present.
    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("DSX_LLM_PROVIDER"),
        std::env::var("DSX_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_chat_model(&prov, &env_model, config);
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GROQ_API_KEY, or name a provider.\n\
                 Error: {e}"
            ),
        })?;
    Ok(Arc::new(EdgequakeChat::new(
        provider,
        model,
        config.temperature,
        config.max_tokens,
    )))
}

/// Resolve the main (per-chunk extraction) model.
pub fn resolve_main_model(config: &ExtractionConfig) -> Result<Arc<dyn ChatModel>, ExtractError> {
    if let Some(ref model) = config.chat_model {
        return Ok(Arc::clone(model));
    }
    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_chat_model(name, model, config);
    }
    auto_detect(model, config)
}

/// Resolve the anchor (screening/classification) model. Falls back to the
/// main provider chain when no anchor-specific configuration is present.
pub fn resolve_anchor_model(config: &ExtractionConfig) -> Result<Arc<dyn ChatModel>, ExtractError> {
    if let Some(ref model) = config.anchor_chat_model {
        return Ok(Arc::clone(model));
    }
    let model = config
        .anchor_model
        .as_deref()
        .unwrap_or(DEFAULT_ANCHOR_MODEL);
    if let Some(name) = config
        .anchor_provider_name
        .as_deref()
        .or(config.provider_name.as_deref())
    {
        return create_chat_model(name, model, config);
    }
    auto_detect(model, config)
}
