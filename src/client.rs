//! Completion client: the single seam between the pipeline and an LLM.
//!
//! The pipeline only ever sees an `Arc<dyn CompletionClient>` injected
//! through [`crate::config::TimelineConfig`]. It never looks at API keys or
//! environment variables itself; [`ProviderClient`] is the edgequake-llm
//! backed implementation, and tests plug in a scripted client instead.

use crate::error::TimelineError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Model used when the caller names a provider but no model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One prompt sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The model's reply plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Failure reported by a [`CompletionClient`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ClientError(pub String);

/// Anything that can turn a prompt into a completion.
///
/// Implementations make exactly one attempt per call; the pipeline does not
/// retry either.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ClientError>;
}

/// [`CompletionClient`] backed by an edgequake-llm provider.
pub struct ProviderClient {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("name", &self.name)
            .field("provider", &"<dyn LLMProvider>")
            .finish()
    }
}

impl ProviderClient {
    /// Wrap an already-constructed provider.
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    /// Instantiate a named provider (`openai`, `anthropic`, `gemini`,
    /// `ollama`, ...) with the given model.
    pub fn named(provider_name: &str, model: &str) -> Result<Self, TimelineError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            TimelineError::ClientNotConfigured {
                hint: format!("Provider '{provider_name}' could not be created: {e}"),
            }
        })?;
        Ok(Self::new(provider_name, provider))
    }

    /// Pick a provider from the process environment.
    ///
    /// Resolution order:
    /// 1. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
    /// 2. `OPENAI_API_KEY` → OpenAI with `model` (or [`DEFAULT_MODEL`])
    /// 3. whatever `ProviderFactory::from_env` detects
    ///
    /// This is the only place the crate reads credentials from the
    /// environment, and only callers that opt in (the CLI) reach it.
    pub fn from_env(model: Option<&str>) -> Result<Self, TimelineError> {
        if let (Ok(prov), Ok(env_model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return Self::named(&prov, &env_model);
            }
        }

        if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
            if !openai_key.is_empty() {
                return Self::named("openai", model.unwrap_or(DEFAULT_MODEL));
            }
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| TimelineError::ClientNotConfigured {
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY.\n\
                    Error: {e}"
                ),
            })?;

        Ok(Self::new("auto", llm_provider))
    }
}

#[async_trait]
impl CompletionClient for ProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ClientError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.prompt.as_str()),
        ];
        let options = build_options(request);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ClientError(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

fn build_options(request: &CompletionRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}
