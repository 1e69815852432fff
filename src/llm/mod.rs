//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! The `complete` method is `async fn` on the enum so callers need no
//! trait-object machinery.

pub mod providers;

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("no API key for request: {0}")]
    Credentials(String),
}

// ── Response ──────────────────────────────────────────────────────────────────

/// Token accounting reported by the backend, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Trimmed, non-empty reply text.
    pub text: String,
    pub usage: Option<LlmUsage>,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Adding a backend = new module + new variant + new `complete` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    Anthropic(providers::anthropic::AnthropicProvider),
}

impl LlmProvider {
    /// Send `content` (and an optional system prompt) to the provider and
    /// return its reply.
    pub async fn complete(
        &self,
        content: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        if content.trim().is_empty() {
            return Err(ProviderError::Request("refusing to send empty prompt".into()));
        }
        let response = match self {
            LlmProvider::Dummy(p) => p.complete(content, system).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(content, system).await,
            LlmProvider::Anthropic(p) => p.complete(content, system).await,
        }?;
        if let Some(u) = &response.usage {
            tracing::debug!(
                input_tokens = u.input_tokens,
                output_tokens = u.output_tokens,
                "llm usage"
            );
        }
        Ok(response)
    }

    /// Short backend name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
            LlmProvider::Anthropic(_) => "anthropic",
        }
    }
}
