//! Dummy LLM provider. Replies with a scripted string, or echoes the input
//! prefixed with `[echo]` when no script is set. Replies can also be routed
//! by prompt content with [`DummyProvider::when`].
//! Used to exercise the analysis pipeline without a real API key.

use crate::llm::{LlmResponse, ProviderError};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    reply: Option<String>,
    /// `(needle, reply)` pairs, tried in order against the prompt.
    routes: Vec<(String, String)>,
}

impl DummyProvider {
    pub fn echo() -> Self {
        Self::default()
    }

    /// Every `complete` call returns `reply` verbatim.
    pub fn scripted(reply: impl Into<String>) -> Self {
        Self { reply: Some(reply.into()), routes: Vec::new() }
    }

    /// Answer `reply` to prompts containing `needle`. The first matching
    /// route wins; unmatched prompts get the scripted reply or the echo.
    pub fn when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.routes.push((needle.into(), reply.into()));
        self
    }

    pub async fn complete(
        &self,
        content: &str,
        _system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        let routed = self
            .routes
            .iter()
            .find(|(needle, _)| content.contains(needle.as_str()))
            .map(|(_, reply)| reply);
        let text = match (routed, &self.reply) {
            (Some(r), _) | (None, Some(r)) => r.clone(),
            (None, None) => format!("[echo] {content}"),
        };
        Ok(LlmResponse { text, usage: None })
    }
}
