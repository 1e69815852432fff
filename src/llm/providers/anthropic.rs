//! Anthropic messages provider (`/v1/messages`).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::keys::KeySource;
use crate::llm::{LlmResponse, LlmUsage, ProviderError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    keys: KeySource,
}

impl AnthropicProvider {
    /// Fails when `keys` is [`KeySource::None`]; the API has no keyless mode.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout_seconds: u64,
        keys: KeySource,
    ) -> Result<Self, ProviderError> {
        if keys.is_none() {
            return Err(ProviderError::Credentials("anthropic provider requires an API key".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, max_tokens, keys })
    }

    pub async fn complete(
        &self,
        content: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        let api_key = self
            .keys
            .key()
            .map_err(|e| ProviderError::Credentials(e.to_string()))?
            .ok_or_else(|| ProviderError::Credentials("no anthropic key".into()))?;

        let payload = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: vec![Message { role: "user", content }],
        };

        debug!(model = %self.model, content_len = content.len(), "sending Anthropic request");
        trace!(fingerprint = %api_key.fingerprint(), "request key");

        let response = self
            .client
            .post(&self.api_base_url)
            .header("x-api-key", api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_base_url, error = %e, "Anthropic transport failure");
                ProviderError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(env) => format!("HTTP {status} [{}]: {}", env.error.kind, env.error.message),
                Err(_) => format!("HTTP {status}: {body}"),
            };
            error!(%status, %message, "Anthropic request returned HTTP error");
            return Err(ProviderError::Request(message));
        }

        let parsed = response.json::<MessagesResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize Anthropic response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        parsed.into_response()
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<UsageData>,
}

impl MessagesResponse {
    fn into_response(self) -> Result<LlmResponse, ProviderError> {
        let text = self
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Request("empty or missing content in response".into()));
        }
        let usage = self.usage.map(|u| LlmUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });
        Ok(LlmResponse { text, usage })
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}
