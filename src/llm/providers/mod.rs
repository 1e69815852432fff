//! LLM provider implementations.
//!
//! `build(config, keys)` is the factory, called when the linking system
//! initialises its API key. Adding a new backend = new module + new match arm.

pub mod anthropic;
pub mod dummy;
pub mod openai_compatible;

use crate::config::LlmConfig;
use crate::keys::KeySource;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and a key source.
///
/// Keys come from an [`crate::keys::ApiKeyManager`] (never TOML).
/// `openai`/`openai-compatible` accept [`KeySource::None`] for keyless local
/// servers; `anthropic` does not.
pub fn build(config: &LlmConfig, keys: KeySource) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::echo())),
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.timeout_seconds,
                keys,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        "anthropic" => {
            let a = &config.anthropic;
            let p = anthropic::AnthropicProvider::new(
                a.api_base_url.clone(),
                a.model.clone(),
                a.temperature,
                a.max_tokens,
                a.timeout_seconds,
                keys,
            )?;
            Ok(LlmProvider::Anthropic(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::keys::ApiKey;
    use std::path::Path;

    #[test]
    fn builds_dummy() {
        let cfg = Config::test_default(Path::new("/tmp"));
        let p = build(&cfg.llm, KeySource::None).unwrap();
        assert_eq!(p.name(), "dummy");
    }

    #[test]
    fn builds_openai_without_key() {
        let mut cfg = Config::test_default(Path::new("/tmp"));
        cfg.llm.provider = "openai".into();
        assert_eq!(build(&cfg.llm, KeySource::None).unwrap().name(), "openai");
        cfg.llm.provider = "openai-compatible".into();
        assert_eq!(build(&cfg.llm, KeySource::None).unwrap().name(), "openai");
    }

    #[test]
    fn anthropic_requires_key() {
        let mut cfg = Config::test_default(Path::new("/tmp"));
        cfg.llm.provider = "anthropic".into();
        let err = build(&cfg.llm, KeySource::None).unwrap_err();
        assert!(matches!(err, ProviderError::Credentials(_)));
        let p = build(&cfg.llm, KeySource::Fixed(ApiKey::new("sk-ant-test").unwrap())).unwrap();
        assert_eq!(p.name(), "anthropic");
    }

    #[test]
    fn unknown_provider_errors() {
        let mut cfg = Config::test_default(Path::new("/tmp"));
        cfg.llm.provider = "gemini".into();
        let err = build(&cfg.llm, KeySource::None).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(p) if p == "gemini"));
    }
}
