//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("api key error: {0}")]
    ApiKey(String),

    #[error("sitemap error: {0}")]
    Sitemap(String),

    #[error("articles error: {0}")]
    Articles(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("llm error: {0}")]
    Provider(#[from] ProviderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
