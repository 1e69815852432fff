//! Interlink: SEO internal linking for article collections.
//!
//! Reads a sitemap and a directory of articles, works out which sitemap pages
//! each article should link to, and writes the articles back with
//! `<a class="internal-link">` elements inserted. See [`system`] for the
//! pipeline.

pub mod analysis;
pub mod articles;
pub mod config;
pub mod error;
pub mod keys;
pub mod linker;
pub mod llm;
pub mod logger;
pub mod matcher;
pub mod prompts;
pub mod report;
pub mod sitemap;
pub mod system;
pub mod url_db;

pub use error::AppError;
pub use system::InternalLinkingSystem;
