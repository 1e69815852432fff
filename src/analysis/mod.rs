//! Content analysis of articles and sitemap pages.
//!
//! [`ContentAnalyzer`] produces a [`PageAnalysis`] either through the
//! configured LLM provider or through the term-frequency heuristics in
//! [`local`]. It also derives anchor texts from URL slugs.

pub mod local;
pub mod page;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisMode;
use crate::error::AppError;
use crate::llm::LlmProvider;
use crate::prompts;

pub use page::{PageFetcher, PageMeta};

/// Topics and keywords describing one piece of content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageAnalysis {
    pub main_topics: Vec<String>,
    pub keywords: Vec<String>,
    pub secondary_topics: Vec<String>,
    pub key_concepts: Vec<String>,
    pub context: String,
    pub content_type: String,
}

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\n?|\n?```").expect("valid fence regex"));

/// Parse an LLM reply into a [`PageAnalysis`], tolerating markdown fences and
/// prose around the JSON object.
pub fn parse_analysis(reply: &str) -> Result<PageAnalysis, AppError> {
    let cleaned = FENCE_RE.replace_all(reply, "");
    let cleaned = cleaned.trim();
    if let Ok(a) = serde_json::from_str::<PageAnalysis>(cleaned) {
        return Ok(a);
    }
    let object = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => return Err(AppError::Analysis(format!("no JSON object in reply: {}", preview(reply)))),
    };
    serde_json::from_str(object)
        .map_err(|e| AppError::Analysis(format!("invalid analysis JSON ({e}): {}", preview(reply))))
}

fn preview(s: &str) -> String {
    s.chars().take(120).collect()
}

/// Last non-empty path segment of `url`, without query or fragment.
pub fn url_slug(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map_or("", |(_, p)| p))
        .unwrap_or(without_query);
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
}

/// Human-readable keyword from a URL slug: extension dropped, `-`/`_` → space.
pub fn slug_keyword(url: &str) -> String {
    let slug = url_slug(url);
    let stem = match slug.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => slug,
    };
    stem.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Produces analyses and anchor texts. Cheap to clone; shared across the
/// page-analysis tasks.
#[derive(Debug, Clone)]
pub struct ContentAnalyzer {
    mode: AnalysisMode,
    provider: Option<LlmProvider>,
}

impl ContentAnalyzer {
    /// `provider` is required for [`AnalysisMode::Llm`].
    pub fn new(mode: AnalysisMode, provider: Option<LlmProvider>) -> Result<Self, AppError> {
        if mode == AnalysisMode::Llm && provider.is_none() {
            return Err(AppError::Analysis("llm analysis needs an LLM provider".into()));
        }
        Ok(Self { mode, provider })
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub async fn analyze_article(&self, content: &str) -> Result<PageAnalysis, AppError> {
        match self.llm() {
            None => Ok(local::analyze(content)),
            Some(provider) => {
                let prompt = prompts::render(prompts::ARTICLE_ANALYSIS, [("content", content)]);
                self.ask_for_analysis(provider, &prompt).await
            }
        }
    }

    /// Analyse a sitemap page from its URL and, when fetched, its metadata.
    pub async fn analyze_page(
        &self,
        url: &str,
        meta: Option<&PageMeta>,
    ) -> Result<PageAnalysis, AppError> {
        let title = meta.map(|m| m.title.as_str()).unwrap_or("");
        let description = meta.map(|m| m.description.as_str()).unwrap_or("");
        match self.llm() {
            None => {
                let text = format!("{}. {title}. {description}", slug_keyword(url));
                Ok(local::analyze(&text))
            }
            Some(provider) => {
                let prompt = prompts::render(
                    prompts::PAGE_ANALYSIS,
                    [("url", url), ("title", title), ("description", description)],
                );
                self.ask_for_analysis(provider, &prompt).await
            }
        }
    }

    /// Anchor text for a link to `url`. The slug keyword, refined by the LLM
    /// in [`AnalysisMode::Llm`].
    pub async fn anchor_text(&self, url: &str) -> Result<String, AppError> {
        let keyword = slug_keyword(url);
        if keyword.is_empty() {
            return Err(AppError::Analysis(format!("no slug keyword in {url}")));
        }
        let Some(provider) = self.llm() else {
            return Ok(keyword);
        };

        let prompt = prompts::render(prompts::ANCHOR_TEXT, [("keyword", keyword.as_str())]);
        let reply = provider.complete(&prompt, Some(prompts::ANCHOR_SYSTEM.trim())).await?;
        let anchor = clean_anchor(&reply.text);
        if anchor.is_empty() {
            warn!(%url, "LLM returned an empty anchor text");
            return Err(AppError::Analysis(format!("empty anchor text for {url}")));
        }
        debug!(%url, %keyword, %anchor, "anchor text refined");
        Ok(anchor)
    }

    fn llm(&self) -> Option<&LlmProvider> {
        match self.mode {
            AnalysisMode::Llm => self.provider.as_ref(),
            AnalysisMode::Local => None,
        }
    }

    async fn ask_for_analysis(
        &self,
        provider: &LlmProvider,
        prompt: &str,
    ) -> Result<PageAnalysis, AppError> {
        let reply = provider
            .complete(prompt, Some(prompts::ANALYSIS_SYSTEM.trim()))
            .await?;
        parse_analysis(&reply.text)
    }
}

/// First line of the reply, stripped of quotes and trailing punctuation.
fn clean_anchor(reply: &str) -> String {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    line.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’'))
        .trim_end_matches(['.', '!'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;

    const REPLY: &str = r#"{"main_topics":["kedi bakımı"],"keywords":["kedi","mama"],
        "context":"evcil hayvan","content_type":"article"}"#;

    #[test]
    fn parses_fenced_json() {
        let reply = format!("```json\n{REPLY}\n```");
        let a = parse_analysis(&reply).unwrap();
        assert_eq!(a.main_topics, vec!["kedi bakımı"]);
        assert_eq!(a.keywords, vec!["kedi", "mama"]);
        assert!(a.secondary_topics.is_empty());
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let reply = format!("Here is the analysis:\n{REPLY}\nHope this helps.");
        assert_eq!(parse_analysis(&reply).unwrap().content_type, "article");
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_analysis("I cannot help with that").is_err());
    }

    #[test]
    fn slug_extraction() {
        assert_eq!(url_slug("https://site.test/blog/kedi-bakimi/"), "kedi-bakimi");
        assert_eq!(url_slug("https://site.test/blog/kedi-bakimi?utm=x#top"), "kedi-bakimi");
        assert_eq!(url_slug("https://site.test"), "");
        assert_eq!(slug_keyword("https://site.test/guides/cat_food-guide.html"), "cat food guide");
        assert_eq!(slug_keyword("https://site.test/v1.2-release"), "v1.2 release");
    }

    #[test]
    fn anchor_cleanup() {
        assert_eq!(clean_anchor("\"Kedi bakımı rehberi.\"\n"), "Kedi bakımı rehberi");
        assert_eq!(clean_anchor("\n  'cat food'  \nexplanation"), "cat food");
    }

    #[test]
    fn llm_mode_requires_provider() {
        assert!(ContentAnalyzer::new(AnalysisMode::Llm, None).is_err());
    }

    #[tokio::test]
    async fn local_anchor_is_slug_keyword() {
        let a = ContentAnalyzer::new(AnalysisMode::Local, None).unwrap();
        assert_eq!(a.anchor_text("https://s.test/cat-food").await.unwrap(), "cat food");
        assert!(a.anchor_text("https://s.test/").await.is_err());
    }

    #[tokio::test]
    async fn llm_article_analysis_uses_provider_reply() {
        let p = LlmProvider::Dummy(DummyProvider::scripted(REPLY));
        let a = ContentAnalyzer::new(AnalysisMode::Llm, Some(p)).unwrap();
        let analysis = a.analyze_article("Kediler hakkında bir yazı").await.unwrap();
        assert_eq!(analysis.context, "evcil hayvan");
    }

    #[tokio::test]
    async fn llm_anchor_refined_by_provider() {
        let p = LlmProvider::Dummy(DummyProvider::scripted("\"Kedi Bakımı\""));
        let a = ContentAnalyzer::new(AnalysisMode::Llm, Some(p)).unwrap();
        assert_eq!(a.anchor_text("https://s.test/kedi-bakimi").await.unwrap(), "Kedi Bakımı");
    }

    #[tokio::test]
    async fn local_mode_ignores_provider() {
        let p = LlmProvider::Dummy(DummyProvider::scripted("not json"));
        let a = ContentAnalyzer::new(AnalysisMode::Local, Some(p)).unwrap();
        let analysis = a.analyze_page("https://s.test/garden-tools", None).await.unwrap();
        assert!(analysis.keywords.contains(&"garden".to_string()));
    }
}
