//! Page fetching and metadata extraction for sitemap URLs.

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::AppError;

/// Rotated per request; some hosts reject unknown clients.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));
static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[content]").expect("valid meta selector"));

/// Title and description of a fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
}

/// Extract `<title>` and the description meta tag (`name="description"`,
/// else `property="og:description"`) from raw HTML.
pub fn extract_meta(html: &str) -> PageMeta {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|el| normalize(&el.text().collect::<String>()))
        .unwrap_or_default();

    let mut description = String::new();
    for el in document.select(&META) {
        let meta = el.value();
        let Some(content) = meta.attr("content") else { continue };
        let name = meta
            .attr("name")
            .or_else(|| meta.attr("property"))
            .map(str::to_ascii_lowercase);
        match name.as_deref() {
            Some("description") => {
                description = normalize(content);
                break;
            }
            Some("og:description") if description.is_empty() => description = normalize(content),
            _ => {}
        }
    }

    PageMeta { title, description }
}

/// Collapse runs of whitespace; entities are already decoded by the parser.
fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// HTTP fetcher for sitemap pages. Cheap to clone; clones share the
/// user-agent rotation.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    next_agent: Arc<AtomicUsize>,
}

impl PageFetcher {
    pub fn new(timeout_seconds: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Analysis(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, next_agent: Arc::new(AtomicUsize::new(0)) })
    }

    /// The underlying client, reused for remote sitemaps.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn user_agent(&self) -> &'static str {
        let i = self.next_agent.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[i % USER_AGENTS.len()]
    }

    pub async fn fetch_meta(&self, url: &str) -> Result<PageMeta, AppError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .send()
            .await
            .map_err(|e| AppError::Analysis(format!("cannot fetch {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Analysis(format!("fetch of {url} failed with HTTP {status}")));
        }
        let html = response
            .text()
            .await
            .map_err(|e| AppError::Analysis(format!("cannot read body of {url}: {e}")))?;
        let meta = extract_meta(&html);
        debug!(%url, title = %meta.title, "page metadata extracted");
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_description() {
        let html = r#"<html><head>
            <TITLE>
              Kedi Bakımı &amp; Beslenme
            </TITLE>
            <meta charset="utf-8">
            <meta content="Kedinizin sağlığı için   ipuçları" name="description" />
            </head></html>"#;
        let meta = extract_meta(html);
        assert_eq!(meta.title, "Kedi Bakımı & Beslenme");
        assert_eq!(meta.description, "Kedinizin sağlığı için ipuçları");
    }

    #[test]
    fn falls_back_to_og_description() {
        let html = r#"<title>T</title><meta property='og:description' content='From OG'>"#;
        assert_eq!(extract_meta(html).description, "From OG");
    }

    #[test]
    fn name_description_wins_over_og() {
        let html = r#"<meta property="og:description" content="og">
                      <meta name="description" content="plain">"#;
        assert_eq!(extract_meta(html).description, "plain");
    }

    #[test]
    fn markup_inside_attributes_survives() {
        let html = r#"<title>Soil &#8211; pH &lt;7&gt;</title>
            <meta name="description" content="a > b &#x26; &quot;c&quot;">"#;
        let meta = extract_meta(html);
        assert_eq!(meta.title, "Soil \u{2013} pH <7>");
        assert_eq!(meta.description, "a > b & \"c\"");
    }

    #[test]
    fn missing_tags_yield_empty_meta() {
        assert_eq!(extract_meta("<p>no head</p>"), PageMeta::default());
    }

    #[test]
    fn user_agents_rotate() {
        let f = PageFetcher::new(5).unwrap();
        let clone = f.clone();
        let a = f.user_agent();
        let b = clone.user_agent();
        assert_ne!(a, b);
    }
}
