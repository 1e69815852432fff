//! Sitemap loading.
//!
//! Accepts a local path or an `http(s)://` URL and three formats:
//!
//! - XML `<urlset>`: every `<url><loc>` is a page.
//! - XML `<sitemapindex>`: every `<sitemap><loc>` is another sitemap, loaded
//!   recursively up to [`MAX_INDEX_DEPTH`]. Relative locations resolve against
//!   the parent's directory (or URL).
//! - Plain text: one URL per line; blank lines and `#` comments are ignored.
//!
//! A nested sitemap that cannot be loaded is skipped with a warning. The
//! returned list is de-duplicated, first occurrence wins, and must not be
//! empty.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Nesting limit for `<sitemapindex>` chains.
pub const MAX_INDEX_DEPTH: usize = 4;

static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<loc>\s*(?:<!\[CDATA\[)?\s*(.*?)\s*(?:\]\]>)?\s*</loc>")
        .expect("valid loc regex")
});
static URLSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<urlset[\s>]").expect("valid urlset regex"));
static INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<sitemapindex[\s>]").expect("valid sitemapindex regex"));

/// One parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDoc {
    /// Page URLs.
    Urls(Vec<String>),
    /// Locations of further sitemaps.
    Index(Vec<String>),
}

/// Parse sitemap text without following index entries.
pub fn parse(text: &str) -> Result<SitemapDoc, AppError> {
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Err(AppError::Sitemap("empty sitemap".into()));
    }

    if !text.starts_with('<') {
        let urls = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        return Ok(SitemapDoc::Urls(urls));
    }

    let locs = || {
        LOC_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    };

    if INDEX_RE.is_match(text) {
        Ok(SitemapDoc::Index(locs()))
    } else if URLSET_RE.is_match(text) {
        Ok(SitemapDoc::Urls(locs()))
    } else {
        Err(AppError::Sitemap("no valid sitemap format found".into()))
    }
}

/// Load every page URL reachable from `source`.
pub async fn load(source: &str, client: &Client) -> Result<Vec<String>, AppError> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for url in load_nested(source.to_string(), 0, client).await? {
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }
    if urls.is_empty() {
        return Err(AppError::Sitemap(format!("no URLs found in {source}")));
    }
    info!(%source, count = urls.len(), "sitemap loaded");
    Ok(urls)
}

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>, AppError>> + Send + 'a>>;

fn load_nested(source: String, depth: usize, client: &Client) -> LoadFuture<'_> {
    Box::pin(async move {
        if depth > MAX_INDEX_DEPTH {
            return Err(AppError::Sitemap(format!(
                "sitemap index nested deeper than {MAX_INDEX_DEPTH} levels at {source}"
            )));
        }

        let text = read_source(&source, client).await?;
        match parse(&text)? {
            SitemapDoc::Urls(urls) => {
                debug!(%source, count = urls.len(), "urlset parsed");
                Ok(urls)
            }
            SitemapDoc::Index(children) => {
                debug!(%source, children = children.len(), "sitemap index parsed");
                let mut all = Vec::new();
                for child in children {
                    let location = resolve_location(&source, &child)?;
                    match load_nested(location.clone(), depth + 1, client).await {
                        Ok(urls) => all.extend(urls),
                        Err(e) => warn!(%location, error = %e, "skipping nested sitemap"),
                    }
                }
                Ok(all)
            }
        }
    })
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn read_source(source: &str, client: &Client) -> Result<String, AppError> {
    if is_remote(source) {
        let response = client
            .get(source)
            .send()
            .await
            .map_err(|e| AppError::Sitemap(format!("cannot fetch {source}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Sitemap(format!("fetch of {source} failed with HTTP {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| AppError::Sitemap(format!("cannot read body of {source}: {e}")))
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| AppError::Sitemap(format!("cannot read {source}: {e}")))
    }
}

/// Resolve a `<loc>` found in `parent` to something [`read_source`] can open.
fn resolve_location(parent: &str, loc: &str) -> Result<String, AppError> {
    if is_remote(loc) {
        return Ok(loc.to_string());
    }
    if is_remote(parent) {
        let base = Url::parse(parent)
            .map_err(|e| AppError::Sitemap(format!("invalid sitemap URL {parent}: {e}")))?;
        let joined = base
            .join(loc)
            .map_err(|e| AppError::Sitemap(format!("cannot resolve {loc} against {parent}: {e}")))?;
        return Ok(joined.to_string());
    }
    let loc_path = Path::new(loc.strip_prefix("file://").unwrap_or(loc));
    if loc_path.is_absolute() {
        return Ok(loc_path.to_string_lossy().into_owned());
    }
    let dir = Path::new(parent).parent().map(Path::to_path_buf).unwrap_or_else(PathBuf::new);
    Ok(dir.join(loc_path).to_string_lossy().into_owned())
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
