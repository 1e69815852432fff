//! Run reports.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::linker::ProcessedLink;

/// Longest paragraph excerpt shown in [`RunReport::summary`].
const EXCERPT_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleReport {
    /// Article file name.
    pub article: String,
    pub links: Vec<ProcessedLink>,
    pub output_path: PathBuf,
}

impl ArticleReport {
    pub fn inserted(&self) -> usize {
        self.links.iter().filter(|l| l.inserted).count()
    }
}

/// An article that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedArticle {
    pub article: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub urls_in_sitemap: usize,
    pub articles: Vec<ArticleReport>,
    pub skipped: Vec<SkippedArticle>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            urls_in_sitemap: 0,
            articles: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// `true` when nothing was processed or skipped.
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty() && self.skipped.is_empty()
    }

    pub fn total_links(&self) -> usize {
        self.articles.iter().map(ArticleReport::inserted).sum()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Plain-text table, one row per link.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for a in &self.articles {
            let _ = writeln!(
                out,
                "{} ({} of {} links inserted)",
                a.article,
                a.inserted(),
                a.links.len()
            );
            for l in &a.links {
                let _ = writeln!(
                    out,
                    "  {mark} {score:>6}  paragraph {idx:<3} {anchor:<28} {url}",
                    mark = if l.inserted { "✓" } else { "✗" },
                    score = format_score(l.similarity_score),
                    idx = l.paragraph_index,
                    anchor = l.anchor_text,
                    url = l.url,
                );
                if !l.inserted {
                    let _ = writeln!(out, "      not found in: {}", excerpt(&l.paragraph));
                }
            }
        }
        for s in &self.skipped {
            let _ = writeln!(out, "{} skipped: {}", s.article, s.reason);
        }
        let _ = write!(
            out,
            "{} links inserted across {} articles ({} URLs in sitemap)",
            self.total_links(),
            self.articles.len(),
            self.urls_in_sitemap
        );
        out
    }
}

/// Similarity as a percentage with one decimal, e.g. `87.5%`.
pub fn format_score(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}…")
    }
}
