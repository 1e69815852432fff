//! Relevance scoring of sitemap pages against an article.
//!
//! Two strategies, both returning a score in `[0, 1]`:
//!
//! - [`overlap_score`]: `0.4·J(main_topics) + 0.3·J(keywords)
//!   + 0.2·J(secondary_topics) + 0.1·[same content type]`, with `J` the
//!   case-insensitive Jaccard index (0 when either side is empty).
//! - [`fuzzy_score`]: `0.7·dice(key concepts) + 0.3·dice(context)`, with
//!   `dice` the bigram Sørensen–Dice coefficient.

use std::collections::{HashMap, HashSet};

use crate::analysis::{PageAnalysis, url_slug};
use crate::config::ScoringStrategy;
use crate::url_db::UrlEntry;

const W_MAIN_TOPICS: f64 = 0.4;
const W_KEYWORDS: f64 = 0.3;
const W_SECONDARY: f64 = 0.2;
const W_CONTENT_TYPE: f64 = 0.1;
const W_CONCEPTS: f64 = 0.7;
const W_CONTEXT: f64 = 0.3;

/// A sitemap page chosen as a link target.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredUrl {
    pub url: String,
    pub score: f64,
}

/// Case-insensitive Jaccard index of two term lists.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: HashSet<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let b: HashSet<String> = b.iter().map(|s| s.to_lowercase()).collect();
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

pub fn overlap_score(a: &PageAnalysis, b: &PageAnalysis) -> f64 {
    let mut score = W_MAIN_TOPICS * jaccard(&a.main_topics, &b.main_topics)
        + W_KEYWORDS * jaccard(&a.keywords, &b.keywords)
        + W_SECONDARY * jaccard(&a.secondary_topics, &b.secondary_topics);
    if !a.content_type.is_empty() && a.content_type.eq_ignore_ascii_case(&b.content_type) {
        score += W_CONTENT_TYPE;
    }
    score
}

/// Bigram Sørensen–Dice coefficient on lowercase text with whitespace removed.
pub fn dice(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    if a == b && !a.is_empty() {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for w in a.windows(2) {
        *bigrams.entry((w[0], w[1])).or_insert(0) += 1;
    }
    let mut shared = 0usize;
    for w in b.windows(2) {
        if let Some(n) = bigrams.get_mut(&(w[0], w[1])) {
            if *n > 0 {
                *n -= 1;
                shared += 1;
            }
        }
    }
    (2 * shared) as f64 / ((a.len() - 1) + (b.len() - 1)) as f64
}

pub fn fuzzy_score(a: &PageAnalysis, b: &PageAnalysis) -> f64 {
    let concepts = dice(&a.key_concepts.join(" "), &b.key_concepts.join(" "));
    let context = if a.context.is_empty() || b.context.is_empty() {
        0.0
    } else {
        dice(&a.context, &b.context)
    };
    W_CONCEPTS * concepts + W_CONTEXT * context
}

pub fn score(strategy: ScoringStrategy, a: &PageAnalysis, b: &PageAnalysis) -> f64 {
    match strategy {
        ScoringStrategy::Overlap => overlap_score(a, b),
        ScoringStrategy::Fuzzy => fuzzy_score(a, b),
    }
}

/// Rank `candidates` against `article` and keep the best `max_links`.
///
/// Pages whose slug equals `own_slug` (the article itself) and pages scoring
/// below `min_score` are dropped. Equal scores keep sitemap order.
pub fn find_relevant(
    strategy: ScoringStrategy,
    article: &PageAnalysis,
    candidates: &[&UrlEntry],
    own_slug: Option<&str>,
    min_score: f64,
    max_links: usize,
) -> Vec<ScoredUrl> {
    let mut scored: Vec<ScoredUrl> = candidates
        .iter()
        .filter(|e| own_slug.is_none_or(|s| !url_slug(&e.url).eq_ignore_ascii_case(s)))
        .map(|e| ScoredUrl { url: e.url.clone(), score: score(strategy, article, &e.analysis) })
        .filter(|s| s.score >= min_score)
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(max_links);
    scored
}
