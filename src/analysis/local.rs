//! Offline analysis: term frequency over non-stop-words.
//!
//! Terms are lowercase alphanumeric runs of at least [`MIN_TERM_CHARS`]
//! characters. Ranking is by count, ties broken by first occurrence, so the
//! output is deterministic.

use std::collections::HashMap;

use super::PageAnalysis;

const MIN_TERM_CHARS: usize = 3;
const KEYWORDS: usize = 10;
const MAIN_TOPICS: usize = 3;
const SECONDARY_TOPICS: usize = 3;
const KEY_CONCEPTS: usize = 5;
const CONTEXT_CHARS: usize = 200;

const STOP_WORDS: &[&str] = &[
    // en
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "new", "now", "see", "who",
    "did", "get", "let", "too", "use", "with", "this", "that", "from", "they", "will", "would",
    "there", "their", "what", "about", "which", "when", "make", "like", "than", "them", "then",
    "into", "some", "could", "other", "more", "also", "your", "been", "were", "only", "over",
    "such", "most", "very", "just", "should", "these", "those", "each", "while", "where",
    // tr
    "bir", "için", "ile", "gibi", "daha", "çok", "olan", "olarak", "kadar", "ancak", "veya",
    "ama", "her", "bu", "şu", "ise", "değil", "sonra", "önce", "göre", "nasıl", "neden",
];

/// Analyse `text` without any network access.
pub fn analyze(text: &str) -> PageAnalysis {
    let ranked = rank_terms(text);
    let take = |skip: usize, n: usize| -> Vec<String> {
        ranked.iter().skip(skip).take(n).cloned().collect()
    };

    PageAnalysis {
        main_topics: take(0, MAIN_TOPICS),
        keywords: take(0, KEYWORDS),
        secondary_topics: take(MAIN_TOPICS, SECONDARY_TOPICS),
        key_concepts: take(0, KEY_CONCEPTS),
        context: first_sentence(text),
        content_type: "article".to_string(),
    }
}

/// Terms ordered by descending frequency, then by first occurrence.
fn rank_terms(text: &str) -> Vec<String> {
    // term -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let terms = text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .filter(|t| !t.chars().all(|c| c.is_numeric()))
        .filter(|t| !STOP_WORDS.contains(&t.as_str()));

    for (pos, term) in terms.enumerate() {
        counts.entry(term).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(t, (n, first))| (t, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().map(|(t, _, _)| t).collect()
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .find(['.', '!', '?', '\n'])
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());
    trimmed[..end]
        .trim()
        .chars()
        .take(CONTEXT_CHARS)
        .collect()
}
