//! Link placement and insertion into article paragraphs.
//!
//! The i-th selected link targets paragraph `min(1 + 2·i, n − 1)`, spreading
//! links over every other paragraph after the introduction. Inside the
//! target paragraph the first case-insensitive occurrence of the anchor text
//! that is not already part of a tag, an `<a>` element, a Markdown link or a
//! code span is wrapped in a link. The matched text keeps its original casing.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::articles::{PARAGRAPH_BREAK, split_paragraphs};

/// Ranges a new link must not overlap: `<a>` elements, other tags,
/// Markdown `[text](url)` links and inline code spans.
static PROTECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b[^>]*>.*?</a\s*>|<[^>]+>|!?\[[^\]]*\]\([^)]*\)|`[^`]*`")
        .expect("valid protected-range regex")
});

/// One link chosen for an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedLink {
    pub url: String,
    pub anchor_text: String,
    /// Zero-based index into the article's non-blank paragraphs.
    pub paragraph_index: usize,
    pub similarity_score: f64,
    /// Target paragraph before insertion.
    pub paragraph: String,
    /// `false` when the anchor text was not found in the paragraph.
    pub inserted: bool,
}

/// Paragraph targeted by the `i`-th link of an article with
/// `paragraph_count` paragraphs.
pub fn link_position(i: usize, paragraph_count: usize) -> usize {
    (1 + 2 * i).min(paragraph_count.saturating_sub(1))
}

/// Render an internal link.
pub fn link_html(url: &str, class: &str, text: &str) -> String {
    let href = url.replace('&', "&amp;").replace('"', "&quot;");
    format!(r#"<a href="{href}" class="{class}">{text}</a>"#)
}

/// Wrap the first eligible occurrence of `anchor` in `paragraph`.
/// Returns `None` when no occurrence outside existing markup exists.
pub fn insert_link(paragraph: &str, anchor: &str, url: &str, class: &str) -> Option<String> {
    let anchor = anchor.trim();
    if anchor.is_empty() {
        return None;
    }

    let starts_word = anchor.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = anchor.chars().last().is_some_and(char::is_alphanumeric);
    let pattern = format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(anchor),
        if ends_word { r"\b" } else { "" },
    );
    let re = RegexBuilder::new(&pattern).case_insensitive(true).build().ok()?;

    let protected: Vec<(usize, usize)> = PROTECTED_RE
        .find_iter(paragraph)
        .map(|m| (m.start(), m.end()))
        .collect();

    let hit = re.find_iter(paragraph).find(|m| {
        !protected
            .iter()
            .any(|&(start, end)| m.start() < end && start < m.end())
    })?;

    let mut out = String::with_capacity(paragraph.len() + url.len() + 48);
    out.push_str(&paragraph[..hit.start()]);
    out.push_str(&link_html(url, class, hit.as_str()));
    out.push_str(&paragraph[hit.end()..]);
    Some(out)
}

/// Insert `links` into `content`, marking each as inserted or not.
/// Returns the linked text, paragraphs joined by a blank line.
pub fn apply_links(content: &str, links: &mut [ProcessedLink], class: &str) -> String {
    let mut paragraphs: Vec<String> = split_paragraphs(content)
        .into_iter()
        .map(str::to_string)
        .collect();

    for link in links.iter_mut() {
        let Some(target) = paragraphs.get_mut(link.paragraph_index) else {
            debug!(url = %link.url, index = link.paragraph_index, "paragraph out of bounds");
            link.inserted = false;
            continue;
        };
        match insert_link(target, &link.anchor_text, &link.url, class) {
            Some(updated) => {
                *target = updated;
                link.inserted = true;
            }
            None => {
                debug!(url = %link.url, anchor = %link.anchor_text, "anchor text not in paragraph");
                link.inserted = false;
            }
        }
    }

    paragraphs.join(PARAGRAPH_BREAK)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, anchor: &str, idx: usize) -> ProcessedLink {
        ProcessedLink {
            url: url.into(),
            anchor_text: anchor.into(),
            paragraph_index: idx,
            similarity_score: 0.5,
            paragraph: String::new(),
            inserted: false,
        }
    }

    #[test]
    fn positions_skip_intro_and_clamp() {
        assert_eq!(link_position(0, 10), 1);
        assert_eq!(link_position(1, 10), 3);
        assert_eq!(link_position(4, 10), 9);
        assert_eq!(link_position(5, 10), 9);
        assert_eq!(link_position(0, 1), 0);
        assert_eq!(link_position(2, 0), 0);
    }

    #[test]
    fn wraps_first_match_keeping_case() {
        let text = "Cat food matters. cat food again.";
        let out = insert_link(text, "cat food", "https://s.test/cat-food", "internal-link");
        let out = out.unwrap();
        let link = r#"<a href="https://s.test/cat-food" class="internal-link">Cat food</a>"#;
        assert_eq!(out, format!("{link} matters. cat food again."));
    }

    #[test]
    fn respects_word_boundaries() {
        assert!(insert_link("concatenate", "cat", "https://s.test/cat", "l").is_none());
        assert!(insert_link("a cat.", "cat", "https://s.test/cat", "l").is_some());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let out =
            insert_link("Learn C++ (fast) today", "C++ (fast)", "https://s.test/cpp", "l").unwrap();
        assert!(out.contains(">C++ (fast)</a>"));
    }

    #[test]
    fn skips_text_inside_existing_links_and_tags() {
        let p = r#"<a href="/x">garden tools</a> and <img alt="garden tools"> then garden tools"#;
        let out = insert_link(p, "garden tools", "https://s.test/g", "l").unwrap();
        let kept = r#"<a href="/x">garden tools</a> and <img alt="garden tools"> then "#;
        assert!(out.starts_with(&format!("{kept}<a href")));
    }

    #[test]
    fn skips_markdown_links_and_code_spans() {
        let p = "See [garden tools](https://other.test/garden-tools) or `garden tools` here.";
        assert!(insert_link(p, "garden tools", "https://s.test/g", "l").is_none());

        let p = "See [garden tools](https://other.test/x), then buy garden tools.";
        let out = insert_link(p, "garden tools", "https://s.test/g", "l").unwrap();
        let link = r#"<a href="https://s.test/g" class="l">garden tools</a>"#;
        assert_eq!(out, format!("See [garden tools](https://other.test/x), then buy {link}."));
    }

    #[test]
    fn href_is_escaped() {
        assert_eq!(
            link_html("https://s.test/?a=1&b=\"2\"", "l", "x"),
            r#"<a href="https://s.test/?a=1&amp;b=&quot;2&quot;" class="l">x</a>"#
        );
    }

    #[test]
    fn apply_links_marks_outcomes_and_accumulates() {
        let content = "Intro.\n\nCats love food and toys.\n\n\n\nEnd.";
        let mut links = vec![
            link("https://s.test/food", "food", 1),
            link("https://s.test/toys", "toys", 1),
            link("https://s.test/none", "missing", 1),
            link("https://s.test/oob", "End", 7),
        ];
        let out = apply_links(content, &mut links, "internal-link");
        let inserted: Vec<bool> = links.iter().map(|l| l.inserted).collect();
        assert_eq!(inserted, vec![true, true, false, false]);
        assert!(out.contains(r#"<a href="https://s.test/food" class="internal-link">food</a>"#));
        assert!(out.contains(r#"<a href="https://s.test/toys" class="internal-link">toys</a>"#));
        assert_eq!(out.split(PARAGRAPH_BREAK).count(), 3);
    }
}
