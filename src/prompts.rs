//! Prompt templates.
//!
//! Templates live under `config/prompts/` and are compiled into the binary so
//! a run does not depend on the working directory. Variables use `{{key}}`
//! syntax and are substituted once by [`render`].

pub const ANALYSIS_SYSTEM: &str = include_str!("../config/prompts/analysis_system.txt");
pub const ARTICLE_ANALYSIS: &str = include_str!("../config/prompts/article_analysis.txt");
pub const PAGE_ANALYSIS: &str = include_str!("../config/prompts/page_analysis.txt");
pub const ANCHOR_SYSTEM: &str = include_str!("../config/prompts/anchor_system.txt");
pub const ANCHOR_TEXT: &str = include_str!("../config/prompts/anchor_text.txt");

/// Replace every `{{key}}` in `template`. Unknown placeholders are left as-is.
pub fn render<'a>(template: &str, vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = template.trim().to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_occurrences() {
        let out = render("{{a}} and {{a}} but {{b}}", [("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x but y");
    }

    #[test]
    fn render_keeps_unknown_placeholders() {
        assert_eq!(render("hi {{name}}", []), "hi {{name}}");
    }

    #[test]
    fn templates_are_non_empty() {
        for t in [ANALYSIS_SYSTEM, ARTICLE_ANALYSIS, PAGE_ANALYSIS, ANCHOR_SYSTEM, ANCHOR_TEXT] {
            assert!(!t.trim().is_empty());
        }
    }
}
