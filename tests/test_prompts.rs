//! Tests for prompt templates under config/prompts and the default config.

use std::fs;
use std::path::Path;

#[test]
fn test_prompt_files_exist() {
    for name in [
        "analysis_system.txt",
        "article_analysis.txt",
        "page_analysis.txt",
        "anchor_system.txt",
        "anchor_text.txt",
    ] {
        let path = format!("config/prompts/{name}");
        assert!(fs::metadata(&path).is_ok(), "{name} prompt file missing");
    }
}

#[test]
fn test_article_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/article_analysis.txt").unwrap();
    assert!(text.contains("{{content}}"), "article_analysis.txt should contain {{content}}");
}

#[test]
fn test_page_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/page_analysis.txt").unwrap();
    assert!(text.contains("{{url}}"), "page_analysis.txt should contain {{url}} variable");
    assert!(text.contains("{{title}}"), "page_analysis.txt should contain {{title}} variable");
    assert!(text.contains("{{description}}"), "page_analysis.txt should contain {{description}}");
}

#[test]
fn test_anchor_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/anchor_text.txt").unwrap();
    assert!(text.contains("{{keyword}}"), "anchor_text.txt should contain {{keyword}} variable");
}

#[test]
fn test_analysis_prompts_describe_every_field() {
    for name in ["article_analysis.txt", "page_analysis.txt"] {
        let text = fs::read_to_string(format!("config/prompts/{name}")).unwrap();
        for field in [
            "main_topics",
            "keywords",
            "secondary_topics",
            "key_concepts",
            "context",
            "content_type",
        ] {
            assert!(text.contains(field), "{name} should mention {field}");
        }
    }
}

#[test]
fn test_rendered_prompt_has_no_placeholders() {
    let out = interlink::prompts::render(
        interlink::prompts::PAGE_ANALYSIS,
        [("url", "https://s.test/a"), ("title", "A"), ("description", "B")],
    );
    assert!(!out.contains("{{"));
    assert!(out.contains("URL: https://s.test/a"));
}

#[test]
fn test_default_config_parses() {
    let path = Path::new("config/default.toml");
    let cfg = interlink::config::load_from(path, Some("/tmp/interlink"), None).unwrap();
    assert_eq!(cfg.name, "interlink");
    assert_eq!(cfg.llm.provider, "openai");
    assert_eq!(cfg.linking.chars_per_link, 500);
    assert_eq!(cfg.linking.link_class, "internal-link");
}
