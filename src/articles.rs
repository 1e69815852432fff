//! Article loading from the articles directory.
//!
//! Only the top level of the directory is read. Allowed extensions: `.txt`,
//! `.md`. Hidden files are skipped; files larger than [`MAX_FILE_BYTES`] are
//! ignored with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AppError;

/// Maximum size of a single article file.
pub const MAX_FILE_BYTES: u64 = 2_000_000; // 2 MB

/// Extensions that are considered article bodies.
const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md"];

/// Paragraph separator, both for splitting input and joining output.
pub const PARAGRAPH_BREAK: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct Article {
    /// File name, e.g. `kedi-bakimi.txt`.
    pub id: String,
    pub path: PathBuf,
    pub content: String,
}

impl Article {
    /// File stem, compared against URL slugs to avoid self-links.
    pub fn slug(&self) -> &str {
        Path::new(&self.id)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.id)
    }

    /// Non-blank paragraphs, in order.
    pub fn paragraphs(&self) -> Vec<&str> {
        split_paragraphs(&self.content)
    }

    /// Character count, used for the automatic link budget.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Split on blank lines, dropping whitespace-only paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split(PARAGRAPH_BREAK)
        .filter(|p| !p.trim().is_empty())
        .collect()
}

/// Load all articles under `dir`, sorted by file name.
pub fn load_dir(dir: &Path) -> Result<Vec<Article>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::Articles(format!("cannot read {}: {e}", dir.display())))?;

    let mut articles = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with('.') || !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            debug!(file = %name, "not an article, skipped");
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.len() > MAX_FILE_BYTES => {
                warn!(file = %name, size = meta.len(), "article exceeds size limit, skipped");
                continue;
            }
            Err(e) => {
                warn!(file = %name, error = %e, "cannot stat article, skipped");
                continue;
            }
            Ok(_) => {}
        }

        match fs::read_to_string(&path) {
            Ok(raw) => {
                let content = raw.replace("\r\n", "\n");
                articles.push(Article { id: name, path, content });
            }
            Err(e) => warn!(file = %name, error = %e, "cannot read article, skipped"),
        }
    }

    articles.sort_by(|a, b| a.id.cmp(&b.id));
    debug!(dir = %dir.display(), count = articles.len(), "articles loaded");
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paragraphs_skip_blank_chunks() {
        let text = "first para\n\n   \n\nsecond para\nstill second\n\n\n\nthird";
        let paras = split_paragraphs(text);
        assert_eq!(paras.len(), 3);
        assert_eq!(paras[1], "second para\nstill second");
    }

    #[test]
    fn slug_is_file_stem() {
        let a = Article {
            id: "kedi-bakimi.md".into(),
            path: PathBuf::new(),
            content: String::new(),
        };
        assert_eq!(a.slug(), "kedi-bakimi");
    }

    #[test]
    fn loads_only_text_articles_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "beta").unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha\r\n\r\nmore").unwrap();
        fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(tmp.path().join(".hidden.txt"), "secret").unwrap();
        fs::create_dir(tmp.path().join("sub.txt")).unwrap();

        let articles = load_dir(tmp.path()).unwrap();
        let ids: Vec<_> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "b.md"]);
        assert_eq!(articles[0].content, "alpha\n\nmore");
        assert_eq!(articles[0].paragraphs(), vec!["alpha", "more"]);
    }

    #[test]
    fn oversized_file_skipped() {
        let tmp = TempDir::new().unwrap();
        let big = "x".repeat(MAX_FILE_BYTES as usize + 1);
        fs::write(tmp.path().join("big.txt"), big).unwrap();
        fs::write(tmp.path().join("small.txt"), "ok").unwrap();
        let articles = load_dir(tmp.path()).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "small.txt");
    }

    #[test]
    fn missing_dir_errors() {
        let err = load_dir(Path::new("/nonexistent/articles")).unwrap_err();
        assert!(matches!(err, AppError::Articles(_)));
    }
}
