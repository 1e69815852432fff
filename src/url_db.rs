//! URL database: cached page analyses, persisted as a JSON array.
//!
//! ```json
//! [
//!   { "url": "https://site.test/kedi-bakimi",
//!     "analysis": { "main_topics": ["kedi bakımı"], ... },
//!     "analyzed_at": "2026-01-01T10:00:00Z" }
//! ]
//! ```
//!
//! Entries keep insertion order; re-inserting a URL replaces its analysis in
//! place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::PageAnalysis;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub url: String,
    #[serde(default)]
    pub analysis: PageAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct UrlDatabase {
    path: PathBuf,
    entries: Vec<UrlEntry>,
    index: HashMap<String, usize>,
}

impl UrlDatabase {
    /// Load the database at `path`; a missing file yields an empty database.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let entries: Vec<UrlEntry> = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| AppError::Analysis(format!("cannot read {}: {e}", path.display())))?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    AppError::Analysis(format!("corrupt url database {}: {e}", path.display()))
                })?
            }
        } else {
            Vec::new()
        };

        let mut db = Self { path, entries: Vec::new(), index: HashMap::new() };
        for entry in entries {
            db.insert(entry);
        }
        debug!(path = %db.path.display(), entries = db.len(), "url database loaded");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&UrlEntry> {
        self.index.get(url).map(|&i| &self.entries[i])
    }

    pub fn insert(&mut self, entry: UrlEntry) {
        match self.index.get(&entry.url) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(entry.url.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Entries for `urls`, in that order; unknown URLs are left out.
    pub fn select<'a>(&'a self, urls: &[String]) -> Vec<&'a UrlEntry> {
        urls.iter().filter_map(|u| self.get(u)).collect()
    }

    /// URLs from `urls` that have no entry yet.
    pub fn missing(&self, urls: &[String]) -> Vec<String> {
        urls.iter().filter(|u| !self.contains(u)).cloned().collect()
    }

    pub fn save(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| AppError::Analysis(format!("cannot serialise url database: {e}")))?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), entries = self.len(), "url database saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(url: &str, topic: &str) -> UrlEntry {
        UrlEntry {
            url: url.into(),
            analysis: PageAnalysis { main_topics: vec![topic.into()], ..Default::default() },
            analyzed_at: None,
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let db = UrlDatabase::load(tmp.path().join("db.json")).unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn insert_replaces_in_place() {
        let tmp = TempDir::new().unwrap();
        let mut db = UrlDatabase::load(tmp.path().join("db.json")).unwrap();
        db.insert(entry("https://s.test/a", "one"));
        db.insert(entry("https://s.test/b", "two"));
        db.insert(entry("https://s.test/a", "three"));
        assert_eq!(db.len(), 2);
        assert_eq!(db.get("https://s.test/a").unwrap().analysis.main_topics, vec!["three"]);
    }

    #[test]
    fn select_and_missing_follow_input_order() {
        let tmp = TempDir::new().unwrap();
        let mut db = UrlDatabase::load(tmp.path().join("db.json")).unwrap();
        db.insert(entry("https://s.test/a", "a"));
        db.insert(entry("https://s.test/c", "c"));
        let urls: Vec<String> = ["https://s.test/c", "https://s.test/b", "https://s.test/a"]
            .map(String::from)
            .to_vec();
        let selected: Vec<_> = db.select(&urls).iter().map(|e| e.url.as_str()).collect();
        assert_eq!(selected, vec!["https://s.test/c", "https://s.test/a"]);
        assert_eq!(db.missing(&urls), vec!["https://s.test/b"]);
    }

    #[test]
    fn save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache/db.json");
        let mut db = UrlDatabase::load(&path).unwrap();
        db.insert(UrlEntry { analyzed_at: Some(Utc::now()), ..entry("https://s.test/a", "a") });
        db.save().unwrap();

        let reloaded = UrlDatabase::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get("https://s.test/a").unwrap().analyzed_at.is_some());
    }

    #[test]
    fn accepts_entries_without_optional_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        fs::write(&path, r#"[{"url":"https://s.test/x","analysis":{"keywords":["x"]}}]"#).unwrap();
        let db = UrlDatabase::load(&path).unwrap();
        assert_eq!(db.get("https://s.test/x").unwrap().analysis.keywords, vec!["x"]);
    }

    #[test]
    fn corrupt_file_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        fs::write(&path, "{not json").unwrap();
        let err = UrlDatabase::load(&path).unwrap_err();
        assert!(err.to_string().contains("corrupt url database"));
    }
}
