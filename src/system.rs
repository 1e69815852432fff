//! The internal linking system: sitemap + articles in, linked articles out.
//!
//! Without an [`ApiKeyManager`] the system is inert: [`InternalLinkingSystem::initialize_api_key`]
//! and [`InternalLinkingSystem::run`] return immediately and touch neither
//! the filesystem nor the network.
//!
//! With a manager, `run` executes the whole pipeline:
//!   1. load the sitemap and the URL database
//!   2. analyse sitemap pages missing from the database (bounded concurrency)
//!   3. per article: analyse, rank candidates, pick anchors, insert links
//!   4. write linked articles and `report.json` to the output directory
//!
//! Everything logged during a run carries the run id through the `run` span.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::analysis::{ContentAnalyzer, PageAnalysis, PageFetcher};
use crate::articles::{self, Article};
use crate::config::{AnalysisMode, Config, LinkingMode};
use crate::error::AppError;
use crate::keys::{ApiKeyManager, KeySource, Provider};
use crate::linker::{self, ProcessedLink};
use crate::llm::{LlmProvider, providers};
use crate::matcher::{self, ScoredUrl};
use crate::report::{ArticleReport, RunReport, SkippedArticle};
use crate::sitemap;
use crate::url_db::{UrlDatabase, UrlEntry};

/// Timeout for sitemap and page fetches.
const FETCH_TIMEOUT_SECS: u64 = 20;

/// File name of the JSON run report inside the output directory.
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug)]
pub struct InternalLinkingSystem {
    sitemap_path: String,
    articles_dir: PathBuf,
    api_key_manager: Option<Arc<dyn ApiKeyManager>>,
    config: Config,
    provider: Option<LlmProvider>,
}

impl InternalLinkingSystem {
    /// Store the three inputs as given. Nothing is validated or read here.
    pub fn new(
        sitemap_path: impl Into<String>,
        articles_dir: impl Into<PathBuf>,
        api_key_manager: Option<Arc<dyn ApiKeyManager>>,
    ) -> Self {
        Self {
            sitemap_path: sitemap_path.into(),
            articles_dir: articles_dir.into(),
            api_key_manager,
            config: Config::default(),
            provider: None,
        }
    }

    /// Replace the linking, LLM and output settings. The sitemap and
    /// articles locations given to [`Self::new`] are kept.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use `provider` instead of building one from the configuration.
    pub fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn sitemap_path(&self) -> &str {
        &self.sitemap_path
    }

    pub fn articles_dir(&self) -> &Path {
        &self.articles_dir
    }

    pub fn api_key_manager(&self) -> Option<&Arc<dyn ApiKeyManager>> {
        self.api_key_manager.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the active LLM provider, once initialised.
    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(LlmProvider::name)
    }

    /// Check that the manager can supply a key and build the LLM provider.
    /// The provider then asks the manager again before every request.
    ///
    /// Returns without doing anything when there is no manager, when a
    /// provider is already present, or when analysis runs locally. An
    /// `openai-compatible` endpoint without a key is used keyless.
    pub fn initialize_api_key(&mut self) -> Result<(), AppError> {
        let Some(manager) = &self.api_key_manager else {
            debug!("no API key manager; skipping key initialisation");
            return Ok(());
        };
        if self.provider.is_some() || self.config.linking.analysis == AnalysisMode::Local {
            return Ok(());
        }

        let llm = &self.config.llm;
        let keys = match Provider::for_llm(&llm.provider) {
            Some(provider) => match manager.key_for(provider) {
                Ok(key) => {
                    info!(%provider, fingerprint = %key.fingerprint(), "API key initialised");
                    KeySource::managed(Arc::clone(manager), provider)
                }
                Err(e) if llm.provider == "openai-compatible" => {
                    info!(error = %e, "no key for the openai-compatible endpoint; sending none");
                    KeySource::None
                }
                Err(e) => return Err(e),
            },
            None => KeySource::None,
        };
        self.provider = Some(providers::build(llm, keys)?);
        Ok(())
    }

    /// Run the linking pipeline. Returns an empty report when there is no
    /// API key manager.
    pub async fn run(&mut self) -> Result<RunReport, AppError> {
        let report = RunReport::new();
        if self.api_key_manager.is_none() {
            debug!("no API key manager; nothing to run");
            return Ok(report);
        }
        let span = info_span!("run", run_id = %report.run_id);
        self.run_pipeline(report).instrument(span).await
    }

    async fn run_pipeline(&mut self, mut report: RunReport) -> Result<RunReport, AppError> {
        self.config.linking.validate()?;

        let output_dir = self.config.inputs.output_dir.clone();
        if resolve_dir(&output_dir)? == resolve_dir(&self.articles_dir)? {
            return Err(AppError::Config(format!(
                "output directory {} must differ from the articles directory",
                output_dir.display()
            )));
        }

        self.initialize_api_key()?;
        let analyzer = ContentAnalyzer::new(self.config.linking.analysis, self.provider.clone())?;
        let fetcher = PageFetcher::new(FETCH_TIMEOUT_SECS)?;

        info!(sitemap = %self.sitemap_path, "run started");
        let urls = sitemap::load(&self.sitemap_path, fetcher.client()).await?;
        report.urls_in_sitemap = urls.len();

        let mut db = UrlDatabase::load(&self.config.inputs.url_database)?;
        self.analyze_missing(&urls, &mut db, &analyzer, &fetcher).await?;
        let candidates = db.select(&urls);

        let articles = articles::load_dir(&self.articles_dir)?;
        tokio::fs::create_dir_all(&output_dir).await?;

        for article in &articles {
            match self.link_article(article, &candidates, &analyzer, &output_dir).await {
                Ok(done) => {
                    info!(
                        article = %done.article,
                        inserted = done.inserted(),
                        selected = done.links.len(),
                        "article linked"
                    );
                    report.articles.push(done);
                }
                Err(e) => {
                    warn!(article = %article.id, error = %e, "article skipped");
                    report.skipped.push(SkippedArticle {
                        article: article.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.finish();
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| AppError::Analysis(format!("cannot serialise report: {e}")))?;
        tokio::fs::write(output_dir.join(REPORT_FILE), json).await?;

        info!(
            articles = report.articles.len(),
            skipped = report.skipped.len(),
            links = report.total_links(),
            "run finished"
        );
        Ok(report)
    }

    /// Analyse every sitemap URL the database does not know yet and persist
    /// the results. Failed pages are logged and left out.
    async fn analyze_missing(
        &self,
        urls: &[String],
        db: &mut UrlDatabase,
        analyzer: &ContentAnalyzer,
        fetcher: &PageFetcher,
    ) -> Result<(), AppError> {
        let missing = db.missing(urls);
        if missing.is_empty() {
            debug!(cached = db.len(), "all sitemap URLs already analysed");
            return Ok(());
        }
        info!(missing = missing.len(), cached = db.len(), "analysing sitemap pages");

        let limit = Arc::new(Semaphore::new(self.config.linking.max_concurrency));
        let fetch_pages = self.config.linking.fetch_pages;
        let mut tasks = JoinSet::new();

        for url in missing {
            let limit = limit.clone();
            let analyzer = analyzer.clone();
            let fetcher = fetcher.clone();
            let task = async move {
                let fetcher = fetch_pages.then_some(&fetcher);
                let result = match limit.acquire_owned().await {
                    Ok(_permit) => analyze_page(&analyzer, fetcher, &url).await,
                    Err(e) => Err(AppError::Analysis(format!("analysis pool closed: {e}"))),
                };
                (url, result)
            };
            tasks.spawn(task.in_current_span());
        }

        let mut added = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, Ok(analysis))) => {
                    db.insert(UrlEntry { url, analysis, analyzed_at: Some(Utc::now()) });
                    added += 1;
                }
                Ok((url, Err(e))) => warn!(%url, error = %e, "page analysis failed"),
                Err(e) => warn!(error = %e, "page analysis task panicked"),
            }
        }

        if added > 0 {
            db.save()?;
        }
        info!(added, total = db.len(), "url database updated");
        Ok(())
    }

    async fn link_article(
        &self,
        article: &Article,
        candidates: &[&UrlEntry],
        analyzer: &ContentAnalyzer,
        output_dir: &Path,
    ) -> Result<ArticleReport, AppError> {
        let paragraphs = article.paragraphs();
        if paragraphs.is_empty() {
            return Err(AppError::Articles(format!("{} has no paragraphs", article.id)));
        }

        let analysis = analyzer.analyze_article(&article.content).await?;
        let budget = self.link_budget(article);
        let linking = &self.config.linking;
        let ranked = matcher::find_relevant(
            linking.scoring,
            &analysis,
            candidates,
            Some(article.slug()),
            linking.min_score,
            budget,
        );
        debug!(article = %article.id, budget, ranked = ranked.len(), "candidates ranked");

        let mut links = Vec::with_capacity(ranked.len());
        for ScoredUrl { url, score } in ranked {
            let anchor_text = match analyzer.anchor_text(&url).await {
                Ok(anchor) => anchor,
                Err(e) => {
                    warn!(article = %article.id, %url, error = %e, "no anchor text; link dropped");
                    continue;
                }
            };
            let paragraph_index = linker::link_position(links.len(), paragraphs.len());
            links.push(ProcessedLink {
                url,
                anchor_text,
                paragraph_index,
                similarity_score: score,
                paragraph: paragraphs[paragraph_index].to_string(),
                inserted: false,
            });
        }

        let linked = linker::apply_links(&article.content, &mut links, &linking.link_class);
        let output_path = output_dir.join(&article.id);
        tokio::fs::write(&output_path, linked).await?;

        Ok(ArticleReport { article: article.id.clone(), links, output_path })
    }

    /// Number of links an article should receive.
    pub fn link_budget(&self, article: &Article) -> usize {
        let linking = &self.config.linking;
        match linking.mode {
            LinkingMode::Manual => linking.manual_link_count,
            LinkingMode::Auto => article
                .char_len()
                .checked_div(linking.chars_per_link)
                .unwrap_or(0)
                .max(1),
        }
    }
}

/// Absolute, symlink-free form of a directory that may not exist yet. The
/// deepest existing ancestor is canonicalized and the remaining components
/// are applied lexically.
fn resolve_dir(path: &Path) -> Result<PathBuf, AppError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut base = absolute.as_path();
    let mut tail = Vec::new();
    let mut resolved = loop {
        if let Ok(canonical) = base.canonicalize() {
            break canonical;
        }
        match (base.parent(), base.components().next_back()) {
            (Some(parent), Some(last)) => {
                tail.push(last);
                base = parent;
            }
            _ => break base.to_path_buf(),
        }
    };

    for component in tail.into_iter().rev() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => resolved.push(name),
            _ => {}
        }
    }
    Ok(resolved)
}

/// Analyse one sitemap page. A failed metadata fetch falls back to
/// analysing the URL alone.
async fn analyze_page(
    analyzer: &ContentAnalyzer,
    fetcher: Option<&PageFetcher>,
    url: &str,
) -> Result<PageAnalysis, AppError> {
    let meta = match fetcher {
        Some(f) => match f.fetch_meta(url).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(%url, error = %e, "page fetch failed; analysing URL only");
                None
            }
        },
        None => None,
    };
    analyzer.analyze_page(url, meta.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ApiKey, StaticKeyManager};
    use crate::llm::providers::dummy::DummyProvider;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn article(content: &str) -> Article {
        Article {
            id: "a.txt".into(),
            path: PathBuf::from("a.txt"),
            content: content.into(),
        }
    }

    fn manager() -> Arc<dyn ApiKeyManager> {
        let key = ApiKey::new("sk-test").unwrap();
        Arc::new(StaticKeyManager::new().with(Provider::OpenAi, key))
    }

    /// Hands out a fresh key per call and counts the calls.
    #[derive(Debug, Default)]
    struct CountingManager {
        calls: AtomicUsize,
    }

    impl ApiKeyManager for CountingManager {
        fn key_for(&self, _provider: Provider) -> Result<ApiKey, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            ApiKey::new(&format!("sk-{n}"))
        }
    }

    /// Two-page sitemap and one article under `root`.
    fn write_inputs(root: &Path) {
        fs::write(
            root.join("sitemap.xml"),
            "<urlset><url><loc>https://s.test/garden-tools</loc></url>\
             <url><loc>https://s.test/cat-food</loc></url></urlset>",
        )
        .unwrap();
        fs::create_dir_all(root.join("articles")).unwrap();
        fs::write(root.join("articles/a.txt"), "Intro.\n\nGarden tools help.").unwrap();
    }

    fn sitemap(root: &Path) -> String {
        root.join("sitemap.xml").to_string_lossy().into_owned()
    }

    #[test]
    fn new_stores_inputs_unmodified() {
        let sys = InternalLinkingSystem::new("sitemap.xml", "/articles", None);
        assert_eq!(sys.sitemap_path(), "sitemap.xml");
        assert_eq!(sys.articles_dir(), Path::new("/articles"));
        assert!(sys.api_key_manager().is_none());
        assert!(sys.provider_name().is_none());
    }

    #[tokio::test]
    async fn inert_without_manager() {
        let mut sys = InternalLinkingSystem::new("does-not-exist.xml", "/no/such/dir", None);
        sys.initialize_api_key().unwrap();
        assert!(sys.provider_name().is_none());
        let report = sys.run().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.urls_in_sitemap, 0);
    }

    #[test]
    fn initialise_builds_provider_from_manager() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        config.linking.analysis = AnalysisMode::Llm;
        config.llm.provider = "openai".into();
        let mut sys =
            InternalLinkingSystem::new("s.xml", tmp.path(), Some(manager())).with_config(config);
        sys.initialize_api_key().unwrap();
        assert_eq!(sys.provider_name(), Some("openai"));
    }

    #[test]
    fn openai_compatible_endpoint_may_be_keyless() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        config.linking.analysis = AnalysisMode::Llm;
        config.llm.provider = "openai-compatible".into();
        let empty: Arc<dyn ApiKeyManager> = Arc::new(StaticKeyManager::new());

        let mut sys = InternalLinkingSystem::new("s.xml", tmp.path(), Some(empty.clone()))
            .with_config(config.clone());
        sys.initialize_api_key().unwrap();
        assert_eq!(sys.provider_name(), Some("openai"));

        config.llm.provider = "openai".into();
        let mut sys =
            InternalLinkingSystem::new("s.xml", tmp.path(), Some(empty)).with_config(config);
        assert!(matches!(sys.initialize_api_key(), Err(AppError::ApiKey(_))));
    }

    #[test]
    fn missing_key_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        config.linking.analysis = AnalysisMode::Llm;
        config.llm.provider = "anthropic".into();
        let mut sys =
            InternalLinkingSystem::new("s.xml", tmp.path(), Some(manager())).with_config(config);
        let err = sys.initialize_api_key().unwrap_err();
        assert!(matches!(err, AppError::ApiKey(_)));
    }

    #[test]
    fn local_analysis_needs_no_provider() {
        let tmp = TempDir::new().unwrap();
        let mut sys = InternalLinkingSystem::new("s.xml", tmp.path(), Some(manager()))
            .with_config(Config::test_default(tmp.path()));
        sys.initialize_api_key().unwrap();
        assert!(sys.provider_name().is_none());
    }

    #[test]
    fn injected_provider_is_kept() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        config.linking.analysis = AnalysisMode::Llm;
        let mut sys = InternalLinkingSystem::new("s.xml", tmp.path(), Some(manager()))
            .with_config(config)
            .with_provider(LlmProvider::Dummy(DummyProvider::scripted("{}")));
        sys.initialize_api_key().unwrap();
        assert_eq!(sys.provider_name(), Some("dummy"));
    }

    #[test]
    fn budget_follows_mode() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        let sys =
            InternalLinkingSystem::new("s.xml", tmp.path(), None).with_config(config.clone());
        assert_eq!(sys.link_budget(&article("short")), 1);
        assert_eq!(sys.link_budget(&article(&"x".repeat(1600))), 3);

        config.linking.mode = LinkingMode::Manual;
        config.linking.manual_link_count = 7;
        let sys = sys.with_config(config.clone());
        assert_eq!(sys.link_budget(&article("short")), 7);

        config.linking.mode = LinkingMode::Auto;
        config.linking.chars_per_link = 0;
        let sys = sys.with_config(config);
        assert_eq!(sys.link_budget(&article(&"x".repeat(1600))), 1);
    }

    #[tokio::test]
    async fn invalid_linking_settings_are_rejected() {
        let tmp = TempDir::new().unwrap();
        write_inputs(tmp.path());

        let mut zero_chars = Config::test_default(tmp.path());
        zero_chars.linking.chars_per_link = 0;
        let mut zero_pool = Config::test_default(tmp.path());
        zero_pool.linking.max_concurrency = 0;

        let articles = tmp.path().join("articles");
        for config in [zero_chars, zero_pool] {
            let mut sys =
                InternalLinkingSystem::new(sitemap(tmp.path()), &articles, Some(manager()))
                    .with_config(config);
            let run = tokio::time::timeout(std::time::Duration::from_secs(5), sys.run());
            let err = run.await.expect("run must not stall").unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{err}");
        }
        assert!(!tmp.path().join("linked").exists());
    }

    #[tokio::test]
    async fn output_dir_must_differ_from_articles_dir() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        config.inputs.output_dir = tmp.path().join("articles");
        let articles = tmp.path().join("articles");
        let mut sys =
            InternalLinkingSystem::new("s.xml", articles, Some(manager())).with_config(config);
        let err = sys.run().await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn aliased_output_dir_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_inputs(tmp.path());
        let articles = tmp.path().join("articles");

        let mut aliases = vec![tmp.path().join("linked/../articles"), articles.join(".")];
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&articles, tmp.path().join("alias")).unwrap();
            aliases.push(tmp.path().join("alias"));
        }

        for alias in aliases {
            let mut config = Config::test_default(tmp.path());
            config.inputs.output_dir = alias.clone();
            let mut sys =
                InternalLinkingSystem::new(sitemap(tmp.path()), &articles, Some(manager()))
                    .with_config(config);
            let err = sys.run().await.unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{} accepted", alias.display());
        }

        let original = fs::read_to_string(articles.join("a.txt")).unwrap();
        assert_eq!(original, "Intro.\n\nGarden tools help.");
        assert!(!articles.join(REPORT_FILE).exists());
    }

    #[test]
    fn unresolved_dirs_normalise_lexically() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        assert_eq!(resolve_dir(&root.join("a/b/../c")).unwrap(), root.join("a/c"));
        assert_eq!(resolve_dir(&root.join("new/./x")).unwrap(), root.join("new/x"));
    }

    #[tokio::test]
    async fn keys_are_resolved_per_request() {
        let tmp = TempDir::new().unwrap();
        write_inputs(tmp.path());
        let mut config = Config::test_default(tmp.path());
        config.linking.analysis = AnalysisMode::Llm;
        config.llm.provider = "openai".into();
        // Nothing listens here; every request fails after its key is resolved.
        config.llm.openai.api_base_url = "http://127.0.0.1:9/v1/chat/completions".into();

        let counter = Arc::new(CountingManager::default());
        let manager: Arc<dyn ApiKeyManager> = counter.clone();
        let articles = tmp.path().join("articles");
        let mut sys = InternalLinkingSystem::new(sitemap(tmp.path()), articles, Some(manager))
            .with_config(config);
        let report = sys.run().await.unwrap();

        // Initial check, two page analyses, one article analysis.
        assert_eq!(counter.calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.urls_in_sitemap, 2);
        assert_eq!(report.skipped.len(), 1);
    }
}
