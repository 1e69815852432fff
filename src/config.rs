//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! an explicit `-f` path), then applies `INTERLINK_WORK_DIR` and
//! `INTERLINK_LOG_LEVEL` env overrides. API keys never come from TOML; see
//! [`crate::keys`].

use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;

use crate::error::AppError;

/// How many links an article receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkingMode {
    /// One link per `chars_per_link` characters of article text, at least one.
    Auto,
    /// Exactly `manual_link_count` links (fewer if not enough candidates).
    Manual,
}

/// Similarity function used to rank sitemap pages against an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringStrategy {
    /// Weighted Jaccard overlap of topics, keywords and content type.
    Overlap,
    /// Bigram Dice similarity of key concepts and context.
    Fuzzy,
}

/// Where page and article analyses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Ask the configured LLM provider.
    Llm,
    /// Term-frequency heuristics, no network and no API key.
    Local,
}

impl FromStr for LinkingMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(AppError::Config(format!(
                "unknown linking mode '{other}' (expected auto|manual)"
            ))),
        }
    }
}

impl FromStr for ScoringStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overlap" => Ok(Self::Overlap),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(AppError::Config(format!(
                "unknown scoring strategy '{other}' (expected overlap|fuzzy)"
            ))),
        }
    }
}

impl FromStr for AnalysisMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm" => Ok(Self::Llm),
            "local" => Ok(Self::Local),
            other => Err(AppError::Config(format!(
                "unknown analysis mode '{other}' (expected llm|local)"
            ))),
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone)]
pub struct InputsConfig {
    /// Local path or `http(s)://` URL of the sitemap.
    pub sitemap: String,
    pub articles_dir: PathBuf,
    /// Linked articles and `report.json` are written here.
    pub output_dir: PathBuf,
    /// Cached page analyses (already resolved against `work_dir`).
    pub url_database: PathBuf,
}

/// Link selection and placement settings (`[linking]`).
#[derive(Debug, Clone)]
pub struct LinkingConfig {
    pub mode: LinkingMode,
    pub manual_link_count: usize,
    pub chars_per_link: usize,
    pub scoring: ScoringStrategy,
    pub analysis: AnalysisMode,
    /// Fetch each sitemap page to read its title and meta description.
    pub fetch_pages: bool,
    /// Upper bound on concurrent page analyses.
    pub max_concurrency: usize,
    /// Candidates scoring below this are never linked.
    pub min_score: f64,
    /// CSS class put on every inserted `<a>`.
    pub link_class: String,
}

impl LinkingConfig {
    /// Reject settings that would divide by zero or stall the analysis pool.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chars_per_link == 0 {
            return Err(AppError::Config("linking.chars_per_link must be > 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(AppError::Config("linking.max_concurrency must be > 0".into()));
        }
        Ok(())
    }
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Anthropic messages API configuration (`[llm.anthropic]`).
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Full messages endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`, `"anthropic"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
    pub anthropic: AnthropicConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    /// Working directory for persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    pub inputs: InputsConfig,
    pub linking: LinkingConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    /// Built-in defaults, identical to an empty TOML file without env overrides.
    fn default() -> Self {
        let work_dir = expand_home(&default_work_dir());
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_file: None,
            inputs: InputsConfig {
                sitemap: default_sitemap(),
                articles_dir: PathBuf::from(default_articles_dir()),
                output_dir: PathBuf::from(default_output_dir()),
                url_database: work_dir.join("url_database.json"),
            },
            linking: LinkingConfig {
                mode: LinkingMode::Auto,
                manual_link_count: default_manual_link_count(),
                chars_per_link: default_chars_per_link(),
                scoring: ScoringStrategy::Overlap,
                analysis: AnalysisMode::Llm,
                fetch_pages: true,
                max_concurrency: default_max_concurrency(),
                min_score: 0.0,
                link_class: default_link_class(),
            },
            llm: LlmConfig {
                provider: default_llm_provider(),
                openai: OpenAiConfig {
                    api_base_url: default_openai_api_base_url(),
                    model: default_openai_model(),
                    temperature: default_temperature(),
                    timeout_seconds: default_timeout_seconds(),
                },
                anthropic: AnthropicConfig {
                    api_base_url: default_anthropic_api_base_url(),
                    model: default_anthropic_model(),
                    temperature: default_temperature(),
                    max_tokens: default_anthropic_max_tokens(),
                    timeout_seconds: default_timeout_seconds(),
                },
            },
            work_dir,
        }
    }
}

impl Config {
    /// Location of the on-disk API key store.
    pub fn key_store_path(&self) -> PathBuf {
        self.work_dir.join("keys.toml")
    }
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    linker: RawLinker,
    #[serde(default)]
    inputs: RawInputs,
    #[serde(default)]
    linking: RawLinking,
    #[serde(default)]
    llm: RawLlm,
}

#[derive(Deserialize)]
struct RawLinker {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawLinker {
    fn default() -> Self {
        Self {
            name: default_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

#[derive(Deserialize)]
struct RawInputs {
    #[serde(default = "default_sitemap")]
    sitemap: String,
    #[serde(default = "default_articles_dir")]
    articles_dir: String,
    #[serde(default = "default_output_dir")]
    output_dir: String,
    /// Relative paths resolve against `work_dir`.
    #[serde(default)]
    url_database: Option<String>,
}

impl Default for RawInputs {
    fn default() -> Self {
        Self {
            sitemap: default_sitemap(),
            articles_dir: default_articles_dir(),
            output_dir: default_output_dir(),
            url_database: None,
        }
    }
}

#[derive(Deserialize)]
struct RawLinking {
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_manual_link_count")]
    manual_link_count: usize,
    #[serde(default = "default_chars_per_link")]
    chars_per_link: usize,
    #[serde(default = "default_scoring")]
    scoring: String,
    #[serde(default = "default_analysis")]
    analysis: String,
    #[serde(default = "default_true")]
    fetch_pages: bool,
    #[serde(default = "default_max_concurrency")]
    max_concurrency: usize,
    #[serde(default)]
    min_score: f64,
    #[serde(default = "default_link_class")]
    link_class: String,
}

impl Default for RawLinking {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            manual_link_count: default_manual_link_count(),
            chars_per_link: default_chars_per_link(),
            scoring: default_scoring(),
            analysis: default_analysis(),
            fetch_pages: true,
            max_concurrency: default_max_concurrency(),
            min_score: 0.0,
            link_class: default_link_class(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
    #[serde(default)]
    anthropic: RawAnthropicConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawOpenAiConfig::default(),
            anthropic: RawAnthropicConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawAnthropicConfig {
    #[serde(default = "default_anthropic_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_anthropic_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_anthropic_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawAnthropicConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_anthropic_api_base_url(),
            model: default_anthropic_model(),
            temperature: default_temperature(),
            max_tokens: default_anthropic_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_name() -> String {
    "interlink".to_string()
}
fn default_work_dir() -> String {
    "~/.interlink".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_sitemap() -> String {
    "sitemap.xml".to_string()
}
fn default_articles_dir() -> String {
    "articles".to_string()
}
fn default_output_dir() -> String {
    "linked".to_string()
}
fn default_mode() -> String {
    "auto".to_string()
}
fn default_manual_link_count() -> usize {
    3
}
fn default_chars_per_link() -> usize {
    500
}
fn default_scoring() -> String {
    "overlap".to_string()
}
fn default_analysis() -> String {
    "llm".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_link_class() -> String {
    "internal-link".to_string()
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_openai_api_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}
fn default_anthropic_api_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_anthropic_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_seconds() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, the built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("INTERLINK_WORK_DIR").ok();
    let log_level_override = env::var("INTERLINK_LOG_LEVEL").ok();

    if let Some(path) = config_path {
        return load_from(
            Path::new(path),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        );
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(
            default_path,
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    } else {
        resolve(
            RawConfig::default(),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    }
}

/// Internal loader. Accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, work_dir_override, log_level_override)
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let l = parsed.linker;

    let work_dir = expand_home(work_dir_override.unwrap_or(&l.work_dir));
    let log_level = log_level_override.unwrap_or(&l.log_level).to_string();
    let log_file = l.log_file.map(|p| under(&work_dir, &p));

    let url_database = match parsed.inputs.url_database {
        Some(p) => under(&work_dir, &p),
        None => work_dir.join("url_database.json"),
    };

    let linking = parsed.linking;
    let linking = LinkingConfig {
        mode: linking.mode.parse()?,
        manual_link_count: linking.manual_link_count,
        chars_per_link: linking.chars_per_link,
        scoring: linking.scoring.parse()?,
        analysis: linking.analysis.parse()?,
        fetch_pages: linking.fetch_pages,
        max_concurrency: linking.max_concurrency,
        min_score: linking.min_score,
        link_class: linking.link_class,
    };
    linking.validate()?;

    Ok(Config {
        name: l.name,
        work_dir,
        log_level,
        log_file,
        inputs: InputsConfig {
            sitemap: parsed.inputs.sitemap,
            articles_dir: expand_home(&parsed.inputs.articles_dir),
            output_dir: expand_home(&parsed.inputs.output_dir),
            url_database,
        },
        linking,
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
            anthropic: AnthropicConfig {
                api_base_url: parsed.llm.anthropic.api_base_url,
                model: parsed.llm.anthropic.model,
                temperature: parsed.llm.anthropic.temperature,
                max_tokens: parsed.llm.anthropic.max_tokens,
                timeout_seconds: parsed.llm.anthropic.timeout_seconds,
            },
        },
    })
}

/// Resolve `path` against `base` unless it is absolute or `~`-prefixed.
fn under(base: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Offline `Config` rooted at `work_dir`: dummy LLM, local analysis,
    /// no page fetching. Used by unit and integration tests.
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            inputs: InputsConfig {
                sitemap: work_dir.join("sitemap.xml").to_string_lossy().into_owned(),
                articles_dir: work_dir.join("articles"),
                output_dir: work_dir.join("linked"),
                url_database: work_dir.join("url_database.json"),
            },
            linking: LinkingConfig {
                mode: LinkingMode::Auto,
                manual_link_count: 3,
                chars_per_link: 500,
                scoring: ScoringStrategy::Overlap,
                analysis: AnalysisMode::Local,
                fetch_pages: false,
                max_concurrency: 2,
                min_score: 0.0,
                link_class: "internal-link".into(),
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
                anthropic: AnthropicConfig {
                    api_base_url: "http://localhost:0/v1/messages".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    max_tokens: 64,
                    timeout_seconds: 1,
                },
            },
        }
    }
}
