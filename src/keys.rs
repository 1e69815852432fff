//! API key management.
//!
//! The linking system never reads keys itself; it asks an [`ApiKeyManager`]
//! for the key of the active provider. Three managers ship with the crate:
//!
//! - [`EnvKeyManager`]: `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`, falling back
//!   to `LLM_API_KEY`.
//! - [`KeyStore`]: a TOML file under `work_dir` holding one or more keys per
//!   provider, handed out round-robin.
//! - [`StaticKeyManager`]: fixed in-memory keys.
//!
//! Keys are wrapped in [`ApiKey`], whose `Debug`/`Display` never print the
//! secret. Logs carry [`ApiKey::fingerprint`] instead.
//!
//! Providers hold a [`KeySource`] and resolve a key before every request, so
//! a manager with several keys spreads one run across all of them.
//!
//! Store layout:
//! ```text
//! ~/.interlink/
//! └── keys.toml   (mode 0600)
//!       openai    = ["sk-...", "sk-..."]
//!       anthropic = ["sk-ant-..."]
//! ```

use std::{
    collections::HashMap,
    env, fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::AppError;

// ── ApiKey ────────────────────────────────────────────────────────────────────

/// A non-empty secret credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trims surrounding whitespace; empty keys are rejected.
    pub fn new(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::ApiKey("API key cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The raw secret, for request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 8 hex chars of `SHA256(key)`, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(digest)[..8].to_string()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "****{}", self.fingerprint())
    }
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Credentialed LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Provider-specific env var consulted by [`EnvKeyManager`].
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Map an `[llm] default` provider name to the vendor whose key it needs.
    /// Returns `None` for keyless backends such as `dummy`.
    pub fn for_llm(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" | "openai-compatible" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(AppError::ApiKey(format!("unknown key provider '{other}'"))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Manager trait ─────────────────────────────────────────────────────────────

/// Supplies credentials to the linking system.
///
/// Implementations are shared behind an `Arc` and may be called from several
/// tasks, hence `Send + Sync`. Managers holding several keys per provider may
/// return a different one on each call.
pub trait ApiKeyManager: Send + Sync + fmt::Debug {
    fn key_for(&self, provider: Provider) -> Result<ApiKey, AppError>;
}

// ── KeySource ─────────────────────────────────────────────────────────────────

/// Where an LLM provider takes its credential from.
#[derive(Debug, Clone, Default)]
pub enum KeySource {
    /// Keyless endpoint, e.g. a local OpenAI-compatible server.
    #[default]
    None,
    Fixed(ApiKey),
    /// Ask `manager` on every request.
    Managed { manager: Arc<dyn ApiKeyManager>, provider: Provider },
}

impl KeySource {
    pub fn managed(manager: Arc<dyn ApiKeyManager>, provider: Provider) -> Self {
        KeySource::Managed { manager, provider }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, KeySource::None)
    }

    /// The key for the next request, `None` for keyless endpoints.
    pub fn key(&self) -> Result<Option<ApiKey>, AppError> {
        match self {
            KeySource::None => Ok(None),
            KeySource::Fixed(key) => Ok(Some(key.clone())),
            KeySource::Managed { manager, provider } => manager.key_for(*provider).map(Some),
        }
    }
}

// ── EnvKeyManager ─────────────────────────────────────────────────────────────

/// Reads keys from the process environment at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvKeyManager;

/// Generic fallback consulted after the provider-specific variable.
pub const FALLBACK_ENV_VAR: &str = "LLM_API_KEY";

impl EnvKeyManager {
    fn resolve(
        provider: Provider,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ApiKey, AppError> {
        [provider.env_var(), FALLBACK_ENV_VAR]
            .into_iter()
            .filter_map(|var| lookup(var))
            .find_map(|value| ApiKey::new(&value).ok())
            .ok_or_else(|| {
                AppError::ApiKey(format!(
                    "no {provider} key: set {} or {FALLBACK_ENV_VAR}",
                    provider.env_var()
                ))
            })
    }
}

impl ApiKeyManager for EnvKeyManager {
    fn key_for(&self, provider: Provider) -> Result<ApiKey, AppError> {
        Self::resolve(provider, |var| env::var(var).ok())
    }
}

// ── StaticKeyManager ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct StaticKeyManager {
    keys: HashMap<Provider, ApiKey>,
}

impl StaticKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Provider, key: ApiKey) -> Self {
        self.keys.insert(provider, key);
        self
    }
}

impl ApiKeyManager for StaticKeyManager {
    fn key_for(&self, provider: Provider) -> Result<ApiKey, AppError> {
        self.keys
            .get(&provider)
            .cloned()
            .ok_or_else(|| AppError::ApiKey(format!("no {provider} key configured")))
    }
}

// ── KeyStore ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    openai: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    anthropic: Vec<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    keys: HashMap<Provider, Vec<ApiKey>>,
    /// Next index handed out per provider.
    cursor: HashMap<Provider, usize>,
}

/// File-backed key store with round-robin rotation.
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl KeyStore {
    /// Open the store at `path`. A missing file yields an empty store; it is
    /// created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let mut state = StoreState::default();

        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| AppError::ApiKey(format!("cannot read {}: {e}", path.display())))?;
            let file: KeyFile = toml::from_str(&raw)
                .map_err(|e| AppError::ApiKey(format!("parse error in {}: {e}", path.display())))?;
            let lists = [(Provider::OpenAi, file.openai), (Provider::Anthropic, file.anthropic)];
            for (provider, list) in lists {
                let keys = list
                    .iter()
                    .filter_map(|k| ApiKey::new(k).ok())
                    .collect::<Vec<_>>();
                if !keys.is_empty() {
                    state.keys.insert(provider, keys);
                }
            }
            debug!(path = %path.display(), providers = state.keys.len(), "key store loaded");
        }

        Ok(Self { path, state: Mutex::new(state) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace every key of `provider` with `raw`.
    pub fn set_key(&self, provider: Provider, raw: &str) -> Result<ApiKey, AppError> {
        let key = ApiKey::new(raw)?;
        {
            let mut state = self.lock()?;
            state.keys.insert(provider, vec![key.clone()]);
            state.cursor.remove(&provider);
        }
        self.save()?;
        info!(%provider, fingerprint = %key.fingerprint(), "API key saved");
        Ok(key)
    }

    /// Append `raw` to the rotation of `provider`; duplicates are ignored.
    pub fn add_key(&self, provider: Provider, raw: &str) -> Result<ApiKey, AppError> {
        let key = ApiKey::new(raw)?;
        {
            let mut state = self.lock()?;
            let list = state.keys.entry(provider).or_default();
            if !list.contains(&key) {
                list.push(key.clone());
            }
        }
        self.save()?;
        info!(%provider, fingerprint = %key.fingerprint(), "API key added to rotation");
        Ok(key)
    }

    /// Number of keys held for `provider`.
    pub fn count(&self, provider: Provider) -> usize {
        self.lock()
            .map(|s| s.keys.get(&provider).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::ApiKey("key store lock poisoned".into()))
    }

    fn save(&self) -> Result<(), AppError> {
        let file = {
            let state = self.lock()?;
            let dump = |p: Provider| -> Vec<String> {
                state
                    .keys
                    .get(&p)
                    .map(|v| v.iter().map(|k| k.expose().to_string()).collect())
                    .unwrap_or_default()
            };
            KeyFile { openai: dump(Provider::OpenAi), anthropic: dump(Provider::Anthropic) }
        };

        let text = toml::to_string(&file)
            .map_err(|e| AppError::ApiKey(format!("cannot serialise key store: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::ApiKey(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let write_err = |e: std::io::Error| {
            AppError::ApiKey(format!("cannot write {}: {e}", self.path.display()))
        };
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(write_err)?;

        // `mode` only applies on creation; tighten stores written by older builds.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600)).map_err(|e| {
                AppError::ApiKey(format!("cannot set permissions on {}: {e}", self.path.display()))
            })?;
        }

        file.write_all(text.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}

impl ApiKeyManager for KeyStore {
    fn key_for(&self, provider: Provider) -> Result<ApiKey, AppError> {
        let mut state = self.lock()?;
        let len = state.keys.get(&provider).map_or(0, Vec::len);
        if len == 0 {
            return Err(AppError::ApiKey(format!(
                "no {provider} key in {}",
                self.path.display()
            )));
        }
        let cursor = state.cursor.entry(provider).or_insert(0);
        let idx = *cursor % len;
        *cursor = (idx + 1) % len;
        Ok(state.keys[&provider][idx].clone())
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────
