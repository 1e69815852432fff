//! Logging initialisation via tracing-subscriber.
//!
//! A bare level such as `"debug"` is widened into per-target directives: the
//! HTTP and HTML-parsing dependencies stay at `warn` so a verbose run shows
//! the linker's own events (page analyses, rankings, insertions). `"trace"`
//! and explicit `EnvFilter` directives are used as given.
//!
//! Call [`init`] once at startup, after the effective level is resolved.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Dependencies held at `warn` under a bare `info` or `debug` level.
const QUIET_TARGETS: &[&str] =
    &["hyper", "hyper_util", "h2", "reqwest", "rustls", "html5ever", "selectors"];

/// Initialise the global tracing subscriber.
///
/// If `prefer_level` is `true` (a `-v` flag was given), `level` wins and
/// `RUST_LOG` is only a fallback for an invalid `level`. Otherwise
/// `RUST_LOG` wins when set and valid.
///
/// Output goes to stderr, or is appended without ANSI colours to `log_file`.
/// Stdout is reserved for the run summary.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(level, prefer_level, rust_log.as_deref())?;

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Filter directives for `level`. Bare `info`/`debug` levels get the
/// [`QUIET_TARGETS`] appended at `warn`; anything else is returned unchanged.
pub fn directives(level: &str) -> String {
    match parse_level(level) {
        Ok(f) if f == LevelFilter::INFO || f == LevelFilter::DEBUG => {
            let mut out = level.to_string();
            for target in QUIET_TARGETS {
                out.push(',');
                out.push_str(target);
                out.push_str("=warn");
            }
            out
        }
        _ => level.to_string(),
    }
}

fn build_filter(
    level: &str,
    prefer_level: bool,
    rust_log: Option<&str>,
) -> Result<EnvFilter, AppError> {
    let from_level = || EnvFilter::try_new(directives(level));
    let from_env = || {
        rust_log
            .filter(|v| !v.trim().is_empty())
            .map(EnvFilter::try_new)
            .transpose()
    };

    if prefer_level {
        match from_level() {
            Ok(filter) => Ok(filter),
            Err(level_err) => match from_env() {
                Ok(Some(filter)) => Ok(filter),
                Ok(None) => {
                    Err(AppError::Logger(format!("invalid log level '{level}': {level_err}")))
                }
                Err(env_err) => Err(AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))),
            },
        }
    } else {
        match from_env() {
            Ok(Some(filter)) => Ok(filter),
            _ => from_level()
                .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}"))),
        }
    }
}

/// Parse a bare log level into a [`LevelFilter`], rejecting anything else.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
