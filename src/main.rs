//! Interlink command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config, apply CLI input/output overrides
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Either store an API key (`set-key` / `add-key`) or run the linker
//!   7. Print the run summary on stdout

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use interlink::config::{self, AnalysisMode, Config};
use interlink::error::AppError;
use interlink::keys::{ApiKeyManager, EnvKeyManager, KeyStore, Provider};
use interlink::logger;
use interlink::system::{InternalLinkingSystem, REPORT_FILE};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;
    if let Some(sitemap) = args.sitemap {
        config.inputs.sitemap = sitemap;
    }
    if let Some(dir) = args.articles_dir {
        config.inputs.articles_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.inputs.output_dir = dir;
    }
    if args.local {
        config.linking.analysis = AnalysisMode::Local;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        name = %config.name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    match args.command {
        Command::StoreKey { provider, key, append } => store_key(&config, provider, &key, append),
        Command::Link => link(config).await,
    }
}

fn store_key(config: &Config, provider: Provider, key: &str, append: bool) -> Result<(), AppError> {
    let store = KeyStore::open(config.key_store_path())?;
    let stored = if append {
        store.add_key(provider, key)?
    } else {
        store.set_key(provider, key)?
    };
    info!(
        %provider,
        fingerprint = %stored.fingerprint(),
        path = %store.path().display(),
        "API key stored"
    );
    println!(
        "✓ {provider} key {} stored ({} key(s) in {})",
        stored.fingerprint(),
        store.count(provider),
        store.path().display()
    );
    Ok(())
}

async fn link(config: Config) -> Result<(), AppError> {
    let manager = key_manager(&config)?;

    let sitemap = config.inputs.sitemap.clone();
    let articles_dir = config.inputs.articles_dir.clone();
    let output_dir = config.inputs.output_dir.clone();

    let mut system =
        InternalLinkingSystem::new(sitemap, articles_dir, Some(manager)).with_config(config);
    let report = system.run().await?;

    println!("{}", report.summary());
    println!("report: {}", output_dir.join(REPORT_FILE).display());
    Ok(())
}

/// Keys stored with `set-key`/`add-key` take precedence over the environment.
fn key_manager(config: &Config) -> Result<Arc<dyn ApiKeyManager>, AppError> {
    let path = config.key_store_path();
    if path.exists() {
        let store = KeyStore::open(&path)?;
        let stored = Provider::for_llm(&config.llm.provider).is_some_and(|p| store.count(p) > 0);
        if stored {
            info!(path = %path.display(), "using key store");
            return Ok(Arc::new(store));
        }
    }
    Ok(Arc::new(EnvKeyManager))
}

enum Command {
    Link,
    StoreKey { provider: Provider, key: String, append: bool },
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    sitemap: Option<String>,
    articles_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    local: bool,
    command: Command,
}

fn print_help() {
    println!("Usage: interlink [OPTIONS]");
    println!("       interlink set-key <openai|anthropic> <KEY>");
    println!("       interlink add-key <openai|anthropic> <KEY>");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("  -f, --config <PATH>        Configuration file (default: config/default.toml)");
    println!("  -s, --sitemap <PATH|URL>   Sitemap location (overrides [inputs].sitemap)");
    println!("  -a, --articles <DIR>       Articles directory (overrides [inputs].articles_dir)");
    println!("  -o, --output <DIR>         Output directory (overrides [inputs].output_dir)");
    println!("      --local                Analyse locally, without an LLM or API key");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
    println!();
    println!("Commands:");
    println!("  set-key                    Store an API key, replacing existing ones");
    println!("  add-key                    Store an additional API key (keys rotate per request)");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(1);
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut sitemap = None;
    let mut articles_dir = None;
    let mut output_dir = None;
    let mut local = false;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            positional.extend(iter.by_ref());
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(path),
                None => usage_error("-f/--config requires a path argument"),
            },
            "-s" | "--sitemap" => match iter.next() {
                Some(s) => sitemap = Some(s),
                None => usage_error("-s/--sitemap requires a path or URL"),
            },
            "-a" | "--articles" => match iter.next() {
                Some(dir) => articles_dir = Some(config::expand_home(&dir)),
                None => usage_error("-a/--articles requires a directory"),
            },
            "-o" | "--output" => match iter.next() {
                Some(dir) => output_dir = Some(config::expand_home(&dir)),
                None => usage_error("-o/--output requires a directory"),
            },
            "--local" => local = true,
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') => usage_error(&format!("unknown option '{a}' (see --help)")),
            other => positional.push(other.to_string()),
        }
    }

    let command = match positional.as_slice() {
        [] => Command::Link,
        [cmd, provider, key] if cmd == "set-key" || cmd == "add-key" => {
            let provider = provider
                .parse::<Provider>()
                .unwrap_or_else(|e| usage_error(&e.to_string()));
            Command::StoreKey { provider, key: key.clone(), append: cmd == "add-key" }
        }
        [cmd, ..] if cmd == "set-key" || cmd == "add-key" => {
            usage_error(&format!("usage: interlink {cmd} <openai|anthropic> <KEY>"))
        }
        [other, ..] => usage_error(&format!("unknown command '{other}' (see --help)")),
    };

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (per-URL analysis, candidate ranking)
    //   -vvvv+  → trace  (full request/response payloads)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, sitemap, articles_dir, output_dir, local, command }
}
