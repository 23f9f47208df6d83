//! Command-line front end.
//!
//! Parsing lives in [`Cli`]; [`run`] does the rest and returns the process
//! exit status, so integration tests can drive it without spawning a binary.
//!
//! Exit statuses: `0` success, `1` usage error, then one per failing stage
//! (see [`Stage::exit_code`]).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use crate::backend::{CommandConverter, HttpDownloader, OpenRouterAnalyzer};
use crate::cache::ContentCache;
use crate::config::{Config, ConfigOverrides};
use crate::error::StageFailure;
use crate::pipeline::{Orchestrator, Stage};
use crate::source::BulletinDate;
use crate::PipelineError;

/// Exit status for malformed arguments.
pub const USAGE_EXIT: i32 = 1;

/// Download a municipal bulletin PDF and turn it into a structured JSON digest.
#[derive(Parser, Debug, Clone)]
#[command(name = "bulletin-digest", version)]
pub struct Cli {
    /// Bulletin date as YYYY-MM-DD (default: today)
    #[arg(long, value_parser = BulletinDate::parse)]
    pub date: Option<BulletinDate>,

    /// Write the JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// System prompt file (overrides DEFAULT_PROMPT_FILE)
    #[arg(long)]
    pub prompt: Option<PathBuf>,

    /// Model id (overrides DEFAULT_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Model to try when the primary model keeps failing
    #[arg(long)]
    pub fallback_model: Option<String>,

    /// Env file to load instead of .env
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bypass the PDF and text caches
    #[arg(long)]
    pub no_cache: bool,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Delete every cached PDF and text, then exit
    #[arg(long, conflicts_with = "cache_stats")]
    pub clear_cache: bool,

    /// Print cache entry counts and size as JSON, then exit
    #[arg(long)]
    pub cache_stats: bool,

    /// Sampling temperature [default: 0.1]
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum tokens in the model's answer [default: 4000]
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            fallback_model: self.fallback_model.clone(),
            prompt_file: self.prompt.clone(),
            cache_dir: self.cache_dir.clone(),
            no_cache: self.no_cache,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Run the tool and return the process exit status.
pub async fn run(cli: Cli) -> i32 {
    match execute(&cli).await {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("Error: {}", failure);
            failure.exit_code()
        }
    }
}

async fn execute(cli: &Cli) -> Result<(), StageFailure> {
    let init = |e: PipelineError| StageFailure::new(Stage::Init, e);

    load_env_file(cli.config.as_deref()).map_err(init)?;
    let config = Config::from_env()
        .map_err(|e| init(e.into()))?
        .with_overrides(cli.overrides());
    tracing::debug!(?config, "configuration loaded");

    if cli.clear_cache || cli.cache_stats {
        return maintain_cache(cli, &config);
    }

    let date = cli.date.unwrap_or_else(BulletinDate::today);
    let orchestrator = build_orchestrator(config).map_err(init)?;

    let output = orchestrator.run(date).await?;
    write_output(&output.json, cli.output.as_deref())
        .map_err(|e| StageFailure::new(Stage::Format, e))?;

    if let Some(path) = &cli.output {
        tracing::info!(path = %path.display(), "digest written");
    }
    Ok(())
}

fn load_env_file(path: Option<&Path>) -> crate::Result<()> {
    match path {
        Some(path) => dotenvy::from_path(path).map_err(|e| {
            PipelineError::Other(format!("could not load env file {}: {}", path.display(), e))
        }),
        None => {
            if let Ok(path) = dotenvy::dotenv() {
                tracing::debug!(path = %path.display(), "loaded .env");
            }
            Ok(())
        }
    }
}

/// Cache housekeeping; never touches the network or the credentials.
fn maintain_cache(cli: &Cli, config: &Config) -> Result<(), StageFailure> {
    let cache = ContentCache::new(config.cache_root());
    let rendered = if cli.clear_cache {
        serde_json::to_string_pretty(&cache.clear())
    } else {
        serde_json::to_string_pretty(&cache.stats())
    };
    let json = rendered.map_err(|e| StageFailure::new(Stage::Format, e))?;
    write_output(&json, cli.output.as_deref()).map_err(|e| StageFailure::new(Stage::Format, e))
}

fn build_orchestrator(config: Config) -> crate::Result<Orchestrator> {
    let downloader = HttpDownloader::new(config.request_timeout)?;
    let converter = CommandConverter::parse(&config.converter_command)?;
    let analyzer = OpenRouterAnalyzer::new(
        config.api_base_url.as_str(),
        config.api_key.clone().unwrap_or_default(),
        config.analyzer_timeout,
    )?;
    Ok(Orchestrator::new(
        config,
        Arc::new(downloader),
        Arc::new(converter),
        Arc::new(analyzer),
    ))
}

fn write_output(json: &str, path: Option<&Path>) -> crate::Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
            std::fs::write(path, format!("{}\n", json)).map_err(|e| PipelineError::io(path, e))
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "{}", json).map_err(|e| PipelineError::io("<stdout>", e))
        }
    }
}
