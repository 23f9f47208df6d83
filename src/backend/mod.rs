//! Collaborator traits and their implementations.
//!
//! The orchestrator talks to three collaborators, all object-safe and used as
//! `Arc<dyn _>`:
//!
//! ```text
//!                 ┌──────────────┐  bytes   ┌─────────────┐  text  ┌────────────┐
//!   pdf url ───►  │  Downloader  │ ───────► │  Converter  │ ─────► │  Analyzer  │ ───► response
//!                 └──────────────┘          └─────────────┘        └────────────┘
//!                  HttpDownloader           CommandConverter       OpenRouterAnalyzer
//! ```
//!
//! Implementations only report what happened. Retrying, caching and timeouts
//! are the orchestrator's business; collaborators just have to return errors
//! that classify correctly (see [`PipelineError::disposition`]).

pub mod command;
pub mod http;
pub mod mock;
pub mod openrouter;

pub use command::CommandConverter;
pub use http::HttpDownloader;
pub use mock::{MockAnalyzer, MockConverter, MockDownloader, MockReply};
pub use openrouter::OpenRouterAnalyzer;

use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// A request to the language model.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Model identifier (e.g. `"anthropic/claude-3.5-sonnet"`).
    pub model: String,

    /// Instructions describing the structure to extract.
    pub system_prompt: String,

    /// The bulletin text.
    pub document: String,

    pub temperature: f64,

    pub max_tokens: u32,
}

/// What the language model sent back.
#[derive(Debug, Clone)]
pub struct AnalysisResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token usage, model, request id).
    pub metadata: Option<serde_json::Value>,
}

/// Fetches the bytes behind a URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Turns a PDF on disk into text.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, pdf_path: &Path) -> Result<String>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Sends a document plus instructions to a language model.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Turn a non-success response into [`PipelineError::HttpError`].
pub(crate) async fn error_from_response(resp: reqwest::Response) -> PipelineError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    PipelineError::HttpError {
        status,
        body,
        retry_after,
    }
}
