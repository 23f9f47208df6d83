//! Scripted collaborators for testing without the network or a converter.
//!
//! Each mock plays back a list of [`MockReply`] values in order, cycling to
//! the beginning once all have been used, and counts how often it was called.
//!
//! # Example
//!
//! ```
//! use bulletin_digest::backend::{MockDownloader, MockReply};
//!
//! let downloader = MockDownloader::new(vec![
//!     MockReply::Status(503),
//!     MockReply::Ok(b"%PDF-1.4".to_vec()),
//! ]);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AnalysisRequest, AnalysisResponse, Analyzer, Converter, Downloader};
use crate::error::Result;
use crate::PipelineError;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ok(T),
    /// Non-success HTTP status (no `Retry-After`).
    Status(u16),
    /// Success with no usable content.
    Empty,
    /// Response envelope in the wrong shape.
    Malformed,
    /// The call took too long.
    Timeout,
    /// Sleep for the duration before answering; lets callers' own timeouts fire.
    Hang(Duration),
    /// A non-retryable failure with the given message.
    Fail(String),
}

impl<T: Clone> MockReply<T> {
    async fn play(&self, source: &str) -> Result<T> {
        match self {
            MockReply::Ok(value) => Ok(value.clone()),
            MockReply::Status(status) => Err(PipelineError::HttpError {
                status: *status,
                body: format!("mock {} status", source),
                retry_after: None,
            }),
            MockReply::Empty => Err(PipelineError::EmptyResponse(source.to_string())),
            MockReply::Malformed => Err(PipelineError::MalformedResponse(format!(
                "mock {} envelope",
                source
            ))),
            MockReply::Timeout => Err(PipelineError::Timeout {
                operation: source.to_string(),
                after: Duration::ZERO,
            }),
            MockReply::Hang(duration) => {
                tokio::time::sleep(*duration).await;
                Err(PipelineError::Timeout {
                    operation: source.to_string(),
                    after: *duration,
                })
            }
            MockReply::Fail(message) => Err(PipelineError::Other(message.clone())),
        }
    }
}

/// Replies played back in order, cycling.
#[derive(Debug)]
struct Script<T> {
    replies: Vec<MockReply<T>>,
    index: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(replies: Vec<MockReply<T>>, owner: &str) -> Self {
        assert!(!replies.is_empty(), "{} requires at least one reply", owner);
        Self {
            replies,
            index: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> MockReply<T> {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }

    fn calls(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }
}

/// A [`Downloader`] that returns scripted bytes.
#[derive(Debug)]
pub struct MockDownloader {
    script: Script<Vec<u8>>,
    urls: Mutex<Vec<String>>,
}

impl MockDownloader {
    pub fn new(replies: Vec<MockReply<Vec<u8>>>) -> Self {
        Self {
            script: Script::new(replies, "MockDownloader"),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same bytes.
    pub fn fixed(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(vec![MockReply::Ok(bytes.into())])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// URLs requested so far, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        self.script.next().play("downloader").await
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// A [`Converter`] that returns scripted text.
///
/// `Fail` replies become [`PipelineError::Conversion`], like a real converter
/// exiting non-zero.
#[derive(Debug)]
pub struct MockConverter {
    script: Script<String>,
    inputs: Mutex<Vec<PathBuf>>,
}

impl MockConverter {
    pub fn new(replies: Vec<MockReply<String>>) -> Self {
        Self {
            script: Script::new(replies, "MockConverter"),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Ok(text.into())])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// PDF paths handed to the converter so far.
    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Converter for MockConverter {
    async fn convert(&self, pdf_path: &Path) -> Result<String> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(pdf_path.to_path_buf());
        }
        match self.script.next() {
            MockReply::Fail(message) => Err(PipelineError::Conversion(message)),
            reply => reply.play("converter").await,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// An [`Analyzer`] that returns scripted completions.
#[derive(Debug)]
pub struct MockAnalyzer {
    script: Script<String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl MockAnalyzer {
    pub fn new(replies: Vec<MockReply<String>>) -> Self {
        Self {
            script: Script::new(replies, "MockAnalyzer"),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Ok(text.into())])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Model ids requested so far, in order.
    pub fn models(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.model.clone()).collect())
            .unwrap_or_default()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let text = self.script.next().play("analyzer").await?;
        Ok(AnalysisResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
