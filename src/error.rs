use crate::config::ConfigError;
use crate::pipeline::{PipelineState, Stage};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pre-flight configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Low-level HTTP transport failure (connection refused, reset, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by the HTTP collaborators when the server answers with a
    /// non-success status. `retry_after` is populated from the `Retry-After`
    /// response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 404, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// A single attempt exceeded its stage timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    /// The remote call succeeded transport-wise but carried no usable content.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// The response envelope did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Local filesystem failure unrelated to a network call.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter could not turn the PDF into text.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// The analyzer payload could not be turned into the output document.
    #[error("could not parse analysis: {0}")]
    Parse(String),

    /// JSON (de)serialization failed at the serde level.
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// All attempts allowed by the retry policy failed with retryable errors.
    #[error("gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<PipelineError>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, looking through `RetryExhausted`.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::RetryExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Terminal failure of a pipeline run, attributed to the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
    /// States the failed run passed through, ending in `Failed(stage)`.
    /// Empty when the failure happened outside a run.
    pub trail: Vec<PipelineState>,
}

impl StageFailure {
    pub fn new(stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            error: error.into(),
            trail: Vec::new(),
        }
    }

    pub fn with_trail(mut self, trail: Vec<PipelineState>) -> Self {
        self.trail = trail;
        self
    }

    /// Process exit status for this failure; distinct per stage.
    pub fn exit_code(&self) -> i32 {
        self.stage.exit_code()
    }
}
