//! # Bulletin Digest
//!
//! Turns a municipal bulletin PDF (the Munich "Rathaus Umschau") into a
//! structured JSON digest: download the issue for a date, convert it to
//! text, ask a language model to extract announcements, events and
//! deadlines, and render the answer as JSON.
//!
//! ## Core Concepts
//!
//! - **[`Config`]**: everything a run needs, read once from the
//!   environment; [`config::validate`] checks it before any I/O.
//! - **[`ContentCache`]**: filesystem get-or-produce cache keyed by
//!   SHA-256, so repeated runs skip the download and the conversion.
//! - **[`RetryPolicy`]** + [`retry::execute`]: bounded retries with
//!   backoff for the download and the model call.
//! - **[`Orchestrator`]**: the stage machine tying it together around the
//!   [`Downloader`](backend::Downloader), [`Converter`](backend::Converter)
//!   and [`Analyzer`](backend::Analyzer) collaborators.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulletin_digest::backend::{MockAnalyzer, MockConverter, MockDownloader};
//! use bulletin_digest::{BulletinDate, Config, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         api_key: Some("sk-or-...".into()),
//!         model: Some("openai/gpt-4o".into()),
//!         system_prompt: Some("Extract announcements as JSON.".into()),
//!         ..Config::default()
//!     };
//!     let orchestrator = Orchestrator::new(
//!         config,
//!         Arc::new(MockDownloader::fixed(b"%PDF-1.4".to_vec())),
//!         Arc::new(MockConverter::fixed("# Rathaus Umschau")),
//!         Arc::new(MockAnalyzer::fixed(r#"{"summary": "Stadtrat tagt"}"#)),
//!     );
//!
//!     let output = orchestrator.run(BulletinDate::parse("2024-01-15")?).await?;
//!     println!("{}", output.json);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod types;

pub use cache::{ContentCache, Namespace};
pub use config::{Config, ConfigError, ConfigOverrides};
pub use error::{PipelineError, Result, StageFailure};
pub use events::{Event, EventHandler, FnEventHandler};
pub use pipeline::{Orchestrator, PipelineOutput, PipelineState, Stage};
pub use retry::{JitterStrategy, RetryPolicy};
pub use source::BulletinDate;
pub use types::{BulletinAnalysis, PipelineContext};
