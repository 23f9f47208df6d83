use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::pipeline::PipelineState;
use crate::source::BulletinDate;
use crate::PipelineError;

/// A municipal announcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Announcement {
    pub title: String,
    pub description: String,
    pub category: String,
    pub date: Option<String>,
    pub location: Option<String>,
}

/// A scheduled event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarEvent {
    pub title: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// A deadline worth knowing about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportantDate {
    pub description: String,
    pub date: String,
    pub details: Option<String>,
}

/// The structured digest of one bulletin issue.
///
/// The model fills the first four fields; the rest is stamped on by the
/// pipeline and overrides whatever the model put there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletinAnalysis {
    pub summary: String,
    pub announcements: Vec<Announcement>,
    pub events: Vec<CalendarEvent>,
    pub important_dates: Vec<ImportantDate>,
    pub processing_date: String,
    pub source_date: String,
    pub model_used: String,
}

/// State of one pipeline run.
///
/// Fields are filled in stage order and never overwritten; a second write to
/// the same field is an internal error. The state trail only grows.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    trail: Vec<PipelineState>,
    date: Option<BulletinDate>,
    prompt: Option<String>,
    model: Option<String>,
    pdf_path: Option<PathBuf>,
    pdf_digest: Option<String>,
    text: Option<String>,
    raw_response: Option<String>,
    analysis: Option<BulletinAnalysis>,
}

fn set_once<T>(slot: &mut Option<T>, field: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(PipelineError::Other(format!(
            "pipeline context field `{}` set twice",
            field
        )));
    }
    *slot = Some(value);
    Ok(())
}

impl PipelineContext {
    pub fn new(date: BulletinDate) -> Self {
        Self {
            trail: vec![PipelineState::Init],
            date: Some(date),
            ..Self::default()
        }
    }

    /// Record the state the run just entered.
    pub fn advance(&mut self, state: PipelineState) {
        tracing::debug!(?state, "pipeline state");
        self.trail.push(state);
    }

    /// Every state entered so far, starting with `Init`.
    pub fn trail(&self) -> &[PipelineState] {
        &self.trail
    }

    pub fn date(&self) -> Option<BulletinDate> {
        self.date
    }

    pub fn set_prompt(&mut self, prompt: String) -> Result<()> {
        set_once(&mut self.prompt, "prompt", prompt)
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Record the model whose answer was used.
    pub fn set_model(&mut self, model: String) -> Result<()> {
        set_once(&mut self.model, "model", model)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_pdf_path(&mut self, path: PathBuf) -> Result<()> {
        set_once(&mut self.pdf_path, "pdf_path", path)
    }

    /// Cached PDF location; `None` when the cache is bypassed.
    pub fn pdf_path(&self) -> Option<&std::path::Path> {
        self.pdf_path.as_deref()
    }

    pub fn set_pdf_digest(&mut self, digest: String) -> Result<()> {
        set_once(&mut self.pdf_digest, "pdf_digest", digest)
    }

    pub fn pdf_digest(&self) -> Option<&str> {
        self.pdf_digest.as_deref()
    }

    pub fn set_text(&mut self, text: String) -> Result<()> {
        set_once(&mut self.text, "text", text)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_raw_response(&mut self, raw: String) -> Result<()> {
        set_once(&mut self.raw_response, "raw_response", raw)
    }

    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }

    pub fn set_analysis(&mut self, analysis: BulletinAnalysis) -> Result<()> {
        set_once(&mut self.analysis, "analysis", analysis)
    }

    pub fn analysis(&self) -> Option<&BulletinAnalysis> {
        self.analysis.as_ref()
    }
}
