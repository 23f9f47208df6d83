//! The download → convert → analyze → format state machine.
//!
//! ```text
//!  Init ─► Validated ─► Downloaded ─► Converted ─► Analyzed ─► Formatted ─► Done
//!   │          │             │            │            │
//!   └──────────┴─────────────┴────────────┴────────────┴──► Failed(stage)
//! ```
//!
//! Each run owns a [`PipelineContext`]. The two expensive artifacts (PDF and
//! converted text) go through the [`ContentCache`]; the two network calls go
//! through [`retry::execute`] with a per-attempt timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::backend::{AnalysisRequest, Analyzer, Converter, Downloader};
use crate::cache::{Cached, ContentCache, Namespace};
use crate::config::{validate, Config};
use crate::error::{Result, StageFailure};
use crate::events::{emit, Event, EventHandler};
use crate::format;
use crate::retry;
use crate::source::BulletinDate;
use crate::types::{BulletinAnalysis, PipelineContext};
use crate::PipelineError;

/// The pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Configuration check and prompt loading.
    Init,
    Download,
    Convert,
    Analyze,
    Format,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Download => "download",
            Stage::Convert => "convert",
            Stage::Analyze => "analyze",
            Stage::Format => "format",
        }
    }

    /// Process exit status when a run fails in this stage.
    pub fn exit_code(&self) -> i32 {
        match self {
            Stage::Init => 2,
            Stage::Download => 3,
            Stage::Convert => 4,
            Stage::Analyze => 5,
            Stage::Format => 6,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Validated,
    Downloaded,
    Converted,
    Analyzed,
    Formatted,
    Done,
    Failed(Stage),
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Pretty-printed digest, ready to write out.
    pub json: String,
    pub analysis: BulletinAnalysis,
    /// Model whose answer was used (the fallback model if it was needed).
    pub model_used: String,
    pub pdf_cache_hit: bool,
    pub markdown_cache_hit: bool,
    /// Every state the run passed through, in order.
    pub trail: Vec<PipelineState>,
}

/// Drives one bulletin through all stages.
///
/// # Example
///
/// ```no_run
/// use bulletin_digest::backend::{CommandConverter, HttpDownloader, OpenRouterAnalyzer};
/// use bulletin_digest::{BulletinDate, Config, Orchestrator};
/// use std::sync::Arc;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_env()?;
/// let orchestrator = Orchestrator::new(
///     config.clone(),
///     Arc::new(HttpDownloader::new(config.request_timeout)?),
///     Arc::new(CommandConverter::parse(&config.converter_command)?),
///     Arc::new(OpenRouterAnalyzer::new(
///         config.api_base_url.as_str(),
///         config.api_key.clone().unwrap_or_default(),
///         config.analyzer_timeout,
///     )?),
/// );
/// let output = orchestrator.run(BulletinDate::parse("2024-01-15")?).await?;
/// println!("{}", output.json);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    config: Config,
    cache: ContentCache,
    downloader: Arc<dyn Downloader>,
    converter: Arc<dyn Converter>,
    analyzer: Arc<dyn Analyzer>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("downloader", &self.downloader.name())
            .field("converter", &self.converter.name())
            .field("analyzer", &self.analyzer.name())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator; the cache follows `config.cache_enabled`.
    pub fn new(
        config: Config,
        downloader: Arc<dyn Downloader>,
        converter: Arc<dyn Converter>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let cache = if config.cache_enabled {
            ContentCache::new(config.cache_root())
        } else {
            ContentCache::disabled()
        };
        Self {
            config,
            cache,
            downloader,
            converter,
            analyzer,
            event_handler: None,
        }
    }

    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Produce the digest for the bulletin published on `date`.
    ///
    /// Runs share nothing but the collaborators and the cache, so one
    /// orchestrator may serve several runs concurrently.
    pub async fn run(&self, date: BulletinDate) -> std::result::Result<PipelineOutput, StageFailure> {
        tracing::info!(%date, "pipeline run started");
        let mut ctx = PipelineContext::new(date);

        match self.run_stages(&mut ctx, date).await {
            Ok(output) => {
                tracing::info!(%date, model = %output.model_used, "pipeline run finished");
                Ok(output)
            }
            Err(failure) => {
                ctx.advance(PipelineState::Failed(failure.stage));
                tracing::error!(stage = %failure.stage, error = %failure.error, "pipeline run failed");
                Err(failure.with_trail(ctx.trail().to_vec()))
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        date: BulletinDate,
    ) -> std::result::Result<PipelineOutput, StageFailure> {

        let prompt = self.stage(Stage::Init, async { self.prepare() }).await?;
        ctx.set_prompt(prompt)
            .map_err(|e| StageFailure::new(Stage::Init, e))?;
        ctx.advance(PipelineState::Validated);
        self.sweep_cache();

        let pdf = self.stage(Stage::Download, self.download(date)).await?;
        if let Some(path) = &pdf.path {
            ctx.set_pdf_path(path.clone())
                .map_err(|e| StageFailure::new(Stage::Download, e))?;
        }
        ctx.set_pdf_digest(hex::encode(Sha256::digest(&pdf.value)))
            .map_err(|e| StageFailure::new(Stage::Download, e))?;
        ctx.advance(PipelineState::Downloaded);

        let text = self.stage(Stage::Convert, self.convert(&pdf)).await?;
        let markdown_cache_hit = text.hit;
        ctx.set_text(text.value)
            .map_err(|e| StageFailure::new(Stage::Convert, e))?;
        ctx.advance(PipelineState::Converted);

        let prompt = ctx.prompt().unwrap_or_default();
        let document = ctx.text().unwrap_or_default();
        let (raw, model) = self
            .stage(Stage::Analyze, self.analyze(prompt, document))
            .await?;
        ctx.set_raw_response(raw)
            .and_then(|()| ctx.set_model(model))
            .map_err(|e| StageFailure::new(Stage::Analyze, e))?;
        ctx.advance(PipelineState::Analyzed);

        let raw = ctx.raw_response().unwrap_or_default();
        let model = ctx.model().unwrap_or_default();
        let (analysis, json) = self
            .stage(Stage::Format, async { format::render(raw, date, model) })
            .await?;
        let model_used = model.to_string();
        ctx.set_analysis(analysis.clone())
            .map_err(|e| StageFailure::new(Stage::Format, e))?;
        ctx.advance(PipelineState::Formatted);
        ctx.advance(PipelineState::Done);

        Ok(PipelineOutput {
            json,
            analysis,
            model_used,
            pdf_cache_hit: pdf.hit,
            markdown_cache_hit,
            trail: ctx.trail().to_vec(),
        })
    }

    /// Run one stage's work, bracketing it with events.
    async fn stage<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, StageFailure> {
        emit(&self.event_handler, Event::StageStarted { stage });
        tracing::info!(%stage, "stage started");
        let started = Instant::now();

        let result = work.await;
        emit(
            &self.event_handler,
            Event::StageFinished {
                stage,
                ok: result.is_ok(),
            },
        );

        match result {
            Ok(value) => {
                tracing::info!(%stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage finished");
                Ok(value)
            }
            Err(error) => Err(StageFailure::new(stage, error)),
        }
    }

    fn prepare(&self) -> Result<String> {
        validate(&self.config)?;
        let prompt = self.config.load_prompt()?;
        tracing::debug!(
            model = self.config.model_id(),
            prompt_chars = prompt.len(),
            "configuration validated"
        );
        Ok(prompt)
    }

    /// Advisory: a failed sweep never affects the run.
    fn sweep_cache(&self) {
        if !self.cache.is_enabled() {
            return;
        }
        let report = self.cache.cleanup(self.config.cache_cleanup_age);
        if report.removed > 0 || report.failed > 0 {
            tracing::info!(removed = report.removed, failed = report.failed, "cache cleanup");
        }
    }

    fn record_lookup<T>(&self, namespace: Namespace, cached: &Cached<T>) {
        if self.cache.is_enabled() {
            emit(
                &self.event_handler,
                Event::CacheLookup {
                    namespace,
                    hit: cached.hit,
                },
            );
        }
    }

    fn retry_reporter(
        &self,
        operation: &'static str,
    ) -> impl FnMut(u32, Duration, &str) + Send + 'static {
        let handler = self.event_handler.clone();
        move |attempt: u32, delay: Duration, reason: &str| {
            emit(
                &handler,
                Event::Retry {
                    operation: operation.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        }
    }

    async fn download(&self, date: BulletinDate) -> Result<Cached<Vec<u8>>> {
        let url = date.pdf_url(&self.config.bulletin_base_url);
        let key = date.to_string();
        let cached = self
            .cache
            .get_or_produce(Namespace::Pdf, key.as_bytes(), self.config.cache_max_age, || {
                self.fetch_pdf(&url)
            })
            .await?;
        self.record_lookup(Namespace::Pdf, &cached);
        tracing::info!(url = %url, bytes = cached.value.len(), cache_hit = cached.hit, "bulletin PDF ready");
        Ok(cached)
    }

    async fn fetch_pdf(&self, url: &str) -> Result<Vec<u8>> {
        let policy = self.config.retry_policy();
        let limit = self.config.request_timeout;
        let downloader = &*self.downloader;
        let mut report = self.retry_reporter("download");

        retry::execute(
            &policy,
            "download",
            move |attempt| {
                tracing::info!(url, attempt, downloader = downloader.name(), "downloading bulletin");
                timed("download", limit, downloader.fetch(url))
            },
            Some(&mut report),
        )
        .await
    }

    async fn convert(&self, pdf: &Cached<Vec<u8>>) -> Result<Cached<String>> {
        let cached = self
            .cache
            .get_or_produce(Namespace::Markdown, &pdf.value, self.config.cache_max_age, || {
                self.convert_fresh(pdf)
            })
            .await?;
        self.record_lookup(Namespace::Markdown, &cached);
        tracing::info!(chars = cached.value.len(), cache_hit = cached.hit, "bulletin text ready");
        Ok(cached)
    }

    /// Run the converter on the cached PDF, or on a scratch copy when the PDF
    /// is not on disk.
    async fn convert_fresh(&self, pdf: &Cached<Vec<u8>>) -> Result<String> {
        let text = match &pdf.path {
            Some(path) => self.converter.convert(path).await?,
            None => {
                let scratch = write_scratch_pdf(&pdf.value)?;
                self.converter.convert(scratch.path()).await?
            }
        };
        if text.trim().is_empty() {
            return Err(PipelineError::Conversion(format!(
                "{} converter produced no text",
                self.converter.name()
            )));
        }
        Ok(text)
    }

    /// Analyze with the primary model, falling back once its retries are
    /// exhausted. Returns the raw response and the model that produced it.
    async fn analyze(&self, prompt: &str, document: &str) -> Result<(String, String)> {
        let primary = self.config.model_id();
        let err = match self.analyze_with(primary, prompt, document).await {
            Ok(raw) => return Ok((raw, primary.to_string())),
            Err(err @ PipelineError::RetryExhausted { .. }) => err,
            Err(err) => return Err(err),
        };

        let fallback = self
            .config
            .fallback_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != primary);
        let Some(fallback) = fallback else {
            return Err(err);
        };

        tracing::warn!(primary, fallback, error = %err, "primary model gave up, trying fallback model");
        emit(
            &self.event_handler,
            Event::FallbackModel {
                model: fallback.to_string(),
            },
        );
        let raw = self.analyze_with(fallback, prompt, document).await?;
        Ok((raw, fallback.to_string()))
    }

    async fn analyze_with(&self, model: &str, prompt: &str, document: &str) -> Result<String> {
        let request = AnalysisRequest {
            model: model.to_string(),
            system_prompt: prompt.to_string(),
            document: document.to_string(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let policy = self.config.retry_policy();
        let limit = self.config.analyzer_timeout;
        let analyzer = &*self.analyzer;
        let request = &request;
        let mut report = self.retry_reporter("analyze");

        retry::execute(
            &policy,
            "analyze",
            move |attempt| {
                tracing::info!(model = %request.model, attempt, analyzer = analyzer.name(), "requesting analysis");
                analyze_once(analyzer, request, limit)
            },
            Some(&mut report),
        )
        .await
    }
}

/// Bound one attempt by `limit`; running out is a retryable timeout.
async fn timed<T>(
    operation: &'static str,
    limit: Duration,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}

async fn analyze_once(
    analyzer: &dyn Analyzer,
    request: &AnalysisRequest,
    limit: Duration,
) -> Result<String> {
    let response = timed("analyze", limit, analyzer.analyze(request)).await?;
    if response.text.trim().is_empty() {
        return Err(PipelineError::EmptyResponse(analyzer.name().to_string()));
    }
    if let Some(meta) = &response.metadata {
        tracing::debug!(metadata = %meta, "analysis metadata");
    }
    Ok(response.text)
}

/// Copy PDF bytes to a temporary file removed on drop.
fn write_scratch_pdf(bytes: &[u8]) -> Result<tempfile::NamedTempFile> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("bulletin-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| PipelineError::io(file.path(), e))?;
    Ok(file)
}
