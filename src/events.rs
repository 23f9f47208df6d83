//! Event hooks for observing a pipeline run.
//!
//! Entirely optional: the orchestrator works without a handler. Useful for
//! progress output, metrics, or asserting on retry behaviour in tests.

use std::sync::Arc;

use crate::cache::Namespace;
use crate::pipeline::Stage;

/// Events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A stage has started.
    StageStarted { stage: Stage },
    /// A stage has finished.
    StageFinished {
        stage: Stage,
        /// Whether the stage succeeded.
        ok: bool,
    },
    /// A cache lookup completed.
    CacheLookup { namespace: Namespace, hit: bool },
    /// A failed attempt is about to be retried.
    Retry {
        /// Operation being retried (`"download"`, `"analyze"`).
        operation: String,
        /// The attempt about to run (2 for the first retry).
        attempt: u32,
        /// Delay before that attempt in milliseconds.
        delay_ms: u64,
        /// Error that caused the retry.
        reason: String,
    },
    /// The primary model gave up; the fallback model is being tried.
    FallbackModel { model: String },
}

/// Handler for pipeline events.
///
/// # Example
///
/// ```
/// use bulletin_digest::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StageStarted { stage } => eprintln!("[start] {}", stage),
///             Event::StageFinished { stage, ok } => eprintln!("[end] {} ok={}", stage, ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// ```
/// use bulletin_digest::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Retry { operation, attempt, .. } = event {
///         eprintln!("retrying {} (attempt {})", operation, attempt);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
