//! The debug channel: human-readable trace lines for profile authors.
//!
//! Every stage run gets a [`Tracer`] that stamps lines with the source, the
//! stage name and a run id, and hands them to a [`DebugSink`]. Unless a
//! [`WebBook`](crate::webbook::WebBook) is given its own sink, the
//! process-wide one set with [`set_debug_sink`] receives the lines.

mod sink;

pub use sink::{BroadcastDebugSink, CollectingDebugSink, DebugSink, LoggingDebugSink, NoOpDebugSink};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::cancellation::{CancelRegistration, CancellationToken};
use crate::errors::{ExtractionFieldError, WebBookError};

static GLOBAL_DEBUG_SINK: RwLock<Option<Arc<dyn DebugSink>>> = RwLock::new(None);

/// Sets the process-wide debug sink.
pub fn set_debug_sink(sink: Arc<dyn DebugSink>) {
    *GLOBAL_DEBUG_SINK.write() = Some(sink);
}

/// Clears the process-wide debug sink.
pub fn clear_debug_sink() {
    *GLOBAL_DEBUG_SINK.write() = None;
}

/// Gets the process-wide debug sink.
///
/// Returns a `NoOpDebugSink` if no sink is set.
pub fn debug_sink() -> Arc<dyn DebugSink> {
    GLOBAL_DEBUG_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpDebugSink))
}

/// What a trace line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// Progress inside a run.
    Step,
    /// The run succeeded.
    Completed,
    /// The run failed.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

/// One line on the debug channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLine {
    /// Source the run works against.
    pub source: String,
    /// Stage name.
    pub stage: String,
    /// Id shared by every line of one run.
    pub run_id: Uuid,
    /// Line kind.
    pub kind: TraceKind,
    /// The message.
    pub message: String,
    /// When the line was produced.
    pub timestamp: DateTime<Utc>,
}

impl TraceLine {
    /// Creates a line stamped with the current time.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        stage: impl Into<String>,
        run_id: Uuid,
        kind: TraceKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            stage: stage.into(),
            run_id,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for TraceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.source,
            self.stage,
            self.message
        )
    }
}

struct TracerInner {
    source: String,
    stage: &'static str,
    run_id: Uuid,
    sink: Arc<dyn DebugSink>,
    token: Arc<CancellationToken>,
    closed: AtomicBool,
    registration: Mutex<Option<CancelRegistration>>,
}

impl TracerInner {
    fn emit(&self, kind: TraceKind, message: String) {
        self.sink
            .emit(&TraceLine::new(self.source.as_str(), self.stage, self.run_id, kind, message));
    }

    /// Emits the single terminal line of the run, if none was emitted yet.
    fn close(&self, kind: TraceKind, message: String) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.emit(kind, message);
        }
    }
}

/// The trace writer of one stage run.
///
/// After the run token is cancelled, step, completion and failure lines are
/// suppressed and a single `cancelled` line is emitted instead.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    /// Creates the tracer of a run.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        stage: &'static str,
        sink: Arc<dyn DebugSink>,
        token: Arc<CancellationToken>,
    ) -> Self {
        let inner = Arc::new(TracerInner {
            source: source.into(),
            stage,
            run_id: Uuid::new_v4(),
            sink,
            token: Arc::clone(&token),
            closed: AtomicBool::new(false),
            registration: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let registration = token.register(move || {
            if let Some(inner) = weak.upgrade() {
                let reason = inner.token.reason().unwrap_or_default();
                inner.close(TraceKind::Cancelled, format!("cancelled: {reason}"));
            }
        });
        *inner.registration.lock() = Some(registration);

        Self { inner }
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// The run token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.inner.token
    }

    /// Whether lines are still delivered.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.inner.token.is_cancelled() && !self.inner.closed.load(Ordering::SeqCst)
    }

    /// Emits a step line.
    pub fn log(&self, message: impl Into<String>) {
        if self.is_live() {
            self.inner.emit(TraceKind::Step, message.into());
        }
    }

    /// Emits a step line for a field that failed to extract.
    pub fn field_error(&self, error: &ExtractionFieldError) {
        self.log(format!("✗ {error}"));
    }

    /// Emits the completion line.
    pub fn completed(&self, message: impl Into<String>) {
        if !self.inner.token.is_cancelled() {
            self.inner.close(TraceKind::Completed, message.into());
        }
    }

    /// Emits the failure line.
    pub fn failed(&self, error: &WebBookError) {
        if !self.inner.token.is_cancelled() {
            self.inner
                .close(TraceKind::Failed, format!("failed ({}): {error}", error.kind()));
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("source", &self.inner.source)
            .field("stage", &self.inner.stage)
            .field("run_id", &self.inner.run_id)
            .finish_non_exhaustive()
    }
}
