//! Debug sink trait and implementations.

use tokio::sync::broadcast;
use tracing::{debug, info, warn, Level};

use super::{TraceKind, TraceLine};

/// Receives trace lines of stage runs.
///
/// Each call carries one whole line. Implementations must not block for long:
/// `emit` is called from inside stage runs.
pub trait DebugSink: Send + Sync {
    /// Delivers one trace line.
    fn emit(&self, line: &TraceLine);
}

/// A sink that discards every line.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDebugSink;

impl DebugSink for NoOpDebugSink {
    fn emit(&self, _line: &TraceLine) {}
}

/// A sink that forwards lines to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingDebugSink {
    /// The level step lines are logged at. Failures always log at WARN.
    level: Level,
}

impl Default for LoggingDebugSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingDebugSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl DebugSink for LoggingDebugSink {
    fn emit(&self, line: &TraceLine) {
        if line.kind == TraceKind::Failed {
            warn!(
                source = %line.source,
                stage = %line.stage,
                run_id = %line.run_id,
                "{}", line.message
            );
        } else if self.level == Level::DEBUG {
            debug!(
                source = %line.source,
                stage = %line.stage,
                run_id = %line.run_id,
                kind = ?line.kind,
                "{}", line.message
            );
        } else {
            info!(
                source = %line.source,
                stage = %line.stage,
                run_id = %line.run_id,
                kind = ?line.kind,
                "{}", line.message
            );
        }
    }
}

/// A sink that keeps every line in memory, for tests and UIs.
#[derive(Debug, Default)]
pub struct CollectingDebugSink {
    lines: parking_lot::Mutex<Vec<TraceLine>>,
}

impl CollectingDebugSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected lines.
    #[must_use]
    pub fn lines(&self) -> Vec<TraceLine> {
        self.lines.lock().clone()
    }

    /// Returns the collected messages.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().iter().map(|l| l.message.clone()).collect()
    }

    /// Returns lines of one kind.
    #[must_use]
    pub fn lines_of_kind(&self, kind: TraceKind) -> Vec<TraceLine> {
        self.lines.lock().iter().filter(|l| l.kind == kind).cloned().collect()
    }

    /// Returns the number of collected lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Returns true if no lines have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Clears all collected lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl DebugSink for CollectingDebugSink {
    fn emit(&self, line: &TraceLine) {
        self.lines.lock().push(line.clone());
    }
}

/// A sink that publishes lines on a broadcast channel.
///
/// Lines emitted while nobody is subscribed are dropped; slow subscribers
/// lose the oldest lines.
#[derive(Debug, Clone)]
pub struct BroadcastDebugSink {
    sender: broadcast::Sender<TraceLine>,
}

impl BroadcastDebugSink {
    /// Creates a sink buffering up to `capacity` lines per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to lines emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TraceLine> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastDebugSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl DebugSink for BroadcastDebugSink {
    fn emit(&self, line: &TraceLine) {
        // No receivers is not an error.
        let _ = self.sender.send(line.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn line(kind: TraceKind, message: &str) -> TraceLine {
        TraceLine::new("http://fixture", "search", Uuid::new_v4(), kind, message)
    }

    #[test]
    fn test_noop_and_logging_sinks() {
        NoOpDebugSink.emit(&line(TraceKind::Step, "x"));
        LoggingDebugSink::default().emit(&line(TraceKind::Step, "x"));
        LoggingDebugSink::debug().emit(&line(TraceKind::Failed, "y"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingDebugSink::new();
        assert!(sink.is_empty());

        sink.emit(&line(TraceKind::Step, "one"));
        sink.emit(&line(TraceKind::Completed, "two"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.messages(), vec!["one", "two"]);
        assert_eq!(sink.lines_of_kind(TraceKind::Completed).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_sink() {
        let sink = BroadcastDebugSink::new(8);
        sink.emit(&line(TraceKind::Step, "before subscribe"));

        let mut rx = sink.subscribe();
        sink.emit(&line(TraceKind::Step, "after subscribe"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "after subscribe");
    }
}
