//! Event sink trait and implementations.

use super::{EventKind, PipelineEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receives lifecycle events from the engine.
///
/// Sinks must not fail the run: errors are theirs to log and swallow.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: &PipelineEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// Failure events are always logged at `WARN`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level to use.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &PipelineEvent) {
        let task = event.task.as_deref().unwrap_or("-");
        if matches!(
            event.kind,
            EventKind::TaskFailed | EventKind::NotificationFailed
        ) {
            warn!(
                event_type = %event.kind,
                run_id = %event.run_id,
                task,
                event_data = %event.data,
                "Event: {}", event.kind
            );
            return;
        }

        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.kind,
                run_id = %event.run_id,
                task,
                event_data = %event.data,
                "Event: {}", event.kind
            );
        } else {
            info!(
                event_type = %event.kind,
                run_id = %event.run_id,
                task,
                event_data = %event.data,
                "Event: {}", event.kind
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &PipelineEvent) {
        self.log_event(event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the kinds of all collected events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the events concerning one task.
    #[must_use]
    pub fn events_for_task(&self, task: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.task.as_deref() == Some(task))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        let event = PipelineEvent::run(EventKind::RunStarted, Uuid::new_v4());
        NoOpEventSink.emit(&event).await;
        LoggingEventSink::default().emit(&event).await;
        LoggingEventSink::debug()
            .emit(&PipelineEvent::task(EventKind::TaskFailed, event.run_id, "t"))
            .await;
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        let run_id = Uuid::new_v4();
        sink.emit(&PipelineEvent::run(EventKind::RunStarted, run_id)).await;
        sink.emit(&PipelineEvent::task(EventKind::TaskStarted, run_id, "a")).await;
        sink.emit(&PipelineEvent::task(EventKind::TaskSucceeded, run_id, "a")).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.kinds(),
            vec![
                EventKind::RunStarted,
                EventKind::TaskStarted,
                EventKind::TaskSucceeded
            ]
        );
        assert_eq!(sink.events_of_kind(EventKind::TaskStarted).len(), 1);
        assert_eq!(sink.events_for_task("a").len(), 2);

        sink.clear();
        assert!(sink.is_empty());
    }
}
