//! Structured log event publishing
//!
//! The coordinator publishes an event at every stage transition and on
//! every retry or failure. Events go out on a bounded broadcast channel so
//! any number of external subscribers (dashboard transports, log shippers)
//! can drain them; a slow or absent subscriber never blocks the pipeline,
//! it just loses the oldest events it failed to keep up with. Every event
//! is also emitted through `tracing`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Severity of a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// One structured log event
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
}

/// Bounded, non-blocking publish point for pipeline events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LogEvent>,
}

impl EventBus {
    /// Create a bus with a bounded buffer of `capacity` events per
    /// subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a receiver handle; each subscriber sees events published after
    /// it subscribed
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; never blocks, a send with no subscribers is a
    /// no-op
    pub fn publish(&self, level: EventLevel, message: impl Into<String>) {
        let message = message.into();

        match level {
            EventLevel::Info => info!("{}", message),
            EventLevel::Warning => warn!("{}", message),
            EventLevel::Error => error!("{}", message),
        }

        let _ = self.sender.send(LogEvent {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(EventLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.publish(EventLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(EventLevel::Error, message);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.info("starting");
        bus.warning("slow page");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, EventLevel::Info);
        assert_eq!(first.message, "starting");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, EventLevel::Warning);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block() {
        let bus = EventBus::new(2);
        for i in 0..100 {
            bus.info(format!("event {}", i));
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.info(format!("event {}", i));
        }

        // The first recv reports the lag, subsequent ones yield the newest
        // buffered events.
        let lagged = rx.recv().await;
        assert!(matches!(
            lagged,
            Err(broadcast::error::RecvError::Lagged(_))
        ));

        let next = rx.recv().await.unwrap();
        assert_eq!(next.message, "event 3");
    }
}
