//! In-process event bus implementations.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tollgate_core::events::Event;
use tollgate_core::ports::EventBus;
use tollgate_core::{Error, Result};
use tracing::trace;

/// Fan-out bus backed by a tokio broadcast channel.
///
/// Publishing with no subscribers is not an error; slow subscribers lose
/// the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        trace!(subject = %event.subject(), "Publishing event");
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.events().iter().map(Event::subject).collect()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        self.events
            .lock()
            .map_err(|e| Error::EventBus(e.to_string()))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::events::DetectorFailedPayload;
    use tollgate_core::ids::RunId;

    fn event() -> Event {
        Event::DetectorFailed(DetectorFailedPayload {
            run_id: RunId::new(),
            error: "boom".into(),
        })
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let bus = BroadcastEventBus::default();
        bus.publish(event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_delivers() {
        let bus = BroadcastEventBus::new(8);
        let mut rx = bus.subscribe();
        let sent = event();
        bus.publish(sent.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().subject(), sent.subject());
    }

    #[tokio::test]
    async fn test_recording_bus() {
        let bus = RecordingEventBus::new();
        bus.publish(event()).await.unwrap();
        assert_eq!(bus.events().len(), 1);
        assert!(bus.subjects()[0].starts_with("decision.failed."));
    }
}
