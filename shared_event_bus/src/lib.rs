#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Event bus abstractions connecting the attune engine crates to observers.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// Event emitted by an engine component, encoded as JSON on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub id: Uuid,
    /// Component that produced the event.
    pub source: String,
    /// Dotted event kind (e.g. `plan.built`, `pattern.anomaly`).
    pub kind: String,
    /// Emission timestamp.
    pub emitted_at: DateTime<Utc>,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Creates an event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            kind: kind.into(),
            emitted_at: Utc::now(),
            payload,
        }
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event to the bus.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// In-memory broadcast bus for local composition and tests.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    capacity: usize,
    sender: broadcast::Sender<EventRecord>,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
}

impl MemoryEventBus {
    /// Creates a bus retaining up to `capacity` recent events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            capacity,
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Subscribes to live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Snapshot of the retained backlog, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // Send fails only when there are no live subscribers; the backlog
        // already retained the event.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// File-backed publisher appending JSON lines; useful for durable event logs.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher appending to the given path.
    ///
    /// # Errors
    /// Returns an error when the parent directory cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let data = serde_json::to_vec(&event)?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> EventRecord {
        EventRecord::new("tester", "unit.test", serde_json::json!({ "value": 1 }))
    }

    #[tokio::test]
    async fn memory_bus_broadcasts_and_retains() {
        let bus = MemoryEventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(sample()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "unit.test");
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn memory_bus_drops_oldest_beyond_capacity() {
        let bus = MemoryEventBus::new(2);
        for _ in 0..3 {
            bus.publish(sample()).await.unwrap();
        }
        assert_eq!(bus.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn file_publisher_appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let publisher = FileEventPublisher::new(&path).unwrap();
        publisher.publish(sample()).await.unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("unit.test"));
    }
}
