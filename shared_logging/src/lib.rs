#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared across the attune engine crates.

use std::{
    collections::VecDeque,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Informational events.
    Info,
    /// Degraded but recoverable situations.
    Warn,
    /// Failures.
    Error,
}

/// One structured log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Component that produced the record.
    pub component: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Structured payload attached to the record.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record without structured fields.
    #[must_use]
    pub fn new(component: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.into(),
            level,
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Attaches a structured payload; non-object values are stored under `"value"`.
    #[must_use]
    pub fn with_fields(mut self, payload: serde_json::Value) -> Self {
        match payload {
            serde_json::Value::Object(map) => self.fields = map,
            serde_json::Value::Null => {}
            other => {
                self.fields.insert("value".into(), other);
            }
        }
        self
    }
}

/// Destination capable of persisting log records.
pub trait LogSink: Send + Sync {
    /// Writes one record to the sink.
    ///
    /// # Errors
    /// Returns an error when the underlying destination rejects the write.
    fn write(&self, record: &LogRecord) -> Result<()>;
}

/// Append-only JSON-lines file sink.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens the log file, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error when the file cannot be created or opened.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path backing this logger.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut file = self.file.lock();
        serde_json::to_writer(&mut *file, record)?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// Bounded in-memory sink retaining the most recent records; used in tests
/// and as a lightweight tap for diagnostics endpoints.
#[derive(Debug)]
pub struct MemoryLogger {
    capacity: usize,
    records: Mutex<VecDeque<LogRecord>>,
}

impl MemoryLogger {
    /// Creates a ring buffer holding up to `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of retained records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LogSink for MemoryLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut records = self.records.lock();
        records.push_back(record.clone());
        while records.len() > self.capacity {
            records.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn json_logger_appends_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("engine.log")).unwrap();
        logger
            .write(&LogRecord::new("planner", LogLevel::Info, "plan.built"))
            .unwrap();
        logger
            .write(
                &LogRecord::new("planner", LogLevel::Warn, "plan.slow")
                    .with_fields(json!({ "steps": 4 })),
            )
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"message\":\"plan.slow\""));
        assert!(content.contains("\"steps\":4"));
    }

    #[test]
    fn memory_logger_caps_retention() {
        let logger = MemoryLogger::new(2);
        for idx in 0..3 {
            logger
                .write(&LogRecord::new("test", LogLevel::Debug, format!("m{idx}")))
                .unwrap();
        }
        let records = logger.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "m1");
    }

    #[test]
    fn non_object_payload_is_wrapped() {
        let record =
            LogRecord::new("test", LogLevel::Info, "scalar").with_fields(json!(42));
        assert_eq!(record.fields.get("value"), Some(&json!(42)));
    }
}
