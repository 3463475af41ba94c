use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::{json, Value};
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Handle, Runtime};

use crate::{anomaly::DetectedAnomaly, module::PatternSignature};

/// Builder for pattern-analysis telemetry sinks.
pub struct PatternTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PatternTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            sink: None,
            event_publisher: None,
        }
    }

    /// Logs to a JSON-lines file at the given path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Logs to a caller-provided sink (takes precedence over `log_path`).
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publishes events on the given bus.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    ///
    /// # Errors
    /// Returns an error when the log file or event runtime cannot be set up.
    pub fn build(self) -> Result<PatternTelemetry> {
        let sink = match (self.sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        let event = self
            .event_publisher
            .map(EventHandle::new)
            .transpose()?;
        Ok(PatternTelemetry {
            inner: Arc::new(TelemetryInner {
                component: self.component,
                sink,
                event,
            }),
        })
    }
}

/// Telemetry handle shared across pattern components.
#[derive(Clone)]
pub struct PatternTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PatternTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternTelemetry")
            .field("component", &self.inner.component)
            .finish()
    }
}

struct TelemetryInner {
    component: String,
    sink: Option<Arc<dyn LogSink>>,
    event: Option<EventHandle>,
}

struct EventHandle {
    runtime: Runtime,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            publisher,
        })
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("pattern telemetry publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl PatternTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> PatternTelemetryBuilder {
        PatternTelemetryBuilder::new(component)
    }

    /// Logs a structured record.
    ///
    /// # Errors
    /// Returns an error when the sink rejects the write.
    pub fn log(&self, level: LogLevel, message: &str, fields: Value) -> Result<()> {
        if let Some(sink) = &self.inner.sink {
            let record = LogRecord::new(&self.inner.component, level, message).with_fields(fields);
            sink.write(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    ///
    /// # Errors
    /// Returns an error when publishing fails synchronously.
    pub fn event(&self, kind: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            handle.publish(EventRecord::new(
                self.inner.component.clone(),
                kind,
                payload,
            ))?;
        }
        Ok(())
    }

    /// Logs and emits one detected anomaly.
    ///
    /// # Errors
    /// Returns an error when the sink or bus rejects the record.
    pub fn anomaly(&self, signature: &PatternSignature, anomaly: &DetectedAnomaly) -> Result<()> {
        let payload = json!({
            "signature": signature.as_str(),
            "kind": anomaly.kind,
            "severity": anomaly.severity,
            "confidence": anomaly.confidence,
        });
        self.log(LogLevel::Warn, &anomaly.description, payload.clone())?;
        self.event("pattern.anomaly", payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::MemoryLogger;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_file_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("patterns.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = PatternTelemetry::builder("patterns")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "pattern.analyzed", json!({ "anomalies": 0 }))
            .unwrap();
        telemetry
            .event("pattern.clustered", json!({ "members": 2 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("pattern.analyzed"));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn memory_sink_captures_records() {
        let sink = Arc::new(MemoryLogger::new(8));
        let telemetry = PatternTelemetry::builder("patterns")
            .sink(sink.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "pattern.seen", Value::Null)
            .unwrap();
        assert_eq!(sink.len(), 1);
    }
}
