use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Handle, Runtime};

/// Builder for prediction telemetry sinks.
pub struct PredictionTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PredictionTelemetryBuilder {
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
    pub fn build(self) -> Result<PredictionTelemetry> {
        let sink = match (self.sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        let event = self
            .event_publisher
            .map(EventHandle::new)
            .transpose()?;
        Ok(PredictionTelemetry {
            inner: Arc::new(TelemetryInner {
                component: self.component,
                sink,
                event,
            }),
        })
    }
}

/// Telemetry handle shared across prediction components.
#[derive(Clone)]
pub struct PredictionTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PredictionTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionTelemetry")
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
                    eprintln!("prediction telemetry publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl PredictionTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> PredictionTelemetryBuilder {
        PredictionTelemetryBuilder::new(component)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_logging::MemoryLogger;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_to_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("prediction.log");
        let telemetry = PredictionTelemetry::builder("prediction")
            .log_path(&path)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "execution.learned", json!({ "steps": 2 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("execution.learned"));
    }

    #[test]
    fn memory_sink_takes_precedence() {
        let sink = Arc::new(MemoryLogger::new(4));
        let telemetry = PredictionTelemetry::builder("prediction")
            .sink(sink.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "prediction.served", Value::Null)
            .unwrap();
        assert_eq!(sink.snapshot()[0].message, "prediction.served");
    }
}
