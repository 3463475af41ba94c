use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::{json, Value};
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Handle, Runtime};

use crate::module::ExecutionPlan;

/// Builder for planning telemetry sinks.
pub struct PlanningTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PlanningTelemetryBuilder {
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
    pub fn build(self) -> Result<PlanningTelemetry> {
        let sink = match (self.sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        let event = self
            .event_publisher
            .map(EventHandle::new)
            .transpose()?;
        Ok(PlanningTelemetry {
            inner: Arc::new(TelemetryInner {
                component: self.component,
                sink,
                event,
            }),
        })
    }
}

/// Telemetry handle shared across planning components.
#[derive(Clone)]
pub struct PlanningTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PlanningTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanningTelemetry")
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
                    eprintln!("planning telemetry publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl PlanningTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> PlanningTelemetryBuilder {
        PlanningTelemetryBuilder::new(component)
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

    /// Logs and emits one finished plan.
    ///
    /// # Errors
    /// Returns an error when the sink or bus rejects the record.
    pub fn plan_built(&self, plan: &ExecutionPlan) -> Result<()> {
        let payload = json!({
            "plan_id": plan.id,
            "intent": plan.intent,
            "domains": plan.domains,
            "steps": plan.steps.len(),
            "parallel": plan.parallel_execution_possible,
            "estimated_seconds": plan.estimated_duration.as_secs_f64(),
        });
        self.log(LogLevel::Info, "plan.built", payload.clone())?;
        self.event("plan.built", payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ExecutionStep, RequestIntent, StepKind};
    use shared_event_bus::MemoryEventBus;
    use shared_logging::MemoryLogger;

    #[test]
    fn plan_built_reaches_sink_and_bus() {
        let sink = Arc::new(MemoryLogger::new(8));
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = PlanningTelemetry::builder("planning")
            .sink(sink.clone())
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let plan = ExecutionPlan::new(
            "inbox",
            RequestIntent::Search,
            vec!["email".to_string()],
            vec![ExecutionStep::new(
                "search_email",
                StepKind::EmailSearch,
                "email",
                "list",
            )],
        )
        .unwrap();
        telemetry.plan_built(&plan).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn absent_sinks_are_a_quiet_no_op() {
        let telemetry = PlanningTelemetry::builder("planning").build().unwrap();
        telemetry
            .log(LogLevel::Info, "plan.built", Value::Null)
            .unwrap();
        telemetry.event("plan.built", Value::Null).unwrap();
    }
}
