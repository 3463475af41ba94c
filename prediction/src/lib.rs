#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Predictive execution subsystem: learns completed step sequences per
//! pattern signature, predicts likely next steps, and suggests plan
//! adaptations from historical durations.

/// Recorded steps, predictions, and adaptation types.
#[path = "../module.rs"]
pub mod module;

/// Per-domain, per-action duration history.
#[path = "../ledger.rs"]
pub mod ledger;

/// Predictive executor entry points.
#[path = "../main.rs"]
pub mod prediction_entry;

/// Telemetry helpers for prediction.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use ledger::{DurationLedger, DEFAULT_STEP_DURATION_MS};
pub use module::{
    AdaptationConfig, AdaptationKind, AdaptationPriority, ConfidenceBucket, ExecutionAdaptation,
    LearnedSequence, PredictedStep, RecordedStep, StepSnapshot,
};
pub use prediction_entry::{PredictiveExecutor, SEQUENCE_CAP};
pub use telemetry::{PredictionTelemetry, PredictionTelemetryBuilder};
