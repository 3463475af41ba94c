#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Pattern learning subsystem: observation store, unsupervised cluster index,
//! and heuristic anomaly detection over execution outcomes.

/// Signatures, observations, and shared pattern types.
#[path = "../module.rs"]
pub mod module;

/// Per-signature running baselines.
#[path = "../baseline.rs"]
pub mod baseline;

/// Observation history, baselines, and user profiles.
#[path = "../store.rs"]
pub mod store;

/// Incremental pattern clustering.
#[path = "../clusters.rs"]
pub mod clusters;

/// Baseline-relative anomaly detection.
#[path = "../anomaly.rs"]
pub mod anomaly;

/// Pattern analysis entry points.
#[path = "../main.rs"]
pub mod analysis_entry;

/// Telemetry helpers for pattern analysis.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use analysis_entry::{PatternAnalyzer, PatternInsight};
pub use anomaly::{AnomalyConfig, AnomalyDetector, AnomalyKind, DetectedAnomaly, Severity};
pub use baseline::Baseline;
pub use clusters::{
    ClusterCentroid, ClusterIndex, ClusterSummary, ClusterTraits, ClusteringConfig, PatternCluster,
};
pub use module::{PatternObservation, PatternSignature};
pub use store::{ObservationOutcome, PatternStore, UserEvent, UserProfile};
pub use telemetry::{PatternTelemetry, PatternTelemetryBuilder};
