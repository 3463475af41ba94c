use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Complexity assumed for observations that do not carry their own estimate.
pub const DEFAULT_COMPLEXITY: f64 = 0.5;

/// Stable key joining history, baselines, clusters, and learned sequences:
/// `intent + ":" + sorted domains joined by comma`. Recomputed
/// deterministically from the request; never stored with independent state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSignature(String);

impl PatternSignature {
    /// Derives the signature for an intent and its target domains.
    #[must_use]
    pub fn derive(intent: &str, domains: &[impl AsRef<str>]) -> Self {
        let mut sorted: Vec<&str> = domains.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();
        Self(format!("{intent}:{}", sorted.join(",")))
    }

    /// Returns the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observed execution of a pattern, as reported by the plan executor or
/// any other observation producer (e.g. retroactive classification of
/// historical data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternObservation {
    /// Classified intent of the request.
    pub intent: String,
    /// Domains the execution touched.
    pub domains: Vec<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the execution succeeded.
    pub success: bool,
    /// Optional complexity estimate in `[0, 1]`.
    pub complexity: Option<f64>,
    /// When the execution was observed.
    pub observed_at: DateTime<Utc>,
    /// Opaque payload the engine passes through without interpreting.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub context: IndexMap<String, serde_json::Value>,
}

impl PatternObservation {
    /// Creates an observation stamped with the current time.
    #[must_use]
    pub fn new(
        intent: impl Into<String>,
        domains: Vec<String>,
        duration_ms: u64,
        success: bool,
    ) -> Self {
        Self {
            intent: intent.into(),
            domains,
            duration_ms,
            success,
            complexity: None,
            observed_at: Utc::now(),
            context: IndexMap::new(),
        }
    }

    /// Attaches a complexity estimate.
    #[must_use]
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Overrides the observation timestamp (used when classifying history).
    #[must_use]
    pub const fn at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Signature this observation files under.
    #[must_use]
    pub fn signature(&self) -> PatternSignature {
        PatternSignature::derive(&self.intent, &self.domains)
    }

    /// Complexity estimate, defaulting when absent.
    #[must_use]
    pub fn complexity_or_default(&self) -> f64 {
        self.complexity.unwrap_or(DEFAULT_COMPLEXITY)
    }

    /// Hour of day (UTC) the execution was observed in.
    #[must_use]
    pub fn hour_of_day(&self) -> u32 {
        self.observed_at.hour()
    }
}
