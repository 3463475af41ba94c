use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One step of a completed execution, as reported by the plan executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedStep {
    /// Step id within its plan.
    pub step_id: String,
    /// Step kind label (e.g. `email_search`).
    pub step_type: String,
    /// Domain the step ran against.
    pub domain: String,
    /// Action verb the step invoked.
    pub action: String,
    /// Step duration in milliseconds.
    pub duration_ms: u64,
    /// Opaque parameters the step carried.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, serde_json::Value>,
}

impl RecordedStep {
    /// Creates a recorded step without parameters.
    #[must_use]
    pub fn new(
        step_id: impl Into<String>,
        step_type: impl Into<String>,
        domain: impl Into<String>,
        action: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            step_type: step_type.into(),
            domain: domain.into(),
            action: action.into(),
            duration_ms,
            parameters: IndexMap::new(),
        }
    }
}

/// One completed step sequence retained under a pattern signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedSequence {
    /// Steps in execution order.
    pub steps: Vec<RecordedStep>,
    /// Total wall-clock duration of the run (milliseconds).
    pub total_duration_ms: u64,
    /// Whether the run succeeded.
    pub success: bool,
    /// When the run was learned.
    pub recorded_at: DateTime<Utc>,
}

/// Confidence bucket for a predicted step, derived from its occurrence rate
/// across matching sequences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    /// Occurrence rate of at least 0.8.
    High,
    /// Occurrence rate in `[0.5, 0.8)`.
    Medium,
    /// Occurrence rate in `[0.2, 0.5)`.
    Low,
    /// Occurrence rate below 0.2.
    Uncertain,
}

impl ConfidenceBucket {
    /// Buckets an occurrence rate and computes its score. High-occurrence
    /// rates approach but never reach certainty (scores cap at 0.95);
    /// low-occurrence rates are not over-promoted.
    #[must_use]
    pub fn from_rate(rate: f64) -> (Self, f64) {
        let (bucket, score) = if rate >= 0.8 {
            (Self::High, 0.8 + (rate - 0.8) * 2.0)
        } else if rate >= 0.5 {
            (Self::Medium, 0.5 + (rate - 0.5) * 0.6)
        } else if rate >= 0.2 {
            (Self::Low, 0.2 + (rate - 0.2))
        } else {
            (Self::Uncertain, rate)
        };
        (bucket, score.min(0.95))
    }
}

/// One predicted next step with its ranking evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedStep {
    /// Step id seen in learned sequences.
    pub step_id: String,
    /// Step kind label.
    pub step_type: String,
    /// Domain the step runs against.
    pub domain: String,
    /// Action verb.
    pub action: String,
    /// Matching sequences this step appeared in.
    pub occurrences: usize,
    /// Average duration across those appearances (milliseconds).
    pub avg_duration_ms: f64,
    /// Occurrence rate: occurrences over matching sequences.
    pub occurrence_rate: f64,
    /// Confidence bucket.
    pub bucket: ConfidenceBucket,
    /// Confidence score, capped at 0.95.
    pub score: f64,
}

/// Planner-agnostic view of a plan step, used for adaptation analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Step id within its plan.
    pub id: String,
    /// Domain the step targets.
    pub domain: String,
    /// Action verb.
    pub action: String,
    /// Whether the step declares any dependencies.
    pub has_dependencies: bool,
}

impl StepSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        action: impl Into<String>,
        has_dependencies: bool,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            action: action.into(),
            has_dependencies,
        }
    }
}

/// Structural change suggested for a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationKind {
    /// Run independent same-domain steps concurrently.
    Parallelize,
    /// Cache search results expected to repeat.
    CacheResults,
    /// Pre-allocate rate-limit quota for the touched domains.
    PreallocateResources,
}

/// How strongly an adaptation is recommended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationPriority {
    /// Apply if at all possible.
    High,
    /// Worth applying.
    Medium,
    /// Optional.
    Low,
}

/// One suggested plan adaptation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAdaptation {
    /// Plan the suggestion applies to.
    pub plan_id: String,
    /// What to change.
    pub kind: AdaptationKind,
    /// Recommendation strength.
    pub priority: AdaptationPriority,
    /// Step ids affected.
    pub affected_steps: Vec<String>,
    /// Domains affected.
    pub domains: Vec<String>,
    /// Estimated relative improvement in `[0, 1]`.
    pub estimated_improvement: f64,
    /// Human-readable rationale.
    pub description: String,
}

/// Thresholds governing adaptation suggestions.
#[derive(Debug, Clone)]
pub struct AdaptationConfig {
    /// Minimum relative improvement before a parallelize suggestion fires.
    pub min_parallel_improvement: f64,
    /// Improvement above which a parallelize suggestion is high priority.
    pub high_priority_improvement: f64,
    /// Fixed improvement assumed for cached search results.
    pub cache_improvement: f64,
    /// Fixed improvement assumed for quota pre-allocation.
    pub reservation_improvement: f64,
    /// Domains whose rate-limit quota can be pre-allocated.
    pub reservable_domains: Vec<String>,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            min_parallel_improvement: 0.2,
            high_priority_improvement: 0.4,
            cache_improvement: 0.75,
            reservation_improvement: 0.15,
            reservable_domains: vec!["email".into(), "calendar".into(), "tasks".into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries_match_contract() {
        let (bucket, score) = ConfidenceBucket::from_rate(0.8);
        assert_eq!(bucket, ConfidenceBucket::High);
        assert!((score - 0.8).abs() < 1e-9);

        let (bucket, score) = ConfidenceBucket::from_rate(0.5);
        assert_eq!(bucket, ConfidenceBucket::Medium);
        assert!((score - 0.5).abs() < 1e-9);

        let (bucket, score) = ConfidenceBucket::from_rate(0.2);
        assert_eq!(bucket, ConfidenceBucket::Low);
        assert!((score - 0.2).abs() < 1e-9);

        let (bucket, score) = ConfidenceBucket::from_rate(0.19);
        assert_eq!(bucket, ConfidenceBucket::Uncertain);
        assert!((score - 0.19).abs() < 1e-9);
    }

    #[test]
    fn score_never_exceeds_cap() {
        let (bucket, score) = ConfidenceBucket::from_rate(1.0);
        assert_eq!(bucket, ConfidenceBucket::High);
        assert!((score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn interior_rates_interpolate() {
        let (_, score) = ConfidenceBucket::from_rate(0.9);
        assert!((score - 0.95).abs() < 1e-9);
        let (_, score) = ConfidenceBucket::from_rate(0.65);
        assert!((score - 0.59).abs() < 1e-9);
        let (_, score) = ConfidenceBucket::from_rate(0.3);
        assert!((score - 0.3).abs() < 1e-9);
    }
}
