use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    baseline::{ema, Baseline, DURATION_ALPHA, SUCCESS_ALPHA},
    module::{PatternObservation, PatternSignature},
};

/// Maximum raw events retained per user profile; the oldest entry is dropped
/// once the cap is reached.
pub const USER_HISTORY_CAP: usize = 100;

/// Number of signatures returned by occurrence prediction.
pub const OCCURRENCE_LIMIT: usize = 5;

/// One raw entry in a user's interaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    /// Signature of the observed pattern.
    pub signature: PatternSignature,
    /// When the pattern was observed.
    pub at: DateTime<Utc>,
    /// Hour of day (UTC) extracted at record time.
    pub hour: u32,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the execution succeeded.
    pub success: bool,
}

/// Per-user interaction profile. Grows monotonically except for the bounded
/// raw history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Observation count per pattern signature.
    pub preferences: IndexMap<PatternSignature, u64>,
    /// Execution count per domain.
    pub domain_counts: IndexMap<String, u64>,
    /// Execution count per intent.
    pub intent_counts: IndexMap<String, u64>,
    /// Total observed patterns.
    pub total_patterns: u64,
    /// Total completed executions reported through learning.
    pub total_executions: u64,
    /// Successful executions reported through learning.
    pub successful_executions: u64,
    /// Success-rate EMA over observed patterns.
    pub success_rate: f64,
    /// Average execution time EMA (milliseconds).
    pub avg_duration_ms: f64,
    /// Bounded raw event history, newest last.
    pub history: VecDeque<UserEvent>,
    /// Profile creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            preferences: IndexMap::new(),
            domain_counts: IndexMap::new(),
            intent_counts: IndexMap::new(),
            total_patterns: 0,
            total_executions: 0,
            successful_executions: 0,
            success_rate: 0.0,
            avg_duration_ms: 0.0,
            history: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Snapshot handed back when an observation is recorded. `prior_baseline` is
/// the baseline as it stood before this observation was folded in, which is
/// what anomaly detection compares against.
#[derive(Debug, Clone)]
pub struct ObservationOutcome {
    /// Baseline before this observation updated it (seeded from the
    /// observation itself on first sight).
    pub prior_baseline: Baseline,
    /// Whether this is the first observation for the signature.
    pub first_seen: bool,
    /// Observation count for the signature, including this one.
    pub total_observations: usize,
}

/// In-memory tables keyed by pattern signature and user id. Every table is
/// lock-guarded so concurrent callers serialize per store rather than racing
/// EMA read-modify-write updates.
#[derive(Debug, Default)]
pub struct PatternStore {
    history: RwLock<HashMap<PatternSignature, Vec<PatternObservation>>>,
    baselines: RwLock<HashMap<PatternSignature, Baseline>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl PatternStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observation to its signature's history and updates the
    /// baseline, returning the pre-update baseline for anomaly comparison.
    pub fn record_observation(&self, observation: &PatternObservation) -> ObservationOutcome {
        let signature = observation.signature();
        let total_observations = {
            let mut history = self.history.write();
            let entries = history.entry(signature.clone()).or_default();
            entries.push(observation.clone());
            entries.len()
        };
        let mut baselines = self.baselines.write();
        if let Some(baseline) = baselines.get_mut(&signature) {
            let prior_baseline = baseline.clone();
            baseline.absorb(observation);
            ObservationOutcome {
                prior_baseline,
                first_seen: false,
                total_observations,
            }
        } else {
            let seeded = Baseline::seeded(observation);
            baselines.insert(signature, seeded.clone());
            ObservationOutcome {
                prior_baseline: seeded,
                first_seen: true,
                total_observations,
            }
        }
    }

    /// Folds an observation into the user's profile and bounded history.
    pub fn record_user_event(&self, user_id: &str, observation: &PatternObservation) {
        let signature = observation.signature();
        let mut profiles = self.profiles.write();
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(UserProfile::new);
        *profile.preferences.entry(signature.clone()).or_insert(0) += 1;
        profile.total_patterns += 1;
        let outcome = if observation.success { 1.0 } else { 0.0 };
        #[allow(clippy::cast_precision_loss)]
        let duration = observation.duration_ms as f64;
        if profile.total_patterns == 1 {
            profile.success_rate = outcome;
            profile.avg_duration_ms = duration;
        } else {
            profile.success_rate = ema(profile.success_rate, outcome, SUCCESS_ALPHA);
            profile.avg_duration_ms = ema(profile.avg_duration_ms, duration, DURATION_ALPHA);
        }
        profile.history.push_back(UserEvent {
            signature,
            at: observation.observed_at,
            hour: observation.hour_of_day(),
            duration_ms: observation.duration_ms,
            success: observation.success,
        });
        while profile.history.len() > USER_HISTORY_CAP {
            profile.history.pop_front();
        }
        profile.updated_at = Utc::now();
    }

    /// Folds a completed plan execution into the user's profile. Called by
    /// the predictive executor when it learns a run.
    pub fn record_execution(
        &self,
        user_id: &str,
        intent: &str,
        domains: &[String],
        total_duration_ms: u64,
        success: bool,
    ) {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(UserProfile::new);
        profile.total_executions += 1;
        if success {
            profile.successful_executions += 1;
        }
        for domain in domains {
            *profile.domain_counts.entry(domain.clone()).or_insert(0) += 1;
        }
        *profile.intent_counts.entry(intent.to_string()).or_insert(0) += 1;
        #[allow(clippy::cast_precision_loss)]
        let duration = total_duration_ms as f64;
        if profile.total_executions == 1 {
            profile.avg_duration_ms = duration;
        } else {
            profile.avg_duration_ms = ema(profile.avg_duration_ms, duration, DURATION_ALPHA);
        }
        profile.updated_at = Utc::now();
    }

    /// Hours of day present in the user's history, excluding the newest
    /// entry. `None` until the user has more than the minimum entries needed
    /// for timing analysis.
    #[must_use]
    pub fn usual_hours(&self, user_id: &str, min_entries: usize) -> Option<HashSet<u32>> {
        let profiles = self.profiles.read();
        let profile = profiles.get(user_id)?;
        if profile.history.len() <= min_entries {
            return None;
        }
        let newest = profile.history.len() - 1;
        Some(
            profile
                .history
                .iter()
                .take(newest)
                .map(|event| event.hour)
                .collect(),
        )
    }

    /// Current baseline for a signature, if any.
    #[must_use]
    pub fn baseline_for(&self, signature: &PatternSignature) -> Option<Baseline> {
        self.baselines.read().get(signature).cloned()
    }

    /// Number of observations recorded under a signature.
    #[must_use]
    pub fn observation_count(&self, signature: &PatternSignature) -> usize {
        self.history
            .read()
            .get(signature)
            .map_or(0, Vec::len)
    }

    /// Snapshot of a user's profile.
    #[must_use]
    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.read().get(user_id).cloned()
    }

    /// Ranks the signatures a user is likely to trigger next. Recent history
    /// inside the lookback window wins; with no recent activity the all-time
    /// preference table is used instead. Returns at most five entries.
    #[must_use]
    pub fn predict_occurrence(
        &self,
        user_id: &str,
        lookback: Duration,
    ) -> Vec<(PatternSignature, f64)> {
        let profiles = self.profiles.read();
        let Some(profile) = profiles.get(user_id) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - lookback;
        let recent: Vec<&UserEvent> = profile
            .history
            .iter()
            .filter(|event| event.at >= cutoff)
            .collect();
        let mut ranked: Vec<(PatternSignature, f64)> = if recent.is_empty() {
            let total: u64 = profile.preferences.values().sum();
            if total == 0 {
                return Vec::new();
            }
            #[allow(clippy::cast_precision_loss)]
            profile
                .preferences
                .iter()
                .map(|(signature, count)| (signature.clone(), *count as f64 / total as f64))
                .collect()
        } else {
            let mut counts: IndexMap<PatternSignature, u64> = IndexMap::new();
            for event in &recent {
                *counts.entry(event.signature.clone()).or_insert(0) += 1;
            }
            #[allow(clippy::cast_precision_loss)]
            let total = recent.len() as f64;
            #[allow(clippy::cast_precision_loss)]
            counts
                .into_iter()
                .map(|(signature, count)| (signature, count as f64 / total))
                .collect()
        };
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(OCCURRENCE_LIMIT);
        ranked
    }
}
