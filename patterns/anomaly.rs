use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{baseline::Baseline, module::PatternObservation};

/// Kind of detected anomaly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A pattern's behavior shifted from its established profile.
    BehaviorChange,
    /// Activity outside the user's usual hours.
    UnusualTiming,
    /// Resource usage spiked beyond expectations.
    ResourceSpike,
    /// A historically reliable pattern failed.
    SuccessRateDrop,
    /// Execution took markedly longer than the baseline.
    ExecutionSlowdown,
}

/// How seriously an anomaly should be treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Requires attention.
    Critical,
    /// Worth surfacing.
    Warning,
    /// Informational only.
    Info,
}

/// One detected anomaly. Ephemeral: appended to a bounded log, never
/// persisted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedAnomaly {
    /// Anomaly classification.
    pub kind: AnomalyKind,
    /// Severity level.
    pub severity: Severity,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// What was observed.
    pub description: String,
    /// Advisory follow-up for the caller.
    pub suggested_action: String,
    /// Detection timestamp.
    pub detected_at: DateTime<Utc>,
}

/// Detection thresholds.
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Durations beyond this multiple of the baseline average fire a
    /// slowdown anomaly.
    pub slowdown_multiplier: f64,
    /// Baseline success rates above this mark a pattern as reliable; a
    /// failure then fires a success-rate drop.
    pub reliable_success_rate: f64,
    /// Minimum user history entries before timing analysis applies.
    pub min_timing_history: usize,
    /// Maximum anomalies retained in the in-memory log.
    pub log_capacity: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            slowdown_multiplier: 1.5,
            reliable_success_rate: 0.8,
            min_timing_history: 10,
            log_capacity: 256,
        }
    }
}

/// Compares observations against their signature baseline and the user's
/// recent-activity profile.
#[derive(Debug, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    log: Mutex<VecDeque<DetectedAnomaly>>,
}

impl AnomalyDetector {
    /// Creates a detector with custom thresholds.
    #[must_use]
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            log: Mutex::new(VecDeque::new()),
        }
    }

    /// Minimum user history entries before timing analysis applies.
    #[must_use]
    pub const fn min_timing_history(&self) -> usize {
        self.config.min_timing_history
    }

    /// Inspects one observation against the baseline as it stood before the
    /// observation was folded in. `usual_hours` is the user's hour-of-day
    /// profile excluding the current event, when enough history exists.
    pub fn inspect(
        &self,
        observation: &PatternObservation,
        prior_baseline: &Baseline,
        usual_hours: Option<&HashSet<u32>>,
    ) -> Vec<DetectedAnomaly> {
        let mut found = Vec::new();
        let now = Utc::now();

        #[allow(clippy::cast_precision_loss)]
        let duration = observation.duration_ms as f64;
        let slowdown_cutoff = prior_baseline.avg_duration_ms * self.config.slowdown_multiplier;
        if duration > slowdown_cutoff {
            found.push(DetectedAnomaly {
                kind: AnomalyKind::ExecutionSlowdown,
                severity: Severity::Warning,
                confidence: 0.8,
                description: format!(
                    "execution took {}ms against a baseline average of {:.0}ms",
                    observation.duration_ms, prior_baseline.avg_duration_ms
                ),
                suggested_action: "check the downstream services behind this pattern for degradation".into(),
                detected_at: now,
            });
        }

        if !observation.success && prior_baseline.success_rate > self.config.reliable_success_rate {
            found.push(DetectedAnomaly {
                kind: AnomalyKind::SuccessRateDrop,
                severity: Severity::Warning,
                confidence: 0.75,
                description: format!(
                    "a pattern with {:.0}% historical success just failed",
                    prior_baseline.success_rate * 100.0
                ),
                suggested_action: "review the failure before retrying this pattern".into(),
                detected_at: now,
            });
        }

        if let Some(hours) = usual_hours {
            if !hours.contains(&observation.hour_of_day()) {
                found.push(DetectedAnomaly {
                    kind: AnomalyKind::UnusualTiming,
                    severity: Severity::Info,
                    confidence: 0.6,
                    description: format!(
                        "activity at hour {:02}:00 falls outside the user's usual hours",
                        observation.hour_of_day()
                    ),
                    suggested_action: "confirm the request came from the expected user".into(),
                    detected_at: now,
                });
            }
        }

        if !found.is_empty() {
            let mut log = self.log.lock();
            for anomaly in &found {
                log.push_back(anomaly.clone());
            }
            while log.len() > self.config.log_capacity {
                log.pop_front();
            }
        }
        found
    }

    /// Most recent detected anomalies, newest last.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<DetectedAnomaly> {
        let log = self.log.lock();
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(duration_ms: u64, success: bool) -> PatternObservation {
        PatternObservation::new("search", vec!["email".into()], duration_ms, success)
    }

    #[test]
    fn seeded_baseline_never_fires_on_first_sight() {
        let detector = AnomalyDetector::default();
        let observation = obs(5000, false);
        let baseline = Baseline::seeded(&observation);
        assert!(detector.inspect(&observation, &baseline, None).is_empty());
    }

    #[test]
    fn slowdown_fires_just_above_threshold() {
        let detector = AnomalyDetector::default();
        let baseline = Baseline::seeded(&obs(1000, true));
        let slow = obs(1501, true);
        let found = detector.inspect(&slow, &baseline, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AnomalyKind::ExecutionSlowdown);
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn slowdown_holds_just_below_threshold() {
        let detector = AnomalyDetector::default();
        let baseline = Baseline::seeded(&obs(1000, true));
        let fast_enough = obs(1499, true);
        assert!(detector.inspect(&fast_enough, &baseline, None).is_empty());
    }

    #[test]
    fn reliable_pattern_failure_fires_drop() {
        let detector = AnomalyDetector::default();
        let mut baseline = Baseline::seeded(&obs(100, true));
        baseline.success_rate = 0.95;
        let failed = obs(100, false);
        let found = detector.inspect(&failed, &baseline, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AnomalyKind::SuccessRateDrop);
    }

    #[test]
    fn unreliable_pattern_failure_stays_quiet() {
        let detector = AnomalyDetector::default();
        let mut baseline = Baseline::seeded(&obs(100, true));
        baseline.success_rate = 0.5;
        assert!(detector.inspect(&obs(100, false), &baseline, None).is_empty());
    }

    #[test]
    fn off_hours_activity_fires_timing_anomaly() {
        let detector = AnomalyDetector::default();
        let observation = obs(100, true);
        let baseline = Baseline::seeded(&observation);
        let other_hour = (observation.hour_of_day() + 1) % 24;
        let hours: HashSet<u32> = HashSet::from([other_hour]);
        let found = detector.inspect(&observation, &baseline, Some(&hours));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AnomalyKind::UnusualTiming);
        assert_eq!(found[0].severity, Severity::Info);
    }

    #[test]
    fn log_retention_is_bounded() {
        let detector = AnomalyDetector::new(AnomalyConfig {
            log_capacity: 3,
            ..AnomalyConfig::default()
        });
        let baseline = Baseline::seeded(&obs(100, true));
        for _ in 0..5 {
            detector.inspect(&obs(400, true), &baseline, None);
        }
        assert_eq!(detector.recent(10).len(), 3);
    }
}
