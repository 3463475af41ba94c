use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    anomaly::{AnomalyDetector, DetectedAnomaly, Severity},
    clusters::{ClusterIndex, ClusterSummary, PatternCluster},
    module::{PatternObservation, PatternSignature},
    store::{ObservationOutcome, PatternStore},
    telemetry::PatternTelemetry,
};

/// Observation count above which a pattern is flagged as an optimization
/// candidate.
const OPTIMIZATION_THRESHOLD: usize = 5;

/// Result of analyzing one observation.
#[derive(Debug, Clone)]
pub struct PatternInsight {
    /// Signature the observation filed under.
    pub signature: PatternSignature,
    /// Cluster the observation joined or created.
    pub cluster: ClusterSummary,
    /// Anomalies detected against the prior baseline.
    pub anomalies: Vec<DetectedAnomaly>,
    /// Advisory recommendations; strings, not structural decisions.
    pub recommendations: Vec<String>,
}

/// Front door of the pattern subsystem: records observations, assigns
/// clusters, detects anomalies, and ranks likely future patterns.
pub struct PatternAnalyzer {
    store: Arc<PatternStore>,
    clusters: ClusterIndex,
    detector: AnomalyDetector,
    telemetry: Option<PatternTelemetry>,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::with_store(Arc::new(PatternStore::new()))
    }
}

impl PatternAnalyzer {
    /// Creates an analyzer over an existing store, so other components (e.g.
    /// the predictive executor) can share profile data.
    #[must_use]
    pub fn with_store(store: Arc<PatternStore>) -> Self {
        Self {
            store,
            clusters: ClusterIndex::default(),
            detector: AnomalyDetector::default(),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PatternTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Shared pattern store handle.
    #[must_use]
    pub const fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// Records and analyzes one observation: history and baseline update,
    /// cluster assignment, anomaly detection against the pre-update
    /// baseline, and advisory recommendations.
    pub fn analyze_pattern(
        &self,
        observation: &PatternObservation,
        user_id: Option<&str>,
    ) -> PatternInsight {
        let signature = observation.signature();
        let outcome = self.store.record_observation(observation);
        if let Some(user) = user_id {
            self.store.record_user_event(user, observation);
        }
        // Hours are computed after the event was appended, excluding the
        // newest entry, so the current hour is judged against prior activity.
        let usual_hours = user_id
            .and_then(|user| self.store.usual_hours(user, self.detector.min_timing_history()));
        let anomalies =
            self.detector
                .inspect(observation, &outcome.prior_baseline, usual_hours.as_ref());
        let cluster = self.clusters.assign(&signature, observation);
        let recommendations = recommend(&signature, &outcome, &cluster, &anomalies);

        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Info,
                "pattern.analyzed",
                json!({
                    "signature": signature.as_str(),
                    "cluster": cluster.name,
                    "anomalies": anomalies.len(),
                    "observations": outcome.total_observations,
                }),
            );
            for anomaly in &anomalies {
                let _ = telemetry.anomaly(&signature, anomaly);
            }
        }

        PatternInsight {
            signature,
            cluster,
            anomalies,
            recommendations,
        }
    }

    /// Ranks the signatures a user is likely to trigger within the lookback
    /// window; falls back to all-time preferences with no recent activity.
    #[must_use]
    pub fn predict_pattern_occurrence(
        &self,
        user_id: &str,
        lookback: Duration,
    ) -> Vec<(PatternSignature, f64)> {
        self.store.predict_occurrence(user_id, lookback)
    }

    /// Snapshot of all clusters.
    #[must_use]
    pub fn clusters(&self) -> Vec<PatternCluster> {
        self.clusters.snapshot()
    }

    /// Most recent detected anomalies.
    #[must_use]
    pub fn recent_anomalies(&self, limit: usize) -> Vec<DetectedAnomaly> {
        self.detector.recent(limit)
    }
}

fn recommend(
    signature: &PatternSignature,
    outcome: &ObservationOutcome,
    cluster: &ClusterSummary,
    anomalies: &[DetectedAnomaly],
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if outcome.total_observations > OPTIMIZATION_THRESHOLD {
        recommendations.push(format!(
            "pattern {} observed {} times; candidate for optimization",
            signature, outcome.total_observations
        ));
    }
    if outcome.first_seen {
        recommendations.push(format!("new pattern {signature} is being monitored"));
    }
    for anomaly in anomalies {
        if matches!(anomaly.severity, Severity::Critical | Severity::Warning) {
            recommendations.push(anomaly.suggested_action.clone());
        }
    }
    if cluster.traits.multi_domain {
        recommendations.push("multi-domain pattern; consider executing domains in parallel".into());
    }
    if cluster.traits.time_sensitive {
        recommendations.push("long-running pattern; prioritize its scheduling".into());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(intent: &str, domains: &[&str], duration_ms: u64, success: bool) -> PatternObservation {
        PatternObservation::new(
            intent,
            domains.iter().map(ToString::to_string).collect(),
            duration_ms,
            success,
        )
    }

    #[test]
    fn cold_signature_produces_no_anomalies() {
        let analyzer = PatternAnalyzer::default();
        let insight = analyzer.analyze_pattern(&obs("search", &["email"], 9000, false), None);
        assert!(insight.anomalies.is_empty());
        assert!(insight
            .recommendations
            .iter()
            .any(|r| r.contains("being monitored")));
    }

    #[test]
    fn second_identical_observation_reuses_cluster() {
        let analyzer = PatternAnalyzer::default();
        let observation = obs("search", &["email"], 400, true);
        let first = analyzer.analyze_pattern(&observation, None);
        let second = analyzer.analyze_pattern(&observation, None);
        assert_eq!(first.cluster.id, second.cluster.id);
        assert_eq!(second.cluster.member_count, 2);
        assert_eq!(analyzer.clusters().len(), 1);
    }

    #[test]
    fn slowdown_surfaces_anomaly_and_recommendation() {
        let analyzer = PatternAnalyzer::default();
        analyzer.analyze_pattern(&obs("search", &["email"], 100, true), None);
        let insight = analyzer.analyze_pattern(&obs("search", &["email"], 400, true), None);
        assert_eq!(insight.anomalies.len(), 1);
        assert!(insight
            .recommendations
            .contains(&insight.anomalies[0].suggested_action));
    }

    #[test]
    fn repeated_pattern_flags_optimization_candidate() {
        let analyzer = PatternAnalyzer::default();
        let observation = obs("search", &["email"], 100, true);
        for _ in 0..5 {
            analyzer.analyze_pattern(&observation, None);
        }
        let insight = analyzer.analyze_pattern(&observation, None);
        assert!(insight
            .recommendations
            .iter()
            .any(|r| r.contains("candidate for optimization")));
    }

    #[test]
    fn multi_domain_pattern_suggests_parallelism() {
        let analyzer = PatternAnalyzer::default();
        let insight =
            analyzer.analyze_pattern(&obs("analyze", &["email", "calendar"], 100, true), None);
        assert!(insight
            .recommendations
            .iter()
            .any(|r| r.contains("parallel")));
    }

    #[test]
    fn occurrence_prediction_flows_through_store() {
        let analyzer = PatternAnalyzer::default();
        analyzer.analyze_pattern(&obs("search", &["email"], 100, true), Some("ada"));
        let ranked = analyzer.predict_pattern_occurrence("ada", Duration::hours(1));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, PatternSignature::derive("search", &["email"]));
    }
}
