use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Duration;
use indexmap::IndexMap;
use serde_json::Value;
use shared_event_bus::EventPublisher;

use attune_patterns::{
    DetectedAnomaly, PatternAnalyzer, PatternCluster, PatternInsight, PatternObservation,
    PatternSignature, PatternStore, PatternTelemetry,
};
use attune_planning::{
    ExecutionPlan, PlanError, PlanningRuntime, PlanningTelemetry, TriggerTable,
};
use attune_prediction::{
    PredictedStep, PredictionTelemetry, PredictiveExecutor, RecordedStep,
};

/// One finished run, as reported back by the external executor.
#[derive(Debug, Clone)]
pub struct CompletedExecution {
    /// Intent the plan was built for.
    pub intent: String,
    /// Domains the plan touched.
    pub domains: Vec<String>,
    /// Steps that actually ran, with measured durations.
    pub steps: Vec<RecordedStep>,
    /// Wall-clock duration of the whole run.
    pub total_duration_ms: u64,
    /// Whether the run completed without a failed step.
    pub success: bool,
    /// User on whose behalf the run executed, when known.
    pub user_id: Option<String>,
}

impl CompletedExecution {
    /// Creates a report for an anonymous run.
    #[must_use]
    pub fn new(
        intent: impl Into<String>,
        domains: Vec<String>,
        steps: Vec<RecordedStep>,
        total_duration_ms: u64,
        success: bool,
    ) -> Self {
        Self {
            intent: intent.into(),
            domains,
            steps,
            total_duration_ms,
            success,
            user_id: None,
        }
    }

    /// Attributes the run to a user, enabling profile learning and
    /// per-user occurrence prediction.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Builder for an [`EngineRuntime`].
#[derive(Default)]
pub struct EngineRuntimeBuilder {
    log_dir: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
    triggers: Option<TriggerTable>,
}

impl EngineRuntimeBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes per-component JSON-lines logs under the given directory.
    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Publishes component events on the given bus.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Replaces the default trigger keyword table.
    #[must_use]
    pub fn triggers(mut self, triggers: TriggerTable) -> Self {
        self.triggers = Some(triggers);
        self
    }

    /// Wires the components around one shared pattern store.
    ///
    /// # Errors
    /// Returns an error when a component log file cannot be created.
    pub fn build(self) -> Result<EngineRuntime> {
        let store = Arc::new(PatternStore::new());

        let mut analyzer = PatternAnalyzer::with_store(Arc::clone(&store));
        if let Some(telemetry) = self.pattern_telemetry()? {
            analyzer = analyzer.with_telemetry(telemetry);
        }

        let mut predictor = PredictiveExecutor::new().with_profiles(Arc::clone(&store));
        if let Some(telemetry) = self.prediction_telemetry()? {
            predictor = predictor.with_telemetry(telemetry);
        }
        let predictor = Arc::new(predictor);

        let mut planning = PlanningRuntime::new().with_predictor(Arc::clone(&predictor));
        if let Some(triggers) = self.triggers {
            planning = planning.with_triggers(triggers);
        }
        if let Some(telemetry) = planning_telemetry(&self.log_dir, &self.event_publisher)? {
            planning = planning.with_telemetry(telemetry);
        }

        Ok(EngineRuntime {
            store,
            analyzer,
            predictor,
            planning,
        })
    }

    fn pattern_telemetry(&self) -> Result<Option<PatternTelemetry>> {
        if self.log_dir.is_none() && self.event_publisher.is_none() {
            return Ok(None);
        }
        let mut builder = PatternTelemetry::builder("patterns");
        if let Some(dir) = &self.log_dir {
            builder = builder.log_path(dir.join("patterns.log"));
        }
        if let Some(publisher) = &self.event_publisher {
            builder = builder.event_publisher(Arc::clone(publisher));
        }
        builder.build().map(Some)
    }

    fn prediction_telemetry(&self) -> Result<Option<PredictionTelemetry>> {
        if self.log_dir.is_none() && self.event_publisher.is_none() {
            return Ok(None);
        }
        let mut builder = PredictionTelemetry::builder("prediction");
        if let Some(dir) = &self.log_dir {
            builder = builder.log_path(dir.join("prediction.log"));
        }
        if let Some(publisher) = &self.event_publisher {
            builder = builder.event_publisher(Arc::clone(publisher));
        }
        builder.build().map(Some)
    }
}

fn planning_telemetry(
    log_dir: &Option<PathBuf>,
    event_publisher: &Option<Arc<dyn EventPublisher>>,
) -> Result<Option<PlanningTelemetry>> {
    if log_dir.is_none() && event_publisher.is_none() {
        return Ok(None);
    }
    let mut builder = PlanningTelemetry::builder("planning");
    if let Some(dir) = log_dir {
        builder = builder.log_path(dir.join("planning.log"));
    }
    if let Some(publisher) = event_publisher {
        builder = builder.event_publisher(Arc::clone(publisher));
    }
    builder.build().map(Some)
}

/// The engine: plans requests, and folds completed runs back into the
/// learning components so later plans improve.
pub struct EngineRuntime {
    store: Arc<PatternStore>,
    analyzer: PatternAnalyzer,
    predictor: Arc<PredictiveExecutor>,
    planning: PlanningRuntime,
}

impl EngineRuntime {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new()
    }

    /// Creates an engine with no telemetry and default components.
    ///
    /// # Errors
    /// Never fails without telemetry configured; kept fallible so callers
    /// handle construction uniformly.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Pattern store shared by every component.
    #[must_use]
    pub const fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// Predictive executor handle, for callers that consult adaptations
    /// directly.
    #[must_use]
    pub const fn predictor(&self) -> &Arc<PredictiveExecutor> {
        &self.predictor
    }

    /// Builds an execution plan for a classified request, applying any
    /// high-confidence adaptations learned from history.
    ///
    /// # Errors
    /// Returns a [`PlanError`] when generated steps are structurally invalid.
    pub fn build_plan(
        &self,
        query: &str,
        intent: &str,
        domains: &[String],
        entities: &IndexMap<String, Value>,
    ) -> Result<ExecutionPlan, PlanError> {
        self.planning.build_plan(query, intent, domains, entities)
    }

    /// Folds one completed run back into the engine: the predictor learns
    /// the step sequence and durations, and the analyzer records the
    /// observation, returning clusters, anomalies, and recommendations.
    pub fn learn_execution(&self, completed: CompletedExecution) -> PatternInsight {
        self.predictor.learn_execution(
            &completed.intent,
            &completed.domains,
            completed.steps,
            completed.total_duration_ms,
            completed.success,
            completed.user_id.as_deref(),
        );
        let observation = PatternObservation::new(
            &completed.intent,
            completed.domains,
            completed.total_duration_ms,
            completed.success,
        );
        self.analyzer
            .analyze_pattern(&observation, completed.user_id.as_deref())
    }

    /// Records and analyzes an observation without sequence learning, for
    /// executions observed from outside the engine.
    pub fn analyze_pattern(
        &self,
        observation: &PatternObservation,
        user_id: Option<&str>,
    ) -> PatternInsight {
        self.analyzer.analyze_pattern(observation, user_id)
    }

    /// Predicts the next steps of an in-flight run from learned sequences.
    #[must_use]
    pub fn predict_next_steps(
        &self,
        intent: &str,
        domains: &[String],
        executed_step_ids: &[String],
        limit: usize,
    ) -> Vec<PredictedStep> {
        self.predictor
            .predict_next_steps(intent, domains, executed_step_ids, limit)
    }

    /// Ranks the patterns a user is likely to trigger within the lookback
    /// window.
    #[must_use]
    pub fn predict_pattern_occurrence(
        &self,
        user_id: &str,
        lookback: Duration,
    ) -> Vec<(PatternSignature, f64)> {
        self.analyzer.predict_pattern_occurrence(user_id, lookback)
    }

    /// Snapshot of all learned clusters.
    #[must_use]
    pub fn clusters(&self) -> Vec<PatternCluster> {
        self.analyzer.clusters()
    }

    /// Most recent detected anomalies across all patterns.
    #[must_use]
    pub fn recent_anomalies(&self, limit: usize) -> Vec<DetectedAnomaly> {
        self.analyzer.recent_anomalies(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_planning::RequestIntent;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn completed_from(plan: &ExecutionPlan, duration_per_step_ms: u64) -> CompletedExecution {
        let steps: Vec<RecordedStep> = plan
            .steps
            .iter()
            .map(|step| {
                RecordedStep::new(
                    step.id.clone(),
                    step.kind.label(),
                    step.domain.clone(),
                    step.action.clone(),
                    duration_per_step_ms,
                )
            })
            .collect();
        let total = duration_per_step_ms * u64::try_from(steps.len()).unwrap();
        CompletedExecution::new(
            plan.intent.as_str(),
            plan.domains.clone(),
            steps,
            total,
            true,
        )
    }

    #[test]
    fn plan_learn_predict_loop_closes() {
        let engine = EngineRuntime::new().unwrap();
        let candidates = domains(&["email", "calendar"]);
        let plan = engine
            .build_plan("inbox", "search", &candidates, &IndexMap::new())
            .unwrap();
        assert_eq!(plan.intent, RequestIntent::Search);
        assert_eq!(plan.steps.len(), 1);

        let insight = engine.learn_execution(completed_from(&plan, 150).for_user("ada"));
        assert!(insight.cluster.newly_created);
        assert!(insight.anomalies.is_empty());

        // The learned run now answers next-step queries for the signature.
        let predicted = engine.predict_next_steps("search", &plan.domains, &[], 3);
        assert_eq!(predicted.len(), 1);
        assert_eq!(predicted[0].step_id, "search_email");
    }

    #[test]
    fn learned_runs_feed_user_occurrence_prediction() {
        let engine = EngineRuntime::new().unwrap();
        let candidates = domains(&["email"]);
        for _ in 0..3 {
            let plan = engine
                .build_plan("unread mail", "search", &candidates, &IndexMap::new())
                .unwrap();
            engine.learn_execution(completed_from(&plan, 120).for_user("ada"));
        }
        let ranked = engine.predict_pattern_occurrence("ada", Duration::hours(24));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, PatternSignature::derive("search", &["email"]));
        assert!(ranked[0].1 > 0.0);

        let profile = engine.store().profile("ada").unwrap();
        assert_eq!(profile.total_executions, 3);
        assert!((profile.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn degraded_run_surfaces_anomaly_through_engine() {
        let engine = EngineRuntime::new().unwrap();
        let candidates = domains(&["email"]);
        let plan = engine
            .build_plan("inbox", "search", &candidates, &IndexMap::new())
            .unwrap();
        engine.learn_execution(completed_from(&plan, 100));
        // Same pattern, four times slower than baseline.
        let insight = engine.learn_execution(completed_from(&plan, 400));
        assert_eq!(insight.anomalies.len(), 1);
        assert_eq!(engine.recent_anomalies(5).len(), 1);
    }

    #[test]
    fn clusters_accumulate_across_learned_runs() {
        let engine = EngineRuntime::new().unwrap();
        let plan_a = engine
            .build_plan("inbox", "search", &domains(&["email"]), &IndexMap::new())
            .unwrap();
        let plan_b = engine
            .build_plan(
                "add a meeting",
                "create",
                &domains(&["calendar"]),
                &IndexMap::new(),
            )
            .unwrap();
        engine.learn_execution(completed_from(&plan_a, 100));
        engine.learn_execution(completed_from(&plan_b, 100));
        assert_eq!(engine.clusters().len(), 2);
    }

    #[test]
    fn telemetry_writes_component_logs_and_events() {
        let tmp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(32));
        let engine = EngineRuntime::builder()
            .log_dir(tmp.path())
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let plan = engine
            .build_plan("inbox", "search", &domains(&["email"]), &IndexMap::new())
            .unwrap();
        engine.learn_execution(completed_from(&plan, 100));
        assert!(tmp.path().join("planning.log").exists());
        assert!(tmp.path().join("patterns.log").exists());
        assert!(tmp.path().join("prediction.log").exists());
        assert!(!bus.snapshot().is_empty());
    }
}
