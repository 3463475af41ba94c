use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value};
use shared_logging::LogLevel;

use attune_prediction::{AdaptationKind, AdaptationPriority, PredictiveExecutor, StepSnapshot};

use crate::{
    builder::PlanBuilder,
    keywords::TriggerTable,
    module::{ExecutionPlan, PlanError, RequestIntent},
    telemetry::PlanningTelemetry,
};

/// Planning runtime: builds plans and consults the predictive executor for
/// adaptation hints before handing them to the external executor.
#[derive(Default)]
pub struct PlanningRuntime {
    builder: PlanBuilder,
    predictor: Option<Arc<PredictiveExecutor>>,
    telemetry: Option<PlanningTelemetry>,
}

impl PlanningRuntime {
    /// Creates a runtime with default components.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the trigger keyword table.
    #[must_use]
    pub fn with_triggers(mut self, triggers: TriggerTable) -> Self {
        self.builder = PlanBuilder::new(triggers);
        self
    }

    /// Wires in a predictive executor for adaptation consults.
    #[must_use]
    pub fn with_predictor(mut self, predictor: Arc<PredictiveExecutor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PlanningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds a plan for a classified request. A high-priority parallelize
    /// adaptation from history upgrades the parallel flag; an already
    /// parallel-eligible plan is never downgraded.
    ///
    /// # Errors
    /// Returns a [`PlanError`] when the generated steps are structurally
    /// invalid; such a plan never reaches the executor.
    pub fn build_plan(
        &self,
        query: &str,
        intent: &str,
        domains: &[String],
        entities: &IndexMap<String, Value>,
    ) -> Result<ExecutionPlan, PlanError> {
        let intent = RequestIntent::parse(intent);
        let mut plan = self.builder.build(query, intent, domains, entities)?;
        if let Some(predictor) = &self.predictor {
            let snapshots: Vec<StepSnapshot> = plan
                .steps
                .iter()
                .map(|step| {
                    StepSnapshot::new(
                        step.id.clone(),
                        step.domain.clone(),
                        step.action.clone(),
                        !step.dependencies.is_empty(),
                    )
                })
                .collect();
            let adaptations = predictor.suggest_adaptations(&plan.id.to_string(), &snapshots);
            let force_parallel = adaptations.iter().any(|adaptation| {
                adaptation.kind == AdaptationKind::Parallelize
                    && adaptation.priority == AdaptationPriority::High
            });
            if force_parallel {
                plan.parallel_execution_possible = true;
            }
            if let Some(telemetry) = &self.telemetry {
                let _ = telemetry.log(
                    LogLevel::Debug,
                    "plan.adaptations",
                    json!({
                        "plan_id": plan.id,
                        "suggestions": adaptations.len(),
                        "forced_parallel": force_parallel,
                    }),
                );
            }
        }
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.plan_built(&plan);
        }
        Ok(plan)
    }
}
