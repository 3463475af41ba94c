use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::order::validate_and_order;

/// Crude throughput heuristic used for the plan duration estimate; callers
/// should not treat the estimate as authoritative.
pub const STEPS_PER_SECOND: f64 = 2.0;

/// Structural errors raised at plan construction time. A plan carrying any
/// of these never reaches the executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A step was supplied without an id.
    #[error("step at position {position} has an empty id")]
    EmptyStepId {
        /// Position of the offending step in the supplied order.
        position: usize,
    },
    /// Two steps share one id.
    #[error("step id `{step}` appears more than once in the plan")]
    DuplicateStepId {
        /// The duplicated id.
        step: String,
    },
    /// A dependency references an id not present in the plan.
    #[error("step `{step}` depends on unknown step `{dependency}`")]
    UnknownDependency {
        /// Step declaring the dependency.
        step: String,
        /// The dangling reference.
        dependency: String,
    },
    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected through step `{step}`")]
    DependencyCycle {
        /// A step on the cycle.
        step: String,
    },
}

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Search over mail.
    EmailSearch,
    /// Mutating mail action.
    EmailAction,
    /// Search over calendar entries.
    CalendarSearch,
    /// Create a calendar entry.
    CalendarCreate,
    /// Update or remove a calendar entry.
    CalendarUpdate,
    /// Search over tasks.
    TaskSearch,
    /// Create a task.
    TaskCreate,
    /// Update or remove a task.
    TaskUpdate,
    /// Combine prior step results.
    Synthesis,
    /// Generic passthrough for domains the engine does not model.
    Conditional,
}

impl StepKind {
    /// Search kind for a domain.
    #[must_use]
    pub fn search_for(domain: &str) -> Self {
        match domain {
            "email" => Self::EmailSearch,
            "calendar" => Self::CalendarSearch,
            "tasks" => Self::TaskSearch,
            _ => Self::Conditional,
        }
    }

    /// Creation kind for a domain.
    #[must_use]
    pub fn create_for(domain: &str) -> Self {
        match domain {
            "email" => Self::EmailAction,
            "calendar" => Self::CalendarCreate,
            "tasks" => Self::TaskCreate,
            _ => Self::Conditional,
        }
    }

    /// Mutation kind for a domain (updates and deletes).
    #[must_use]
    pub fn mutate_for(domain: &str) -> Self {
        match domain {
            "email" => Self::EmailAction,
            "calendar" => Self::CalendarUpdate,
            "tasks" => Self::TaskUpdate,
            _ => Self::Conditional,
        }
    }

    /// Stable label used when recording executed steps.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::EmailSearch => "email_search",
            Self::EmailAction => "email_action",
            Self::CalendarSearch => "calendar_search",
            Self::CalendarCreate => "calendar_create",
            Self::CalendarUpdate => "calendar_update",
            Self::TaskSearch => "task_search",
            Self::TaskCreate => "task_create",
            Self::TaskUpdate => "task_update",
            Self::Synthesis => "synthesis",
            Self::Conditional => "conditional",
        }
    }
}

/// Retry discipline enforced by the external plan executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retry attempts per step.
    pub max_retries: u32,
    /// Timeout per attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// One unit of work inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Id unique within the plan.
    pub id: String,
    /// Kind of work.
    pub kind: StepKind,
    /// Target subsystem (e.g. `email`).
    pub domain: String,
    /// Verb understood by the domain's executor (e.g. `list`).
    pub action: String,
    /// Opaque parameters passed through to the executor.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, serde_json::Value>,
    /// Ids of steps that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Retry discipline.
    pub retry_policy: RetryPolicy,
}

impl ExecutionStep {
    /// Creates a step with no parameters or dependencies.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: StepKind,
        domain: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            domain: domain.into(),
            action: action.into(),
            parameters: IndexMap::new(),
            dependencies: Vec::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the parameter map.
    #[must_use]
    pub fn with_parameters(mut self, parameters: IndexMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Declares a dependency on another step.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }
}

/// Classified intent of the inbound request. Unknown intents fall back to
/// `Query`, which plans like a search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestIntent {
    /// Find existing items.
    Search,
    /// Create new items.
    Create,
    /// Modify existing items.
    Update,
    /// Remove existing items.
    Delete,
    /// Gather and synthesize across domains.
    Analyze,
    /// Default / unclassified.
    Query,
}

impl RequestIntent {
    /// Parses the upstream intent string; anything unrecognized is `Query`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "search" => Self::Search,
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "analyze" => Self::Analyze,
            _ => Self::Query,
        }
    }

    /// Stable label for signatures and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Analyze => "analyze",
            Self::Query => "query",
        }
    }
}

/// Directed graph of steps produced for one user request. Built once by the
/// plan builder, optionally adapted before execution, then immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Plan identifier.
    pub id: Uuid,
    /// Raw query text the plan was built from.
    pub query: String,
    /// Classified intent.
    pub intent: RequestIntent,
    /// Candidate domains supplied by upstream classification.
    pub domains: Vec<String>,
    /// Steps stored in a valid execution order (dependencies first).
    pub steps: Vec<ExecutionStep>,
    /// Whether all steps partition into domains with no cross-domain
    /// dependencies.
    pub parallel_execution_possible: bool,
    /// Crude duration estimate; not authoritative.
    pub estimated_duration: Duration,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Validates and orders the supplied steps into a plan.
    ///
    /// # Errors
    /// Returns a [`PlanError`] for empty or duplicate ids, dangling
    /// dependency references, or dependency cycles.
    pub fn new(
        query: impl Into<String>,
        intent: RequestIntent,
        domains: Vec<String>,
        steps: Vec<ExecutionStep>,
    ) -> Result<Self, PlanError> {
        let order = validate_and_order(&steps)?;
        let mut by_id: IndexMap<String, ExecutionStep> = steps
            .into_iter()
            .map(|step| (step.id.clone(), step))
            .collect();
        let mut ordered = Vec::with_capacity(order.len());
        for id in &order {
            if let Some(step) = by_id.shift_remove(id) {
                ordered.push(step);
            }
        }
        let parallel_execution_possible = domain_partitions_independent(&ordered);
        #[allow(clippy::cast_precision_loss)]
        let estimated_duration = Duration::from_secs_f64(ordered.len() as f64 / STEPS_PER_SECOND);
        Ok(Self {
            id: Uuid::new_v4(),
            query: query.into(),
            intent,
            domains,
            steps: ordered,
            parallel_execution_possible,
            estimated_duration,
            created_at: Utc::now(),
        })
    }

    /// Step ids in execution order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.id.as_str()).collect()
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|step| step.id == id)
    }
}

/// A plan is parallel-eligible when no step depends on a step from another
/// domain partition.
fn domain_partitions_independent(steps: &[ExecutionStep]) -> bool {
    let domain_of: IndexMap<&str, &str> = steps
        .iter()
        .map(|step| (step.id.as_str(), step.domain.as_str()))
        .collect();
    steps.iter().all(|step| {
        step.dependencies.iter().all(|dep| {
            domain_of
                .get(dep.as_str())
                .map_or(false, |domain| *domain == step.domain)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_dangling_dependency() {
        let steps = vec![
            ExecutionStep::new("a", StepKind::EmailSearch, "email", "list"),
            ExecutionStep::new("b", StepKind::EmailAction, "email", "update").depends_on("ghost"),
        ];
        let err = ExecutionPlan::new("q", RequestIntent::Update, vec!["email".into()], steps)
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownDependency {
                step: "b".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn construction_rejects_empty_id() {
        let steps = vec![ExecutionStep::new("", StepKind::EmailSearch, "email", "list")];
        let err =
            ExecutionPlan::new("q", RequestIntent::Search, vec!["email".into()], steps).unwrap_err();
        assert_eq!(err, PlanError::EmptyStepId { position: 0 });
    }

    #[test]
    fn steps_are_stored_in_dependency_order() {
        let steps = vec![
            ExecutionStep::new("act", StepKind::EmailAction, "email", "update")
                .depends_on("search"),
            ExecutionStep::new("search", StepKind::EmailSearch, "email", "list"),
        ];
        let plan =
            ExecutionPlan::new("q", RequestIntent::Update, vec!["email".into()], steps).unwrap();
        assert_eq!(plan.execution_order(), vec!["search", "act"]);
    }

    #[test]
    fn cross_domain_dependency_disables_parallelism() {
        let steps = vec![
            ExecutionStep::new("s1", StepKind::EmailSearch, "email", "list"),
            ExecutionStep::new("s2", StepKind::Synthesis, "synthesis", "synthesize")
                .depends_on("s1"),
        ];
        let plan =
            ExecutionPlan::new("q", RequestIntent::Analyze, vec!["email".into()], steps).unwrap();
        assert!(!plan.parallel_execution_possible);
    }

    #[test]
    fn independent_domains_stay_parallel_eligible() {
        let steps = vec![
            ExecutionStep::new("s1", StepKind::EmailSearch, "email", "list"),
            ExecutionStep::new("s2", StepKind::CalendarSearch, "calendar", "list"),
        ];
        let plan =
            ExecutionPlan::new("q", RequestIntent::Search, vec!["email".into()], steps).unwrap();
        assert!(plan.parallel_execution_possible);
    }

    #[test]
    fn duration_estimate_uses_throughput_constant() {
        let steps = vec![
            ExecutionStep::new("s1", StepKind::EmailSearch, "email", "list"),
            ExecutionStep::new("s2", StepKind::CalendarSearch, "calendar", "list"),
            ExecutionStep::new("s3", StepKind::TaskSearch, "tasks", "list"),
        ];
        let plan =
            ExecutionPlan::new("q", RequestIntent::Search, vec!["email".into()], steps).unwrap();
        assert_eq!(plan.estimated_duration, Duration::from_millis(1500));
    }

    #[test]
    fn intent_parsing_defaults_to_query() {
        assert_eq!(RequestIntent::parse("Search"), RequestIntent::Search);
        assert_eq!(RequestIntent::parse("unknown"), RequestIntent::Query);
    }

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
    }
}
