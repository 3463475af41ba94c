use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    keywords::TriggerTable,
    module::{ExecutionPlan, ExecutionStep, PlanError, RequestIntent, StepKind},
};

/// Entity keys treated as concrete identifiers. A delete request carrying
/// one skips its lookup phase.
const IDENTIFIER_KEYS: [&str; 4] = ["id", "identifier", "ids", "entity_id"];

/// Generates execution steps from a classified request, one policy per
/// intent.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    triggers: TriggerTable,
}

impl PlanBuilder {
    /// Creates a builder with a custom trigger table.
    #[must_use]
    pub const fn new(triggers: TriggerTable) -> Self {
        Self { triggers }
    }

    /// Builds a plan for the request.
    ///
    /// # Errors
    /// Returns a [`PlanError`] when generated steps violate structural
    /// invariants; generation itself should never produce one, so an error
    /// here indicates a bug worth surfacing rather than swallowing.
    pub fn build(
        &self,
        query: &str,
        intent: RequestIntent,
        domains: &[String],
        entities: &IndexMap<String, Value>,
    ) -> Result<ExecutionPlan, PlanError> {
        let steps = match intent {
            RequestIntent::Search | RequestIntent::Query => {
                self.search_steps(query, domains, entities)
            }
            RequestIntent::Create => Self::create_steps(query, domains, entities),
            RequestIntent::Update => Self::mutation_steps(query, domains, entities, "update", false),
            RequestIntent::Delete => Self::mutation_steps(query, domains, entities, "delete", true),
            RequestIntent::Analyze => Self::analyze_steps(query, domains, entities),
        };
        ExecutionPlan::new(query, intent, domains.to_vec(), steps)
    }

    /// Search and default intents: restrict to domains whose exclusive
    /// keywords matched the query, falling back to every candidate. The
    /// action is `list` because list-style calls serve both "show me X" and
    /// "find X" phrasing.
    fn search_steps(
        &self,
        query: &str,
        domains: &[String],
        entities: &IndexMap<String, Value>,
    ) -> Vec<ExecutionStep> {
        self.triggers
            .filter(query, domains)
            .into_iter()
            .map(|domain| {
                ExecutionStep::new(
                    format!("search_{domain}"),
                    StepKind::search_for(&domain),
                    domain.clone(),
                    "list",
                )
                .with_parameters(base_parameters(query, entities))
            })
            .collect()
    }

    /// Creation never needs a prior search.
    fn create_steps(
        query: &str,
        domains: &[String],
        entities: &IndexMap<String, Value>,
    ) -> Vec<ExecutionStep> {
        domains
            .iter()
            .map(|domain| {
                ExecutionStep::new(
                    format!("create_{domain}"),
                    StepKind::create_for(domain),
                    domain.clone(),
                    "create",
                )
                .with_parameters(base_parameters(query, entities))
            })
            .collect()
    }

    /// Updates and deletes locate their target first, then act on it within
    /// the same domain. Deletes skip the lookup when the entities already
    /// carry a concrete identifier.
    fn mutation_steps(
        query: &str,
        domains: &[String],
        entities: &IndexMap<String, Value>,
        action: &str,
        skippable_search: bool,
    ) -> Vec<ExecutionStep> {
        let skip_search = skippable_search && has_identifier(entities);
        let mut steps = Vec::new();
        for domain in domains {
            let search_id = format!("search_{domain}");
            if !skip_search {
                steps.push(
                    ExecutionStep::new(
                        search_id.clone(),
                        StepKind::search_for(domain),
                        domain.clone(),
                        "list",
                    )
                    .with_parameters(base_parameters(query, entities)),
                );
            }
            let mut act = ExecutionStep::new(
                format!("{action}_{domain}"),
                StepKind::mutate_for(domain),
                domain.clone(),
                action,
            )
            .with_parameters(base_parameters(query, entities));
            if !skip_search {
                act = act.depends_on(search_id);
            }
            steps.push(act);
        }
        steps
    }

    /// Analysis searches every domain and synthesizes across the results.
    fn analyze_steps(
        query: &str,
        domains: &[String],
        entities: &IndexMap<String, Value>,
    ) -> Vec<ExecutionStep> {
        let mut steps: Vec<ExecutionStep> = domains
            .iter()
            .map(|domain| {
                ExecutionStep::new(
                    format!("search_{domain}"),
                    StepKind::search_for(domain),
                    domain.clone(),
                    "list",
                )
                .with_parameters(base_parameters(query, entities))
            })
            .collect();
        let mut synthesis = ExecutionStep::new(
            "synthesize",
            StepKind::Synthesis,
            "synthesis",
            "synthesize",
        )
        .with_parameters(base_parameters(query, entities));
        for step in &steps {
            synthesis = synthesis.depends_on(step.id.clone());
        }
        steps.push(synthesis);
        steps
    }
}

fn base_parameters(query: &str, entities: &IndexMap<String, Value>) -> IndexMap<String, Value> {
    let mut parameters = IndexMap::with_capacity(entities.len() + 1);
    parameters.insert("query".to_string(), Value::String(query.to_string()));
    for (key, value) in entities {
        parameters.insert(key.clone(), value.clone());
    }
    parameters
}

fn has_identifier(entities: &IndexMap<String, Value>) -> bool {
    IDENTIFIER_KEYS
        .iter()
        .any(|key| entities.get(*key).is_some_and(|value| !value.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn build(
        query: &str,
        intent: RequestIntent,
        names: &[&str],
        entities: IndexMap<String, Value>,
    ) -> ExecutionPlan {
        PlanBuilder::default()
            .build(query, intent, &domains(names), &entities)
            .unwrap()
    }

    #[test]
    fn inbox_query_restricts_search_to_email() {
        let plan = build(
            "inbox",
            RequestIntent::Search,
            &["email", "calendar"],
            IndexMap::new(),
        );
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].domain, "email");
        assert_eq!(plan.steps[0].action, "list");
        assert_eq!(plan.steps[0].kind, StepKind::EmailSearch);
    }

    #[test]
    fn neutral_query_searches_every_domain() {
        let plan = build(
            "anything new?",
            RequestIntent::Search,
            &["email", "calendar", "tasks"],
            IndexMap::new(),
        );
        assert_eq!(plan.steps.len(), 3);
        assert!(plan.parallel_execution_possible);
    }

    #[test]
    fn create_steps_have_no_dependencies() {
        let plan = build(
            "add a meeting",
            RequestIntent::Create,
            &["calendar"],
            IndexMap::new(),
        );
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, "create");
        assert_eq!(plan.steps[0].kind, StepKind::CalendarCreate);
        assert!(plan.steps[0].dependencies.is_empty());
    }

    #[test]
    fn update_searches_then_acts_within_domain() {
        let plan = build(
            "move my meeting",
            RequestIntent::Update,
            &["calendar"],
            IndexMap::new(),
        );
        assert_eq!(plan.execution_order(), vec!["search_calendar", "update_calendar"]);
        let update = plan.step("update_calendar").unwrap();
        assert_eq!(update.dependencies, vec!["search_calendar".to_string()]);
        assert_eq!(update.kind, StepKind::CalendarUpdate);
    }

    #[test]
    fn delete_with_identifier_skips_search() {
        let mut entities = IndexMap::new();
        entities.insert("id".to_string(), json!("msg-42"));
        let plan = build("delete that", RequestIntent::Delete, &["email"], entities);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].id, "delete_email");
        assert!(plan.steps[0].dependencies.is_empty());
    }

    #[test]
    fn delete_without_identifier_searches_first() {
        let plan = build(
            "delete the old reminder",
            RequestIntent::Delete,
            &["tasks"],
            IndexMap::new(),
        );
        assert_eq!(plan.execution_order(), vec!["search_tasks", "delete_tasks"]);
    }

    #[test]
    fn analyze_synthesizes_over_all_searches() {
        let plan = build(
            "how was my week",
            RequestIntent::Analyze,
            &["email", "calendar"],
            IndexMap::new(),
        );
        assert_eq!(plan.steps.len(), 3);
        let synthesis = plan.step("synthesize").unwrap();
        assert_eq!(synthesis.kind, StepKind::Synthesis);
        assert_eq!(synthesis.dependencies.len(), 2);
        // Synthesis depends across domains, so the plan is sequential.
        assert!(!plan.parallel_execution_possible);
        let order = plan.execution_order();
        assert_eq!(order.last(), Some(&"synthesize"));
    }

    #[test]
    fn unknown_domains_become_conditional_steps() {
        let plan = build(
            "find the doc",
            RequestIntent::Search,
            &["notion"],
            IndexMap::new(),
        );
        assert_eq!(plan.steps[0].kind, StepKind::Conditional);
        assert_eq!(plan.steps[0].domain, "notion");
    }

    #[test]
    fn parameters_carry_query_and_entities() {
        let mut entities = IndexMap::new();
        entities.insert("person".to_string(), json!("grace"));
        let plan = build("mail from grace", RequestIntent::Search, &["email"], entities);
        let step = &plan.steps[0];
        assert_eq!(step.parameters.get("query"), Some(&json!("mail from grace")));
        assert_eq!(step.parameters.get("person"), Some(&json!("grace")));
    }
}
