use indexmap::IndexMap;

use crate::module::{ExecutionStep, PlanError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Validates step references and computes a topological execution order via
/// depth-first post-order traversal. Every dependency of a step appears
/// before the step itself; steps with no path between them keep their
/// supplied relative order. Revisiting a step that is still in progress
/// means the dependency graph loops, which fails construction instead of
/// recursing forever.
///
/// # Errors
/// Returns a [`PlanError`] for empty ids, duplicate ids, dangling
/// dependency references, or dependency cycles.
pub fn validate_and_order(steps: &[ExecutionStep]) -> Result<Vec<String>, PlanError> {
    let mut index: IndexMap<&str, usize> = IndexMap::with_capacity(steps.len());
    for (position, step) in steps.iter().enumerate() {
        if step.id.is_empty() {
            return Err(PlanError::EmptyStepId { position });
        }
        if index.insert(step.id.as_str(), position).is_some() {
            return Err(PlanError::DuplicateStepId {
                step: step.id.clone(),
            });
        }
    }
    for step in steps {
        for dependency in &step.dependencies {
            if !index.contains_key(dependency.as_str()) {
                return Err(PlanError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let mut marks = vec![Mark::Unvisited; steps.len()];
    let mut order = Vec::with_capacity(steps.len());
    for position in 0..steps.len() {
        if marks[position] == Mark::Unvisited {
            visit(position, steps, &index, &mut marks, &mut order)?;
        }
    }
    Ok(order)
}

fn visit(
    position: usize,
    steps: &[ExecutionStep],
    index: &IndexMap<&str, usize>,
    marks: &mut [Mark],
    order: &mut Vec<String>,
) -> Result<(), PlanError> {
    marks[position] = Mark::InProgress;
    for dependency in &steps[position].dependencies {
        let dep_position = index[dependency.as_str()];
        match marks[dep_position] {
            Mark::Done => {}
            Mark::InProgress => {
                return Err(PlanError::DependencyCycle {
                    step: dependency.clone(),
                });
            }
            Mark::Unvisited => visit(dep_position, steps, index, marks, order)?,
        }
    }
    marks[position] = Mark::Done;
    order.push(steps[position].id.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StepKind;

    fn step(id: &str, deps: &[&str]) -> ExecutionStep {
        let mut step = ExecutionStep::new(id, StepKind::EmailSearch, "email", "list");
        for dep in deps {
            step = step.depends_on(*dep);
        }
        step
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let steps = vec![
            step("c", &["b"]),
            step("b", &["a"]),
            step("a", &[]),
        ];
        let order = validate_and_order(&steps).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn every_step_appears_exactly_once() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a", "b"]),
        ];
        let order = validate_and_order(&steps).unwrap();
        assert_eq!(order.len(), 3);
        for s in &steps {
            assert_eq!(order.iter().filter(|id| *id == &s.id).count(), 1);
        }
    }

    #[test]
    fn unconstrained_steps_keep_supplied_order() {
        let steps = vec![step("x", &[]), step("y", &[]), step("z", &[])];
        assert_eq!(validate_and_order(&steps).unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn two_step_cycle_is_detected() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(matches!(
            validate_and_order(&steps),
            Err(PlanError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn self_dependency_is_detected() {
        let steps = vec![step("a", &["a"])];
        assert!(matches!(
            validate_and_order(&steps),
            Err(PlanError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let steps = vec![step("a", &[]), step("a", &[])];
        assert_eq!(
            validate_and_order(&steps).unwrap_err(),
            PlanError::DuplicateStepId { step: "a".into() }
        );
    }
}
