use std::collections::{HashMap, HashSet, VecDeque};
use switchyard_core::{Order, Plan, Selection, SwitchyardError};
use thiserror::Error;

/// Reasons a plan must not be executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan has no tasks")]
    EmptyPlan,

    #[error("task id '{0}' appears more than once")]
    DuplicateTaskId(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// `referenced_by` is an order id or a task id.
    #[error("'{referenced_by}' references worker '{worker}' which is not in the selection")]
    UnknownAgent { worker: String, referenced_by: String },

    #[error("dependency cycle among tasks: {}", .tasks.join(", "))]
    CycleDetected { tasks: Vec<String> },
}

impl PlanError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::EmptyPlan => "empty_plan",
            PlanError::DuplicateTaskId(_) => "duplicate_task",
            PlanError::UnknownDependency { .. } => "unknown_dep",
            PlanError::UnknownAgent { .. } => "unknown_agent",
            PlanError::CycleDetected { .. } => "cycle_detected",
        }
    }

    /// What to change so the plan validates.
    pub fn hint(&self) -> &'static str {
        match self {
            PlanError::EmptyPlan => "produce at least one task",
            PlanError::DuplicateTaskId(_) => "give every task a unique id",
            PlanError::UnknownDependency { .. } => {
                "every dependsOn entry must name a task id defined in the same plan"
            }
            PlanError::UnknownAgent { .. } => {
                "assign tasks and orders only to workers from the current selection"
            }
            PlanError::CycleDetected { .. } => {
                "remove or reverse a dependency so the task graph is acyclic"
            }
        }
    }
}

impl From<PlanError> for SwitchyardError {
    fn from(err: PlanError) -> Self {
        SwitchyardError::PlanRejected {
            code: err.code(),
            message: err.to_string(),
            hint: err.hint(),
        }
    }
}

/// Check a plan before execution. Pure; the plan is never modified.
///
/// Checks run in a fixed order and the first failure is returned: non-empty
/// plan, unique task ids, known dependencies, order workers in the selection,
/// task workers in the selection, acyclicity.
pub fn validate(selection: &Selection, plan: &Plan, orders: &[Order]) -> Result<(), PlanError> {
    if plan.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let mut ids = HashSet::with_capacity(plan.len());
    for task in plan.tasks() {
        if !ids.insert(task.id.as_str()) {
            return Err(PlanError::DuplicateTaskId(task.id.clone()));
        }
    }

    for task in plan.tasks() {
        if let Some(dep) = task.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(PlanError::UnknownDependency {
                task: task.id.clone(),
                dependency: dep.clone(),
            });
        }
    }

    for order in orders {
        if !selection.contains(&order.worker_id) {
            return Err(PlanError::UnknownAgent {
                worker: order.worker_id.clone(),
                referenced_by: order.order_id.clone(),
            });
        }
    }

    for task in plan.tasks() {
        if !selection.contains(&task.worker_id) {
            return Err(PlanError::UnknownAgent {
                worker: task.worker_id.clone(),
                referenced_by: task.id.clone(),
            });
        }
    }

    topological_order(plan).map(|_| ())
}

/// Kahn's algorithm; ties keep plan order.
///
/// Dependencies on ids outside the plan are ignored here, [`validate`]
/// reports them.
pub fn topological_order(plan: &Plan) -> Result<Vec<String>, PlanError> {
    let position: HashMap<&str, usize> = plan
        .tasks()
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; plan.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plan.len()];
    for (i, task) in plan.tasks().iter().enumerate() {
        let deps: HashSet<&str> = task.depends_on.iter().map(String::as_str).collect();
        for dep in deps {
            if let Some(&d) = position.get(dep) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..plan.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(plan.len());
    while let Some(i) = queue.pop_front() {
        order.push(plan.tasks()[i].id.clone());
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < plan.len() {
        let tasks = plan
            .tasks()
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, t)| t.id.clone())
            .collect();
        return Err(PlanError::CycleDetected { tasks });
    }

    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use switchyard_core::Task;

    fn selection() -> Selection {
        Selection::from_ids(["backend", "tester"], "test")
    }

    #[test]
    fn test_valid_plan() {
        let plan = Plan::new(vec![
            Task::new("A", "build", "backend"),
            Task::new("B", "test", "tester").depends_on(["A"]),
        ]);
        let orders = vec![Order::new("O1", "backend"), Order::new("O2", "tester")];
        assert!(validate(&selection(), &plan, &orders).is_ok());
    }

    #[test]
    fn test_empty_plan() {
        let err = validate(&selection(), &Plan::default(), &[]).unwrap_err();
        assert_eq!(err.code(), "empty_plan");
    }

    #[test]
    fn test_duplicate_task() {
        let plan = Plan::new(vec![
            Task::new("A", "one", "backend"),
            Task::new("A", "two", "backend"),
        ]);
        let err = validate(&selection(), &plan, &[]).unwrap_err();
        assert_eq!(err, PlanError::DuplicateTaskId("A".into()));
        assert_eq!(err.code(), "duplicate_task");
    }

    #[test]
    fn test_unknown_dependency() {
        let plan = Plan::new(vec![Task::new("A", "one", "backend").depends_on(["Z"])]);
        let err = validate(&selection(), &plan, &[]).unwrap_err();
        assert_eq!(err.code(), "unknown_dep");
        assert!(err.to_string().contains("'Z'"));
    }

    #[test]
    fn test_cycle() {
        let plan = Plan::new(vec![
            Task::new("A", "one", "backend").depends_on(["B"]),
            Task::new("B", "two", "tester").depends_on(["A"]),
        ]);
        let err = validate(&selection(), &plan, &[]).unwrap_err();
        assert_eq!(err.code(), "cycle_detected");
        assert_eq!(
            err,
            PlanError::CycleDetected {
                tasks: vec!["A".into(), "B".into()]
            }
        );
    }

    #[test]
    fn test_order_for_unselected_worker() {
        let plan = Plan::new(vec![Task::new("A", "one", "backend")]);
        let orders = vec![Order::new("O9", "designer")];
        let err = validate(&selection(), &plan, &orders).unwrap_err();
        assert_eq!(err.code(), "unknown_agent");
        assert!(matches!(err, PlanError::UnknownAgent { ref referenced_by, .. } if referenced_by == "O9"));
    }

    #[test]
    fn test_task_for_unselected_worker() {
        let plan = Plan::new(vec![Task::new("A", "one", "designer")]);
        let err = validate(&selection(), &plan, &[]).unwrap_err();
        assert_eq!(err.code(), "unknown_agent");
    }

    #[test]
    fn test_checks_run_in_order() {
        // Unknown dependency is reported before the cycle and the unknown worker.
        let plan = Plan::new(vec![
            Task::new("A", "one", "ghost").depends_on(["B", "Z"]),
            Task::new("B", "two", "backend").depends_on(["A"]),
        ]);
        assert_eq!(validate(&selection(), &plan, &[]).unwrap_err().code(), "unknown_dep");
    }

    #[test]
    fn test_topological_order_keeps_plan_order_for_ties() {
        let plan = Plan::new(vec![
            Task::new("C", "c", "backend").depends_on(["A"]),
            Task::new("A", "a", "backend"),
            Task::new("B", "b", "backend"),
            Task::new("D", "d", "tester").depends_on(["C", "B"]),
        ]);
        assert_eq!(topological_order(&plan).unwrap(), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_error_converts_with_hint() {
        let err: SwitchyardError = PlanError::EmptyPlan.into();
        match err {
            SwitchyardError::PlanRejected { code, hint, .. } => {
                assert_eq!(code, "empty_plan");
                assert!(!hint.is_empty());
            }
            other => panic!("Expected PlanRejected, got {other:?}"),
        }
    }
}
