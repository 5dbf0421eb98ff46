//! The escalation controller: ReAct or Tree-of-Thoughts, per step.
//!
//! A pure decision function with no side effects, so the policy is testable
//! as plain classification.

use crate::mission::Task;
use crate::protocol::{FailureAnalysis, FailureKind};

/// Escalate to multi-path search when the task is tagged with a
/// high-complexity planning class (before any attempt), or when the last
/// failure's root cause is not uniquely identifiable.
pub fn should_escalate_to_tot(task: &Task, last_failure: Option<&FailureAnalysis>) -> bool {
    if task.complexity.is_planning_class() {
        return true;
    }
    matches!(
        last_failure,
        Some(FailureAnalysis {
            kind: FailureKind::Ambiguous,
            ..
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::ComplexityClass;

    #[test]
    fn planning_classes_escalate_before_any_attempt() {
        let task = Task::new("t-001", "pick a storage engine")
            .with_complexity(ComplexityClass::ArchitectureSelection);
        assert!(should_escalate_to_tot(&task, None));
    }

    #[test]
    fn routine_tasks_do_not_escalate_without_failure() {
        let task = Task::new("t-001", "run: make");
        assert!(!should_escalate_to_tot(&task, None));
    }

    #[test]
    fn ambiguous_failures_escalate() {
        let task = Task::new("t-001", "run: make");
        let ambiguous = FailureAnalysis::new("t-001", FailureKind::Ambiguous, "multi-cause build failure");
        assert!(should_escalate_to_tot(&task, Some(&ambiguous)));
    }

    #[test]
    fn classifiable_failures_do_not_escalate() {
        use crate::protocol::FailureCategory;

        let task = Task::new("t-001", "run: make");
        let transient = FailureAnalysis::new(
            "t-001",
            FailureKind::Transient(FailureCategory::MissingDependency),
            "cmake: command not found",
        );
        assert!(!should_escalate_to_tot(&task, Some(&transient)));
    }
}
