//! The task DAG for one mission.
//!
//! Invariant: acyclic at all times. The plan is mutated only by its owner
//! (the orchestrator's scheduling loop); node and edge insertion beyond
//! decomposition happens solely through [`Plan::inject_task`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::graph::detect_cycle;
use super::{BlockReason, Mission, Task, TaskResult, TaskState};
use crate::collaborator::{Reasoner, TaskProposal};
use crate::error::{Result, WayfarerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub mission_id: String,
    tasks: BTreeMap<String, Task>,
    #[serde(default)]
    next_seq: u32,
}

impl Plan {
    /// Decompose a mission into a plan. The actual decomposition is
    /// delegated to the reasoning collaborator; this function enforces the
    /// structural guarantees on what comes back.
    pub async fn decompose(mission: &Mission, reasoner: &dyn Reasoner) -> Result<Plan> {
        let proposals = reasoner.decompose(mission).await?;
        if proposals.is_empty() {
            return Err(WayfarerError::InvalidPlan(format!(
                "mission {}: decomposition produced no tasks",
                mission.id
            )));
        }
        let plan = Self::from_proposals(&mission.id, &proposals)?;
        info!(mission_id = %mission.id, tasks = plan.len(), "Plan accepted");
        Ok(plan)
    }

    /// Build a plan from collaborator proposals, assigning sequential task
    /// ids and rejecting unknown references and cycles.
    pub fn from_proposals(mission_id: &str, proposals: &[TaskProposal]) -> Result<Plan> {
        let mut id_by_ref: BTreeMap<&str, String> = BTreeMap::new();
        for (i, proposal) in proposals.iter().enumerate() {
            let id = format!("t-{:03}", i + 1);
            if id_by_ref.insert(proposal.ref_id.as_str(), id).is_some() {
                return Err(WayfarerError::InvalidPlan(format!(
                    "duplicate task reference '{}'",
                    proposal.ref_id
                )));
            }
        }

        let mut tasks = BTreeMap::new();
        for proposal in proposals {
            let id = id_by_ref[proposal.ref_id.as_str()].clone();
            let mut deps = Vec::with_capacity(proposal.depends_on.len());
            for dep_ref in &proposal.depends_on {
                let dep_id = id_by_ref.get(dep_ref.as_str()).ok_or_else(|| {
                    WayfarerError::InvalidPlan(format!(
                        "task '{}' depends on unknown task '{}'",
                        proposal.ref_id, dep_ref
                    ))
                })?;
                deps.push(dep_id.clone());
            }

            let task = Task::new(id.clone(), proposal.description.clone())
                .with_dependencies(deps)
                .with_complexity(proposal.complexity)
                .with_required_capabilities(proposal.required_capabilities.clone());
            tasks.insert(id, task);
        }

        let plan = Plan {
            mission_id: mission_id.to_string(),
            next_seq: tasks.len() as u32,
            tasks,
        };
        plan.assert_acyclic()?;
        Ok(plan)
    }

    fn assert_acyclic(&self) -> Result<()> {
        let deps: BTreeMap<String, Vec<String>> = self
            .tasks
            .values()
            .map(|t| (t.id.clone(), t.dependencies.clone()))
            .collect();
        if let Some(cycle) = detect_cycle(&deps) {
            return Err(WayfarerError::InvalidPlan(format!(
                "dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }
        Ok(())
    }

    pub fn task(&self, id: &str) -> Result<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| WayfarerError::TaskNotFound(id.to_string()))
    }

    pub fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| WayfarerError::TaskNotFound(id.to_string()))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn succeeded_ids(&self) -> Vec<&str> {
        self.tasks
            .values()
            .filter(|t| t.state == TaskState::Succeeded)
            .map(|t| t.id.as_str())
            .collect()
    }

    /// The next runnable task: lowest id whose dependencies are all
    /// succeeded and whose own state is pending. Deterministic by the map's
    /// id ordering.
    pub fn next_runnable(&self) -> Option<&Task> {
        let succeeded = self.succeeded_ids();
        self.tasks.values().find(|t| t.can_start(&succeeded))
    }

    /// All currently runnable task ids, in id order, for the worker pool.
    pub fn runnable_batch(&self) -> Vec<String> {
        let succeeded = self.succeeded_ids();
        self.tasks
            .values()
            .filter(|t| t.can_start(&succeeded))
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn record_outcome(&mut self, task_id: &str, result: TaskResult) -> Result<()> {
        let task = self.task_mut(task_id)?;
        if result.success {
            task.succeed(result);
        } else {
            task.fail(result.output);
        }
        debug!(task_id, state = %self.tasks[task_id].state, "Outcome recorded");
        Ok(())
    }

    /// Allocate the next sequential task id for an injected task.
    pub fn allocate_id(&mut self) -> String {
        self.next_seq += 1;
        format!("t-{:03}", self.next_seq)
    }

    /// Insert a task as a new prerequisite of `before`. Protocol-engine use
    /// only. The plan stays acyclic: an insertion that would close a cycle
    /// is rolled back and rejected.
    pub fn inject_task(&mut self, task: Task, before: &str) -> Result<()> {
        if !self.tasks.contains_key(before) {
            return Err(WayfarerError::TaskNotFound(before.to_string()));
        }
        if self.tasks.contains_key(&task.id) {
            return Err(WayfarerError::InvalidPlan(format!(
                "task id '{}' already present",
                task.id
            )));
        }

        let task_id = task.id.clone();
        self.tasks.insert(task_id.clone(), task);
        self.tasks
            .get_mut(before)
            .expect("checked above")
            .dependencies
            .push(task_id.clone());

        if let Err(err) = self.assert_acyclic() {
            let removed = self.tasks.remove(&task_id);
            debug_assert!(removed.is_some());
            if let Some(before_task) = self.tasks.get_mut(before) {
                before_task.dependencies.retain(|d| d != &task_id);
            }
            return Err(err);
        }

        debug!(task_id = %task_id, before, "Task injected as prerequisite");
        Ok(())
    }

    /// Crash recovery: a task found `Running` on load has no live worker;
    /// return it to the scheduler without touching its retry budget.
    pub fn reset_inflight(&mut self) {
        for task in self.tasks.values_mut() {
            if task.state == TaskState::Running {
                task.state = TaskState::Pending;
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tasks
            .values()
            .all(|t| t.state == TaskState::Succeeded)
    }

    /// No runnable work and nothing in flight, but the plan is not complete:
    /// the mission can make no further progress on its own.
    pub fn is_stalled(&self) -> bool {
        !self.is_complete()
            && self.runnable_batch().is_empty()
            && !self
                .tasks
                .values()
                .any(|t| t.state == TaskState::Running)
    }

    pub fn blocked_awaiting_human(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| {
                t.state
                    == TaskState::Blocked {
                        reason: BlockReason::AwaitingHuman,
                    }
            })
            .collect()
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded_ids().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::ComplexityClass;

    fn proposal(ref_id: &str, deps: &[&str]) -> TaskProposal {
        TaskProposal {
            ref_id: ref_id.to_string(),
            description: format!("do {}", ref_id),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            complexity: ComplexityClass::Routine,
            required_capabilities: Vec::new(),
        }
    }

    #[test]
    fn proposals_get_sequential_ids() {
        let plan = Plan::from_proposals(
            "m-001",
            &[proposal("setup", &[]), proposal("build", &["setup"])],
        )
        .unwrap();
        assert!(plan.task("t-001").is_ok());
        assert_eq!(plan.task("t-002").unwrap().dependencies, vec!["t-001"]);
    }

    #[test]
    fn cyclic_proposals_are_rejected() {
        let err = Plan::from_proposals(
            "m-001",
            &[proposal("a", &["b"]), proposal("b", &["a"])],
        )
        .unwrap_err();
        assert!(matches!(err, WayfarerError::InvalidPlan(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = Plan::from_proposals("m-001", &[proposal("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, WayfarerError::InvalidPlan(_)));
    }

    #[test]
    fn next_runnable_is_lowest_ready_id() {
        let mut plan = Plan::from_proposals(
            "m-001",
            &[
                proposal("a", &[]),
                proposal("b", &[]),
                proposal("c", &["a", "b"]),
            ],
        )
        .unwrap();

        assert_eq!(plan.next_runnable().unwrap().id, "t-001");
        plan.record_outcome("t-001", TaskResult::success("ok", 9.0)).unwrap();
        assert_eq!(plan.next_runnable().unwrap().id, "t-002");
        plan.record_outcome("t-002", TaskResult::success("ok", 9.0)).unwrap();
        assert_eq!(plan.next_runnable().unwrap().id, "t-003");
    }

    #[test]
    fn injected_task_gates_its_target() {
        let mut plan = Plan::from_proposals("m-001", &[proposal("a", &[])]).unwrap();
        let corrective_id = plan.allocate_id();
        plan.inject_task(Task::new(corrective_id.clone(), "install libfoo"), "t-001")
            .unwrap();

        assert_eq!(plan.next_runnable().unwrap().id, corrective_id);
        plan.record_outcome(&corrective_id, TaskResult::success("installed", 8.0))
            .unwrap();
        assert_eq!(plan.next_runnable().unwrap().id, "t-001");
    }

    #[test]
    fn cycle_closing_injection_rolls_back() {
        let mut plan = Plan::from_proposals(
            "m-001",
            &[proposal("a", &[]), proposal("b", &["a"])],
        )
        .unwrap();

        // t-003 depends on t-002, and is injected before t-001: t-002 -> t-003 -> t-001 -> t-002
        let bad = Task::new("t-003", "bad").with_dependencies(vec!["t-002".into()]);
        assert!(plan.inject_task(bad, "t-001").is_err());
        assert_eq!(plan.len(), 2);
        assert!(plan.task("t-001").unwrap().dependencies.is_empty());
    }

    #[test]
    fn stalled_when_only_blocked_tasks_remain() {
        let mut plan = Plan::from_proposals("m-001", &[proposal("a", &[])]).unwrap();
        plan.task_mut("t-001").unwrap().block(BlockReason::AwaitingHuman);
        assert!(plan.is_stalled());
        assert!(!plan.is_complete());
        assert_eq!(plan.blocked_awaiting_human().len(), 1);
    }
}
