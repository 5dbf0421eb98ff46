//! Mission scheduling: the worker pool and the plan's owning loop.
//!
//! The orchestrator owns each mission's plan and mutates it only from its
//! scheduling loop. Runnable tasks fan out to workers bounded by a
//! semaphore and are joined per round; failures come back as analyses and
//! go through the protocol engine, on this thread, before the next round.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info};

use super::signal::SignalHandle;
use super::worker::{AttemptOutcome, TaskWorker};
use crate::collaborator::{Reasoner, Research};
use crate::config::WayfarerConfig;
use crate::context::ContextCurator;
use crate::error::{Result, WayfarerError};
use crate::escalation::{EscalationHandler, EscalationPayload, Resolution};
use crate::gateway::{Observation, ToolGateway};
use crate::goal::{GoalManager, GoalState};
use crate::knowledge::KnowledgeStore;
use crate::memory::{EpisodicMemory, RecordCategory};
use crate::mission::{
    Mission, MissionSnapshot, MissionState, MissionStore, Plan, TaskResult, TaskState,
};
use crate::protocol::{FailureAnalysis, FailureCategory, FailureKind, ProtocolEngine};
use crate::reasoning::{ReactExecutor, TotEngine};
use crate::reflexion::ReflexionEngine;
use crate::registry::CapabilityRegistry;
use crate::utils::head_line;

#[derive(Debug, Clone)]
pub struct MissionReport {
    pub mission_id: String,
    pub status: MissionState,
    pub tasks_total: usize,
    pub tasks_succeeded: usize,
    pub blocked: Vec<String>,
    pub iterations: u32,
}

pub struct Orchestrator {
    cfg: WayfarerConfig,
    store: MissionStore,
    goals: Arc<GoalManager>,
    memory: Arc<EpisodicMemory>,
    registry: Arc<CapabilityRegistry>,
    gateway: Arc<ToolGateway>,
    knowledge: Arc<KnowledgeStore>,
    reflexion: Arc<ReflexionEngine>,
    reasoner: Arc<dyn Reasoner>,
    protocol: ProtocolEngine,
    worker: Arc<TaskWorker>,
    signal: SignalHandle,
}

impl Orchestrator {
    /// Wire the full stack against a data directory. Returns the receiving
    /// end of the operator-facing escalation channel alongside.
    pub async fn open(
        data_dir: &Path,
        cfg: WayfarerConfig,
        reasoner: Arc<dyn Reasoner>,
        research: Arc<dyn Research>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EscalationPayload>)> {
        cfg.validate()?;
        tokio::fs::create_dir_all(data_dir).await?;

        let store = MissionStore::new(data_dir);
        store.init().await?;
        let goals = Arc::new(GoalManager::new(data_dir));
        goals.init().await?;
        let memory = Arc::new(EpisodicMemory::open(data_dir.join("memory.db"))?);
        let knowledge = Arc::new(KnowledgeStore::open(data_dir.join("knowledge"))?);

        let registry = Arc::new(CapabilityRegistry::new());
        let gateway = Arc::new(ToolGateway::new(
            registry.clone(),
            cfg.registry.verify_threshold,
        ));

        let curator = Arc::new(ContextCurator::new(
            memory.clone(),
            registry.clone(),
            goals.clone(),
            cfg.context.clone(),
        ));
        let reflexion = Arc::new(ReflexionEngine::new(
            memory.clone(),
            registry.clone(),
            cfg.reflexion.clone(),
        ));

        let tool_timeout = Duration::from_secs(cfg.react.tool_timeout_secs);
        let react = Arc::new(ReactExecutor::new(
            reasoner.clone(),
            gateway.clone(),
            tool_timeout,
        ));
        let tot = Arc::new(TotEngine::new(
            reasoner.clone(),
            gateway.clone(),
            cfg.tot.clone(),
            tool_timeout,
        ));

        let (escalation, escalation_rx) = EscalationHandler::channel();
        let protocol = ProtocolEngine::new(
            reasoner.clone(),
            research,
            knowledge.clone(),
            registry.clone(),
            gateway.clone(),
            memory.clone(),
            escalation,
            cfg.recovery.clone(),
            cfg.research.clone(),
        );

        let worker = Arc::new(TaskWorker::new(
            curator,
            react,
            tot,
            reflexion.clone(),
            registry.clone(),
            memory.clone(),
            cfg.react.clone(),
            cfg.research.min_capability_confidence,
        ));

        Ok((
            Self {
                cfg,
                store,
                goals,
                memory,
                registry,
                gateway,
                knowledge,
                reflexion,
                reasoner,
                protocol,
                worker,
                signal: SignalHandle::new(),
            },
            escalation_rx,
        ))
    }

    pub fn gateway(&self) -> Arc<ToolGateway> {
        self.gateway.clone()
    }

    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        self.registry.clone()
    }

    pub fn knowledge(&self) -> Arc<KnowledgeStore> {
        self.knowledge.clone()
    }

    pub fn memory(&self) -> Arc<EpisodicMemory> {
        self.memory.clone()
    }

    pub fn signal(&self) -> SignalHandle {
        self.signal.clone()
    }

    pub async fn create_mission(&self, prime_directive: &str) -> Result<Mission> {
        let id = self.store.next_id().await?;
        let mission = Mission::new(&id, prime_directive);
        self.store
            .save(&MissionSnapshot {
                mission: mission.clone(),
                plan: None,
            })
            .await?;
        info!(mission_id = %id, "Mission created");
        Ok(mission)
    }

    pub async fn missions(&self) -> Result<Vec<MissionSnapshot>> {
        self.store.list().await
    }

    pub async fn snapshot(&self, mission_id: &str) -> Result<MissionSnapshot> {
        self.store.load(mission_id).await
    }

    /// Execute a mission to a terminal or suspended state. Safe to call
    /// again on an `Escalated` mission after `resolve`.
    pub async fn run(&self, mission_id: &str) -> Result<MissionReport> {
        let MissionSnapshot { mut mission, plan } = self.store.load(mission_id).await?;
        self.signal.reset();

        if mission.status.is_terminal() {
            return Ok(match &plan {
                Some(plan) => self.report(&mission, plan, 0),
                None => MissionReport {
                    mission_id: mission.id.clone(),
                    status: mission.status,
                    tasks_total: 0,
                    tasks_succeeded: 0,
                    blocked: Vec::new(),
                    iterations: 0,
                },
            });
        }

        let mut plan = match plan {
            Some(mut plan) => {
                plan.reset_inflight();
                if mission.status == MissionState::Escalated {
                    mission.transition(MissionState::Running, "resumed after operator input")?;
                }
                plan
            }
            None => {
                mission.transition(MissionState::Planning, "decomposing mission")?;
                self.checkpoint(&mission, None).await?;

                let plan = match Plan::decompose(&mission, self.reasoner.as_ref()).await {
                    Ok(plan) => plan,
                    Err(err) => {
                        // A malformed plan is never executed: fatal to the
                        // mission, surfaced to the operator.
                        error!(mission_id = %mission.id, error = %err, "Plan rejected");
                        mission.transition(MissionState::Failed, err.to_string())?;
                        self.checkpoint(&mission, None).await?;
                        return Err(err);
                    }
                };

                let goal = GoalState::new(
                    &mission.id,
                    &mission.prime_directive,
                    plan.tasks().map(|t| t.description.clone()).collect(),
                );
                self.goals.save(&goal).await?;
                mission.transition(MissionState::Running, "plan accepted")?;
                plan
            }
        };
        self.checkpoint(&mission, Some(&plan)).await?;

        let semaphore = Arc::new(Semaphore::new(self.cfg.orchestrator.max_parallel_tasks));
        let mut iterations = 0u32;

        loop {
            if self.signal.is_cancelled() {
                mission.transition(MissionState::Cancelled, "cancellation signal")?;
                break;
            }
            if plan.is_complete() {
                mission.transition(MissionState::Completed, "all tasks succeeded")?;
                break;
            }

            let batch = plan.runnable_batch();
            if batch.is_empty() {
                if plan.blocked_awaiting_human().is_empty() {
                    mission.transition(MissionState::Failed, "no progress possible")?;
                } else {
                    mission
                        .transition(MissionState::Escalated, "blocked tasks await operator input")?;
                }
                break;
            }

            iterations += 1;
            if iterations > self.cfg.orchestrator.max_iterations {
                mission.transition(MissionState::Failed, "scheduling-round budget exhausted")?;
                break;
            }
            debug!(mission_id = %mission.id, round = iterations, tasks = batch.len(), "Scheduling round");

            let mut handles = Vec::with_capacity(batch.len());
            for task_id in batch {
                plan.task_mut(&task_id)?.start();
                let worker = self.worker.clone();
                let semaphore = semaphore.clone();
                let cancel = self.signal.subscribe();
                let task = plan.task(&task_id)?.clone();
                let mission_id = mission.id.clone();

                handles.push((
                    task_id,
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        worker.attempt(&mission_id, task, cancel).await
                    }),
                ));
            }
            self.checkpoint(&mission, Some(&plan)).await?;

            let joined = join_all(handles.into_iter().map(|(task_id, handle)| async move {
                (task_id, handle.await)
            }))
            .await;

            for (task_id, joined_result) in joined {
                let report = match joined_result {
                    Ok(report) => report,
                    Err(join_err) => {
                        error!(task_id = %task_id, error = %join_err, "Worker panicked");
                        plan.record_outcome(&task_id, TaskResult::failure(join_err.to_string()))?;
                        let analysis = FailureAnalysis::new(
                            &task_id,
                            FailureKind::Transient(FailureCategory::Runtime),
                            join_err.to_string(),
                        );
                        self.protocol
                            .handle_failure(&mission.id, &mut plan, &analysis)
                            .await?;
                        continue;
                    }
                };

                match report.outcome {
                    AttemptOutcome::Succeeded(result) => {
                        let description = plan.task(&report.task_id)?.description.clone();
                        plan.record_outcome(&report.task_id, result)?;
                        self.goals.mark_done(&mission.id, &description).await?;
                        info!(mission_id = %mission.id, task_id = %report.task_id, "Task succeeded");
                    }
                    AttemptOutcome::Failed(analysis) => {
                        plan.record_outcome(
                            &report.task_id,
                            TaskResult::failure(head_line(&analysis.message, 400)),
                        )?;
                        let outcome = self
                            .protocol
                            .handle_failure(&mission.id, &mut plan, &analysis)
                            .await?;
                        debug!(
                            mission_id = %mission.id,
                            task_id = %report.task_id,
                            outcome = ?outcome,
                            "Protocol handled failure"
                        );
                    }
                    AttemptOutcome::Cancelled => {
                        // Result discarded; the task goes back untouched.
                        let task = plan.task_mut(&report.task_id)?;
                        if task.state == TaskState::Running {
                            task.requeue();
                        }
                    }
                }
            }

            self.checkpoint(&mission, Some(&plan)).await?;
        }

        self.checkpoint(&mission, Some(&plan)).await?;
        let report = self.report(&mission, &plan, iterations);
        info!(
            mission_id = %mission.id,
            status = %report.status,
            succeeded = report.tasks_succeeded,
            total = report.tasks_total,
            "Mission run finished"
        );
        Ok(report)
    }

    /// Deliver an operator resolution for a blocked task: a synthetic
    /// successful observation, or an explicit task cancellation.
    pub async fn resolve(
        &self,
        mission_id: &str,
        task_id: &str,
        resolution: Resolution,
    ) -> Result<()> {
        let mut snapshot = self.store.load(mission_id).await?;
        let plan = snapshot
            .plan
            .as_mut()
            .ok_or_else(|| WayfarerError::TaskNotFound(task_id.to_string()))?;

        match resolution {
            Resolution::SyntheticObservation { content } => {
                let task = plan.task(task_id)?.clone();
                let observation = Observation::synthetic(&content);
                self.reflexion.reflect(
                    &task,
                    task.retry_count,
                    "operator",
                    "manual resolution",
                    Ok(&observation),
                    RecordCategory::Escalation,
                )?;
                plan.task_mut(task_id)?
                    .succeed(TaskResult::success(content, 10.0));
                self.goals.mark_done(mission_id, &task.description).await?;
                info!(mission_id, task_id, "Task resolved by operator");
            }
            Resolution::CancelTask => {
                plan.task_mut(task_id)?.fail("cancelled by operator");
                info!(mission_id, task_id, "Task cancelled by operator");
            }
        }

        self.store.save(&snapshot).await
    }

    async fn checkpoint(&self, mission: &Mission, plan: Option<&Plan>) -> Result<()> {
        self.store
            .save(&MissionSnapshot {
                mission: mission.clone(),
                plan: plan.cloned(),
            })
            .await
    }

    fn report(&self, mission: &Mission, plan: &Plan, iterations: u32) -> MissionReport {
        MissionReport {
            mission_id: mission.id.clone(),
            status: mission.status,
            tasks_total: plan.len(),
            tasks_succeeded: plan.succeeded_count(),
            blocked: plan
                .blocked_awaiting_human()
                .iter()
                .map(|t| t.id.clone())
                .collect(),
            iterations,
        }
    }
}
