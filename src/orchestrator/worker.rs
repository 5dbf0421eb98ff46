//! Per-task worker: owns one task's cognitive-loop execution end-to-end.
//!
//! Within a task, execution is strictly sequential; parallelism exists only
//! across tasks. The worker performs ReAct cycles (or a Tree-of-Thoughts
//! episode when the controller says so), reflects on every outcome, and
//! reports the terminal result back to the scheduling loop. All plan
//! mutation stays with the scheduler.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::config::ReactConfig;
use crate::context::{Context, ContextCurator};
use crate::error::WayfarerError;
use crate::memory::{EpisodicMemory, RecordCategory, ReflexionRecord};
use crate::mission::{Task, TaskResult};
use crate::protocol::{
    FailureAnalysis, FailureCategory, FailureKind, ObservationClass,
};
use crate::reasoning::{ReactExecutor, TotEngine, TotOutcome, should_escalate_to_tot};
use crate::reflexion::ReflexionEngine;
use crate::registry::CapabilityRegistry;
use crate::utils::head_line;

#[derive(Debug)]
pub(crate) struct AttemptReport {
    pub task_id: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Succeeded(TaskResult),
    Failed(FailureAnalysis),
    Cancelled,
}

pub(crate) struct TaskWorker {
    curator: Arc<ContextCurator>,
    react: Arc<ReactExecutor>,
    tot: Arc<TotEngine>,
    reflexion: Arc<ReflexionEngine>,
    registry: Arc<CapabilityRegistry>,
    memory: Arc<EpisodicMemory>,
    react_cfg: ReactConfig,
    min_capability_confidence: f64,
}

impl TaskWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        curator: Arc<ContextCurator>,
        react: Arc<ReactExecutor>,
        tot: Arc<TotEngine>,
        reflexion: Arc<ReflexionEngine>,
        registry: Arc<CapabilityRegistry>,
        memory: Arc<EpisodicMemory>,
        react_cfg: ReactConfig,
        min_capability_confidence: f64,
    ) -> Self {
        Self {
            curator,
            react,
            tot,
            reflexion,
            registry,
            memory,
            react_cfg,
            min_capability_confidence,
        }
    }

    pub async fn attempt(
        &self,
        mission_id: &str,
        task: Task,
        mut cancel: watch::Receiver<bool>,
    ) -> AttemptReport {
        // Hallucination guard, checked before any attempt: an uncovered
        // capability hint is a gap, not a tool failure.
        for hint in &task.required_capabilities {
            if self
                .registry
                .lookup_confident(hint, self.min_capability_confidence)
                .is_empty()
            {
                debug!(task_id = %task.id, capability = %hint, "Required capability uncovered");
                return self.failed(&task, FailureAnalysis::capability_gap(&task.id, hint));
            }
        }

        if *cancel.borrow() {
            return self.cancelled(&task);
        }

        // High-complexity planning classes skip the linear loop entirely.
        if should_escalate_to_tot(&task, None) {
            let context = match self.curator.build(mission_id, &task).await {
                Ok(context) => context,
                Err(err) => return self.infra_failure(&task, err),
            };
            return self.tot_episode(&task, None, &context, &mut cancel).await;
        }

        let mut steps = 0;
        loop {
            steps += 1;
            if steps > self.react_cfg.max_steps {
                return self.failed(
                    &task,
                    FailureAnalysis::new(
                        &task.id,
                        FailureKind::Transient(FailureCategory::Runtime),
                        format!("no terminal observation within {} cycles", self.react_cfg.max_steps),
                    ),
                );
            }
            if *cancel.borrow() {
                return self.cancelled(&task);
            }

            // Recitation happens here: the context opens with the goal
            // state on every iteration.
            let context = match self.curator.build(mission_id, &task).await {
                Ok(context) => context,
                Err(err) => return self.infra_failure(&task, err),
            };

            let step = tokio::select! {
                _ = cancel.changed() => return self.cancelled(&task),
                step = self.react.step(&task, &context) => match step {
                    Ok(step) => step,
                    Err(err) => return self.infra_failure(&task, err),
                },
            };

            match &step.outcome {
                Ok(observation) => {
                    let reflected = self.reflexion.reflect(
                        &task,
                        task.retry_count,
                        &step.action.tool,
                        &step.action.rationale,
                        Ok(observation),
                        RecordCategory::Attempt,
                    );
                    let evaluation = match reflected {
                        Ok((_, evaluation)) => evaluation,
                        Err(err) => return self.infra_failure(&task, err),
                    };

                    match step.class.unwrap_or(ObservationClass::Ambiguous) {
                        ObservationClass::Success if step.terminal => {
                            return AttemptReport {
                                task_id: task.id.clone(),
                                outcome: AttemptOutcome::Succeeded(TaskResult::success(
                                    head_line(&observation.content, 400),
                                    evaluation.score,
                                )),
                            };
                        }
                        ObservationClass::Success => continue,
                        ObservationClass::Failure(_) => {
                            return self.failed(
                                &task,
                                FailureAnalysis::from_observation(&task.id, observation),
                            );
                        }
                        ObservationClass::Ambiguous => {
                            let analysis =
                                FailureAnalysis::from_observation(&task.id, observation);
                            if should_escalate_to_tot(&task, Some(&analysis)) {
                                return self
                                    .tot_episode(&task, Some(&analysis), &context, &mut cancel)
                                    .await;
                            }
                            return self.failed(&task, analysis);
                        }
                    }
                }
                Err(tool_err) => {
                    if let Err(err) = self.reflexion.reflect(
                        &task,
                        task.retry_count,
                        &step.action.tool,
                        &step.action.rationale,
                        Err(tool_err),
                        RecordCategory::Attempt,
                    ) {
                        return self.infra_failure(&task, err);
                    }
                    return self.failed(&task, FailureAnalysis::from_tool_error(&task.id, tool_err));
                }
            }
        }
    }

    async fn tot_episode(
        &self,
        task: &Task,
        failure: Option<&FailureAnalysis>,
        context: &Context,
        cancel: &mut watch::Receiver<bool>,
    ) -> AttemptReport {
        let outcome = tokio::select! {
            _ = cancel.changed() => return self.cancelled(task),
            outcome = self.tot.search(task, failure, context) => match outcome {
                Ok(outcome) => outcome,
                Err(err) => return self.infra_failure(task, err),
            },
        };

        match outcome {
            TotOutcome::Solved {
                observation,
                action,
                path,
                ..
            } => {
                let reflected = self.reflexion.reflect(
                    task,
                    task.retry_count,
                    &action.tool,
                    &format!("tree search: {}", path.join(" -> ")),
                    Ok(&observation),
                    RecordCategory::Attempt,
                );
                match reflected {
                    Ok((_, evaluation)) => AttemptReport {
                        task_id: task.id.clone(),
                        outcome: AttemptOutcome::Succeeded(TaskResult::success(
                            head_line(&observation.content, 400),
                            evaluation.score,
                        )),
                    },
                    Err(err) => self.infra_failure(task, err),
                }
            }
            TotOutcome::Exhausted {
                explored,
                last_failure,
            } => {
                let analysis = last_failure.unwrap_or_else(|| {
                    FailureAnalysis::new(
                        &task.id,
                        FailureKind::Ambiguous,
                        format!("tree search exhausted after {} nodes", explored),
                    )
                });
                let record = ReflexionRecord::new(
                    &task.id,
                    task.retry_count,
                    "tree search",
                    head_line(&analysis.message, 400),
                    RecordCategory::Attempt,
                    0.0,
                    format!("no strategy survived after exploring {} nodes", explored),
                );
                if let Err(err) = self.memory.append(record) {
                    return self.infra_failure(task, err);
                }
                self.failed(task, analysis)
            }
        }
    }

    fn failed(&self, task: &Task, analysis: FailureAnalysis) -> AttemptReport {
        AttemptReport {
            task_id: task.id.clone(),
            outcome: AttemptOutcome::Failed(analysis),
        }
    }

    fn cancelled(&self, task: &Task) -> AttemptReport {
        AttemptReport {
            task_id: task.id.clone(),
            outcome: AttemptOutcome::Cancelled,
        }
    }

    fn infra_failure(&self, task: &Task, err: WayfarerError) -> AttemptReport {
        self.failed(
            task,
            FailureAnalysis::new(
                &task.id,
                FailureKind::Transient(FailureCategory::Runtime),
                err.to_string(),
            ),
        )
    }
}
