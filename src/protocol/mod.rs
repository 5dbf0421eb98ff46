//! The autonomous reasoning protocol engine.
//!
//! Two independent, composable tiers sit above the cognitive loop and
//! govern retries, corrective-task injection, and capability-gap
//! resolution. Tier 1 (Reflexion) handles recognizable transient failures
//! with bounded retry-with-correction; Tier 2 (Meta-Cognition) handles
//! absent capabilities by researching, updating the knowledge base, and
//! requeueing. The tiers are triggered by disjoint conditions and are
//! mutually exclusive per task at any instant.

mod analysis;
mod tier1;
mod tier2;

use std::sync::Arc;

pub use analysis::{
    FailureAnalysis, FailureCategory, FailureKind, ObservationClass, classify_observation,
};

use tracing::warn;

use crate::collaborator::{Reasoner, Research};
use crate::config::{RecoveryConfig, ResearchConfig};
use crate::error::{Result, WayfarerError};
use crate::escalation::{EscalationHandler, EscalationPayload, EscalationReason};
use crate::gateway::ToolGateway;
use crate::knowledge::KnowledgeStore;
use crate::memory::{EpisodicMemory, RecordCategory, ReflexionRecord};
use crate::mission::{BlockReason, Plan, TaskState};
use crate::registry::CapabilityRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOutcome {
    /// Tier 1 injected one corrective task and consumed one retry.
    CorrectiveInjected { corrective_id: String },
    /// Tier 1's circuit breaker tripped; the task is blocked and reported.
    Tripped,
    /// Tier 2 committed a knowledge update and returned the task to the
    /// scheduler.
    Requeued { document: String, version: u64 },
    /// Terminal hand-off to the human boundary outside the breaker path.
    Escalated { reason: EscalationReason },
}

pub struct ProtocolEngine {
    pub(crate) reasoner: Arc<dyn Reasoner>,
    pub(crate) research: Arc<dyn Research>,
    pub(crate) knowledge: Arc<KnowledgeStore>,
    pub(crate) registry: Arc<CapabilityRegistry>,
    pub(crate) gateway: Arc<ToolGateway>,
    pub(crate) memory: Arc<EpisodicMemory>,
    pub(crate) escalation: EscalationHandler,
    pub(crate) recovery: RecoveryConfig,
    pub(crate) research_cfg: ResearchConfig,
}

impl ProtocolEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        research: Arc<dyn Research>,
        knowledge: Arc<KnowledgeStore>,
        registry: Arc<CapabilityRegistry>,
        gateway: Arc<ToolGateway>,
        memory: Arc<EpisodicMemory>,
        escalation: EscalationHandler,
        recovery: RecoveryConfig,
        research_cfg: ResearchConfig,
    ) -> Self {
        Self {
            reasoner,
            research,
            knowledge,
            registry,
            gateway,
            memory,
            escalation,
            recovery,
            research_cfg,
        }
    }

    /// Classify-and-handle for one failed task. Must be called from the
    /// plan's owning scheduling loop; all plan mutation happens here.
    pub async fn handle_failure(
        &self,
        mission_id: &str,
        plan: &mut Plan,
        analysis: &FailureAnalysis,
    ) -> Result<ProtocolOutcome> {
        let state = plan.task(&analysis.task_id)?.state;
        if state
            == (TaskState::Blocked {
                reason: BlockReason::PendingResearch,
            })
        {
            return Err(WayfarerError::InvalidTransition(format!(
                "task {} is already inside a Tier-2 workflow",
                analysis.task_id
            )));
        }

        match &analysis.kind {
            FailureKind::Transient(_) => self.tier_one(mission_id, plan, analysis).await,
            FailureKind::CapabilityGap { capability } => {
                self.tier_two(mission_id, plan, &analysis.task_id, capability).await
            }
            // Unauthorized tools and ambiguity that survived tree search
            // have no retry tier; they go straight to the operator.
            FailureKind::Unauthorized | FailureKind::Ambiguous => {
                self.block_and_report(
                    mission_id,
                    plan,
                    &analysis.task_id,
                    EscalationReason::CircuitBreakerTripped,
                    &analysis.message,
                )
                .await
            }
        }
    }

    /// Terminal path shared by every non-retriable outcome: block the task,
    /// append the closing record, and emit the payload with full history.
    pub(crate) async fn block_and_report(
        &self,
        mission_id: &str,
        plan: &mut Plan,
        task_id: &str,
        reason: EscalationReason,
        message: &str,
    ) -> Result<ProtocolOutcome> {
        let task = plan.task_mut(task_id)?;
        task.block(BlockReason::AwaitingHuman);
        task.escalation_tier = None;
        let attempt = task.retry_count;

        warn!(mission_id, task_id, %reason, "Task blocked pending human input");
        self.memory.append(ReflexionRecord::new(
            task_id,
            attempt,
            format!("escalate: {}", reason),
            message,
            RecordCategory::Escalation,
            0.0,
            format!("no automated path remains ({})", reason),
        ))?;

        let history = self.memory.history(task_id)?;
        self.escalation.escalate(EscalationPayload::new(
            mission_id, task_id, reason, history,
        ));
        Ok(ProtocolOutcome::Escalated { reason })
    }
}
