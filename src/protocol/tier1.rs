//! Tier 1 — Reflexion: retry-with-correction for transient failures.
//!
//! Detected -> Categorized -> HypothesisFormed -> CorrectiveTaskInjected ->
//! Retrying -> {Resolved | CircuitBreakerTripped}. Exactly one corrective
//! task per failure, injected as a prerequisite of the original; the
//! original's retry budget is consumed only here.

use tracing::{debug, info};

use super::{FailureAnalysis, ProtocolEngine, ProtocolOutcome};
use crate::error::Result;
use crate::escalation::{EscalationPayload, EscalationReason};
use crate::memory::{RecordCategory, ReflexionRecord};
use crate::mission::{BlockReason, Plan, Task};
use crate::utils::head_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TierOneState {
    Detected,
    Categorized,
    HypothesisFormed,
    CorrectiveTaskInjected,
    Retrying,
    CircuitBreakerTripped,
}

impl std::fmt::Display for TierOneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Detected => "detected",
            Self::Categorized => "categorized",
            Self::HypothesisFormed => "hypothesis_formed",
            Self::CorrectiveTaskInjected => "corrective_task_injected",
            Self::Retrying => "retrying",
            Self::CircuitBreakerTripped => "circuit_breaker_tripped",
        };
        write!(f, "{}", s)
    }
}

impl ProtocolEngine {
    pub(crate) async fn tier_one(
        &self,
        mission_id: &str,
        plan: &mut Plan,
        analysis: &FailureAnalysis,
    ) -> Result<ProtocolOutcome> {
        let task = plan.task(&analysis.task_id)?.clone();
        debug!(task_id = %task.id, state = %TierOneState::Detected, category = ?analysis.kind, "Tier 1 engaged");
        debug!(task_id = %task.id, state = %TierOneState::Categorized, signature = %analysis.signature, "Failure categorized");

        // Circuit breaker: only Tier-1-triggered re-attempts count, and the
        // task blocks the moment the budget is spent.
        if task.retries_exhausted() {
            debug!(task_id = %task.id, state = %TierOneState::CircuitBreakerTripped, retries = task.retry_count, "Retry budget exhausted");
            self.trip_breaker(mission_id, plan, &task.id, analysis).await?;
            return Ok(ProtocolOutcome::Tripped);
        }

        // Past outcomes for the same failure signature inform the new
        // hypothesis instead of repeating a strategy that already failed.
        let mut enriched = analysis.clone();
        if let Some(prior) = self
            .memory
            .relevant(&analysis.signature, 5)?
            .into_iter()
            .find(|r| r.category == RecordCategory::Corrective)
        {
            debug!(task_id = %task.id, prior_record = prior.id, "Prior corrective outcome found");
            enriched.message = format!(
                "{}\npreviously attempted: {}",
                enriched.message, prior.reflection_text
            );
        }

        let hypothesis = self.reasoner.hypothesize(&task, &enriched).await?;
        debug!(task_id = %task.id, state = %TierOneState::HypothesisFormed, cause = %hypothesis.cause, "Hypothesis formed");

        let corrective_id = plan.allocate_id();
        let corrective = Task::new(&corrective_id, &hypothesis.corrective_task)
            .with_required_capabilities(hypothesis.required_capabilities.clone())
            .with_max_retries(self.recovery.max_retries);
        plan.inject_task(corrective, &task.id)?;
        debug!(task_id = %task.id, corrective_id = %corrective_id, state = %TierOneState::CorrectiveTaskInjected, "Corrective task injected");

        let original = plan.task_mut(&task.id)?;
        original.prepare_retry();
        let attempt = original.retry_count;

        self.memory.append(ReflexionRecord::new(
            &task.id,
            attempt,
            format!("inject corrective {}: {}", corrective_id, head_line(&hypothesis.corrective_task, 120)),
            analysis.message.clone(),
            RecordCategory::Corrective,
            0.0,
            hypothesis.cause.clone(),
        ))?;

        info!(
            mission_id,
            task_id = %task.id,
            corrective_id = %corrective_id,
            retry = attempt,
            state = %TierOneState::Retrying,
            "Task will re-run once the corrective task succeeds"
        );
        Ok(ProtocolOutcome::CorrectiveInjected { corrective_id })
    }

    async fn trip_breaker(
        &self,
        mission_id: &str,
        plan: &mut Plan,
        task_id: &str,
        analysis: &FailureAnalysis,
    ) -> Result<()> {
        let task = plan.task_mut(task_id)?;
        task.block(BlockReason::AwaitingHuman);
        task.escalation_tier = None;
        let retries = task.retry_count;

        self.memory.append(ReflexionRecord::new(
            task_id,
            retries,
            "circuit breaker",
            analysis.message.clone(),
            RecordCategory::Escalation,
            0.0,
            format!(
                "same classifiable failure persisted through {} corrective retries",
                retries
            ),
        ))?;

        let history = self.memory.history(task_id)?;
        self.escalation.escalate(EscalationPayload::new(
            mission_id,
            task_id,
            EscalationReason::CircuitBreakerTripped,
            history,
        ));
        Ok(())
    }
}
