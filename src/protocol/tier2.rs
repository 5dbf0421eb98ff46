//! Tier 2 — Meta-Cognition: capability-gap resolution.
//!
//! GapIdentified -> MetaTaskEscalated -> Researching -> HeuristicSynthesized
//! -> KnowledgeBaseUpdated -> Requeued. The original task parks in
//! `Blocked{PendingResearch}` without touching its retry budget, and is
//! requeued exactly once per gap, after the knowledge-base write commits
//! and the learned capability is visible to the registry.

use tracing::{debug, info};

use super::{ProtocolEngine, ProtocolOutcome};
use crate::error::Result;
use crate::escalation::EscalationReason;
use crate::knowledge::{KnowledgeBaseDocument, WriteOutcome};
use crate::memory::{RecordCategory, ReflexionRecord};
use crate::mission::{BlockReason, EscalationTier, Plan};
use crate::utils::head_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TierTwoState {
    GapIdentified,
    MetaTaskEscalated,
    Researching,
    HeuristicSynthesized,
    KnowledgeBaseUpdated,
    Requeued,
}

impl std::fmt::Display for TierTwoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GapIdentified => "gap_identified",
            Self::MetaTaskEscalated => "meta_task_escalated",
            Self::Researching => "researching",
            Self::HeuristicSynthesized => "heuristic_synthesized",
            Self::KnowledgeBaseUpdated => "knowledge_base_updated",
            Self::Requeued => "requeued",
        };
        write!(f, "{}", s)
    }
}

impl ProtocolEngine {
    pub(crate) async fn tier_two(
        &self,
        mission_id: &str,
        plan: &mut Plan,
        task_id: &str,
        capability: &str,
    ) -> Result<ProtocolOutcome> {
        debug!(task_id, capability, state = %TierTwoState::GapIdentified, "Tier 2 engaged");

        {
            let task = plan.task_mut(task_id)?;
            task.block(BlockReason::PendingResearch);
            task.escalation_tier = Some(EscalationTier::MetaCognition);
        }
        let task = plan.task(task_id)?.clone();
        debug!(task_id, state = %TierTwoState::MetaTaskEscalated, "Task parked pending research");

        // Research sub-mission: the sole goal is a heuristic answering the gap.
        let query = format!("{} for: {}", capability, task.description);
        debug!(task_id, state = %TierTwoState::Researching, query = %query, "Research dispatched");
        let findings: Vec<_> = self
            .research
            .research(&query)
            .await?
            .into_iter()
            .filter(|f| f.confidence >= self.research_cfg.min_finding_confidence)
            .collect();

        if findings.is_empty() {
            return self
                .block_and_report(
                    mission_id,
                    plan,
                    task_id,
                    EscalationReason::ResearchExhausted,
                    &format!("no usable finding for capability '{}'", capability),
                )
                .await;
        }

        let proposal = self
            .reasoner
            .synthesize_heuristic(capability, &findings)
            .await?;
        debug!(
            task_id,
            state = %TierTwoState::HeuristicSynthesized,
            document = %proposal.document,
            "Heuristic synthesized"
        );

        let Some(doc) = self.commit_heuristic(&proposal.document, &proposal.heuristic)? else {
            return self
                .block_and_report(
                    mission_id,
                    plan,
                    task_id,
                    EscalationReason::KnowledgeBaseConflict,
                    &format!(
                        "document '{}' kept moving through {} write attempts",
                        proposal.document, self.research_cfg.max_write_conflicts
                    ),
                )
                .await;
        };
        debug!(task_id, document = %doc.name, version = doc.version, state = %TierTwoState::KnowledgeBaseUpdated, "Knowledge base updated");

        if let Some(learned) = &proposal.capability
            && let Err(err) = self
                .gateway
                .mount_learned(learned.clone(), self.research_cfg.initial_confidence)
        {
            return self
                .block_and_report(
                    mission_id,
                    plan,
                    task_id,
                    EscalationReason::ResearchExhausted,
                    &format!("learned capability is not mountable: {}", err),
                )
                .await;
        }

        // The update must actually close the gap, or requeueing would just
        // re-enter this tier forever.
        if self
            .registry
            .lookup_confident(capability, self.research_cfg.min_capability_confidence)
            .is_empty()
        {
            return self
                .block_and_report(
                    mission_id,
                    plan,
                    task_id,
                    EscalationReason::ResearchExhausted,
                    &format!(
                        "research produced no capability covering '{}'",
                        capability
                    ),
                )
                .await;
        }

        let observation = findings
            .iter()
            .map(|f| format!("{} ({})", f.summary, f.source))
            .collect::<Vec<_>>()
            .join("; ");
        self.memory.append(ReflexionRecord::new(
            task_id,
            task.retry_count,
            format!("research {}", capability),
            observation,
            RecordCategory::Research,
            8.0,
            head_line(&proposal.heuristic, 200),
        ))?;

        plan.task_mut(task_id)?.requeue();
        info!(
            mission_id,
            task_id,
            capability,
            document = %doc.name,
            version = doc.version,
            state = %TierTwoState::Requeued,
            "Gap closed; task returned to the scheduler"
        );
        Ok(ProtocolOutcome::Requeued {
            document: doc.name,
            version: doc.version,
        })
    }

    /// Optimistic-concurrency append: read, merge, write-if-unmoved, else
    /// reload and recompute against the latest content. Bounded attempts.
    fn commit_heuristic(
        &self,
        document: &str,
        heuristic: &str,
    ) -> Result<Option<KnowledgeBaseDocument>> {
        for attempt in 1..=self.research_cfg.max_write_conflicts {
            let current = self.knowledge.read(document)?;
            let merged = if current.content.is_empty() {
                heuristic.to_string()
            } else {
                format!("{}\n{}", current.content.trim_end(), heuristic)
            };
            match self.knowledge.write(document, merged, current.version)? {
                WriteOutcome::Committed(doc) => return Ok(Some(doc)),
                WriteOutcome::Conflict { actual_version } => {
                    debug!(
                        document,
                        attempt,
                        actual_version,
                        "Knowledge write conflicted; recomputing"
                    );
                }
            }
        }
        Ok(None)
    }
}
