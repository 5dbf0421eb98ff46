//! The human escalation boundary.
//!
//! Terminal task failures emit a structured payload to an operator-facing
//! channel. The affected task stays blocked (the mission does not) until a
//! resolution comes back as a synthetic successful observation or an
//! explicit task cancellation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::memory::ReflexionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    CircuitBreakerTripped,
    ResearchExhausted,
    KnowledgeBaseConflict,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitBreakerTripped => write!(f, "circuit breaker tripped"),
            Self::ResearchExhausted => write!(f, "research exhausted"),
            Self::KnowledgeBaseConflict => write!(f, "knowledge base conflict"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPayload {
    pub id: String,
    pub mission_id: String,
    pub task_id: String,
    pub reason: EscalationReason,
    /// Every attempted hypothesis and corrective action, in order. A
    /// blocked task is never reported without its full history.
    pub history: Vec<ReflexionRecord>,
    pub created_at: DateTime<Utc>,
}

impl EscalationPayload {
    pub fn new(
        mission_id: impl Into<String>,
        task_id: impl Into<String>,
        reason: EscalationReason,
        history: Vec<ReflexionRecord>,
    ) -> Self {
        Self {
            id: format!("esc-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            mission_id: mission_id.into(),
            task_id: task_id.into(),
            reason,
            history,
            created_at: Utc::now(),
        }
    }
}

/// Operator response delivered back through [`crate::orchestrator::Orchestrator::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    /// Treat the task as succeeded with the given observation content.
    SyntheticObservation { content: String },
    CancelTask,
}

#[derive(Clone)]
pub struct EscalationHandler {
    tx: mpsc::UnboundedSender<EscalationPayload>,
}

impl EscalationHandler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EscalationPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn escalate(&self, payload: EscalationPayload) {
        warn!(
            mission_id = %payload.mission_id,
            task_id = %payload.task_id,
            reason = %payload.reason,
            attempts = payload.history.len(),
            "Task escalated to operator"
        );
        // A detached receiver only means no operator is listening yet; the
        // blocked task state itself is durable.
        let _ = self.tx.send(payload);
    }
}
