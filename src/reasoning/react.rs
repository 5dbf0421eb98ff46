//! The default single-path cognitive loop: Thought -> Action -> Observation.
//!
//! One full cycle per invocation; the executor is not re-entrant. The
//! caller (the task worker, under the protocol engine) decides whether to
//! loop again.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::collaborator::{ActionProposal, Reasoner};
use crate::context::Context;
use crate::error::Result;
use crate::gateway::{Observation, ToolError, ToolGateway};
use crate::mission::Task;
use crate::protocol::{ObservationClass, classify_observation};

#[derive(Debug)]
pub struct StepResult {
    pub thought: String,
    pub action: ActionProposal,
    pub outcome: std::result::Result<Observation, ToolError>,
    /// Set when the action produced an observation.
    pub class: Option<ObservationClass>,
    /// True when the observation indicates task completion, or when the
    /// tool error is not worth another linear cycle.
    pub terminal: bool,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.class == Some(ObservationClass::Success)
    }
}

pub struct ReactExecutor {
    reasoner: Arc<dyn Reasoner>,
    gateway: Arc<ToolGateway>,
    tool_timeout: Duration,
}

impl ReactExecutor {
    pub fn new(reasoner: Arc<dyn Reasoner>, gateway: Arc<ToolGateway>, tool_timeout: Duration) -> Self {
        Self {
            reasoner,
            gateway,
            tool_timeout,
        }
    }

    /// Perform exactly one (thought, action, observation) triple.
    pub async fn step(&self, task: &Task, context: &Context) -> Result<StepResult> {
        let proposal = self.reasoner.propose_step(task, context).await?;
        debug!(
            task_id = %task.id,
            tool = %proposal.action.tool,
            thought = %proposal.thought,
            "ReAct cycle"
        );

        let outcome = self
            .gateway
            .invoke(&proposal.action.tool, &proposal.action.args, self.tool_timeout)
            .await;

        let (class, terminal) = match &outcome {
            Ok(observation) => {
                let class = classify_observation(observation);
                let terminal = match class {
                    ObservationClass::Success => proposal.completes_task,
                    // Failures terminate the linear loop; the protocol
                    // engine owns what happens next.
                    _ => true,
                };
                (Some(class), terminal)
            }
            Err(_) => (None, true),
        };

        Ok(StepResult {
            thought: proposal.thought,
            action: proposal.action,
            outcome,
            class,
            terminal,
        })
    }
}
