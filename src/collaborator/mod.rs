//! Collaborator contracts: the opaque reasoning model behind thought
//! generation and the external search capability behind Tier-2 research.
//!
//! The engine never generates natural-language thoughts itself; everything
//! linguistic is delegated through these traits. Output structs derive
//! `JsonSchema` so a model-backed implementation can enforce structured
//! responses.

mod scripted;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use scripted::{ScriptedReasoner, ScriptedResearch};

use crate::context::Context;
use crate::error::Result;
use crate::gateway::{JsonMap, LearnedCapability};
use crate::mission::{ComplexityClass, Mission, Task};
use crate::protocol::FailureAnalysis;

/// One proposed task from mission decomposition. References between
/// proposals use collaborator-chosen `ref_id`s; the plan assigns real ids.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskProposal {
    pub ref_id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub complexity: ComplexityClass,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActionProposal {
    pub tool: String,
    #[serde(default)]
    pub args: JsonMap,
    pub rationale: String,
}

/// A full thought-action pair for one ReAct cycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepProposal {
    pub thought: String,
    pub action: ActionProposal,
    /// Whether a successful outcome of this action completes the task.
    #[serde(default)]
    pub completes_task: bool,
}

/// Tier-1 output: a single-sentence causal hypothesis and exactly one
/// corrective task derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Hypothesis {
    pub cause: String,
    pub corrective_task: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    pub source: String,
    pub summary: String,
    pub confidence: f64,
}

/// Tier-2 output: the knowledge-base change and, when research uncovered a
/// workable route, the capability to mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicProposal {
    /// Knowledge-base document the heuristic belongs to.
    pub document: String,
    /// The learned heuristic, appended to the document content.
    pub heuristic: String,
    pub capability: Option<LearnedCapability>,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Decompose a mission into task proposals. Structural validity is
    /// enforced by the caller, not here.
    async fn decompose(&self, mission: &Mission) -> Result<Vec<TaskProposal>>;

    /// Propose one thought-action pair for the current cycle.
    async fn propose_step(&self, task: &Task, context: &Context) -> Result<StepProposal>;

    /// Generate up to `width` distinct candidate strategies as children of
    /// `parent` (`None` expands from the task's failure or planning point).
    async fn expand(
        &self,
        task: &Task,
        context: &Context,
        parent: Option<&str>,
        width: usize,
    ) -> Result<Vec<String>>;

    /// Self-evaluation of a candidate strategy, in [0, 10].
    async fn score(&self, task: &Task, thought: &str) -> Result<f64>;

    /// Concrete action for a chosen strategy.
    async fn action_for(
        &self,
        task: &Task,
        context: &Context,
        thought: &str,
    ) -> Result<ActionProposal>;

    /// Tier-1 causal hypothesis for a classified failure.
    async fn hypothesize(&self, task: &Task, failure: &FailureAnalysis) -> Result<Hypothesis>;

    /// Tier-2 heuristic synthesis from research findings.
    async fn synthesize_heuristic(
        &self,
        capability: &str,
        findings: &[Finding],
    ) -> Result<HeuristicProposal>;
}

/// External search collaborator. Used only by the Meta-Cognition tier.
#[async_trait]
pub trait Research: Send + Sync {
    async fn research(&self, query: &str) -> Result<Vec<Finding>>;
}
