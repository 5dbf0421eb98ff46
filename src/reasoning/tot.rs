//! Tree-of-Thoughts: beam search over candidate strategies.
//!
//! Thought generation and evaluation are side-effect-free collaborator
//! calls and fan out concurrently per frontier level. Real actions are
//! lazy: at each level, frontier nodes are executed best-first and each
//! node touches the Tool Gateway at most once. The node-evaluation budget
//! is beam_width x max_depth; hitting it is identical to exhaustion.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::collaborator::{ActionProposal, Reasoner};
use crate::config::TotConfig;
use crate::context::Context;
use crate::error::Result;
use crate::gateway::{Observation, ToolGateway};
use crate::mission::Task;
use crate::protocol::{FailureAnalysis, ObservationClass, classify_observation};

/// Ephemeral search node. Never persisted beyond the episode.
#[derive(Debug, Clone)]
pub struct ThoughtNode {
    pub id: u32,
    pub parent: Option<u32>,
    pub text: String,
    pub score: f64,
    pub depth: u32,
}

#[derive(Debug)]
pub enum TotOutcome {
    Solved {
        observation: Observation,
        action: ActionProposal,
        /// Thought texts from the root strategy to the winning node.
        path: Vec<String>,
        explored: u32,
    },
    Exhausted {
        explored: u32,
        last_failure: Option<FailureAnalysis>,
    },
}

impl TotOutcome {
    pub fn explored(&self) -> u32 {
        match self {
            Self::Solved { explored, .. } | Self::Exhausted { explored, .. } => *explored,
        }
    }
}

pub struct TotEngine {
    reasoner: Arc<dyn Reasoner>,
    gateway: Arc<ToolGateway>,
    cfg: TotConfig,
    tool_timeout: Duration,
}

impl TotEngine {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        gateway: Arc<ToolGateway>,
        cfg: TotConfig,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            reasoner,
            gateway,
            cfg,
            tool_timeout,
        }
    }

    pub async fn search(
        &self,
        task: &Task,
        failure: Option<&FailureAnalysis>,
        context: &Context,
    ) -> Result<TotOutcome> {
        let budget = self.cfg.beam_width * self.cfg.max_depth;
        let mut arena: Vec<ThoughtNode> = Vec::new();
        let mut frontier: Vec<usize> = Vec::new();
        let mut explored: u32 = 0;
        let mut last_failure: Option<FailureAnalysis> = failure.cloned();

        for depth in 0..self.cfg.max_depth {
            // Expand: up to W candidates per frontier node. The root level
            // expands from the failure or planning point itself.
            let parents: Vec<Option<usize>> = if frontier.is_empty() {
                vec![None]
            } else {
                frontier.iter().map(|&i| Some(i)).collect()
            };

            let mut level: Vec<usize> = Vec::new();
            for parent in parents {
                if explored >= budget {
                    break;
                }
                let remaining = (budget - explored) as usize;
                let width = (self.cfg.beam_width as usize).min(remaining);

                let parent_text = match parent {
                    Some(i) => Some(arena[i].text.as_str()),
                    None => last_failure.as_ref().map(|f| f.message.as_str()),
                };
                let mut texts = self
                    .reasoner
                    .expand(task, context, parent_text, width)
                    .await?;
                texts.truncate(width);

                // Evaluate: side-effect-free, dispatched concurrently.
                let scores = join_all(
                    texts
                        .iter()
                        .map(|text| self.reasoner.score(task, text)),
                )
                .await;

                for (text, score) in texts.into_iter().zip(scores) {
                    let score = score?;
                    explored += 1;
                    let id = arena.len() as u32;
                    arena.push(ThoughtNode {
                        id,
                        parent: parent.map(|i| arena[i].id),
                        text,
                        score,
                        depth,
                    });
                    level.push(arena.len() - 1);
                }
            }

            // Prune and select: drop below-threshold nodes, keep the top W.
            // The sort is stable, so ties keep insertion order.
            level.retain(|&i| arena[i].score >= self.cfg.score_threshold);
            level.sort_by(|&a, &b| {
                arena[b]
                    .score
                    .partial_cmp(&arena[a].score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            level.truncate(self.cfg.beam_width as usize);
            frontier = level;

            if frontier.is_empty() {
                debug!(task_id = %task.id, depth, "Frontier pruned empty");
                break;
            }

            // Execute: best node first, backtracking to the next-best
            // sibling on failure. One real action per node, ever.
            for &idx in &frontier {
                let node_text = arena[idx].text.clone();
                let action = self.reasoner.action_for(task, context, &node_text).await?;
                debug!(
                    task_id = %task.id,
                    node = arena[idx].id,
                    score = arena[idx].score,
                    tool = %action.tool,
                    "Executing chosen thought"
                );

                match self
                    .gateway
                    .invoke(&action.tool, &action.args, self.tool_timeout)
                    .await
                {
                    Ok(observation) if classify_observation(&observation) == ObservationClass::Success => {
                        info!(
                            task_id = %task.id,
                            explored,
                            depth,
                            "Tree search resolved the task"
                        );
                        return Ok(TotOutcome::Solved {
                            observation,
                            action,
                            path: trace_path(&arena, idx),
                            explored,
                        });
                    }
                    Ok(observation) => {
                        last_failure =
                            Some(FailureAnalysis::from_observation(&task.id, &observation));
                    }
                    Err(err) => {
                        last_failure = Some(FailureAnalysis::from_tool_error(&task.id, &err));
                    }
                }
            }

            if explored >= budget {
                break;
            }
        }

        info!(task_id = %task.id, explored, "Tree search exhausted");
        Ok(TotOutcome::Exhausted {
            explored,
            last_failure,
        })
    }
}

fn trace_path(arena: &[ThoughtNode], idx: usize) -> Vec<String> {
    let mut path = vec![arena[idx].text.clone()];
    let mut current = arena[idx].parent;
    while let Some(id) = current {
        let node = &arena[id as usize];
        path.push(node.text.clone());
        current = node.parent;
    }
    path.reverse();
    path
}
