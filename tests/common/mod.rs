//! Shared fixtures: deterministic collaborators and scriptable tools.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use wayfarer::collaborator::{
    ActionProposal, Finding, HeuristicProposal, Hypothesis, Reasoner, Research, StepProposal,
    TaskProposal,
};
use wayfarer::context::Context;
use wayfarer::error::Result;
use wayfarer::gateway::{JsonMap, LearnedCapability, Observation, Tool, ToolError};
use wayfarer::mission::{Mission, Task};
use wayfarer::protocol::FailureAnalysis;
use wayfarer::utils::head_line;

/// Reasoner with fixed decomposition and convention-driven step proposals:
/// corrective tasks use the corrective tool, tasks with a capability hint
/// propose the hinted capability, everything else uses the main tool.
pub struct TestReasoner {
    pub proposals: Vec<TaskProposal>,
    pub main_tool: String,
    pub corrective_tool: String,
    /// When set, synthesized heuristics mount the gap capability through
    /// this tool. When `None`, research never yields a mountable route.
    pub heuristic_via: Option<String>,
}

impl TestReasoner {
    pub fn single_task(description: &str) -> Self {
        Self::with_proposals(vec![TaskProposal {
            ref_id: "main".into(),
            description: description.into(),
            depends_on: Vec::new(),
            complexity: Default::default(),
            required_capabilities: Vec::new(),
        }])
    }

    pub fn with_proposals(proposals: Vec<TaskProposal>) -> Self {
        Self {
            proposals,
            main_tool: "target".into(),
            corrective_tool: "fixer".into(),
            heuristic_via: Some("fixer".into()),
        }
    }
}

#[async_trait]
impl Reasoner for TestReasoner {
    async fn decompose(&self, _mission: &Mission) -> Result<Vec<TaskProposal>> {
        Ok(self.proposals.clone())
    }

    async fn propose_step(&self, task: &Task, _context: &Context) -> Result<StepProposal> {
        let tool = if task.description.contains("corrective") {
            self.corrective_tool.clone()
        } else if let Some(hint) = task.required_capabilities.first() {
            hint.clone()
        } else {
            self.main_tool.clone()
        };
        Ok(StepProposal {
            thought: format!("attempt {} via {}", task.id, tool),
            action: ActionProposal {
                tool,
                args: JsonMap::new(),
                rationale: task.description.clone(),
            },
            completes_task: true,
        })
    }

    async fn expand(
        &self,
        _task: &Task,
        _context: &Context,
        parent: Option<&str>,
        width: usize,
    ) -> Result<Vec<String>> {
        let base = parent.unwrap_or("root");
        Ok((0..width)
            .map(|i| {
                if i == 0 {
                    format!("{} / winning strategy", base)
                } else {
                    format!("{} / strategy {}", base, i)
                }
            })
            .collect())
    }

    async fn score(&self, _task: &Task, thought: &str) -> Result<f64> {
        Ok(if thought.contains("winning") { 9.0 } else { 2.0 })
    }

    async fn action_for(
        &self,
        _task: &Task,
        _context: &Context,
        thought: &str,
    ) -> Result<ActionProposal> {
        let mut args = JsonMap::new();
        args.insert("win".into(), serde_json::json!(thought.contains("winning")));
        Ok(ActionProposal {
            tool: self.main_tool.clone(),
            args,
            rationale: thought.to_string(),
        })
    }

    async fn hypothesize(&self, task: &Task, failure: &FailureAnalysis) -> Result<Hypothesis> {
        Ok(Hypothesis {
            cause: format!("transient failure: {}", head_line(&failure.message, 80)),
            corrective_task: format!("corrective for {}", task.id),
            required_capabilities: Vec::new(),
        })
    }

    async fn synthesize_heuristic(
        &self,
        capability: &str,
        findings: &[Finding],
    ) -> Result<HeuristicProposal> {
        Ok(HeuristicProposal {
            document: "playbook".into(),
            heuristic: format!(
                "### {}\n- {}\n",
                capability,
                findings.first().map(|f| f.summary.as_str()).unwrap_or("none")
            ),
            capability: self.heuristic_via.as_ref().map(|via| LearnedCapability {
                name: capability.to_string(),
                description: format!("learned route for {}", capability),
                via_tool: via.clone(),
                base_args: JsonMap::new(),
            }),
        })
    }
}

pub struct TestResearch {
    pub findings: Vec<Finding>,
}

impl TestResearch {
    pub fn empty() -> Self {
        Self {
            findings: Vec::new(),
        }
    }

    pub fn with_finding(summary: &str) -> Self {
        Self {
            findings: vec![Finding {
                source: "test-corpus".into(),
                summary: summary.into(),
                confidence: 0.8,
            }],
        }
    }
}

#[async_trait]
impl Research for TestResearch {
    async fn research(&self, _query: &str) -> Result<Vec<Finding>> {
        Ok(self.findings.clone())
    }
}

pub enum ToolScript {
    AlwaysSucceed,
    /// Fail with the given content/exit that many times, then succeed.
    FailTimes { times: u32, content: String, exit: i32 },
    AlwaysFail { content: String, exit: i32 },
    /// Succeed only when invoked with `{"win": true}`.
    WinArg,
    /// Sleep before succeeding, to open a cancellation window.
    Delay { ms: u64 },
}

pub struct TestTool {
    name: String,
    script: ToolScript,
    remaining: AtomicU32,
    pub invocations: AtomicU32,
}

impl TestTool {
    pub fn new(name: &str, script: ToolScript) -> Arc<Self> {
        let remaining = match &script {
            ToolScript::FailTimes { times, .. } => *times,
            _ => 0,
        };
        Arc::new(Self {
            name: name.into(),
            script,
            remaining: AtomicU32::new(remaining),
            invocations: AtomicU32::new(0),
        })
    }

    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for TestTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    async fn invoke(&self, args: &JsonMap) -> std::result::Result<Observation, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let obs = match &self.script {
            ToolScript::AlwaysSucceed => Observation::new(&self.name, "ok").with_exit_code(0),
            ToolScript::FailTimes { content, exit, .. } => {
                let prev = self
                    .remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        Some(n.saturating_sub(1))
                    })
                    .unwrap_or(0);
                if prev > 0 {
                    Observation::new(&self.name, content.clone()).with_exit_code(*exit)
                } else {
                    Observation::new(&self.name, "ok").with_exit_code(0)
                }
            }
            ToolScript::AlwaysFail { content, exit } => {
                Observation::new(&self.name, content.clone()).with_exit_code(*exit)
            }
            ToolScript::WinArg => {
                let win = args.get("win").and_then(|v| v.as_bool()).unwrap_or(false);
                Observation::new(&self.name, "probe result")
                    .with_exit_code(if win { 0 } else { 1 })
            }
            ToolScript::Delay { ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
                Observation::new(&self.name, "ok").with_exit_code(0)
            }
        };
        Ok(obs)
    }
}
