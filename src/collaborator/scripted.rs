//! Deterministic rule-driven collaborators.
//!
//! Used by the CLI for offline runs and by tests that need reproducible
//! reasoning. Task descriptions carry a small directive syntax:
//! `run: <command>` executes through the shell tool, `read: <path>` through
//! the file reader, and a trailing `requires <name>` declares a capability
//! hint. Anything else degrades to a harmless no-op action.

use async_trait::async_trait;

use super::{
    ActionProposal, Finding, HeuristicProposal, Hypothesis, Reasoner, Research, StepProposal,
    TaskProposal,
};
use crate::context::Context;
use crate::error::Result;
use crate::gateway::{JsonMap, LearnedCapability};
use crate::memory::relevance::{overlap_score, signature};
use crate::mission::{ComplexityClass, Mission, Task};
use crate::protocol::{FailureAnalysis, FailureKind};
use crate::utils::head_line;

#[derive(Default)]
pub struct ScriptedReasoner;

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self
    }

    fn classify_step(description: &str) -> ComplexityClass {
        let lower = description.to_lowercase();
        if lower.contains("architecture") {
            ComplexityClass::ArchitectureSelection
        } else if lower.contains("choose") || lower.contains("select a") {
            ComplexityClass::TechnologyChoice
        } else if lower.contains("refactor") {
            ComplexityClass::LargeRefactor
        } else {
            ComplexityClass::Routine
        }
    }

    fn capability_hints(description: &str) -> (String, Vec<String>) {
        match description.split_once(" requires ") {
            Some((head, caps)) => (
                head.trim().to_string(),
                caps.split(',').map(|c| c.trim().to_string()).collect(),
            ),
            None => (description.trim().to_string(), Vec::new()),
        }
    }

    fn action_from_text(text: &str, context: &Context) -> ActionProposal {
        if let Some(command) = text.trim().strip_prefix("run:") {
            let mut args = JsonMap::new();
            args.insert("command".into(), serde_json::json!(command.trim()));
            return ActionProposal {
                tool: "shell".into(),
                args,
                rationale: format!("execute: {}", command.trim()),
            };
        }
        if let Some(path) = text.trim().strip_prefix("read:") {
            let mut args = JsonMap::new();
            args.insert("path".into(), serde_json::json!(path.trim()));
            return ActionProposal {
                tool: "read_file".into(),
                args,
                rationale: format!("inspect {}", path.trim()),
            };
        }

        // Pick the best-overlapping known capability; fall back to a no-op
        // through the shell so the cycle still produces an observation.
        let text_sig = signature(text);
        let best = context
            .capabilities
            .iter()
            .map(|cap| {
                let cap_text = format!("{} {}", cap.tool_name, cap.description);
                (overlap_score(&text_sig, &signature(&cap_text)), cap)
            })
            .filter(|(score, _)| *score > 0.0)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((_, cap)) => ActionProposal {
                tool: cap.tool_name.clone(),
                args: JsonMap::new(),
                rationale: text.to_string(),
            },
            None => {
                let mut args = JsonMap::new();
                args.insert("command".into(), serde_json::json!("true"));
                ActionProposal {
                    tool: "shell".into(),
                    args,
                    rationale: text.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decompose(&self, mission: &Mission) -> Result<Vec<TaskProposal>> {
        let steps: Vec<&str> = mission
            .prime_directive
            .split(" then ")
            .flat_map(|part| part.split("; "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        Ok(steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let (description, required_capabilities) = Self::capability_hints(step);
                TaskProposal {
                    ref_id: format!("s{}", i + 1),
                    complexity: Self::classify_step(&description),
                    description,
                    depends_on: if i == 0 {
                        Vec::new()
                    } else {
                        vec![format!("s{}", i)]
                    },
                    required_capabilities,
                }
            })
            .collect())
    }

    async fn propose_step(&self, task: &Task, context: &Context) -> Result<StepProposal> {
        let action = Self::action_from_text(&task.description, context);
        Ok(StepProposal {
            thought: format!("Use {} to complete: {}", action.tool, task.description),
            action,
            completes_task: true,
        })
    }

    async fn expand(
        &self,
        task: &Task,
        _context: &Context,
        parent: Option<&str>,
        width: usize,
    ) -> Result<Vec<String>> {
        let base = parent.unwrap_or(&task.description);
        let variants = [
            format!("directly attempt: {}", base),
            format!("probe the environment, then attempt: {}", base),
            format!("reduce scope and attempt a minimal form of: {}", base),
            format!("attempt an alternative route to: {}", base),
        ];
        Ok(variants.into_iter().take(width).collect())
    }

    async fn score(&self, task: &Task, thought: &str) -> Result<f64> {
        let overlap = overlap_score(&signature(&task.description), &signature(thought));
        let directness = if thought.starts_with("directly") { 2.0 } else { 0.0 };
        Ok((4.0 + 4.0 * overlap + directness).clamp(0.0, 10.0))
    }

    async fn action_for(
        &self,
        task: &Task,
        context: &Context,
        thought: &str,
    ) -> Result<ActionProposal> {
        // A strategy that embeds a directive executes it; otherwise act on
        // the task itself.
        let source = if thought.contains("run:") || thought.contains("read:") {
            let idx = thought.find("run:").or_else(|| thought.find("read:")).unwrap_or(0);
            &thought[idx..]
        } else {
            task.description.as_str()
        };
        Ok(Self::action_from_text(source, context))
    }

    async fn hypothesize(&self, task: &Task, failure: &FailureAnalysis) -> Result<Hypothesis> {
        let cause = match &failure.kind {
            FailureKind::Transient(category) => format!(
                "Task {} hit a {}: {}",
                task.id,
                category,
                head_line(&failure.message, 120)
            ),
            _ => format!("Task {} failed: {}", task.id, head_line(&failure.message, 120)),
        };
        Ok(Hypothesis {
            cause,
            corrective_task: format!("run: true # clear the path for {}", task.id),
            required_capabilities: Vec::new(),
        })
    }

    async fn synthesize_heuristic(
        &self,
        capability: &str,
        findings: &[Finding],
    ) -> Result<HeuristicProposal> {
        let mut heuristic = format!("### {}\n", capability);
        for finding in findings {
            heuristic.push_str(&format!("- {} ({})\n", finding.summary, finding.source));
        }

        let capability = findings.first().map(|finding| {
            let mut base_args = JsonMap::new();
            base_args.insert("command".into(), serde_json::json!("true"));
            LearnedCapability {
                name: capability.to_string(),
                description: finding.summary.clone(),
                via_tool: "shell".into(),
                base_args,
            }
        });

        Ok(HeuristicProposal {
            document: "learned-capabilities".into(),
            heuristic,
            capability,
        })
    }
}

/// Keyword-matched canned findings. Empty by default, which makes every
/// research episode exhaust.
#[derive(Default)]
pub struct ScriptedResearch {
    entries: Vec<(String, Finding)>,
}

impl ScriptedResearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_finding(
        mut self,
        keyword: impl Into<String>,
        source: impl Into<String>,
        summary: impl Into<String>,
        confidence: f64,
    ) -> Self {
        self.entries.push((
            keyword.into().to_lowercase(),
            Finding {
                source: source.into(),
                summary: summary.into(),
                confidence,
            },
        ));
        self
    }
}

#[async_trait]
impl Research for ScriptedResearch {
    async fn research(&self, query: &str) -> Result<Vec<Finding>> {
        let query = query.to_lowercase();
        Ok(self
            .entries
            .iter()
            .filter(|(keyword, _)| query.contains(keyword))
            .map(|(_, finding)| finding.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decompose_builds_a_linear_chain() {
        let mission = Mission::new("m-001", "run: make then run: make test");
        let proposals = ScriptedReasoner::new().decompose(&mission).await.unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[1].depends_on, vec!["s1"]);
    }

    #[tokio::test]
    async fn requires_suffix_becomes_capability_hint() {
        let mission = Mission::new("m-001", "call the forecast api requires http_call");
        let proposals = ScriptedReasoner::new().decompose(&mission).await.unwrap();
        assert_eq!(proposals[0].required_capabilities, vec!["http_call"]);
        assert!(!proposals[0].description.contains("requires"));
    }

    #[tokio::test]
    async fn run_prefix_maps_to_shell() {
        let task = Task::new("t-001", "run: echo hello");
        let step = ScriptedReasoner::new()
            .propose_step(&task, &Context::bare(""))
            .await
            .unwrap();
        assert_eq!(step.action.tool, "shell");
        assert_eq!(
            step.action.args.get("command").and_then(|v| v.as_str()),
            Some("echo hello")
        );
    }

    #[tokio::test]
    async fn research_matches_on_keyword() {
        let research = ScriptedResearch::new().with_finding(
            "http",
            "docs",
            "use curl through the shell",
            0.8,
        );
        assert_eq!(research.research("http_call for task x").await.unwrap().len(), 1);
        assert!(research.research("unrelated").await.unwrap().is_empty());
    }
}
