//! Post-hoc evaluation of every action's outcome.
//!
//! `reflect` runs on success and failure alike: every evaluation appends
//! exactly one record to episodic memory and feeds the capability
//! registry's confidence for the tools involved. Evaluators are pluggable
//! per domain, with a generic heuristic fallback.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::ReflexionConfig;
use crate::error::Result;
use crate::gateway::{Observation, ToolError};
use crate::memory::{EpisodicMemory, RecordCategory, ReflexionRecord};
use crate::mission::Task;
use crate::registry::CapabilityRegistry;
use crate::utils::head_line;

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Outcome quality in [0, 10].
    pub score: f64,
    pub reflection_text: String,
}

pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn applies_to(&self, observation: &Observation) -> bool;

    fn evaluate(&self, task: &Task, action: &str, observation: &Observation) -> EvaluationResult;
}

/// Scores process-like observations from their exit code.
pub struct ExitCodeEvaluator;

impl Evaluator for ExitCodeEvaluator {
    fn name(&self) -> &str {
        "exit-code"
    }

    fn applies_to(&self, observation: &Observation) -> bool {
        observation.exit_code.is_some()
    }

    fn evaluate(&self, _task: &Task, action: &str, observation: &Observation) -> EvaluationResult {
        match observation.exit_code {
            Some(0) => EvaluationResult {
                score: 9.0,
                reflection_text: format!("'{}' exited cleanly", head_line(action, 80)),
            },
            Some(code) => EvaluationResult {
                score: 1.5,
                reflection_text: format!(
                    "'{}' exited with {}: {}",
                    head_line(action, 80),
                    code,
                    head_line(&observation.content, 160)
                ),
            },
            None => EvaluationResult {
                score: 5.0,
                reflection_text: "no exit status to judge".into(),
            },
        }
    }
}

static TEST_SUMMARY: OnceLock<Regex> = OnceLock::new();

fn test_summary_pattern() -> &'static Regex {
    TEST_SUMMARY.get_or_init(|| Regex::new(r"(\d+) passed\D+(\d+) failed").unwrap())
}

/// Parses test-runner summaries and scores by pass ratio.
pub struct TestSummaryEvaluator;

impl Evaluator for TestSummaryEvaluator {
    fn name(&self) -> &str {
        "test-summary"
    }

    fn applies_to(&self, observation: &Observation) -> bool {
        test_summary_pattern().is_match(&observation.content)
    }

    fn evaluate(&self, _task: &Task, _action: &str, observation: &Observation) -> EvaluationResult {
        let caps = test_summary_pattern()
            .captures(&observation.content)
            .expect("applies_to checked");
        let passed: f64 = caps[1].parse().unwrap_or(0.0);
        let failed: f64 = caps[2].parse().unwrap_or(0.0);
        let total = passed + failed;
        let score = if total == 0.0 { 5.0 } else { 10.0 * passed / total };
        EvaluationResult {
            score,
            reflection_text: format!("{} of {} tests passed", passed as u64, total as u64),
        }
    }
}

/// Keyword fallback for observations nothing more specific claims.
pub struct HeuristicEvaluator;

impl Evaluator for HeuristicEvaluator {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn applies_to(&self, _observation: &Observation) -> bool {
        true
    }

    fn evaluate(&self, _task: &Task, action: &str, observation: &Observation) -> EvaluationResult {
        let lower = observation.content.to_lowercase();
        let negative = ["error", "failed", "denied", "not found", "panic"]
            .iter()
            .filter(|kw| lower.contains(*kw))
            .count();
        let score = match negative {
            0 => 7.5,
            1 => 3.0,
            _ => 1.0,
        };
        EvaluationResult {
            score,
            reflection_text: format!(
                "'{}' produced {} error indicator(s)",
                head_line(action, 80),
                negative
            ),
        }
    }
}

pub struct ReflexionEngine {
    evaluators: Vec<Box<dyn Evaluator>>,
    memory: Arc<EpisodicMemory>,
    registry: Arc<CapabilityRegistry>,
    cfg: ReflexionConfig,
}

impl ReflexionEngine {
    pub fn new(
        memory: Arc<EpisodicMemory>,
        registry: Arc<CapabilityRegistry>,
        cfg: ReflexionConfig,
    ) -> Self {
        Self {
            // Order matters: the first evaluator that claims an observation
            // wins; the heuristic fallback always claims.
            evaluators: vec![
                Box::new(TestSummaryEvaluator),
                Box::new(ExitCodeEvaluator),
                Box::new(HeuristicEvaluator),
            ],
            memory,
            registry,
            cfg,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluators.insert(0, evaluator);
        self
    }

    pub fn evaluate(&self, task: &Task, action: &str, observation: &Observation) -> EvaluationResult {
        let evaluator = self
            .evaluators
            .iter()
            .find(|e| e.applies_to(observation))
            .expect("heuristic fallback always applies");
        let result = evaluator.evaluate(task, action, observation);
        debug!(
            task_id = %task.id,
            evaluator = evaluator.name(),
            score = result.score,
            "Outcome evaluated"
        );
        result
    }

    /// Judge an action's outcome, append the reflexion record, and adjust
    /// the used tool's confidence. Returns the stored record and the score.
    pub fn reflect(
        &self,
        task: &Task,
        attempt: u32,
        tool: &str,
        action: &str,
        outcome: std::result::Result<&Observation, &ToolError>,
        category: RecordCategory,
    ) -> Result<(ReflexionRecord, EvaluationResult)> {
        let (observation_text, evaluation) = match outcome {
            Ok(observation) => (
                observation.content.clone(),
                self.evaluate(task, action, observation),
            ),
            Err(err) => (
                err.to_string(),
                EvaluationResult {
                    score: 0.0,
                    reflection_text: format!("tool failed before observing: {}", err),
                },
            ),
        };

        if evaluation.score >= self.cfg.success_score {
            self.registry.adjust_confidence(tool, self.cfg.success_boost);
        } else {
            self.registry.adjust_confidence(tool, -self.cfg.failure_decay);
        }

        let record = self.memory.append(ReflexionRecord::new(
            &task.id,
            attempt,
            action,
            observation_text,
            category,
            evaluation.score,
            evaluation.reflection_text.clone(),
        ))?;
        Ok((record, evaluation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (ReflexionEngine, Arc<EpisodicMemory>, Arc<CapabilityRegistry>) {
        let memory = Arc::new(EpisodicMemory::in_memory().unwrap());
        let registry = Arc::new(CapabilityRegistry::new());
        registry.register_tool("shell", "execute a shell command", serde_json::json!({}), 0.5);
        let engine = ReflexionEngine::new(
            memory.clone(),
            registry.clone(),
            ReflexionConfig::default(),
        );
        (engine, memory, registry)
    }

    #[test]
    fn test_summary_outranks_exit_code() {
        let (engine, _, _) = engine();
        let task = Task::new("t-001", "run tests");
        let obs = Observation::new("shell", "12 passed; 4 failed").with_exit_code(1);
        let result = engine.evaluate(&task, "cargo test", &obs);
        assert!((result.score - 7.5).abs() < 0.01);
    }

    #[test]
    fn reflect_appends_and_reinforces() {
        let (engine, memory, registry) = engine();
        let task = Task::new("t-001", "build");
        let obs = Observation::new("shell", "done").with_exit_code(0);

        engine
            .reflect(&task, 0, "shell", "make", Ok(&obs), RecordCategory::Attempt)
            .unwrap();

        assert_eq!(memory.count().unwrap(), 1);
        assert!(registry.get("shell").unwrap().confidence_score > 0.5);
    }

    #[test]
    fn reflect_on_tool_error_decays_confidence() {
        let (engine, memory, registry) = engine();
        let task = Task::new("t-001", "build");
        let err = ToolError::new("shell", crate::gateway::ToolErrorKind::Timeout, "no answer");

        let (record, evaluation) = engine
            .reflect(&task, 1, "shell", "make", Err(&err), RecordCategory::Attempt)
            .unwrap();

        assert_eq!(evaluation.score, 0.0);
        assert!(record.observation.contains("timeout"));
        assert!(registry.get("shell").unwrap().confidence_score < 0.5);
        assert_eq!(memory.count().unwrap(), 1);
    }
}
