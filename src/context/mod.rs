//! Context curation: what the cognitive loop sees on each iteration.
//!
//! Every context opens with the goal recitation, followed by the most
//! relevant reflections and the registry entries plausibly useful for the
//! task. The serialized size never exceeds the configured budget: over
//! budget, observation bodies degrade to one-line references before whole
//! reflections are dropped. Capabilities are kept — they gate what the
//! reasoner is allowed to propose.

use std::sync::Arc;

use tracing::debug;

use crate::config::ContextConfig;
use crate::error::Result;
use crate::goal::GoalManager;
use crate::memory::{EpisodicMemory, ReflexionRecord};
use crate::mission::Task;
use crate::registry::{CapabilityManifestEntry, CapabilityRegistry};
use crate::utils::{head_line, truncate_with_marker};

const OBSERVATION_SLICE_BYTES: usize = 400;
const REFERENCE_LINE_BYTES: usize = 96;

#[derive(Debug, Clone)]
pub struct ReflexionSlice {
    pub record_id: i64,
    pub task_id: String,
    pub body: String,
}

impl ReflexionSlice {
    fn full(record: &ReflexionRecord) -> Self {
        Self {
            record_id: record.id,
            task_id: record.task_id.clone(),
            body: format!(
                "[r{} {} {}] action: {} | observed: {} | lesson: {}",
                record.id,
                record.task_id,
                record.category,
                head_line(&record.action, 120),
                truncate_with_marker(&record.observation, OBSERVATION_SLICE_BYTES),
                record.reflection_text,
            ),
        }
    }

    /// Reference form: record id and a truncated head instead of content.
    /// The full record can be re-fetched from episodic memory on demand.
    fn reference(record: &ReflexionRecord) -> Self {
        Self {
            record_id: record.id,
            task_id: record.task_id.clone(),
            body: format!(
                "[r{} {}] {}",
                record.id,
                record.task_id,
                head_line(&record.reflection_text, REFERENCE_LINE_BYTES),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub recitation: String,
    pub reflections: Vec<ReflexionSlice>,
    pub capabilities: Vec<CapabilityManifestEntry>,
}

impl Context {
    /// Minimal context for tests and ToT sub-episodes.
    pub fn bare(recitation: impl Into<String>) -> Self {
        Self {
            recitation: recitation.into(),
            reflections: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.recitation);
        if !self.reflections.is_empty() {
            out.push_str("\nPAST REFLECTIONS:\n");
            for slice in &self.reflections {
                out.push_str(&slice.body);
                out.push('\n');
            }
        }
        if !self.capabilities.is_empty() {
            out.push_str("\nAVAILABLE TOOLS:\n");
            for cap in &self.capabilities {
                out.push_str(&format!(
                    "- {} (confidence {:.2}): {}\n",
                    cap.tool_name, cap.confidence_score, cap.description
                ));
            }
        }
        out
    }

    pub fn serialized_len(&self) -> usize {
        self.render().len()
    }
}

pub struct ContextCurator {
    memory: Arc<EpisodicMemory>,
    registry: Arc<CapabilityRegistry>,
    goals: Arc<GoalManager>,
    cfg: ContextConfig,
}

impl ContextCurator {
    pub fn new(
        memory: Arc<EpisodicMemory>,
        registry: Arc<CapabilityRegistry>,
        goals: Arc<GoalManager>,
        cfg: ContextConfig,
    ) -> Self {
        Self {
            memory,
            registry,
            goals,
            cfg,
        }
    }

    pub async fn build(&self, mission_id: &str, task: &Task) -> Result<Context> {
        let goal = self.goals.recite(mission_id).await?;

        let mut query = task.description.clone();
        if let Some(result) = &task.result
            && !result.success
        {
            query.push(' ');
            query.push_str(&head_line(&result.output, 200));
        }

        // The task's own recent history first, then cross-task relevance.
        let mut records = self.memory.history(&task.id)?;
        let own_len = records.len();
        if own_len > self.cfg.top_k_reflexions {
            records = records.split_off(own_len - self.cfg.top_k_reflexions);
        }
        for candidate in self.memory.relevant(&query, self.cfg.top_k_reflexions)? {
            if records.len() >= self.cfg.top_k_reflexions {
                break;
            }
            if records.iter().all(|r| r.id != candidate.id) {
                records.push(candidate);
            }
        }

        let mut hints = task.description.clone();
        for hint in &task.required_capabilities {
            hints.push(' ');
            hints.push_str(hint);
        }
        let mut capabilities = self.registry.lookup(&hints);
        if capabilities.is_empty() {
            capabilities = self.registry.snapshot();
        }
        capabilities.truncate(self.cfg.max_capabilities);

        let mut context = Context {
            recitation: goal.recitation(),
            reflections: records.iter().map(ReflexionSlice::full).collect(),
            capabilities,
        };
        self.fit_to_budget(&mut context, &records);

        debug!(
            task_id = %task.id,
            reflections = context.reflections.len(),
            capabilities = context.capabilities.len(),
            bytes = context.serialized_len(),
            "Context assembled"
        );
        Ok(context)
    }

    fn fit_to_budget(&self, context: &mut Context, records: &[ReflexionRecord]) {
        if context.serialized_len() <= self.cfg.budget_bytes {
            return;
        }

        // First degrade content to references, then shed whole entries.
        context.reflections = records.iter().map(ReflexionSlice::reference).collect();
        while context.serialized_len() > self.cfg.budget_bytes && context.reflections.pop().is_some()
        {
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalState;
    use crate::memory::{RecordCategory, ReflexionRecord};

    async fn curator(cfg: ContextConfig) -> (ContextCurator, Arc<EpisodicMemory>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(EpisodicMemory::in_memory().unwrap());
        let registry = Arc::new(CapabilityRegistry::new());
        registry.register_tool("shell", "execute a shell command", serde_json::json!({}), 0.9);
        let goals = Arc::new(GoalManager::new(dir.path()));
        goals.init().await.unwrap();
        goals
            .save(&GoalState::new("m-001", "keep the lights on", vec!["task one".into()]))
            .await
            .unwrap();
        (
            ContextCurator::new(memory.clone(), registry, goals, cfg),
            memory,
            dir,
        )
    }

    #[tokio::test]
    async fn recitation_always_present() {
        let (curator, _memory, _dir) = curator(ContextConfig::default()).await;
        let task = Task::new("t-001", "run the shell build");
        let context = curator.build("m-001", &task).await.unwrap();
        assert!(context.recitation.contains("PRIME DIRECTIVE: keep the lights on"));
        assert!(!context.capabilities.is_empty());
    }

    #[tokio::test]
    async fn stays_within_budget() {
        let cfg = ContextConfig {
            budget_bytes: 1024,
            top_k_reflexions: 8,
            max_capabilities: 4,
        };
        let (curator, memory, _dir) = curator(cfg).await;

        for i in 0..8 {
            memory
                .append(ReflexionRecord::new(
                    "t-001",
                    i,
                    "shell build",
                    "x".repeat(600),
                    RecordCategory::Attempt,
                    3.0,
                    "build output was noisy",
                ))
                .unwrap();
        }

        let task = Task::new("t-001", "shell build");
        let context = curator.build("m-001", &task).await.unwrap();
        assert!(context.serialized_len() <= 1024);
        assert!(context.recitation.contains("PRIME DIRECTIVE"));
    }
}
