//! Goal state: the prime directive and its checklist.
//!
//! The goal state is recited at the start of every cognitive-loop iteration
//! so the prime directive is present in every assembled context, preventing
//! goal loss over long missions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, WayfarerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalState {
    pub mission_id: String,
    pub prime_directive: String,
    pub checklist: Vec<ChecklistItem>,
}

impl GoalState {
    pub fn new(
        mission_id: impl Into<String>,
        prime_directive: impl Into<String>,
        items: Vec<String>,
    ) -> Self {
        Self {
            mission_id: mission_id.into(),
            prime_directive: prime_directive.into(),
            checklist: items
                .into_iter()
                .map(|item| ChecklistItem { item, done: false })
                .collect(),
        }
    }

    /// Marks the first matching incomplete item done. Returns false when no
    /// such item exists.
    pub fn mark_done(&mut self, item: &str) -> bool {
        for entry in &mut self.checklist {
            if !entry.done && entry.item == item {
                entry.done = true;
                return true;
            }
        }
        false
    }

    pub fn is_complete(&self) -> bool {
        self.checklist.iter().all(|i| i.done)
    }

    pub fn incomplete(&self) -> Vec<&str> {
        self.checklist
            .iter()
            .filter(|i| !i.done)
            .map(|i| i.item.as_str())
            .collect()
    }

    /// The recitation block placed at the head of every context.
    pub fn recitation(&self) -> String {
        let mut out = format!("PRIME DIRECTIVE: {}\n", self.prime_directive);
        for entry in &self.checklist {
            let mark = if entry.done { "x" } else { " " };
            out.push_str(&format!("[{}] {}\n", mark, entry.item));
        }
        out
    }
}

/// Persists one goal state per active mission under `goals/`.
pub struct GoalManager {
    goals_dir: PathBuf,
}

impl GoalManager {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            goals_dir: data_dir.join("goals"),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.goals_dir).await?;
        Ok(())
    }

    pub async fn save(&self, goal: &GoalState) -> Result<()> {
        let path = self.goal_path(&goal.mission_id);
        let content = serde_yaml_bw::to_string(goal)?;
        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!(mission_id = %goal.mission_id, "Goal state saved");
        Ok(())
    }

    /// Read the live goal state ("recitation" read at loop start).
    pub async fn recite(&self, mission_id: &str) -> Result<GoalState> {
        let path = self.goal_path(mission_id);
        if !path.exists() {
            return Err(WayfarerError::MissionNotFound(mission_id.to_string()));
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_yaml_bw::from_str(&content)?)
    }

    /// Mark a checklist item complete after a verified task success.
    pub async fn mark_done(&self, mission_id: &str, item: &str) -> Result<bool> {
        let mut goal = self.recite(mission_id).await?;
        let changed = goal.mark_done(item);
        if changed {
            self.save(&goal).await?;
        }
        Ok(changed)
    }

    fn goal_path(&self, mission_id: &str) -> PathBuf {
        self.goals_dir.join(format!("{}.yaml", mission_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recitation_contains_directive_and_items() {
        let goal = GoalState::new(
            "m-001",
            "ship the release",
            vec!["build".into(), "test".into()],
        );
        let text = goal.recitation();
        assert!(text.contains("PRIME DIRECTIVE: ship the release"));
        assert!(text.contains("[ ] build"));
    }

    #[test]
    fn mark_done_only_matches_incomplete() {
        let mut goal = GoalState::new("m-001", "d", vec!["a".into(), "a".into()]);
        assert!(goal.mark_done("a"));
        assert!(goal.mark_done("a"));
        assert!(!goal.mark_done("a"));
        assert!(goal.is_complete());
    }

    #[tokio::test]
    async fn save_and_recite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GoalManager::new(dir.path());
        manager.init().await.unwrap();

        let goal = GoalState::new("m-001", "directive", vec!["step one".into()]);
        manager.save(&goal).await.unwrap();

        manager.mark_done("m-001", "step one").await.unwrap();
        let loaded = manager.recite("m-001").await.unwrap();
        assert!(loaded.is_complete());
    }
}
