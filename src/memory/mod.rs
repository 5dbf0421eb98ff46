//! Episodic memory: the append-only log of reflection records.
//!
//! Records are never edited or deleted once appended; the log is the audit
//! trail every `Blocked` task is explained by. Within a task, appends are
//! strictly chronological and visible to subsequent context builds.

pub mod relevance;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::EpisodicMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    /// A regular thought-action-observation cycle.
    Attempt,
    /// A Tier-1 corrective hypothesis and injected task.
    Corrective,
    /// A Tier-2 research episode.
    Research,
    /// A terminal hand-off to the human boundary.
    Escalation,
}

impl RecordCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attempt => "attempt",
            Self::Corrective => "corrective",
            Self::Research => "research",
            Self::Escalation => "escalation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attempt" => Some(Self::Attempt),
            "corrective" => Some(Self::Corrective),
            "research" => Some(Self::Research),
            "escalation" => Some(Self::Escalation),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflexionRecord {
    /// Row id assigned by the store on append; 0 before insertion.
    #[serde(default)]
    pub id: i64,
    pub task_id: String,
    pub attempt: u32,
    pub action: String,
    pub observation: String,
    pub category: RecordCategory,
    pub evaluation_score: f64,
    pub reflection_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ReflexionRecord {
    pub fn new(
        task_id: impl Into<String>,
        attempt: u32,
        action: impl Into<String>,
        observation: impl Into<String>,
        category: RecordCategory,
        evaluation_score: f64,
        reflection_text: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            task_id: task_id.into(),
            attempt,
            action: action.into(),
            observation: observation.into(),
            category,
            evaluation_score,
            reflection_text: reflection_text.into(),
            timestamp: Utc::now(),
        }
    }
}
