use thiserror::Error;

use crate::gateway::ToolError;

pub type Result<T> = std::result::Result<T, WayfarerError>;

#[derive(Debug, Error)]
pub enum WayfarerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("episodic store error: {0}")]
    Memory(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("mission not found: {0}")]
    MissionNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A decomposed plan contained a cycle or referenced an unknown task.
    /// Fatal to the mission: the plan is never executed.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("ambiguous observation for task {task_id}: {message}")]
    AmbiguousObservation { task_id: String, message: String },

    #[error("capability gap: no registered tool covers '{capability}'")]
    CapabilityGap { capability: String },

    #[error("circuit breaker tripped for task {task_id} after {retries} retries")]
    CircuitBreakerTripped { task_id: String, retries: u32 },

    #[error("research exhausted for task {task_id}: {reason}")]
    ResearchExhausted { task_id: String, reason: String },

    #[error("knowledge base conflict on '{name}' after {attempts} write attempts")]
    KnowledgeConflict { name: String, attempts: u32 },

    #[error("mission cancelled")]
    MissionCancelled,

    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl WayfarerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Whether this error is fatal to the owning mission rather than to a
    /// single task.
    pub fn is_mission_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidPlan(_) | Self::MissionCancelled | Self::Config(_)
        )
    }
}
