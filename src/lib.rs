pub mod cli;
pub mod collaborator;
pub mod config;
pub mod context;
pub mod error;
pub mod escalation;
pub mod gateway;
pub mod goal;
pub mod knowledge;
pub mod memory;
pub mod mission;
pub mod orchestrator;
pub mod protocol;
pub mod reasoning;
pub mod reflexion;
pub mod registry;
pub mod utils;

pub use collaborator::{Reasoner, Research, ScriptedReasoner, ScriptedResearch};
pub use config::WayfarerConfig;
pub use context::{Context, ContextCurator};
pub use error::{Result, WayfarerError};
pub use escalation::{EscalationPayload, EscalationReason, Resolution};
pub use gateway::{Observation, Tool, ToolError, ToolErrorKind, ToolGateway};
pub use goal::{GoalManager, GoalState};
pub use knowledge::{KnowledgeBaseDocument, KnowledgeStore};
pub use memory::{EpisodicMemory, RecordCategory, ReflexionRecord};
pub use mission::{
    Mission, MissionSnapshot, MissionState, MissionStore, Plan, Task, TaskResult, TaskState,
};
pub use orchestrator::{MissionReport, Orchestrator};
pub use protocol::{FailureAnalysis, FailureCategory, FailureKind, ProtocolEngine};
pub use reasoning::{ReactExecutor, TotEngine, should_escalate_to_tot};
pub use reflexion::ReflexionEngine;
pub use registry::{CapabilityManifestEntry, CapabilityRegistry};
