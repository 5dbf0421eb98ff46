use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Terminal: the task waits for an operator at the escalation boundary.
    AwaitingHuman,
    /// Tier-2 parking state while a capability gap is researched. Does not
    /// count against the retry budget and is lifted by a requeue.
    PendingResearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Blocked { reason: BlockReason },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Blocked {
                    reason: BlockReason::AwaitingHuman
                }
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Blocked { reason: BlockReason::AwaitingHuman } => write!(f, "blocked (human)"),
            Self::Blocked { reason: BlockReason::PendingResearch } => {
                write!(f, "blocked (research)")
            }
        }
    }
}

/// Planning-complexity tag. Non-routine classes route to Tree-of-Thoughts
/// before any linear attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityClass {
    #[default]
    Routine,
    ArchitectureSelection,
    TechnologyChoice,
    LargeRefactor,
}

impl ComplexityClass {
    pub fn is_planning_class(self) -> bool {
        !matches!(self, Self::Routine)
    }
}

/// Which self-correction tier currently owns this task's failure workflow.
/// The tiers are mutually exclusive at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Reflexion,
    MetaCognition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub evaluation_score: Option<f64>,
}

impl TaskResult {
    pub fn success(output: impl Into<String>, score: f64) -> Self {
        Self {
            success: true,
            output: output.into(),
            evaluation_score: Some(score),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            evaluation_score: None,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,

    #[serde(default)]
    pub complexity: ComplexityClass,

    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Capability hints checked against the registry before any attempt;
    /// an uncovered hint is the Tier-2 trigger.
    #[serde(default)]
    pub required_capabilities: Vec<String>,

    pub state: TaskState,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub escalation_tier: Option<EscalationTier>,

    #[serde(default)]
    pub result: Option<TaskResult>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            complexity: ComplexityClass::Routine,
            dependencies: Vec::new(),
            required_capabilities: Vec::new(),
            state: TaskState::Pending,
            retry_count: 0,
            max_retries: default_max_retries(),
            escalation_tier: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityClass) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_required_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Runnable when pending and every dependency is in the given set of
    /// succeeded task ids.
    pub fn can_start(&self, succeeded: &[&str]) -> bool {
        self.state == TaskState::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| succeeded.contains(&dep.as_str()))
    }

    pub fn start(&mut self) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, result: TaskResult) {
        self.state = TaskState::Succeeded;
        self.completed_at = Some(Utc::now());
        self.escalation_tier = None;
        self.result = Some(result);
    }

    pub fn fail(&mut self, output: impl Into<String>) {
        self.state = TaskState::Failed;
        self.result = Some(TaskResult::failure(output));
    }

    pub fn block(&mut self, reason: BlockReason) {
        self.state = TaskState::Blocked { reason };
        if reason == BlockReason::AwaitingHuman {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Tier-1 re-attempt: consumes one unit of the retry budget and returns
    /// the task to the scheduler.
    pub fn prepare_retry(&mut self) {
        self.retry_count += 1;
        self.state = TaskState::Pending;
        self.escalation_tier = Some(EscalationTier::Reflexion);
    }

    /// Tier-2 requeue after a committed knowledge update. Leaves the retry
    /// budget untouched.
    pub fn requeue(&mut self) {
        self.state = TaskState::Pending;
        self.escalation_tier = None;
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
