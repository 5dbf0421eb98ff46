//! Failure classification: the disambiguation the two protocol tiers hinge
//! on. A recognizable transient category routes to Tier 1; an absent
//! capability routes to Tier 2; an observation matching zero or several
//! distinct signatures is ambiguous and routes to Tree-of-Thoughts first.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::gateway::{Observation, ToolError, ToolErrorKind};
use crate::memory::relevance::signature_line;
use crate::utils::head_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    MissingDependency,
    PermissionDenied,
    SyntaxError,
    Timeout,
    Network,
    Runtime,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDependency => write!(f, "missing dependency"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::SyntaxError => write!(f, "syntax error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network error"),
            Self::Runtime => write!(f, "runtime error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Classifiable and transient: Tier-1 eligible.
    Transient(FailureCategory),
    /// Root cause not uniquely identifiable from the observation.
    Ambiguous,
    /// No registered tool covers a required action: Tier-2 eligible.
    CapabilityGap { capability: String },
    /// Authorization failures bypass both tiers to the human boundary.
    Unauthorized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub task_id: String,
    pub kind: FailureKind,
    pub message: String,
    /// Token signature of the message, for matching against past outcomes.
    pub signature: String,
    pub occurred_at: DateTime<Utc>,
}

impl FailureAnalysis {
    pub fn new(task_id: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            task_id: task_id.into(),
            kind,
            signature: signature_line(&head_line(&message, 200)),
            message,
            occurred_at: Utc::now(),
        }
    }

    pub fn from_tool_error(task_id: &str, err: &ToolError) -> Self {
        let kind = match err.kind {
            ToolErrorKind::NotFound => FailureKind::CapabilityGap {
                capability: err.tool.clone(),
            },
            ToolErrorKind::Unauthorized => FailureKind::Unauthorized,
            ToolErrorKind::Timeout => FailureKind::Transient(FailureCategory::Timeout),
            ToolErrorKind::RuntimeError => FailureKind::Transient(FailureCategory::Runtime),
        };
        Self::new(task_id, kind, err.to_string())
    }

    pub fn from_observation(task_id: &str, obs: &Observation) -> Self {
        let kind = match classify_observation(obs) {
            ObservationClass::Failure(category) => FailureKind::Transient(category),
            _ => FailureKind::Ambiguous,
        };
        Self::new(task_id, kind, obs.content.clone())
    }

    pub fn capability_gap(task_id: &str, capability: impl Into<String>) -> Self {
        let capability = capability.into();
        let message = format!("no registered tool covers '{}'", capability);
        Self::new(task_id, FailureKind::CapabilityGap { capability }, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationClass {
    Success,
    Failure(FailureCategory),
    /// Zero recognizable signatures on a failing exit, or several distinct
    /// ones: the root cause is not uniquely identifiable.
    Ambiguous,
}

static SIGNATURES: OnceLock<Vec<(FailureCategory, Regex)>> = OnceLock::new();

fn signatures() -> &'static [(FailureCategory, Regex)] {
    SIGNATURES.get_or_init(|| {
        [
            (
                FailureCategory::MissingDependency,
                r"(?i)command not found|no such file|module not found|cannot find (crate|module|package)|unresolved import|is not installed|missing dependency|package .* has no installation candidate",
            ),
            (
                FailureCategory::PermissionDenied,
                r"(?i)permission denied|operation not permitted|access denied|read-only file system",
            ),
            (
                FailureCategory::SyntaxError,
                r"(?i)syntax error|unexpected token|parse error|invalid syntax|unexpected end of (file|input)",
            ),
            (FailureCategory::Timeout, r"(?i)timed? ?out"),
            (
                FailureCategory::Network,
                r"(?i)connection (refused|reset)|network (is )?unreachable|name resolution|temporary failure in name|429|502|503|504",
            ),
            (
                FailureCategory::Runtime,
                r"(?i)panicked at|segmentation fault|stack overflow|killed|out of memory",
            ),
        ]
        .into_iter()
        .map(|(cat, pattern)| (cat, Regex::new(pattern).expect("static pattern")))
        .collect()
    })
}

/// Classify an observation into success, a single recognizable failure
/// category, or ambiguity.
pub fn classify_observation(obs: &Observation) -> ObservationClass {
    let matched: Vec<FailureCategory> = signatures()
        .iter()
        .filter(|(_, re)| re.is_match(&obs.content))
        .map(|(cat, _)| *cat)
        .collect();

    match obs.exit_code {
        Some(0) => ObservationClass::Success,
        Some(_) => match matched.as_slice() {
            [single] => ObservationClass::Failure(*single),
            _ => ObservationClass::Ambiguous,
        },
        None => match matched.as_slice() {
            [] => ObservationClass::Success,
            [single] => ObservationClass::Failure(*single),
            _ => ObservationClass::Ambiguous,
        },
    }
}
