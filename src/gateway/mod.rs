//! Uniform synchronous interface to all external effectful operations.
//!
//! Every action an agent takes goes through [`ToolGateway::invoke`]. The
//! gateway enforces the hallucination guard: a tool that is absent from the
//! Capability Registry is never dispatched, and a tool whose confidence has
//! decayed below the verify threshold is probed before it is trusted with a
//! consequential action.

mod tools;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use tools::{FileReadTool, ShellTool};

use crate::registry::CapabilityRegistry;

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    Unauthorized,
    Timeout,
    RuntimeError,
}

impl ToolErrorKind {
    /// Timeout and runtime errors are idempotent-safe to retry. NotFound and
    /// Unauthorized bypass the retry tier entirely.
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Timeout | Self::RuntimeError)
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Timeout => write!(f, "timeout"),
            Self::RuntimeError => write!(f, "runtime error"),
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("tool '{tool}' failed ({kind}): {message}")]
pub struct ToolError {
    pub tool: String,
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(tool: impl Into<String>, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        let message = format!("no tool named '{}' is registered", tool);
        Self::new(tool, ToolErrorKind::NotFound, message)
    }
}

/// Result of a dispatched action, as seen by the cognitive loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub tool: String,
    pub content: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            content: content.into(),
            exit_code: None,
            elapsed_ms: 0,
            observed_at: Utc::now(),
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Synthetic observation injected by a human resolution at the
    /// escalation boundary.
    pub fn synthetic(content: impl Into<String>) -> Self {
        Self::new("operator", content).with_exit_code(0)
    }
}

/// A capability learned through Tier-2 research: a named composition over
/// an already-mounted tool, with baseline arguments from the synthesized
/// heuristic. Caller-supplied arguments override the baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedCapability {
    pub name: String,
    pub description: String,
    pub via_tool: String,
    #[serde(default)]
    pub base_args: JsonMap,
}

struct LearnedTool {
    capability: LearnedCapability,
    inner: Arc<dyn Tool>,
}

#[async_trait]
impl Tool for LearnedTool {
    fn name(&self) -> &str {
        &self.capability.name
    }

    fn description(&self) -> &str {
        &self.capability.description
    }

    fn invocation_schema(&self) -> serde_json::Value {
        self.inner.invocation_schema()
    }

    async fn invoke(&self, args: &JsonMap) -> std::result::Result<Observation, ToolError> {
        let mut merged = self.capability.base_args.clone();
        for (key, value) in args {
            merged.insert(key.clone(), value.clone());
        }
        self.inner.invoke(&merged).await
    }

    async fn probe(&self) -> bool {
        self.inner.probe().await
    }
}

/// A single external capability behind the gateway.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn invocation_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn invoke(&self, args: &JsonMap) -> std::result::Result<Observation, ToolError>;

    /// Cheap read-only probe used by [`ToolGateway`] before relying on a
    /// low-confidence tool.
    async fn probe(&self) -> bool {
        true
    }
}

pub struct ToolGateway {
    tools: DashMap<String, Arc<dyn Tool>>,
    registry: Arc<CapabilityRegistry>,
    verify_threshold: f64,
}

impl ToolGateway {
    pub fn new(registry: Arc<CapabilityRegistry>, verify_threshold: f64) -> Self {
        Self {
            tools: DashMap::new(),
            registry,
            verify_threshold,
        }
    }

    /// Mounts a tool and registers its manifest entry. Mounting is the only
    /// way a tool becomes dispatchable.
    pub fn mount(&self, tool: Arc<dyn Tool>, initial_confidence: f64) {
        self.registry.register_tool(
            tool.name(),
            tool.description(),
            tool.invocation_schema(),
            initial_confidence,
        );
        debug!(tool = tool.name(), "Tool mounted");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Mount a capability learned by the Meta-Cognition tier. The underlying
    /// tool must already be mounted.
    pub fn mount_learned(
        &self,
        capability: LearnedCapability,
        initial_confidence: f64,
    ) -> std::result::Result<(), ToolError> {
        let inner = match self.tools.get(&capability.via_tool) {
            Some(tool) => Arc::clone(tool.value()),
            None => return Err(ToolError::not_found(&capability.via_tool)),
        };
        self.mount(
            Arc::new(LearnedTool { capability, inner }),
            initial_confidence,
        );
        Ok(())
    }

    /// Dispatch an action. Registry lookup is a hard precondition: an
    /// unregistered name returns `NotFound` without touching any tool.
    pub async fn invoke(
        &self,
        name: &str,
        args: &JsonMap,
        timeout: Duration,
    ) -> std::result::Result<Observation, ToolError> {
        let entry = match self.registry.get(name) {
            Some(entry) => entry,
            None => {
                warn!(tool = name, "Dispatch refused: tool absent from registry");
                return Err(ToolError::not_found(name));
            }
        };

        let tool = match self.tools.get(name) {
            Some(tool) => Arc::clone(tool.value()),
            None => return Err(ToolError::not_found(name)),
        };

        if entry.confidence_score < self.verify_threshold && !self.verify(name).await {
            return Err(ToolError::new(
                name,
                ToolErrorKind::RuntimeError,
                "pre-dispatch probe failed",
            ));
        }

        let started = std::time::Instant::now();
        match tokio::time::timeout(timeout, tool.invoke(args)).await {
            Ok(Ok(mut obs)) => {
                obs.elapsed_ms = started.elapsed().as_millis() as u64;
                Ok(obs)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ToolError::new(
                name,
                ToolErrorKind::Timeout,
                format!("no response within {}s", timeout.as_secs()),
            )),
        }
    }

    /// Read-only probe; refreshes `verified_at` on success.
    pub async fn verify(&self, name: &str) -> bool {
        let Some(tool) = self.tools.get(name).map(|t| Arc::clone(t.value())) else {
            return false;
        };
        let ok = tool.probe().await;
        if ok {
            self.registry.mark_verified(name);
        } else {
            warn!(tool = name, "Probe failed");
        }
        ok
    }
}
