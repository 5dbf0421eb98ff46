use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, WayfarerError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfarerConfig {
    pub orchestrator: OrchestratorConfig,
    pub react: ReactConfig,
    pub tot: TotConfig,
    pub reflexion: ReflexionConfig,
    pub recovery: RecoveryConfig,
    pub research: ResearchConfig,
    pub context: ContextConfig,
    pub registry: RegistryConfig,
}

impl WayfarerConfig {
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = data_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| WayfarerError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.orchestrator.max_parallel_tasks == 0 {
            errors.push("max_parallel_tasks must be greater than 0");
        }
        if self.orchestrator.max_iterations == 0 {
            errors.push("max_iterations must be greater than 0");
        }

        if self.react.max_steps == 0 {
            errors.push("react.max_steps must be greater than 0");
        }
        if self.react.tool_timeout_secs == 0 {
            errors.push("react.tool_timeout_secs must be greater than 0");
        }

        if self.tot.beam_width == 0 {
            errors.push("tot.beam_width must be greater than 0");
        }
        if self.tot.max_depth == 0 {
            errors.push("tot.max_depth must be greater than 0");
        }
        if !(0.0..=10.0).contains(&self.tot.score_threshold) {
            errors.push("tot.score_threshold must be between 0.0 and 10.0");
        }

        if !(0.0..=10.0).contains(&self.reflexion.success_score) {
            errors.push("reflexion.success_score must be between 0.0 and 10.0");
        }
        if !(0.0..=1.0).contains(&self.reflexion.success_boost) {
            errors.push("reflexion.success_boost must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.reflexion.failure_decay) {
            errors.push("reflexion.failure_decay must be between 0.0 and 1.0");
        }

        if self.recovery.max_retries == 0 {
            errors.push("recovery.max_retries must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.research.min_finding_confidence) {
            errors.push("research.min_finding_confidence must be between 0.0 and 1.0");
        }
        if self.research.max_write_conflicts == 0 {
            errors.push("research.max_write_conflicts must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.research.initial_confidence) {
            errors.push("research.initial_confidence must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.research.min_capability_confidence) {
            errors.push("research.min_capability_confidence must be between 0.0 and 1.0");
        }

        if self.context.budget_bytes < 1024 {
            errors.push("context.budget_bytes must be at least 1024");
        }
        if self.context.top_k_reflexions == 0 {
            errors.push("context.top_k_reflexions must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.registry.verify_threshold) {
            errors.push("registry.verify_threshold must be between 0.0 and 1.0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WayfarerError::Config(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Concurrent task workers per mission.
    pub max_parallel_tasks: usize,
    /// Scheduling-round budget before the mission is abandoned.
    pub max_iterations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            max_iterations: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactConfig {
    /// Thought-action-observation cycles per task attempt.
    pub max_steps: u32,
    pub tool_timeout_secs: u64,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            tool_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TotConfig {
    pub beam_width: u32,
    pub max_depth: u32,
    /// Candidates scoring below this are pruned. Scores are in [0, 10].
    pub score_threshold: f64,
}

impl Default for TotConfig {
    fn default() -> Self {
        Self {
            beam_width: 3,
            max_depth: 4,
            score_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexionConfig {
    /// Evaluation score at or above which an outcome reinforces tool
    /// confidence.
    pub success_score: f64,
    pub success_boost: f64,
    pub failure_decay: f64,
}

impl Default for ReflexionConfig {
    fn default() -> Self {
        Self {
            success_score: 7.0,
            success_boost: 0.05,
            failure_decay: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Tier-1 re-attempts of the same task before the circuit breaker trips.
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub min_finding_confidence: f64,
    /// Bounded retries of a conflicted knowledge-base write.
    pub max_write_conflicts: u32,
    /// Confidence assigned to a freshly learned capability.
    pub initial_confidence: f64,
    /// Below this, a registry entry does not count as covering a required
    /// capability (the Tier-2 trigger).
    pub min_capability_confidence: f64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            min_finding_confidence: 0.3,
            max_write_conflicts: 3,
            initial_confidence: 0.6,
            min_capability_confidence: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Serialized context size cap in bytes.
    pub budget_bytes: usize,
    pub top_k_reflexions: usize,
    pub max_capabilities: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 16 * 1024,
            top_k_reflexions: 5,
            max_capabilities: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Tools below this confidence are probed before dispatch.
    pub verify_threshold: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            verify_threshold: 0.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        WayfarerConfig::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_values_are_collected() {
        let mut config = WayfarerConfig::default();
        config.tot.score_threshold = 42.0;
        config.recovery.max_retries = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("score_threshold"));
        assert!(err.contains("max_retries"));
    }
}
