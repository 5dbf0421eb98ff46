mod settings;

pub use settings::{
    ContextConfig, OrchestratorConfig, ReactConfig, RecoveryConfig, ReflexionConfig,
    RegistryConfig, ResearchConfig, TotConfig, WayfarerConfig,
};
