mod engine;
mod signal;
mod worker;

pub use engine::{MissionReport, Orchestrator};
pub use signal::SignalHandle;
