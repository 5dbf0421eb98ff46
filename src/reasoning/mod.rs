mod controller;
mod react;
mod tot;

pub use controller::should_escalate_to_tot;
pub use react::{ReactExecutor, StepResult};
pub use tot::{ThoughtNode, TotEngine, TotOutcome};
