use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfarerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    #[default]
    Pending,
    Planning,
    Running,
    /// Suspended on a blocked task awaiting human input. Resumable.
    Escalated,
    Completed,
    Failed,
    Cancelled,
}

impl MissionState {
    pub fn allowed_transitions(&self) -> &'static [MissionState] {
        use MissionState::*;
        match self {
            Pending => &[Planning, Failed, Cancelled],
            Planning => &[Running, Failed, Cancelled],
            Running => &[Completed, Failed, Cancelled, Escalated],
            Escalated => &[Running, Failed, Cancelled],
            Completed => &[],
            Failed => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: MissionState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Planning | Self::Running)
    }

    pub fn requires_human_input(&self) -> bool {
        matches!(self, Self::Escalated)
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Planning => "Planning",
            Self::Running => "Running",
            Self::Escalated => "Escalated",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: MissionState,
    pub to: MissionState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One top-level objective. Immutable after creation except for its status
/// and the transition history that explains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub prime_directive: String,
    pub status: MissionState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state_history: Vec<StateTransition>,
}

impl Mission {
    pub fn new(id: impl Into<String>, prime_directive: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prime_directive: prime_directive.into(),
            status: MissionState::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            state_history: Vec::new(),
        }
    }

    pub fn transition(&mut self, to: MissionState, reason: impl Into<String>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(WayfarerError::InvalidTransition(format!(
                "mission {}: {} -> {}",
                self.id, self.status, to
            )));
        }
        self.state_history.push(StateTransition {
            from: self.status,
            to,
            reason: reason.into(),
            at: Utc::now(),
        });
        if to == MissionState::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let mut mission = Mission::new("m-001", "ship it");
        mission.transition(MissionState::Planning, "decomposing").unwrap();
        mission.transition(MissionState::Running, "plan accepted").unwrap();
        mission.transition(MissionState::Completed, "all tasks done").unwrap();
        assert!(mission.status.is_terminal());
        assert_eq!(mission.state_history.len(), 3);
        assert!(mission.completed_at.is_some());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut mission = Mission::new("m-001", "d");
        mission.transition(MissionState::Planning, "").unwrap();
        mission.transition(MissionState::Failed, "cycle in plan").unwrap();
        assert!(mission.transition(MissionState::Running, "").is_err());
    }

    #[test]
    fn escalated_is_resumable() {
        assert!(MissionState::Escalated.can_transition_to(MissionState::Running));
        assert!(MissionState::Escalated.requires_human_input());
        assert!(!MissionState::Escalated.is_terminal());
    }
}
