// Run State Machine
//
// IDLE -> ACQUIRING -> PAYLOAD_SET -> EXECUTING -> {SUCCEEDED, FAILED} -> IDLE

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Acquiring,
    PayloadSet,
    Executing,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, PayloadSet)
                // Handoff or validation failed before the unit was started
                | (Acquiring, Failed)
                | (PayloadSet, Executing)
                | (PayloadSet, Failed)
                | (Executing, Succeeded)
                | (Executing, Failed)
                | (Succeeded, Idle)
                | (Failed, Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Acquiring => write!(f, "ACQUIRING"),
            RunState::PayloadSet => write!(f, "PAYLOAD_SET"),
            RunState::Executing => write!(f, "EXECUTING"),
            RunState::Succeeded => write!(f, "SUCCEEDED"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Lifecycle of a single run
#[derive(Debug)]
pub struct RunLifecycle {
    run_id: String,
    state: RunState,
}

impl RunLifecycle {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunState::Idle,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(run_id = %self.run_id, from = %self.state, to = %next, "Run state transition");
        self.state = next;
        Ok(())
    }
}
