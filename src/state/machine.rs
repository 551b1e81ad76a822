use super::error::{StateError, StateResult};
use super::{event::StateTransition, CaptureState, WorkflowEvent};

#[derive(Debug)]
pub struct StateMachine {
    state: CaptureState,
    transition_history: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: CaptureState::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn can_transition(&self, event: WorkflowEvent) -> bool {
        self.next_state(event).is_some()
    }

    /// The single authoritative transition table for the capture workflow.
    pub fn next_state(&self, event: WorkflowEvent) -> Option<CaptureState> {
        use WorkflowEvent::*;
        match (self.state, event) {
            (CaptureState::Ready, StartCapture) => Some(CaptureState::Capturing),
            (CaptureState::Capturing, ImageCaptured) => Some(CaptureState::Capturing),
            (CaptureState::Capturing, CaptureFinished) => Some(CaptureState::Reconstructing),
            (CaptureState::Capturing, CaptureAborted) => Some(CaptureState::Failed),
            (CaptureState::Reconstructing, ProgressUpdated) => Some(CaptureState::Reconstructing),
            (CaptureState::Reconstructing, ReconstructionCompleted) => Some(CaptureState::Viewing),
            (CaptureState::Reconstructing, ReconstructionFailed) => Some(CaptureState::Failed),
            (CaptureState::Viewing, AcknowledgeCompletion) => Some(CaptureState::Completed),
            (CaptureState::Failed, AcknowledgeError) => Some(CaptureState::Restart),
            (CaptureState::Restart, CleanupFinished) => Some(CaptureState::Ready),
            (CaptureState::Capturing, Cancel)
            | (CaptureState::Reconstructing, Cancel)
            | (CaptureState::Viewing, Cancel) => Some(CaptureState::Restart),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: WorkflowEvent) -> StateResult<CaptureState> {
        tracing::debug!(from = ?self.state, event = ?event, "request state transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid state transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        let record = StateTransition::new(Some(self.state), event, next);
        self.state = next;
        self.transition_history.push(record);

        Ok(self.state)
    }
}

#[cfg(test)]
impl StateMachine {
    fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CaptureState::{:?}", self.state)
    }
}
