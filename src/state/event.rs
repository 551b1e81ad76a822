use super::model::CaptureState;

/// Payload-free transition triggers. Event payloads (counts, paths,
/// reasons) are applied by the orchestrator alongside the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowEvent {
    StartCapture,
    ImageCaptured,
    CaptureFinished,
    CaptureAborted,
    ProgressUpdated,
    ReconstructionCompleted,
    ReconstructionFailed,
    AcknowledgeCompletion,
    AcknowledgeError,
    Cancel,
    CleanupFinished,
}

/// One applied transition, kept in the machine's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: Option<CaptureState>,
    pub event: WorkflowEvent,
    pub to: CaptureState,
}

impl StateTransition {
    pub fn new(from: Option<CaptureState>, event: WorkflowEvent, to: CaptureState) -> Self {
        Self { from, event, to }
    }
}
