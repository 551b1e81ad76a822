/// Workflow phases for one guided object capture run.
///
/// `Completed` and `Failed` are terminal for the attempt; `Restart` is a
/// transient cleanup phase that always returns to `Ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CaptureState {
    #[default]
    Ready,
    Capturing,
    Reconstructing,
    Viewing,
    Completed,
    Failed,
    Restart,
}

impl CaptureState {
    /// True when no further transition can leave this state for the
    /// current attempt without user acknowledgement.
    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureState::Completed | CaptureState::Failed)
    }
}
