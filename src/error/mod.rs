use crate::capture::CaptureError;
use crate::reconstruct::ReconstructionError;
use crate::state::StateError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Which adapter an opaque engine failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    Capture,
    Reconstruction,
}

impl std::fmt::Display for EngineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStage::Capture => f.write_str("capture"),
            EngineStage::Reconstruction => f.write_str("reconstruction"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("filesystem error: {0}")]
    Filesystem(#[from] StorageError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),
    /// Opaque failure reported by a running engine; the reason is carried
    /// through untranslated for diagnostics.
    #[error("{stage} engine failure: {reason}")]
    Engine { stage: EngineStage, reason: String },
}
