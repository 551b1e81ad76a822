use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error(
        "not enough usable images for reconstruction: found {found}, need at least {required}; \
         capture more images and retry"
    )]
    InsufficientInput { found: usize, required: usize },
    #[error("reconstruction io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReconstructResult<T> = std::result::Result<T, ReconstructionError>;

/// Requested output quality/size preset for the batch engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Preview,
    Reduced,
    #[default]
    Medium,
    Full,
    Raw,
}

/// Progress stream of one batch job: zero or more `Progress` updates with a
/// non-decreasing fraction, then exactly one terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionEvent {
    Progress(f64),
    Completed { output: PathBuf },
    Cancelled,
    Failed { reason: String },
}

impl ReconstructionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReconstructionEvent::Progress(_))
    }
}

/// Control-thread end of one submitted reconstruction job.
#[derive(Debug)]
pub struct ReconstructionHandle {
    events: mpsc::Receiver<ReconstructionEvent>,
    cancel: mpsc::Sender<()>,
}

impl ReconstructionHandle {
    pub fn new(events: mpsc::Receiver<ReconstructionEvent>, cancel: mpsc::Sender<()>) -> Self {
        Self { events, cancel }
    }

    /// Advisory abort; the job may still emit trailing progress before its
    /// terminal event.
    pub fn cancel(&self) {
        let _ = self.cancel.send(());
    }

    pub fn try_next_event(&self) -> Option<ReconstructionEvent> {
        self.events.try_recv().ok()
    }
}

/// Seam to the external photogrammetry engine: consumes a folder of
/// captured images and produces a model file under `models_dir`.
pub trait ReconstructionEngine {
    fn reconstruct(
        &mut self,
        images_dir: &Path,
        detail: DetailLevel,
        models_dir: &Path,
    ) -> ReconstructResult<ReconstructionHandle>;
}

/// Counts files in `dir` that decode as images. Entries whose dimensions
/// cannot be read are skipped with a warning rather than failing the scan.
pub fn count_usable_images(dir: &Path) -> ReconstructResult<usize> {
    let mut usable = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match image::image_dimensions(&path) {
            Ok((width, height)) if width > 0 && height > 0 => usable += 1,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), ?err, "skipping unreadable capture file");
            }
        }
    }
    Ok(usable)
}
