use std::path::Path;
use std::sync::mpsc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {message}")]
    DeviceUnavailable { message: String },
    #[error("capture io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Pose-tracking quality reported by the live capture engine while the
/// user orbits the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingQuality {
    Normal,
    Limited,
    NotAvailable,
}

/// Events pushed by a live capture session, in capture order. The stream
/// ends exactly once, with `Finished`, `Cancelled`, or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    ImageCaptured { count: u64 },
    TrackingQualityChanged(TrackingQuality),
    Finished,
    Cancelled,
    Failed { reason: String },
}

impl CaptureEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureEvent::Finished | CaptureEvent::Cancelled | CaptureEvent::Failed { .. }
        )
    }
}

/// Advisory commands sent to a running session. The engine may emit a few
/// trailing events after a command before its terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Finish,
    Cancel,
}

/// Control-thread end of one live capture session: events arrive on a
/// channel fed by the engine's producer thread, commands go the other way.
#[derive(Debug)]
pub struct CaptureSessionHandle {
    events: mpsc::Receiver<CaptureEvent>,
    commands: mpsc::Sender<CaptureCommand>,
}

impl CaptureSessionHandle {
    pub fn new(
        events: mpsc::Receiver<CaptureEvent>,
        commands: mpsc::Sender<CaptureCommand>,
    ) -> Self {
        Self { events, commands }
    }

    /// The user is done orbiting; the engine flushes in-flight captures and
    /// then emits `Finished`.
    pub fn finish(&self) {
        let _ = self.commands.send(CaptureCommand::Finish);
    }

    /// Best-effort teardown request; the engine's terminal event becomes
    /// `Cancelled`.
    pub fn cancel(&self) {
        let _ = self.commands.send(CaptureCommand::Cancel);
    }

    /// Non-blocking drain for the control thread. `None` means no event is
    /// pending right now (or the producer hung up after its terminal event).
    pub fn try_next_event(&self) -> Option<CaptureEvent> {
        self.events.try_recv().ok()
    }
}

/// Seam to the external live-capture engine. Implementations stream photos
/// of the object into `images_dir` and report progress through the handle.
pub trait CaptureEngine {
    fn start(&mut self, images_dir: &Path) -> CaptureResult<CaptureSessionHandle>;
}
