use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use crate::capture::{CaptureEngine, CaptureEvent, CaptureSessionHandle, TrackingQuality};
use crate::config;
use crate::error::{AppError, AppResult, EngineStage};
use crate::reconstruct::{
    count_usable_images, DetailLevel, ReconstructionEngine, ReconstructionError,
    ReconstructionEvent, ReconstructionHandle,
};
use crate::state::{CaptureState, StateError, StateMachine, WorkflowEvent};
use crate::storage::{RunWorkspace, StorageService};

/// Immutable view of the workflow published to presentation after every
/// applied transition.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: CaptureState,
    pub captured_images: u64,
    pub tracking_quality: TrackingQuality,
    pub progress: f64,
    pub last_error: Option<Arc<AppError>>,
    pub output_model: Option<PathBuf>,
}

#[derive(Debug)]
struct ActiveRun {
    workspace: RunWorkspace,
    captured_images: u64,
    tracking_quality: TrackingQuality,
    progress: f64,
    output_model: Option<PathBuf>,
    capture: Option<CaptureSessionHandle>,
    reconstruction: Option<ReconstructionHandle>,
    cancel_pending: bool,
}

impl ActiveRun {
    fn new(workspace: RunWorkspace, capture: CaptureSessionHandle) -> Self {
        Self {
            workspace,
            captured_images: 0,
            tracking_quality: TrackingQuality::NotAvailable,
            progress: 0.0,
            output_model: None,
            capture: Some(capture),
            reconstruction: None,
            cancel_pending: false,
        }
    }
}

/// Drives one guided capture workflow end to end: owns the state machine,
/// the run storage, and both engine adapters. Intents come in from
/// presentation; engine events are pumped in on the owner's control thread
/// via [`Orchestrator::pump`]. Consumers construct and own an instance
/// explicitly; there is no process-wide singleton.
pub struct Orchestrator {
    machine: StateMachine,
    storage: StorageService,
    capture_engine: Box<dyn CaptureEngine>,
    reconstruction_engine: Box<dyn ReconstructionEngine>,
    detail_level: DetailLevel,
    min_images: usize,
    run: Option<ActiveRun>,
    last_error: Option<Arc<AppError>>,
    listeners: Vec<mpsc::Sender<Snapshot>>,
}

impl Orchestrator {
    /// Builds an orchestrator with workflow defaults from `config.json`.
    pub fn new(
        storage: StorageService,
        capture_engine: Box<dyn CaptureEngine>,
        reconstruction_engine: Box<dyn ReconstructionEngine>,
    ) -> Self {
        let config = config::load_app_config();
        Self::with_settings(
            storage,
            capture_engine,
            reconstruction_engine,
            config.detail_level(),
            config.min_images(),
        )
    }

    pub fn with_settings(
        storage: StorageService,
        capture_engine: Box<dyn CaptureEngine>,
        reconstruction_engine: Box<dyn ReconstructionEngine>,
        detail_level: DetailLevel,
        min_images: usize,
    ) -> Self {
        Self {
            machine: StateMachine::new(),
            storage,
            capture_engine,
            reconstruction_engine,
            detail_level,
            min_images,
            run: None,
            last_error: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.machine.state()
    }

    pub fn last_error(&self) -> Option<&Arc<AppError>> {
        self.last_error.as_ref()
    }

    pub fn captured_images(&self) -> u64 {
        self.run.as_ref().map_or(0, |run| run.captured_images)
    }

    pub fn output_model(&self) -> Option<&Path> {
        self.run
            .as_ref()
            .and_then(|run| run.output_model.as_deref())
    }

    pub fn snapshot(&self) -> Snapshot {
        let run = self.run.as_ref();
        Snapshot {
            state: self.machine.state(),
            captured_images: run.map_or(0, |r| r.captured_images),
            tracking_quality: run.map_or(TrackingQuality::NotAvailable, |r| r.tracking_quality),
            progress: run.map_or(0.0, |r| r.progress),
            last_error: self.last_error.clone(),
            output_model: run.and_then(|r| r.output_model.clone()),
        }
    }

    /// Registers a listener for state-change snapshots. Listeners whose
    /// receiving end hangs up are pruned on the next publish.
    pub fn subscribe(&mut self) -> mpsc::Receiver<Snapshot> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    /// Starts a fresh capture run. Rejected while another run is active;
    /// the caller must cancel or acknowledge first. Run-directory or device
    /// startup failures land the workflow in `Failed` rather than being
    /// returned, so presentation always has one error path.
    pub fn start_capture(&mut self) -> AppResult<()> {
        self.apply(WorkflowEvent::StartCapture)?;
        match self.begin_run() {
            Ok(run) => {
                self.run = Some(run);
                self.publish();
                Ok(())
            }
            Err(err) => {
                self.fail(WorkflowEvent::CaptureAborted, err);
                Ok(())
            }
        }
    }

    /// The user is done orbiting the object. The transition to
    /// reconstruction happens once the engine's `Finished` event arrives.
    pub fn finish_capture(&mut self) -> AppResult<()> {
        if self.machine.state() != CaptureState::Capturing {
            return Err(StateError::InvalidStateTransition {
                from: self.machine.state(),
                event: WorkflowEvent::CaptureFinished,
            }
            .into());
        }
        if let Some(capture) = self.run.as_ref().and_then(|run| run.capture.as_ref()) {
            capture.finish();
        }
        Ok(())
    }

    /// Cancels the current run from any live phase. Live adapters get an
    /// advisory `cancel()` and cleanup waits for their terminal event; with
    /// no adapter running, cleanup happens immediately.
    pub fn cancel(&mut self) -> AppResult<()> {
        self.apply(WorkflowEvent::Cancel)?;
        let mut awaiting_adapter = false;
        if let Some(run) = &mut self.run {
            run.cancel_pending = true;
            if let Some(capture) = &run.capture {
                capture.cancel();
                awaiting_adapter = true;
            }
            if let Some(reconstruction) = &run.reconstruction {
                reconstruction.cancel();
                awaiting_adapter = true;
            }
        }
        if !awaiting_adapter {
            self.finish_restart();
        }
        Ok(())
    }

    pub fn acknowledge_completion(&mut self) -> AppResult<()> {
        self.apply(WorkflowEvent::AcknowledgeCompletion)?;
        Ok(())
    }

    /// Dismisses the failure alert: tears the run down and returns to
    /// `Ready`, so the user is never stuck in a dead state.
    pub fn acknowledge_error(&mut self) -> AppResult<()> {
        self.apply(WorkflowEvent::AcknowledgeError)?;
        self.finish_restart();
        Ok(())
    }

    /// Drains pending adapter events and applies their transitions. Must be
    /// called from the thread that owns the orchestrator; never blocks.
    pub fn pump(&mut self) {
        self.pump_capture();
        self.pump_reconstruction();
    }

    fn pump_capture(&mut self) {
        while let Some(event) = self
            .run
            .as_ref()
            .and_then(|run| run.capture.as_ref())
            .and_then(|capture| capture.try_next_event())
        {
            self.on_capture_event(event);
        }
    }

    fn pump_reconstruction(&mut self) {
        while let Some(event) = self
            .run
            .as_ref()
            .and_then(|run| run.reconstruction.as_ref())
            .and_then(|reconstruction| reconstruction.try_next_event())
        {
            self.on_reconstruction_event(event);
        }
    }

    fn begin_run(&mut self) -> AppResult<ActiveRun> {
        let workspace = self.storage.create_run()?;
        match self.capture_engine.start(workspace.images_dir()) {
            Ok(capture) => Ok(ActiveRun::new(workspace, capture)),
            Err(err) => {
                if let Err(clear_err) = self.storage.clear_run(&workspace) {
                    tracing::warn!(
                        root = %workspace.root().display(),
                        ?clear_err,
                        "failed to clear workspace after capture start failure"
                    );
                }
                Err(err.into())
            }
        }
    }

    fn on_capture_event(&mut self, event: CaptureEvent) {
        if self.run.as_ref().is_some_and(|run| run.cancel_pending) {
            if event.is_terminal() {
                if let Some(run) = &mut self.run {
                    run.capture = None;
                }
                self.finish_restart();
            } else {
                tracing::debug!(?event, "ignoring trailing capture event after cancel");
            }
            return;
        }

        match event {
            CaptureEvent::ImageCaptured { count } => {
                if let Some(run) = &mut self.run {
                    run.captured_images = run.captured_images.max(count);
                }
                self.apply_or_drop(WorkflowEvent::ImageCaptured);
            }
            CaptureEvent::TrackingQualityChanged(quality) => {
                if let Some(run) = &mut self.run {
                    run.tracking_quality = quality;
                }
                self.publish();
            }
            CaptureEvent::Finished => {
                if let Some(run) = &mut self.run {
                    run.capture = None;
                }
                self.apply_or_drop(WorkflowEvent::CaptureFinished);
                if self.machine.state() == CaptureState::Reconstructing {
                    self.begin_reconstruction();
                }
            }
            CaptureEvent::Cancelled => {
                // A cancel the orchestrator never asked for fails the run.
                if let Some(run) = &mut self.run {
                    run.capture = None;
                }
                self.fail(
                    WorkflowEvent::CaptureAborted,
                    AppError::Engine {
                        stage: EngineStage::Capture,
                        reason: "capture session cancelled by engine".into(),
                    },
                );
            }
            CaptureEvent::Failed { reason } => {
                if let Some(run) = &mut self.run {
                    run.capture = None;
                }
                self.fail(
                    WorkflowEvent::CaptureAborted,
                    AppError::Engine {
                        stage: EngineStage::Capture,
                        reason,
                    },
                );
            }
        }
    }

    fn on_reconstruction_event(&mut self, event: ReconstructionEvent) {
        if self.run.as_ref().is_some_and(|run| run.cancel_pending) {
            if event.is_terminal() {
                if let Some(run) = &mut self.run {
                    run.reconstruction = None;
                }
                self.finish_restart();
            } else {
                tracing::debug!(?event, "ignoring trailing reconstruction event after cancel");
            }
            return;
        }

        match event {
            ReconstructionEvent::Progress(fraction) => {
                if let Some(run) = &mut self.run {
                    run.progress = run.progress.max(fraction.clamp(0.0, 1.0));
                }
                self.apply_or_drop(WorkflowEvent::ProgressUpdated);
            }
            ReconstructionEvent::Completed { output } => {
                if let Some(run) = &mut self.run {
                    run.reconstruction = None;
                    // The output path is set once per run and never replaced.
                    if run.output_model.is_none() {
                        run.output_model = Some(output);
                    }
                }
                self.apply_or_drop(WorkflowEvent::ReconstructionCompleted);
            }
            ReconstructionEvent::Cancelled => {
                if let Some(run) = &mut self.run {
                    run.reconstruction = None;
                }
                self.fail(
                    WorkflowEvent::ReconstructionFailed,
                    AppError::Engine {
                        stage: EngineStage::Reconstruction,
                        reason: "reconstruction cancelled by engine".into(),
                    },
                );
            }
            ReconstructionEvent::Failed { reason } => {
                if let Some(run) = &mut self.run {
                    run.reconstruction = None;
                }
                self.fail(
                    WorkflowEvent::ReconstructionFailed,
                    AppError::Engine {
                        stage: EngineStage::Reconstruction,
                        reason,
                    },
                );
            }
        }
    }

    fn begin_reconstruction(&mut self) {
        let (images_dir, models_dir) = match &self.run {
            Some(run) => (
                run.workspace.images_dir().to_path_buf(),
                run.workspace.models_dir().to_path_buf(),
            ),
            None => return,
        };

        let min_images = self.min_images;
        let detail_level = self.detail_level;
        let started = count_usable_images(&images_dir)
            .map_err(AppError::from)
            .and_then(|found| {
                if found < min_images {
                    Err(ReconstructionError::InsufficientInput {
                        found,
                        required: min_images,
                    }
                    .into())
                } else {
                    Ok(())
                }
            })
            .and_then(|()| {
                self.reconstruction_engine
                    .reconstruct(&images_dir, detail_level, &models_dir)
                    .map_err(AppError::from)
            });

        match started {
            Ok(handle) => {
                if let Some(run) = &mut self.run {
                    run.reconstruction = Some(handle);
                }
            }
            Err(err) => self.fail(WorkflowEvent::ReconstructionFailed, err),
        }
    }

    /// Clears the run's working directory and re-enters `Ready`. Clearing
    /// failures are logged, never escalated; the next run gets a fresh
    /// uniquely named directory regardless.
    fn finish_restart(&mut self) {
        if let Some(run) = self.run.take() {
            if let Err(err) = self.storage.clear_run(&run.workspace) {
                tracing::warn!(
                    root = %run.workspace.root().display(),
                    ?err,
                    "failed to clear run workspace during restart"
                );
            }
        }
        self.apply_or_drop(WorkflowEvent::CleanupFinished);
    }

    fn fail(&mut self, event: WorkflowEvent, err: AppError) {
        tracing::error!(%err, "capture workflow failure");
        self.last_error = Some(Arc::new(err));
        if let Err(transition_err) = self.apply(event) {
            self.last_error = None;
            tracing::warn!(?transition_err, "failure event outside a live phase dropped");
        }
    }

    fn apply(&mut self, event: WorkflowEvent) -> AppResult<CaptureState> {
        let previous = self.machine.state();
        let next = self.machine.transition(event)?;
        if previous == CaptureState::Failed && next != CaptureState::Failed {
            self.last_error = None;
        }
        debug_assert_eq!(
            self.last_error.is_some(),
            next == CaptureState::Failed,
            "error payload must be carried exactly in the failed state"
        );
        self.publish();
        Ok(next)
    }

    /// For machine-driven events that are valid by construction; an invalid
    /// application here means a logic bug, logged rather than surfaced.
    fn apply_or_drop(&mut self, event: WorkflowEvent) {
        if let Err(err) = self.apply(event) {
            tracing::warn!(?err, "dropped workflow event");
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.listeners
            .retain(|listener| listener.send(snapshot.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureCommand, CaptureError, CaptureResult};
    use crate::reconstruct::ReconstructResult;
    use image::{ImageBuffer, Rgb};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedCapture {
        sessions: VecDeque<(mpsc::Receiver<CaptureEvent>, mpsc::Sender<CaptureCommand>)>,
        fail_next: Option<String>,
    }

    impl CaptureEngine for ScriptedCapture {
        fn start(&mut self, _images_dir: &Path) -> CaptureResult<CaptureSessionHandle> {
            if let Some(message) = self.fail_next.take() {
                return Err(CaptureError::DeviceUnavailable { message });
            }
            let (events, commands) = self
                .sessions
                .pop_front()
                .expect("scripted capture session available");
            Ok(CaptureSessionHandle::new(events, commands))
        }
    }

    #[derive(Default)]
    struct ScriptedReconstruction {
        jobs: VecDeque<(mpsc::Receiver<ReconstructionEvent>, mpsc::Sender<()>)>,
    }

    impl ReconstructionEngine for ScriptedReconstruction {
        fn reconstruct(
            &mut self,
            _images_dir: &Path,
            _detail: DetailLevel,
            _models_dir: &Path,
        ) -> ReconstructResult<ReconstructionHandle> {
            let (events, cancel) = self.jobs.pop_front().expect("scripted job available");
            Ok(ReconstructionHandle::new(events, cancel))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        capture_events: mpsc::Sender<CaptureEvent>,
        capture_commands: mpsc::Receiver<CaptureCommand>,
        recon_events: mpsc::Sender<ReconstructionEvent>,
        recon_cancels: mpsc::Receiver<()>,
        base: tempfile::TempDir,
    }

    fn harness(min_images: usize) -> Harness {
        let base = tempfile::tempdir().unwrap();
        let storage = StorageService::with_base_dir(base.path().to_path_buf());

        let (capture_events, capture_event_rx) = mpsc::channel();
        let (capture_command_tx, capture_commands) = mpsc::channel();
        let mut capture = ScriptedCapture::default();
        capture
            .sessions
            .push_back((capture_event_rx, capture_command_tx));

        let (recon_events, recon_event_rx) = mpsc::channel();
        let (recon_cancel_tx, recon_cancels) = mpsc::channel();
        let mut reconstruction = ScriptedReconstruction::default();
        reconstruction.jobs.push_back((recon_event_rx, recon_cancel_tx));

        let orchestrator = Orchestrator::with_settings(
            storage,
            Box::new(capture),
            Box::new(reconstruction),
            DetailLevel::Medium,
            min_images,
        );

        Harness {
            orchestrator,
            capture_events,
            capture_commands,
            recon_events,
            recon_cancels,
            base,
        }
    }

    fn run_roots(base: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(base)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    fn drive_to_reconstructing(harness: &mut Harness, images: u64) {
        harness.orchestrator.start_capture().unwrap();
        for count in 1..=images {
            harness
                .capture_events
                .send(CaptureEvent::ImageCaptured { count })
                .unwrap();
        }
        harness.orchestrator.finish_capture().unwrap();
        harness.capture_events.send(CaptureEvent::Finished).unwrap();
        harness.orchestrator.pump();
    }

    #[test]
    fn capture_run_advances_to_reconstructing_with_image_count() {
        let mut harness = harness(0);
        harness.orchestrator.start_capture().unwrap();
        assert_eq!(harness.orchestrator.state(), CaptureState::Capturing);

        for count in 1..=3 {
            harness
                .capture_events
                .send(CaptureEvent::ImageCaptured { count })
                .unwrap();
        }
        harness.orchestrator.pump();
        assert_eq!(harness.orchestrator.state(), CaptureState::Capturing);
        assert_eq!(harness.orchestrator.captured_images(), 3);

        harness.orchestrator.finish_capture().unwrap();
        assert_eq!(
            harness.capture_commands.try_recv(),
            Ok(CaptureCommand::Finish)
        );

        harness.capture_events.send(CaptureEvent::Finished).unwrap();
        harness.orchestrator.pump();
        assert_eq!(harness.orchestrator.state(), CaptureState::Reconstructing);
        assert_eq!(harness.orchestrator.captured_images(), 3);
    }

    #[test]
    fn reconstruction_progress_then_completion_reaches_viewing() {
        let mut harness = harness(0);
        drive_to_reconstructing(&mut harness, 3);

        let output = PathBuf::from("/runs/abc/models/model.usdz");
        harness
            .recon_events
            .send(ReconstructionEvent::Progress(0.3))
            .unwrap();
        harness
            .recon_events
            .send(ReconstructionEvent::Progress(0.7))
            .unwrap();
        harness
            .recon_events
            .send(ReconstructionEvent::Completed {
                output: output.clone(),
            })
            .unwrap();
        harness.orchestrator.pump();

        assert_eq!(harness.orchestrator.state(), CaptureState::Viewing);
        assert_eq!(harness.orchestrator.output_model(), Some(output.as_path()));
        assert!((harness.orchestrator.snapshot().progress - 0.7).abs() < f64::EPSILON);

        harness.orchestrator.acknowledge_completion().unwrap();
        assert_eq!(harness.orchestrator.state(), CaptureState::Completed);
        assert_eq!(harness.orchestrator.output_model(), Some(output.as_path()));
    }

    #[test]
    fn capture_failure_surfaces_error_and_acknowledge_clears_the_run() {
        let mut harness = harness(0);
        harness.orchestrator.start_capture().unwrap();
        assert_eq!(run_roots(harness.base.path()).len(), 1);

        harness
            .capture_events
            .send(CaptureEvent::Failed {
                reason: "sensor lost".into(),
            })
            .unwrap();
        harness.orchestrator.pump();

        assert_eq!(harness.orchestrator.state(), CaptureState::Failed);
        let err = harness.orchestrator.last_error().expect("error payload");
        assert!(err.to_string().contains("sensor lost"));

        harness.orchestrator.acknowledge_error().unwrap();
        assert_eq!(harness.orchestrator.state(), CaptureState::Ready);
        assert!(harness.orchestrator.last_error().is_none());
        assert!(run_roots(harness.base.path()).is_empty());
    }

    #[test]
    fn cancel_mid_reconstruction_ignores_trailing_progress() {
        let mut harness = harness(0);
        drive_to_reconstructing(&mut harness, 2);

        harness.orchestrator.cancel().unwrap();
        assert_eq!(harness.orchestrator.state(), CaptureState::Restart);
        assert!(harness.recon_cancels.try_recv().is_ok());

        harness
            .recon_events
            .send(ReconstructionEvent::Progress(0.9))
            .unwrap();
        harness
            .recon_events
            .send(ReconstructionEvent::Cancelled)
            .unwrap();
        harness.orchestrator.pump();

        assert_eq!(harness.orchestrator.state(), CaptureState::Ready);
        assert!(harness.orchestrator.output_model().is_none());
        assert!((harness.orchestrator.snapshot().progress - 0.0).abs() < f64::EPSILON);
        assert!(run_roots(harness.base.path()).is_empty());
    }

    #[test]
    fn cancel_mid_capture_waits_for_terminal_event_before_cleanup() {
        let mut harness = harness(0);
        harness.orchestrator.start_capture().unwrap();

        harness.orchestrator.cancel().unwrap();
        assert_eq!(harness.orchestrator.state(), CaptureState::Restart);
        assert_eq!(
            harness.capture_commands.try_recv(),
            Ok(CaptureCommand::Cancel)
        );
        // Folders survive until the engine confirms teardown.
        assert_eq!(run_roots(harness.base.path()).len(), 1);

        harness
            .capture_events
            .send(CaptureEvent::ImageCaptured { count: 99 })
            .unwrap();
        harness.capture_events.send(CaptureEvent::Cancelled).unwrap();
        harness.orchestrator.pump();

        assert_eq!(harness.orchestrator.state(), CaptureState::Ready);
        assert_eq!(harness.orchestrator.captured_images(), 0);
        assert!(run_roots(harness.base.path()).is_empty());
    }

    #[test]
    fn start_is_rejected_while_a_run_is_active() {
        let mut harness = harness(0);
        harness.orchestrator.start_capture().unwrap();

        let err = harness
            .orchestrator
            .start_capture()
            .expect_err("single-flight start must be rejected");
        assert!(matches!(err, AppError::State(_)));
        assert_eq!(harness.orchestrator.state(), CaptureState::Capturing);
    }

    #[test]
    fn device_unavailable_at_start_lands_in_failed() {
        let base = tempfile::tempdir().unwrap();
        let storage = StorageService::with_base_dir(base.path().to_path_buf());
        let capture = ScriptedCapture {
            sessions: VecDeque::new(),
            fail_next: Some("no depth sensor".into()),
        };
        let mut orchestrator = Orchestrator::with_settings(
            storage,
            Box::new(capture),
            Box::new(ScriptedReconstruction::default()),
            DetailLevel::Medium,
            0,
        );

        orchestrator.start_capture().unwrap();
        assert_eq!(orchestrator.state(), CaptureState::Failed);
        let err = orchestrator.last_error().expect("error payload");
        assert!(err.to_string().contains("no depth sensor"));
        // The half-created workspace is cleared on the failed start.
        assert!(run_roots(base.path()).is_empty());

        orchestrator.acknowledge_error().unwrap();
        assert_eq!(orchestrator.state(), CaptureState::Ready);
    }

    #[test]
    fn too_few_usable_images_fails_before_submitting_reconstruction() {
        let mut harness = harness(5);
        drive_to_reconstructing(&mut harness, 2);

        // No real image files were written, so the floor check rejects.
        assert_eq!(harness.orchestrator.state(), CaptureState::Failed);
        let err = harness.orchestrator.last_error().expect("error payload");
        assert!(err.to_string().contains("capture more images"));
    }

    #[test]
    fn usable_image_floor_passes_with_real_captures_on_disk() {
        let mut harness = harness(2);
        let listener = harness.orchestrator.subscribe();

        harness.orchestrator.start_capture().unwrap();
        let images_dir = run_roots(harness.base.path())[0].join("images");
        for index in 0..2 {
            let img = ImageBuffer::from_pixel(4, 4, Rgb::<u8>([0, 0, 0]));
            img.save(images_dir.join(format!("frame_{index:04}.png")))
                .unwrap();
        }

        harness.orchestrator.finish_capture().unwrap();
        harness.capture_events.send(CaptureEvent::Finished).unwrap();
        harness.orchestrator.pump();
        assert_eq!(harness.orchestrator.state(), CaptureState::Reconstructing);

        // Every published snapshot upholds the error-iff-failed invariant.
        while let Ok(snapshot) = listener.try_recv() {
            assert_eq!(
                snapshot.last_error.is_some(),
                snapshot.state == CaptureState::Failed
            );
        }
    }

    #[test]
    fn tracking_quality_updates_are_observable_without_transitions() {
        let mut harness = harness(0);
        let listener = harness.orchestrator.subscribe();
        harness.orchestrator.start_capture().unwrap();

        harness
            .capture_events
            .send(CaptureEvent::TrackingQualityChanged(
                TrackingQuality::Limited,
            ))
            .unwrap();
        harness.orchestrator.pump();

        assert_eq!(harness.orchestrator.state(), CaptureState::Capturing);
        let latest = std::iter::from_fn(|| listener.try_recv().ok())
            .last()
            .expect("snapshot published");
        assert_eq!(latest.tracking_quality, TrackingQuality::Limited);
    }

    #[test]
    fn image_count_resets_on_a_new_capture_phase() {
        let base = tempfile::tempdir().unwrap();
        let storage = StorageService::with_base_dir(base.path().to_path_buf());

        let mut capture = ScriptedCapture::default();
        let (first_events, first_rx) = mpsc::channel();
        let (first_cmd_tx, _first_cmds) = mpsc::channel();
        capture.sessions.push_back((first_rx, first_cmd_tx));
        let (_second_events, second_rx) = mpsc::channel::<CaptureEvent>();
        let (second_cmd_tx, _second_cmds) = mpsc::channel();
        capture.sessions.push_back((second_rx, second_cmd_tx));

        let mut orchestrator = Orchestrator::with_settings(
            storage,
            Box::new(capture),
            Box::new(ScriptedReconstruction::default()),
            DetailLevel::Medium,
            0,
        );

        orchestrator.start_capture().unwrap();
        for count in 1..=4 {
            first_events
                .send(CaptureEvent::ImageCaptured { count })
                .unwrap();
        }
        first_events
            .send(CaptureEvent::Failed {
                reason: "sensor lost".into(),
            })
            .unwrap();
        orchestrator.pump();
        assert_eq!(orchestrator.captured_images(), 4);

        orchestrator.acknowledge_error().unwrap();
        orchestrator.start_capture().unwrap();
        assert_eq!(orchestrator.state(), CaptureState::Capturing);
        assert_eq!(orchestrator.captured_images(), 0);
    }

    #[test]
    fn intents_outside_their_phase_are_rejected() {
        let mut harness = harness(0);

        assert!(matches!(
            harness.orchestrator.finish_capture(),
            Err(AppError::State(_))
        ));
        assert!(matches!(
            harness.orchestrator.cancel(),
            Err(AppError::State(_))
        ));
        assert!(matches!(
            harness.orchestrator.acknowledge_completion(),
            Err(AppError::State(_))
        ));
        assert!(matches!(
            harness.orchestrator.acknowledge_error(),
            Err(AppError::State(_))
        ));
        assert_eq!(harness.orchestrator.state(), CaptureState::Ready);
    }
}
