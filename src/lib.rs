pub mod capture;
mod config;
pub mod error;
pub mod logging;
pub mod reconstruct;
pub mod state;
pub mod storage;
pub mod workflow;

pub use error::{AppError, AppResult};
pub use workflow::{Orchestrator, Snapshot};

use storage::StorageService;

/// Builds an orchestrator over the default on-disk storage area, with
/// workflow settings from `config.json`. Engine adapters are injected by
/// the embedding application.
pub fn bootstrap(
    capture_engine: Box<dyn capture::CaptureEngine>,
    reconstruction_engine: Box<dyn reconstruct::ReconstructionEngine>,
) -> AppResult<Orchestrator> {
    let storage = StorageService::with_default_paths()?;
    tracing::info!(base = %storage.base_dir().display(), "capture storage ready");
    Ok(Orchestrator::new(
        storage,
        capture_engine,
        reconstruction_engine,
    ))
}
