use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

const RUN_DIR_PREFIX: &str = "run-";
const APP_DATA_SUBDIR: &str = "orbitcap/runs";
const IMAGES_SUBDIR: &str = "images";
const CHECKPOINTS_SUBDIR: &str = "checkpoints";
const MODELS_SUBDIR: &str = "models";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Directory tree owned by exactly one capture run. Raw captures land in
/// `images_dir`, session checkpoints in `checkpoints_dir`, and the
/// reconstruction output in `models_dir`; all three live under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    root: PathBuf,
    images_dir: PathBuf,
    checkpoints_dir: PathBuf,
    models_dir: PathBuf,
}

impl RunWorkspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn checkpoints_dir(&self) -> &Path {
        &self.checkpoints_dir
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }
}

pub trait RunStorage {
    fn create_run(&self) -> StorageResult<RunWorkspace>;
    fn clear_run(&self, workspace: &RunWorkspace) -> StorageResult<()>;
}

/// Allocates and tears down per-run working directories under a base
/// storage area. Every run gets a fresh uniquely named root, so a
/// best-effort cleanup that fails can never leak content into a later run.
#[derive(Debug, Clone)]
pub struct StorageService {
    base_dir: PathBuf,
}

impl StorageService {
    pub const fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn with_default_paths() -> StorageResult<Self> {
        let base_dir = default_data_dir()?;
        fs::create_dir_all(&base_dir)?;
        Ok(Self::with_base_dir(base_dir))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_run(&self) -> StorageResult<RunWorkspace> {
        let root = self
            .base_dir
            .join(format!("{RUN_DIR_PREFIX}{}", Uuid::new_v4()));
        let workspace = RunWorkspace {
            images_dir: root.join(IMAGES_SUBDIR),
            checkpoints_dir: root.join(CHECKPOINTS_SUBDIR),
            models_dir: root.join(MODELS_SUBDIR),
            root,
        };

        fs::create_dir_all(&workspace.images_dir)?;
        fs::create_dir_all(&workspace.checkpoints_dir)?;
        fs::create_dir_all(&workspace.models_dir)?;

        tracing::debug!(root = %workspace.root.display(), "created run workspace");
        Ok(workspace)
    }

    pub fn clear_run(&self, workspace: &RunWorkspace) -> StorageResult<()> {
        match fs::remove_dir_all(workspace.root()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

impl RunStorage for StorageService {
    fn create_run(&self) -> StorageResult<RunWorkspace> {
        self.create_run()
    }

    fn clear_run(&self, workspace: &RunWorkspace) -> StorageResult<()> {
        self.clear_run(workspace)
    }
}

fn default_data_dir() -> StorageResult<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_DATA_SUBDIR));
    }

    let home = std::env::var("HOME").map_err(|_| StorageError::MissingHomeDirectory)?;
    Ok(PathBuf::from(home)
        .join(".local/share")
        .join(APP_DATA_SUBDIR))
}
