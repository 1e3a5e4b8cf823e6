use std::path::PathBuf;

use thiserror::Error;

/// Failures of the recording storage layer.
/// Callers decide which of these degrade to a fallback.
#[derive(Error, Debug)]
pub enum StorageError {
  /// No directory is configured for this kind of storage
  #[error("no {0} storage root configured")]
  NoRoot(&'static str),

  /// The reference does not point at a local file we can copy
  #[error("not a local file reference: {0}")]
  NotLocal(String),

  /// Slot ids end up as file names
  #[error("slot id {0:?} is not usable as a file name")]
  InvalidName(String),

  #[error("storage io error on {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("manifest error: {0}")]
  Manifest(#[from] serde_json::Error),
}

impl StorageError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.into();
    move |source| StorageError::Io { path, source }
  }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
