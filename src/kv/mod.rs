use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum KvError {
  #[error("kv io error on {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("kv encode error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type KvResult<T> = std::result::Result<T, KvError>;

/// String-to-string persistence used for small pieces of app state.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
  async fn get_item(&self, key: &str) -> KvResult<Option<String>>;
  async fn set_item(&self, key: &str, value: String) -> KvResult<()>;
}

pub type SharedKvStore = Arc<dyn KvStore>;

/// Keeps everything in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
  inner: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl KvStore for MemoryKvStore {
  async fn get_item(&self, key: &str) -> KvResult<Option<String>> {
    let m = self.inner.read().await;
    Ok(m.get(key).cloned())
  }

  async fn set_item(&self, key: &str, value: String) -> KvResult<()> {
    let mut m = self.inner.write().await;
    m.insert(key.to_string(), value);
    Ok(())
  }
}

/// All keys live in one JSON object file. The file is loaded once on open
/// and rewritten through a sibling temp file on every change.
#[derive(Debug)]
pub struct FileKvStore {
  path: PathBuf,
  inner: RwLock<HashMap<String, String>>,
}

impl FileKvStore {
  /// Opens the store at `path`. A missing or unreadable file starts empty.
  pub async fn open(path: impl Into<PathBuf>) -> FileKvStore {
    let path = path.into();
    let entries = match tokio::fs::read_to_string(&path).await {
      Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
        Ok(entries) => entries,
        Err(e) => {
          warn!("Ignoring malformed kv file {:?}: {}", path, e);
          HashMap::new()
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
      Err(e) => {
        warn!("Failed to read kv file {:?}: {}", path, e);
        HashMap::new()
      }
    };
    debug!("Opened kv file {:?} with {} keys", path, entries.len());
    FileKvStore {
      path,
      inner: RwLock::new(entries),
    }
  }

  async fn flush(&self, entries: &HashMap<String, String>) -> KvResult<()> {
    let io_err = |source| KvError::Io {
      path: self.path.clone(),
      source,
    };
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let body = serde_json::to_string(entries)?;
    let tmp = self.path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
    Ok(())
  }
}

#[async_trait]
impl KvStore for FileKvStore {
  async fn get_item(&self, key: &str) -> KvResult<Option<String>> {
    let m = self.inner.read().await;
    Ok(m.get(key).cloned())
  }

  async fn set_item(&self, key: &str, value: String) -> KvResult<()> {
    let mut m = self.inner.write().await;
    m.insert(key.to_string(), value);
    self.flush(&m).await
  }
}
