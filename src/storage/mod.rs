use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use itertools::Itertools;
use log::{debug, trace, warn};
use serde_derive::{Deserialize, Serialize};

pub use self::errors::{StorageError, StorageResult};
use crate::types::{SlotId, Uri};

mod errors;

pub const DEFAULT_EXTENSION: &str = "mp4";
pub const MANIFEST_FILE: &str = "manifest.json";
/// Clips smaller than this are assumed to be broken captures.
pub const MIN_CLIP_BYTES: u64 = 1024;

const MAX_EXTENSION_LEN: usize = 8;

// {
//   "savedAt": 1760000000000,
//   "sceneId": "scene_1",
//   "runId": "0b6c0d0e-5a57-4c55-9d7c-4c8b9a4c1f0e",
//   "variantId": "v2",
//   "slots": ["dm_v2_1", "dm_v2_2", "dm_v2_3"]
// }
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
  #[serde(rename = "savedAt")]
  pub saved_at: i64,
  #[serde(rename = "sceneId")]
  pub scene_id: String,
  #[serde(rename = "runId")]
  pub run_id: String,
  #[serde(rename = "variantId")]
  pub variant_id: String,
  pub slots: Vec<SlotId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipCheck {
  Playable,
  Missing,
  TooSmall(u64),
}

impl ClipCheck {
  pub fn is_playable(&self) -> bool {
    matches!(self, ClipCheck::Playable)
  }
}

/// Maps recordings to files: one scratch directory per run, plus a single
/// well-known "last run" backup directory.
#[derive(Debug)]
pub struct RecordingStorageImpl {
  temp_root: Option<PathBuf>,
  backup_root: Option<PathBuf>,
}

pub type RecordingStorage = Arc<RecordingStorageImpl>;

impl RecordingStorageImpl {
  /// Either root may be missing. Run scratch space falls back to the
  /// persistent root, the backup falls back to the temp root, and with
  /// neither nothing is written to disk at all.
  pub fn new(temp_root: Option<PathBuf>, persistent_root: Option<PathBuf>) -> RecordingStorage {
    let temp = temp_root.clone().or_else(|| persistent_root.clone());
    let backup = persistent_root.or(temp_root);
    Arc::new(RecordingStorageImpl {
      temp_root: temp,
      backup_root: backup,
    })
  }

  pub fn memory_only() -> RecordingStorage {
    Self::new(None, None)
  }
}

impl RecordingStorageImpl {
  pub fn is_memory_only(&self) -> bool {
    self.temp_root.is_none() && self.backup_root.is_none()
  }

  pub fn run_dir(&self, scene_id: &str, run_id: &str) -> Option<PathBuf> {
    self
      .temp_root
      .as_ref()
      .map(|root| root.join("runs").join(scene_id).join(run_id))
  }

  pub fn last_run_dir(&self) -> Option<PathBuf> {
    self.backup_root.as_ref().map(|root| root.join("last_run"))
  }

  /// Copies the clip at `uri` into the run directory as `{slot_id}.{ext}`
  /// and returns the reference to the copy.
  pub async fn store_recording(
    &self,
    scene_id: &str,
    run_id: &str,
    slot_id: &str,
    uri: &str,
  ) -> StorageResult<Uri> {
    let dir = self
      .run_dir(scene_id, run_id)
      .ok_or(StorageError::NoRoot("temp"))?;
    let source = local_path(uri).ok_or_else(|| StorageError::NotLocal(uri.to_string()))?;
    let dest = dir.join(clip_file_name(slot_id, uri)?);

    tokio::fs::create_dir_all(&dir)
      .await
      .map_err(StorageError::io(&dir))?;
    // Copying a file onto itself truncates it.
    if is_same_file(&source, &dest).await {
      trace!("{} is already stored at {:?}", uri, dest);
      return Ok(reference_like(uri, &dest));
    }
    tokio::fs::copy(&source, &dest)
      .await
      .map_err(StorageError::io(&source))?;
    trace!("Stored {} -> {:?}", uri, dest);

    Ok(reference_like(uri, &dest))
  }

  /// Removes the run directory. Returns whether there was anything to remove.
  pub async fn delete_run(&self, scene_id: &str, run_id: &str) -> StorageResult<bool> {
    let Some(dir) = self.run_dir(scene_id, run_id) else {
      return Ok(false);
    };
    remove_dir_if_exists(&dir).await
  }

  /// Replaces the backup directory with copies of `recordings` and a manifest.
  ///
  /// Clips that cannot be copied are left out of both the directory and the
  /// manifest; the rest of the backup still goes ahead.
  pub async fn backup_run(
    &self,
    scene_id: &str,
    run_id: &str,
    variant_id: &str,
    recordings: &HashMap<SlotId, Uri>,
  ) -> StorageResult<BackupManifest> {
    let dir = self.last_run_dir().ok_or(StorageError::NoRoot("backup"))?;

    remove_dir_if_exists(&dir).await?;
    tokio::fs::create_dir_all(&dir)
      .await
      .map_err(StorageError::io(&dir))?;

    let mut slots = vec![];
    for (slot_id, from) in recordings.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
      match self.backup_clip(&dir, slot_id, from).await {
        Ok(()) => slots.push(slot_id.clone()),
        Err(e) => warn!("Leaving {} out of the backup: {}", slot_id, e),
      }
    }

    let manifest = BackupManifest {
      saved_at: chrono::Utc::now().timestamp_millis(),
      scene_id: scene_id.to_string(),
      run_id: run_id.to_string(),
      variant_id: variant_id.to_string(),
      slots,
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    tokio::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
      .await
      .map_err(StorageError::io(&manifest_path))?;
    debug!(
      "Backed up run {} of {} ({} clips) to {:?}",
      run_id,
      scene_id,
      manifest.slots.len(),
      dir
    );
    Ok(manifest)
  }

  async fn backup_clip(&self, dir: &Path, slot_id: &str, from: &str) -> StorageResult<()> {
    let source = local_path(from).ok_or_else(|| StorageError::NotLocal(from.to_string()))?;
    let dest = dir.join(clip_file_name(slot_id, from)?);
    if is_same_file(&source, &dest).await {
      return Ok(());
    }
    tokio::fs::copy(&source, &dest)
      .await
      .map_err(StorageError::io(&source))?;
    Ok(())
  }

  /// The manifest of the current backup, if there is one.
  pub async fn read_last_backup(&self) -> StorageResult<Option<BackupManifest>> {
    let Some(dir) = self.last_run_dir() else {
      return Ok(None);
    };
    let path = dir.join(MANIFEST_FILE);
    let raw = match tokio::fs::read_to_string(&path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(StorageError::Io { path, source: e }),
    };
    Ok(Some(serde_json::from_str(&raw)?))
  }

  /// Local clips must exist and not be suspiciously small before playback.
  /// Non-local references are left to the player.
  pub async fn verify_clip(&self, uri: &str) -> ClipCheck {
    let Some(path) = local_path(uri) else {
      return ClipCheck::Playable;
    };
    match tokio::fs::metadata(&path).await {
      Ok(meta) if !meta.is_file() => ClipCheck::Missing,
      Ok(meta) if meta.len() < MIN_CLIP_BYTES => ClipCheck::TooSmall(meta.len()),
      Ok(_) => ClipCheck::Playable,
      Err(e) => {
        debug!("Clip {} not readable: {}", uri, e);
        ClipCheck::Missing
      }
    }
  }
}

async fn remove_dir_if_exists(dir: &Path) -> StorageResult<bool> {
  match tokio::fs::remove_dir_all(dir).await {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(StorageError::Io {
      path: dir.to_path_buf(),
      source: e,
    }),
  }
}

/// Extension of the last path segment, ignoring any query string. Falls back
/// to `mp4` when there is none or it does not look like an extension.
pub fn ext_from_uri(uri: &str) -> &str {
  let clean = uri.split('?').next().unwrap_or(uri);
  let segment = clean.rsplit('/').next().unwrap_or(clean);
  match segment.rsplit_once('.') {
    Some((_, ext))
      if !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
    {
      ext
    }
    _ => DEFAULT_EXTENSION,
  }
}

/// `file://` URIs and absolute paths resolve to a local path; anything else
/// (content providers, remote URLs) does not.
///
/// Only `file:///path` and `file://localhost/path` are understood. URIs with
/// another host, a relative path or percent escapes are not decoded and
/// resolve to nothing, so the caller keeps the reference as is.
pub fn local_path(uri: &str) -> Option<PathBuf> {
  let path = match uri.strip_prefix("file://") {
    Some(rest) => {
      let rest = rest.strip_prefix("localhost").unwrap_or(rest);
      if rest.contains('%') {
        return None;
      }
      Path::new(rest)
    }
    None => Path::new(uri),
  };
  path.is_absolute().then(|| path.to_path_buf())
}

/// Whether both paths name the same existing file.
async fn is_same_file(a: &Path, b: &Path) -> bool {
  match (
    tokio::fs::canonicalize(a).await,
    tokio::fs::canonicalize(b).await,
  ) {
    (Ok(a), Ok(b)) => a == b,
    _ => false,
  }
}

fn clip_file_name(slot_id: &str, uri: &str) -> StorageResult<String> {
  if slot_id.is_empty()
    || slot_id == "."
    || slot_id == ".."
    || slot_id.contains(['/', '\\'])
  {
    return Err(StorageError::InvalidName(slot_id.to_string()));
  }
  Ok(format!("{}.{}", slot_id, ext_from_uri(uri)))
}

/// Refers to `path` in the same style as `original`.
fn reference_like(original: &str, path: &Path) -> Uri {
  if original.starts_with("file://") {
    format!("file://{}", path.display())
  } else {
    path.display().to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_clip(dir: &Path, name: &str, len: usize) -> String {
    let path = dir.join(name);
    std::fs::write(&path, vec![7u8; len]).unwrap();
    format!("file://{}", path.display())
  }

  #[test]
  fn extension_rules() {
    assert_eq!(ext_from_uri("file:///a/b/clip.mov"), "mov");
    assert_eq!(ext_from_uri("file:///a/b/clip.mov?token=x.y"), "mov");
    assert_eq!(ext_from_uri("file:///a.dir/clip"), "mp4");
    assert_eq!(ext_from_uri("/tmp/clip.averyverylongext"), "mp4");
    assert_eq!(ext_from_uri("clip."), "mp4");
    assert_eq!(ext_from_uri(""), "mp4");
  }

  #[test]
  fn local_paths() {
    assert_eq!(local_path("file:///tmp/a.mp4"), Some(PathBuf::from("/tmp/a.mp4")));
    assert_eq!(local_path("/tmp/a.mp4"), Some(PathBuf::from("/tmp/a.mp4")));
    assert_eq!(local_path("content://media/1"), None);
    assert_eq!(local_path("relative/a.mp4"), None);
    assert_eq!(local_path("file://"), None);
    assert_eq!(
      local_path("file://localhost/tmp/a.mp4"),
      Some(PathBuf::from("/tmp/a.mp4"))
    );
    assert_eq!(local_path("file://a.mp4"), None);
    assert_eq!(local_path("file://otherhost/tmp/a.mp4"), None);
    assert_eq!(local_path("file:///tmp/my%20clip.mp4"), None);
  }

  #[tokio::test]
  async fn storing_the_stored_copy_again_keeps_it() {
    let tmp = tempfile::tempdir().unwrap();
    let capture = write_clip(tmp.path(), "capture.mp4", 4096);
    let storage = RecordingStorageImpl::new(Some(tmp.path().join("cache")), None);

    let stored = storage
      .store_recording("scene_1", "r1", "a", &capture)
      .await
      .unwrap();
    let again = storage
      .store_recording("scene_1", "r1", "a", &stored)
      .await
      .unwrap();
    assert_eq!(again, stored);
    let path = local_path(&stored).unwrap();
    assert_eq!(std::fs::metadata(path).unwrap().len(), 4096);
  }

  #[tokio::test]
  async fn backup_of_a_clip_already_in_the_backup_keeps_it() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = RecordingStorageImpl::new(None, Some(tmp.path().to_path_buf()));
    let dir = storage.last_run_dir().unwrap();
    std::fs::create_dir_all(&dir).unwrap();
    let dest = dir.join("a.mp4");
    std::fs::write(&dest, vec![1u8; 2048]).unwrap();

    storage
      .backup_clip(&dir, "a", &dest.display().to_string())
      .await
      .unwrap();
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 2048);
  }

  #[test]
  fn roots_fall_back_to_each_other() {
    let storage = RecordingStorageImpl::new(None, Some("/p".into()));
    assert_eq!(
      storage.run_dir("scene_1", "r1"),
      Some(PathBuf::from("/p/runs/scene_1/r1"))
    );
    let storage = RecordingStorageImpl::new(Some("/t".into()), None);
    assert_eq!(storage.last_run_dir(), Some(PathBuf::from("/t/last_run")));
    let storage = RecordingStorageImpl::memory_only();
    assert!(storage.is_memory_only());
    assert_eq!(storage.run_dir("scene_1", "r1"), None);
  }

  #[tokio::test]
  async fn store_copies_into_run_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let capture = write_clip(tmp.path(), "capture.mov", 2048);
    let storage = RecordingStorageImpl::new(Some(tmp.path().join("cache")), None);

    let stored = storage
      .store_recording("scene_1", "r1", "dm_v1_1", &capture)
      .await
      .unwrap();
    let expected = tmp.path().join("cache/runs/scene_1/r1/dm_v1_1.mov");
    assert_eq!(stored, format!("file://{}", expected.display()));
    assert_eq!(std::fs::metadata(&expected).unwrap().len(), 2048);
  }

  #[tokio::test]
  async fn store_reports_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = RecordingStorageImpl::new(Some(tmp.path().to_path_buf()), None);

    let missing = format!("file://{}", tmp.path().join("gone.mp4").display());
    assert!(matches!(
      storage.store_recording("s", "r", "a", &missing).await,
      Err(StorageError::Io { .. })
    ));
    assert!(matches!(
      storage.store_recording("s", "r", "a", "content://x").await,
      Err(StorageError::NotLocal(_))
    ));
    let clip = write_clip(tmp.path(), "c.mp4", 10);
    assert!(matches!(
      storage.store_recording("s", "r", "../a", &clip).await,
      Err(StorageError::InvalidName(_))
    ));
    assert!(matches!(
      RecordingStorageImpl::memory_only()
        .store_recording("s", "r", "a", &clip)
        .await,
      Err(StorageError::NoRoot(_))
    ));
  }

  #[tokio::test]
  async fn delete_run_is_idempotent_and_scoped() {
    let tmp = tempfile::tempdir().unwrap();
    let clip = write_clip(tmp.path(), "c.mp4", 10);
    let storage = RecordingStorageImpl::new(Some(tmp.path().join("cache")), None);
    storage.store_recording("s", "r1", "a", &clip).await.unwrap();
    storage.store_recording("s", "r2", "a", &clip).await.unwrap();

    assert!(storage.delete_run("s", "r1").await.unwrap());
    assert!(!storage.delete_run("s", "r1").await.unwrap());
    assert!(!storage.run_dir("s", "r1").unwrap().exists());
    assert!(storage.run_dir("s", "r2").unwrap().join("a.mp4").exists());
  }

  #[tokio::test]
  async fn backup_replaces_previous_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = RecordingStorageImpl::new(None, Some(tmp.path().join("docs")));

    let first = HashMap::from([
      ("a".to_string(), write_clip(tmp.path(), "a.mp4", 10)),
      ("b".to_string(), write_clip(tmp.path(), "b.mov", 10)),
    ]);
    storage.backup_run("s", "r1", "v1", &first).await.unwrap();

    let second = HashMap::from([("c".to_string(), write_clip(tmp.path(), "c.mp4", 10))]);
    let manifest = storage.backup_run("s", "r2", "v2", &second).await.unwrap();
    assert_eq!(manifest.slots, vec!["c".to_string()]);

    let dir = storage.last_run_dir().unwrap();
    let mut names: Vec<String> = std::fs::read_dir(&dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .collect();
    names.sort();
    assert_eq!(names, vec!["c.mp4".to_string(), MANIFEST_FILE.to_string()]);

    let read = storage.read_last_backup().await.unwrap().unwrap();
    assert_eq!(read, manifest);
    assert_eq!(read.run_id, "r2");
  }

  #[tokio::test]
  async fn backup_skips_uncopyable_clips() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = RecordingStorageImpl::new(None, Some(tmp.path().to_path_buf()));
    let recordings = HashMap::from([
      ("a".to_string(), write_clip(tmp.path(), "a.mp4", 10)),
      ("b".to_string(), "content://media/12".to_string()),
    ]);
    let manifest = storage.backup_run("s", "r", "v1", &recordings).await.unwrap();
    assert_eq!(manifest.slots, vec!["a".to_string()]);
  }

  #[tokio::test]
  async fn no_backup_yet() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = RecordingStorageImpl::new(None, Some(tmp.path().to_path_buf()));
    assert_eq!(storage.read_last_backup().await.unwrap(), None);
    assert_eq!(
      RecordingStorageImpl::memory_only()
        .read_last_backup()
        .await
        .unwrap(),
      None
    );
  }

  #[tokio::test]
  async fn verify_clip_checks_size() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = RecordingStorageImpl::memory_only();
    let big = write_clip(tmp.path(), "big.mp4", 4096);
    let small = write_clip(tmp.path(), "small.mp4", 12);

    assert_eq!(storage.verify_clip(&big).await, ClipCheck::Playable);
    assert_eq!(storage.verify_clip(&small).await, ClipCheck::TooSmall(12));
    assert_eq!(
      storage.verify_clip("file:///definitely/not/here.mp4").await,
      ClipCheck::Missing
    );
    assert!(storage.verify_clip("https://cdn/x.mp4").await.is_playable());
  }
}
