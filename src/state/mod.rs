use std::{collections::HashMap, path::PathBuf, sync::Arc};

use log::{debug, info, trace, warn};

use crate::{
  selector::{shuffled, SelectorError, VariantSelector},
  storage::{BackupManifest, RecordingStorage, StorageError},
  timeline::{build_timeline, resolve_timeline, ResolvedTimeline},
  types::{
    new_run_id, Catalog, RunId, RunKey, Scene, SceneEntry, SceneId, SeasonId, Slot, SlotId,
    TimelineItem, Uri, Variant,
  },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
  /// `copied` is false when the original reference was kept.
  Saved { uri: Uri, copied: bool },
  /// The run the recording was made for is over.
  Stale,
  /// The slot is not part of the active variant.
  UnknownSlot,
}

/// The active run: which scene and variant is being played, in what order the
/// prompts come, how far along we are and what has been recorded.
///
/// One instance per app session, owned by the caller and mutated only through
/// the methods below. Storage and persistence faults never surface as errors;
/// each operation has a fallback.
#[derive(Debug)]
pub struct GameState {
  catalog: Arc<Catalog>,
  selector: VariantSelector,
  storage: RecordingStorage,
  asset_root: Option<PathBuf>,

  season_id: SeasonId,
  scene_id: SceneId,
  variant_index: usize,
  run_id: RunId,
  /// Bumped to force a reshuffle even when the variant did not change.
  seed: u64,
  order: Vec<Slot>,
  index: usize,
  recordings: HashMap<SlotId, Uri>,
  timeline: Vec<TimelineItem>,
  display_scene_number: String,
  bridge_visible: bool,
}

impl GameState {
  pub fn new(catalog: Arc<Catalog>, selector: VariantSelector, storage: RecordingStorage) -> Self {
    let season_id = catalog.default_season().id.clone();
    let scene_id = catalog.default_scene().id.clone();
    let mut state = GameState {
      catalog,
      selector,
      storage,
      asset_root: None,
      season_id,
      scene_id,
      variant_index: 0,
      run_id: new_run_id(),
      seed: 0,
      order: vec![],
      index: 0,
      recordings: HashMap::new(),
      timeline: vec![],
      display_scene_number: String::new(),
      bridge_visible: false,
    };
    state.order = shuffled(&state.variant().slots);
    state.refresh_timeline();
    state.bump_scene_number();
    state
  }

  /// Relative filler clip paths in timelines are resolved against this.
  pub fn with_asset_root(mut self, asset_root: impl Into<PathBuf>) -> Self {
    self.asset_root = Some(asset_root.into());
    self
  }
}

// Derived values
impl GameState {
  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  pub fn storage(&self) -> &RecordingStorage {
    &self.storage
  }

  pub fn season_id(&self) -> &str {
    &self.season_id
  }

  pub fn scene_id(&self) -> &str {
    &self.scene_id
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn run_key(&self) -> RunKey {
    RunKey {
      scene_id: self.scene_id.clone(),
      run_id: self.run_id.clone(),
    }
  }

  pub fn scene_entry(&self) -> &SceneEntry {
    self.catalog.scene(&self.scene_id)
  }

  pub fn scene(&self) -> &Scene {
    &self.scene_entry().scene
  }

  pub fn variant_index(&self) -> usize {
    self.variant_index
  }

  pub fn variant(&self) -> &Variant {
    self.scene().variant(self.variant_index)
  }

  /// Slots in authored order.
  pub fn story(&self) -> &[Slot] {
    &self.variant().slots
  }

  /// Slots in the order they are recorded in.
  pub fn order(&self) -> &[Slot] {
    &self.order
  }

  pub fn seed(&self) -> u64 {
    self.seed
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn current_slot(&self) -> Option<&Slot> {
    self.order.get(self.index)
  }

  pub fn recordings(&self) -> &HashMap<SlotId, Uri> {
    &self.recordings
  }

  pub fn recording(&self, slot_id: &str) -> Option<&str> {
    self.recordings.get(slot_id).map(String::as_str)
  }

  /// Every slot of the story has a take.
  pub fn is_complete(&self) -> bool {
    let story = self.story();
    !story.is_empty() && story.iter().all(|s| self.recordings.contains_key(&s.id))
  }

  pub fn scenes_for_season(&self) -> Vec<&SceneEntry> {
    self.catalog.scenes_for_season(&self.season_id)
  }

  pub fn timeline(&self) -> &[TimelineItem] {
    &self.timeline
  }

  pub fn resolved_timeline(&self) -> ResolvedTimeline {
    resolve_timeline(&self.timeline, &self.recordings, self.asset_root.as_deref())
  }

  pub fn display_scene_number(&self) -> &str {
    &self.display_scene_number
  }

  pub fn bridge_visible(&self) -> bool {
    self.bridge_visible
  }
}

// Mutators
impl GameState {
  pub fn set_season_id(&mut self, id: &str) {
    self.season_id = self.catalog.season(id).id.clone();
  }

  /// Cleans up the current run, switches scene and starts a fresh run on it.
  pub async fn set_scene_id(&mut self, id: &str) {
    self.cleanup_run().await;
    if !self.catalog.contains_scene(id) {
      debug!("Unknown scene {}, using {}", id, self.catalog.default_scene().id);
    }
    self.scene_id = self.catalog.scene(id).id.clone();
    self.start_new_run().await;
  }

  /// "Play again": a new run, and most likely a new variant, of the same scene.
  pub async fn replay_same_scene(&mut self) {
    self.cleanup_run().await;
    self.start_new_run().await;
  }

  /// Starts over inside the same run: same id and variant, new order.
  pub fn reset_run_only(&mut self) {
    self.reshuffle();
    self.index = 0;
    self.recordings.clear();
  }

  pub async fn reset_all(&mut self) {
    self.cleanup_run().await;
    self.season_id = self.catalog.default_season().id.clone();
    self.scene_id = self.catalog.default_scene().id.clone();
    self.variant_index = 0;
    self.run_id = new_run_id();
    self.reshuffle();
    self.index = 0;
    self.recordings.clear();
    self.bridge_visible = false;
    self.refresh_timeline();
    self.bump_scene_number();
    info!("Reset to {} ({})", self.scene_id, self.run_id);
  }

  async fn start_new_run(&mut self) {
    self.run_id = new_run_id();

    let variant_count = self.scene().variants().len();
    self.variant_index = match self
      .selector
      .pick_next_variant_index(&self.scene_id, variant_count)
      .await
    {
      Ok(picked) => picked,
      Err(SelectorError::Persist { picked, source }) => {
        warn!("Variant bag for {} not saved: {}", self.scene_id, source);
        picked
      }
    };

    self.reshuffle();
    self.index = 0;
    self.recordings.clear();
    self.refresh_timeline();
    self.bump_scene_number();
    info!(
      "New run {} on {} with variant {}",
      self.run_id,
      self.scene_id,
      self.variant().id
    );
  }

  fn reshuffle(&mut self) {
    self.seed += 1;
    let order = shuffled(&self.variant().slots);
    self.order = order;
  }

  fn refresh_timeline(&mut self) {
    let timeline = build_timeline(&self.catalog, self.scene().id(), &self.variant().id);
    self.timeline = timeline;
  }

  /// Records a take for the current run.
  pub async fn save_recording(&mut self, slot_id: &str, uri: &str) -> RecordOutcome {
    let key = self.run_key();
    self.save_recording_for(&key, slot_id, uri).await
  }

  /// Records a take for the run identified by `key`, which the caller
  /// captured before the capture started. Takes for a run that has since been
  /// replaced are dropped.
  pub async fn save_recording_for(&mut self, key: &RunKey, slot_id: &str, uri: &str) -> RecordOutcome {
    if *key != self.run_key() {
      warn!(
        "Dropping take for {} from finished run {} (current {})",
        slot_id, key.run_id, self.run_id
      );
      return RecordOutcome::Stale;
    }
    if !self.variant().has_slot(slot_id) {
      warn!("Slot {} is not part of variant {}", slot_id, self.variant().id);
      return RecordOutcome::UnknownSlot;
    }

    let (reference, copied) = match self
      .storage
      .store_recording(&key.scene_id, &key.run_id, slot_id, uri)
      .await
    {
      Ok(stored) => (stored, true),
      Err(e @ (StorageError::NoRoot(_) | StorageError::NotLocal(_))) => {
        debug!("Keeping original reference for {}: {}", slot_id, e);
        (uri.to_string(), false)
      }
      Err(e) => {
        warn!("Failed to copy take for {}, keeping {}: {}", slot_id, uri, e);
        (uri.to_string(), false)
      }
    };
    trace!("recordings[{}] = {}", slot_id, reference);
    self.recordings.insert(slot_id.to_string(), reference.clone());
    RecordOutcome::Saved {
      uri: reference,
      copied,
    }
  }

  pub fn next(&mut self) {
    let max = self.order.len();
    self.index = if max == 0 { 0 } else { (self.index + 1).min(max) };
  }

  /// Deletes the current run's scratch directory. Never fails.
  pub async fn cleanup_run(&self) {
    match self.storage.delete_run(&self.scene_id, &self.run_id).await {
      Ok(true) => debug!("Cleaned up run {} of {}", self.run_id, self.scene_id),
      Ok(false) => (),
      Err(e) => warn!("Failed to clean up run {}: {}", self.run_id, e),
    }
  }

  /// Replaces the single "last run" backup with the current recordings.
  /// Returns the written manifest, or `None` if nothing could be saved.
  pub async fn save_last_run_backup(&self) -> Option<BackupManifest> {
    let result = self
      .storage
      .backup_run(
        &self.scene_id,
        &self.run_id,
        &self.variant().id,
        &self.recordings,
      )
      .await;
    match result {
      Ok(manifest) => Some(manifest),
      Err(StorageError::NoRoot(_)) => {
        debug!("No backup location, skipping backup of {}", self.run_id);
        None
      }
      Err(e) => {
        warn!("Backup of run {} failed: {}", self.run_id, e);
        None
      }
    }
  }

  pub async fn last_run_backup(&self) -> Option<BackupManifest> {
    self.storage.read_last_backup().await.unwrap_or_else(|e| {
      warn!("Failed to read last run backup: {}", e);
      None
    })
  }

  /// The final cut, once every slot is recorded: the resolved timeline with
  /// missing or broken clips skipped.
  pub async fn playback_queue(&self) -> Vec<Uri> {
    let Some(uris) = self.resolved_timeline().uris() else {
      return vec![];
    };
    let mut queue = Vec::with_capacity(uris.len());
    for uri in uris {
      let check = self.storage.verify_clip(&uri).await;
      if check.is_playable() {
        queue.push(uri);
      } else {
        warn!("Skipping clip {}: {:?}", uri, check);
      }
    }
    queue
  }

  /// Refreshes the scene-number label for the current prompt: the slot's
  /// authored label, or its position in the order.
  pub fn bump_scene_number(&mut self) {
    self.display_scene_number = match self.current_slot() {
      Some(slot) => slot
        .scene_number
        .clone()
        .unwrap_or_else(|| (self.index + 1).to_string()),
      None => String::new(),
    };
  }

  pub fn show_bridge(&mut self) {
    self.bridge_visible = true;
  }

  pub fn hide_bridge(&mut self) {
    self.bridge_visible = false;
  }
}
