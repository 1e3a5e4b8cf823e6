use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod catalog;
pub use catalog::*;

pub type SeasonId = String;
pub type SceneId = String;
pub type VariantId = String;
pub type SlotId = String;

#[derive(Error, Debug)]
pub enum ContentError {
  #[error("malformed content: {0}")]
  Json(#[from] serde_json::Error),

  #[error("scene {0} has no variants")]
  NoVariants(String),

  #[error("variant {variant} lists slot {slot} more than once")]
  DuplicateSlot { variant: VariantId, slot: SlotId },

  #[error("catalog has no {0}")]
  Empty(&'static str),

  #[error("scene {scene} and season {season} disagree about membership")]
  SeasonMismatch { scene: SceneId, season: SeasonId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotType {
  Reaction,
  OneWord,
  Line,
  Improv,
}

/// Where the performer should look while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookDir {
  Left,
  Right,
  Camera,
  Up,
  Down,
  DownLeft,
  DownRight,
  UpLeft,
  UpRight,
}

// {
//   "id": "dm_v1_2",
//   "character": "Myself",
//   "type": "REACTION",
//   "prompt": "React: shocked",
//   "maxSeconds": 2,
//   "duration": "2 seconds",
//   "mood": "surprised",
//   "tone": "silent",
//   "sceneNumber": "2A",
//   "direction": "Let it register before reacting.",
//   "directionArrow": "UP"
// }
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
  pub id: SlotId,
  #[serde(rename = "type")]
  pub slot_type: SlotType,
  pub prompt: String,
  #[serde(rename = "maxSeconds")]
  pub max_seconds: u32,
  pub example: Option<String>,
  pub character: Option<String>,
  #[serde(rename = "sceneNumber")]
  pub scene_number: Option<String>,
  #[serde(rename = "directionArrow")]
  pub direction_arrow: Option<LookDir>,
  pub duration: Option<String>,
  pub mood: Option<String>,
  pub tone: Option<String>,
  pub direction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
  pub id: VariantId,
  pub title: Option<String>,
  /// Slots in story order.
  #[serde(default)]
  pub slots: Vec<Slot>,
}

impl Variant {
  pub fn slot(&self, slot_id: &str) -> Option<&Slot> {
    self.slots.iter().find(|s| s.id == slot_id)
  }

  pub fn has_slot(&self, slot_id: &str) -> bool {
    self.slot(slot_id).is_some()
  }
}

/// Scene content. Always holds at least one variant, checked when built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScene")]
pub struct Scene {
  id: SceneId,
  variants: Vec<Variant>,
}

#[derive(Deserialize)]
struct RawScene {
  id: SceneId,
  #[serde(default)]
  variants: Vec<Variant>,
}

impl TryFrom<RawScene> for Scene {
  type Error = ContentError;

  fn try_from(raw: RawScene) -> Result<Self, Self::Error> {
    Scene::new(raw.id, raw.variants)
  }
}

impl Scene {
  pub fn new(id: SceneId, variants: Vec<Variant>) -> Result<Self, ContentError> {
    if variants.is_empty() {
      return Err(ContentError::NoVariants(id));
    }
    for variant in &variants {
      if let Some(slot) = variant.slots.iter().map(|s| &s.id).duplicates().next() {
        return Err(ContentError::DuplicateSlot {
          variant: variant.id.clone(),
          slot: slot.clone(),
        });
      }
    }
    Ok(Scene { id, variants })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn variants(&self) -> &[Variant] {
    &self.variants
  }

  /// The variant at `index`, or the first one when out of range.
  pub fn variant(&self, index: usize) -> &Variant {
    self.variants.get(index).unwrap_or(&self.variants[0])
  }
}

/// A scene as listed in the scene picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
  pub id: SceneId,
  #[serde(rename = "seasonId")]
  pub season_id: SeasonId,
  pub title: String,
  pub subtitle: Option<String>,
  pub scene: Scene,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
  pub id: SeasonId,
  pub title: String,
  pub subtitle: Option<String>,
  #[serde(rename = "sceneIds")]
  pub scene_ids: Vec<SceneId>,
}

/// One entry of the final playback sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineItem {
  /// Pre-produced filler clip, as an asset path.
  Creator { uri: String },
  /// Placeholder for the clip recorded for `slot_id`.
  Slot {
    #[serde(rename = "slotId")]
    slot_id: SlotId,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDef {
  #[serde(rename = "sceneId")]
  pub scene_id: SceneId,
  #[serde(rename = "variantId")]
  pub variant_id: VariantId,
  pub items: Vec<TimelineItem>,
}
