use uuid::Uuid;

pub use youre_up_content::{
  Catalog, ContentError, LookDir, Scene, SceneEntry, SceneId, Season, SeasonId, Slot, SlotId,
  SlotType, TimelineItem, Variant, VariantId,
};

pub type UuidString = String;
pub type RunId = UuidString;
/// A clip reference: a `file://` URI, an absolute path, or any other URI the
/// capture layer hands us.
pub type Uri = String;

pub fn new_run_id() -> RunId {
  Uuid::new_v4().to_string()
}

/// Identifies one run. Capture it before starting a recording and hand it
/// back on completion so late results cannot leak into a newer run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
  pub scene_id: SceneId,
  pub run_id: RunId,
}
