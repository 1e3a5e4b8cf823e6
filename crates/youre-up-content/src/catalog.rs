use serde::{Deserialize, Serialize};

use crate::{ContentError, SceneEntry, Season, TimelineDef, TimelineItem};

const BUILTIN_CATALOG: &str = include_str!("../content/catalog.json");

/// Read-only registry of every season, scene and timeline the game ships.
///
/// A catalog always has at least one season and one scene, so lookups by an
/// unknown id can fall back to the first entry instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCatalog")]
pub struct Catalog {
  seasons: Vec<Season>,
  scenes: Vec<SceneEntry>,
  timelines: Vec<TimelineDef>,
}

#[derive(Deserialize)]
struct RawCatalog {
  seasons: Vec<Season>,
  scenes: Vec<SceneEntry>,
  #[serde(default)]
  timelines: Vec<TimelineDef>,
}

impl TryFrom<RawCatalog> for Catalog {
  type Error = ContentError;

  fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
    Catalog::new(raw.seasons, raw.scenes, raw.timelines)
  }
}

/// Every scene names a season that lists it back, and every scene a season
/// lists exists and names that season.
fn check_membership(seasons: &[Season], scenes: &[SceneEntry]) -> Result<(), ContentError> {
  let mismatch = |scene: &str, season: &str| ContentError::SeasonMismatch {
    scene: scene.to_string(),
    season: season.to_string(),
  };
  for entry in scenes {
    let listed = seasons
      .iter()
      .find(|s| s.id == entry.season_id)
      .is_some_and(|s| s.scene_ids.contains(&entry.id));
    if !listed {
      return Err(mismatch(&entry.id, &entry.season_id));
    }
  }
  for season in seasons {
    for scene_id in &season.scene_ids {
      let claimed = scenes
        .iter()
        .any(|e| &e.id == scene_id && e.season_id == season.id);
      if !claimed {
        return Err(mismatch(scene_id, &season.id));
      }
    }
  }
  Ok(())
}

impl Catalog {
  pub fn new(
    seasons: Vec<Season>,
    scenes: Vec<SceneEntry>,
    timelines: Vec<TimelineDef>,
  ) -> Result<Self, ContentError> {
    if seasons.is_empty() {
      return Err(ContentError::Empty("seasons"));
    }
    if scenes.is_empty() {
      return Err(ContentError::Empty("scenes"));
    }
    check_membership(&seasons, &scenes)?;
    Ok(Catalog {
      seasons,
      scenes,
      timelines,
    })
  }

  /// The catalog compiled into the binary.
  pub fn builtin() -> Result<Self, ContentError> {
    Self::from_json(BUILTIN_CATALOG)
  }

  pub fn from_json(json: &str) -> Result<Self, ContentError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn seasons(&self) -> &[Season] {
    &self.seasons
  }

  pub fn scenes(&self) -> &[SceneEntry] {
    &self.scenes
  }

  pub fn default_season(&self) -> &Season {
    &self.seasons[0]
  }

  pub fn default_scene(&self) -> &SceneEntry {
    &self.scenes[0]
  }

  pub fn season(&self, id: &str) -> &Season {
    self
      .seasons
      .iter()
      .find(|s| s.id == id)
      .unwrap_or_else(|| self.default_season())
  }

  pub fn scene(&self, id: &str) -> &SceneEntry {
    self
      .scenes
      .iter()
      .find(|s| s.id == id)
      .unwrap_or_else(|| self.default_scene())
  }

  pub fn contains_scene(&self, id: &str) -> bool {
    self.scenes.iter().any(|s| s.id == id)
  }

  pub fn scenes_for_season(&self, season_id: &str) -> Vec<&SceneEntry> {
    self
      .scenes
      .iter()
      .filter(|s| s.season_id == season_id)
      .collect()
  }

  /// Timeline for a scene content id and variant id; empty when none is
  /// authored for the pair.
  pub fn timeline(&self, scene_id: &str, variant_id: &str) -> Vec<TimelineItem> {
    self
      .timelines
      .iter()
      .find(|t| t.scene_id == scene_id && t.variant_id == variant_id)
      .map(|t| t.items.clone())
      .unwrap_or_default()
  }
}
