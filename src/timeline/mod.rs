use std::{collections::HashMap, path::Path};

use crate::types::{Catalog, SlotId, TimelineItem, Uri};

/// Playback order for a scene content id and variant id. Unknown pairs get an
/// empty timeline.
pub fn build_timeline(catalog: &Catalog, scene_id: &str, variant_id: &str) -> Vec<TimelineItem> {
  catalog.timeline(scene_id, variant_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedClip {
  Filler(Uri),
  Recorded { slot_id: SlotId, uri: Uri },
  /// Not recorded yet.
  Missing { slot_id: SlotId },
}

impl ResolvedClip {
  pub fn uri(&self) -> Option<&str> {
    match self {
      ResolvedClip::Filler(uri) | ResolvedClip::Recorded { uri, .. } => Some(uri.as_str()),
      ResolvedClip::Missing { .. } => None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTimeline {
  pub clips: Vec<ResolvedClip>,
}

impl ResolvedTimeline {
  pub fn missing_slot_ids(&self) -> Vec<&str> {
    self
      .clips
      .iter()
      .filter_map(|c| match c {
        ResolvedClip::Missing { slot_id } => Some(slot_id.as_str()),
        _ => None,
      })
      .collect()
  }

  /// Non-empty and every placeholder has a recording.
  pub fn all_ready(&self) -> bool {
    !self.clips.is_empty() && self.clips.iter().all(|c| c.uri().is_some())
  }

  /// The playable sequence, only once everything is ready.
  pub fn uris(&self) -> Option<Vec<Uri>> {
    self.all_ready().then(|| {
      self
        .clips
        .iter()
        .filter_map(|c| c.uri().map(str::to_string))
        .collect()
    })
  }
}

/// Substitutes recordings into slot placeholders. Relative filler paths are
/// joined onto `asset_root` when one is given.
pub fn resolve_timeline(
  items: &[TimelineItem],
  recordings: &HashMap<SlotId, Uri>,
  asset_root: Option<&Path>,
) -> ResolvedTimeline {
  let clips = items
    .iter()
    .map(|item| match item {
      TimelineItem::Creator { uri } => ResolvedClip::Filler(asset_uri(uri, asset_root)),
      TimelineItem::Slot { slot_id } => match recordings.get(slot_id) {
        Some(uri) => ResolvedClip::Recorded {
          slot_id: slot_id.clone(),
          uri: uri.clone(),
        },
        None => ResolvedClip::Missing {
          slot_id: slot_id.clone(),
        },
      },
    })
    .collect();
  ResolvedTimeline { clips }
}

fn asset_uri(uri: &str, asset_root: Option<&Path>) -> Uri {
  match asset_root {
    Some(root) if !uri.contains("://") && Path::new(uri).is_relative() => {
      root.join(uri).display().to_string()
    }
    _ => uri.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn catalog() -> Catalog {
    Catalog::builtin().unwrap()
  }

  #[test]
  fn unknown_pair_gives_empty_timeline() {
    assert!(build_timeline(&catalog(), "unknown_scene", "v1").is_empty());
    assert!(build_timeline(&catalog(), "detective_mystery", "zzz").is_empty());
  }

  #[test]
  fn known_pair_interleaves_fillers_and_slots() {
    let timeline = build_timeline(&catalog(), "detective_mystery", "v1");
    assert_eq!(timeline.len(), 7);
    assert!(matches!(timeline[0], TimelineItem::Creator { .. }));
    assert_eq!(
      timeline[1],
      TimelineItem::Slot {
        slot_id: "dm_v1_1".into()
      }
    );
  }

  #[test]
  fn partial_recordings_are_reported_missing() {
    let timeline = build_timeline(&catalog(), "detective_mystery", "v1");
    let recordings = HashMap::from([("dm_v1_1".to_string(), "file:///r/1.mp4".to_string())]);
    let resolved = resolve_timeline(&timeline, &recordings, Some(Path::new("/assets")));

    assert_eq!(resolved.missing_slot_ids(), vec!["dm_v1_2", "dm_v1_3"]);
    assert!(!resolved.all_ready());
    assert_eq!(resolved.uris(), None);
    assert_eq!(
      resolved.clips[0],
      ResolvedClip::Filler("/assets/videos/1_Opening.mp4".into())
    );
  }

  #[test]
  fn complete_recordings_are_playable() {
    let timeline = build_timeline(&catalog(), "detective_mystery", "v2");
    let recordings: HashMap<_, _> = ["dm_v2_1", "dm_v2_2", "dm_v2_3"]
      .iter()
      .map(|s| (s.to_string(), format!("file:///r/{}.mp4", s)))
      .collect();
    let resolved = resolve_timeline(&timeline, &recordings, None);

    let uris = resolved.uris().unwrap();
    assert_eq!(uris.len(), 7);
    assert_eq!(uris[0], "videos/v2_1Open.mp4");
    assert_eq!(uris[1], "file:///r/dm_v2_1.mp4");
  }

  #[test]
  fn empty_timeline_is_never_ready() {
    let resolved = resolve_timeline(&[], &HashMap::new(), None);
    assert!(!resolved.all_ready());
    assert!(resolved.missing_slot_ids().is_empty());
  }

  #[test]
  fn absolute_and_remote_fillers_are_untouched() {
    assert_eq!(asset_uri("https://x/y.mp4", Some(Path::new("/a"))), "https://x/y.mp4");
    assert_eq!(asset_uri("/abs/y.mp4", Some(Path::new("/a"))), "/abs/y.mp4");
  }
}
