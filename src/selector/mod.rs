use std::sync::Arc;

use log::{debug, trace, warn};
use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

use crate::kv::{KvError, SharedKvStore};

#[derive(Error, Debug)]
pub enum SelectorError {
  /// The pick itself succeeded but the remaining bag could not be stored.
  #[error("picked variant {picked} but failed to persist bag: {source}")]
  Persist {
    picked: usize,
    #[source]
    source: KvError,
  },
}

pub fn bag_key(scene_id: &str) -> String {
  format!("youreup_variant_bag_{}", scene_id)
}

/// In-place Fisher-Yates: walks from the end, swapping each position with a
/// uniformly chosen position at or before it.
pub fn shuffle_in_place<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
  items.shuffle(rng);
}

pub fn shuffled<T: Clone>(items: &[T]) -> Vec<T> {
  let mut out = items.to_vec();
  shuffle_in_place(&mut out, &mut rand::thread_rng());
  out
}

/// Hands out variant indices so that every variant of a scene is shown once
/// before any repeats.
#[derive(Debug)]
pub struct VariantSelectorImpl {
  kv: SharedKvStore,
}

pub type VariantSelector = Arc<VariantSelectorImpl>;

impl VariantSelectorImpl {
  pub fn new(kv: SharedKvStore) -> VariantSelector {
    Arc::new(VariantSelectorImpl { kv })
  }
}

impl VariantSelectorImpl {
  async fn load_bag(&self, key: &str, variant_count: usize) -> Vec<usize> {
    let raw = match self.kv.get_item(key).await {
      Ok(raw) => raw,
      Err(e) => {
        warn!("Failed to read variant bag {}: {}", key, e);
        None
      }
    };
    let bag = match raw {
      Some(raw) => serde_json::from_str::<Vec<usize>>(&raw).unwrap_or_else(|e| {
        debug!("Discarding malformed variant bag {}: {}", key, e);
        vec![]
      }),
      None => vec![],
    };
    // Content may have shrunk since the bag was stored.
    bag.into_iter().filter(|i| *i < variant_count).collect()
  }

  pub async fn pick_next_variant_index(
    &self,
    scene_id: &str,
    variant_count: usize,
  ) -> Result<usize, SelectorError> {
    if variant_count < 1 {
      return Ok(0);
    }

    let key = bag_key(scene_id);
    let mut bag = self.load_bag(&key, variant_count).await;
    if bag.is_empty() {
      bag = (0..variant_count).collect();
      shuffle_in_place(&mut bag, &mut rand::thread_rng());
      debug!("New variant cycle for {}: {:?}", scene_id, bag);
    }

    // The bag is non-empty here, but stay total.
    let picked = bag.pop().unwrap_or(0);
    trace!("Picked variant {} for {}, left {:?}", picked, scene_id, bag);

    let encoded = serde_json::to_string(&bag).map_err(|e| SelectorError::Persist {
      picked,
      source: e.into(),
    })?;
    self
      .kv
      .set_item(&key, encoded)
      .await
      .map_err(|source| SelectorError::Persist { picked, source })?;
    Ok(picked)
  }
}
