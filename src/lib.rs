use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use log::{debug, info};

use crate::{
  kv::{FileKvStore, MemoryKvStore, SharedKvStore},
  selector::{VariantSelector, VariantSelectorImpl},
  state::GameState,
  storage::{RecordingStorage, RecordingStorageImpl},
  types::Catalog,
};

pub mod kv;
pub mod selector;
pub mod state;
pub mod storage;
pub mod timeline;
pub mod types;

pub type Result<T> = anyhow::Result<T>;

pub const BAG_STORE_FILE: &str = "variant_bags.json";

#[derive(Debug, Parser, Clone)]
pub struct AppOpts {
  /// Scratch space for in-progress runs. Falls back to the persistent root.
  #[clap(long, env = "YOUREUP_TEMP_ROOT")]
  pub temp_root: Option<PathBuf>,
  /// Durable storage for the last-run backup and the variant bags.
  #[clap(long, env = "YOUREUP_PERSISTENT_ROOT")]
  pub persistent_root: Option<PathBuf>,
  /// Where variant bags are kept. Defaults to a file in the persistent root;
  /// without either, bags only live in memory.
  #[clap(long, env = "YOUREUP_BAG_STORE")]
  pub bag_store: Option<PathBuf>,
  /// Content catalog JSON. The built-in catalog is used when absent.
  #[clap(long, env = "YOUREUP_CATALOG")]
  pub catalog: Option<PathBuf>,
  /// Base for relative filler clip paths in timelines.
  #[clap(long, env = "YOUREUP_ASSET_ROOT", default_value = "./assets")]
  pub asset_root: PathBuf,
}

impl AppOpts {
  pub fn bag_store_path(&self) -> Option<PathBuf> {
    self
      .bag_store
      .clone()
      .or_else(|| self.persistent_root.as_ref().map(|p| p.join(BAG_STORE_FILE)))
  }
}

#[derive(Debug)]
pub struct AppServiceImpl {
  pub opts: AppOpts,
  pub catalog: Arc<Catalog>,
  pub selector: VariantSelector,
  pub storage: RecordingStorage,
}

pub type AppService = Arc<AppServiceImpl>;

impl AppServiceImpl {
  pub async fn new(opts: AppOpts) -> Result<AppService> {
    let catalog = match &opts.catalog {
      Some(path) => {
        let raw = tokio::fs::read_to_string(path)
          .await
          .with_context(|| format!("reading catalog {:?}", path))?;
        Catalog::from_json(&raw).with_context(|| format!("loading catalog {:?}", path))?
      }
      None => Catalog::builtin().context("loading built-in catalog")?,
    };
    debug!(
      "Catalog: {} seasons, {} scenes",
      catalog.seasons().len(),
      catalog.scenes().len()
    );

    let kv: SharedKvStore = match opts.bag_store_path() {
      Some(path) => Arc::new(FileKvStore::open(path).await),
      None => {
        info!("No bag store configured, variant rotation resets on restart");
        Arc::new(MemoryKvStore::new())
      }
    };

    let storage = RecordingStorageImpl::new(opts.temp_root.clone(), opts.persistent_root.clone());
    if storage.is_memory_only() {
      info!("No storage roots configured, recordings are referenced in place");
    }

    Ok(Arc::new(AppServiceImpl {
      catalog: Arc::new(catalog),
      selector: VariantSelectorImpl::new(kv),
      storage,
      opts,
    }))
  }

  /// A fresh session on the default season and scene.
  pub fn new_game(&self) -> GameState {
    GameState::new(
      self.catalog.clone(),
      self.selector.clone(),
      self.storage.clone(),
    )
    .with_asset_root(self.opts.asset_root.clone())
  }
}

pub fn my_git_hash() -> String {
  option_env!("VERGEN_GIT_SHA")
    .map(|x| x.get(..8).unwrap_or(x).to_string())
    .unwrap_or_else(|| "0".to_string())
}
