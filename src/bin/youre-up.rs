use clap::{Parser, Subcommand};
use log::{info, warn};
use youre_up::{
  state::{GameState, RecordOutcome},
  AppOpts, AppServiceImpl,
};

#[derive(Debug, Parser)]
#[clap(version, about = "You're Up! run engine")]
struct Cli {
  #[clap(flatten)]
  opts: AppOpts,
  #[clap(subcommand)]
  command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// List seasons and their scenes.
  Scenes,
  /// Play one run of a scene, using the given clips as takes in prompt order.
  Play {
    scene: String,
    clips: Vec<String>,
    /// Keep the run's scratch directory after the backup.
    #[clap(long)]
    keep: bool,
  },
  /// Show the manifest of the last backed-up run.
  LastRun,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
  match dotenvy::dotenv() {
    Err(e) => warn!("dotenv(): failed to load .env file: {}", e),
    _ => {}
  }

  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let cli = Cli::parse();
  info!("You're Up!: version {}", youre_up::my_git_hash());

  let app = AppServiceImpl::new(cli.opts).await?;
  let mut game = app.new_game();

  match cli.command {
    Command::Scenes => {
      for season in app.catalog.seasons() {
        println!("{} - {}", season.id, season.title);
        for entry in app.catalog.scenes_for_season(&season.id) {
          println!(
            "  {} - {} ({} variants)",
            entry.id,
            entry.title,
            entry.scene.variants().len()
          );
        }
      }
    }
    Command::Play { scene, clips, keep } => {
      game.set_scene_id(&scene).await;
      play(&mut game, &clips).await;
      if !keep {
        game.cleanup_run().await;
      }
    }
    Command::LastRun => match game.last_run_backup().await {
      Some(manifest) => println!("{}", serde_json::to_string_pretty(&manifest)?),
      None => println!("no backup yet"),
    },
  }

  Ok(())
}

async fn play(game: &mut GameState, clips: &[String]) {
  info!(
    "Run {} on {}, variant {}",
    game.run_id(),
    game.scene_id(),
    game.variant().id
  );

  for clip in clips {
    let Some(slot) = game.current_slot().cloned() else {
      warn!("More clips than prompts, ignoring {}", clip);
      continue;
    };
    game.bump_scene_number();
    println!(
      "[{}] {} ({}s): {}",
      game.display_scene_number(),
      slot.id,
      slot.max_seconds,
      slot.prompt
    );
    match game.save_recording(&slot.id, clip).await {
      RecordOutcome::Saved { uri, copied } => {
        println!("  -> {}{}", uri, if copied { "" } else { " (in place)" })
      }
      other => warn!("Take for {} not saved: {:?}", slot.id, other),
    }
    game.next();
  }

  let resolved = game.resolved_timeline();
  if !game.is_complete() {
    println!("missing takes: {}", resolved.missing_slot_ids().join(", "));
    return;
  }

  println!("final cut:");
  for uri in game.playback_queue().await {
    println!("  {}", uri);
  }
  match game.save_last_run_backup().await {
    Some(manifest) => println!("backed up {} clips", manifest.slots.len()),
    None => println!("backup skipped"),
  }
}
