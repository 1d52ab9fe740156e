use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use warmup_choreo_core::{
    grid, timing, ActionId, Assembler, AudienceTier, ChoreoError, EngineConfig, JsonFileStore,
    Phase, PlaybackSynchronizer, ProgramComposite, SurfaceMessage,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> warmup_choreo_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default(&cli.config)?;
    if let Some(store) = cli.store {
        config.store.path = store.display().to_string();
    }

    match cli.command {
        Commands::Generate {
            id,
            group,
            title,
            description,
            actions,
            think,
            flow,
            challenge,
        } => {
            let selection: Vec<ActionId> = actions.into_iter().map(ActionId::from).collect();
            let mut record =
                ProgramComposite::warmup(id, group, title, description.unwrap_or_default(), &selection)?;
            if let Some(tier) = think {
                record.push_phase(Phase::think(tier));
            }
            if let Some(tier) = flow {
                record.push_phase(Phase::flow(tier));
            }
            if let Some(level) = challenge {
                record.push_phase(Phase::challenge(level, cli.bpm));
            }
            run_generate(&config, &record).await
        }
        Commands::Show { id } => run_show(&config, &id).await,
        Commands::Revoke { id } => run_revoke(&config, &id).await,
        Commands::Profiles { tier } => run_profiles(tier),
        Commands::Grid { diagonal } => run_grid(diagonal),
        Commands::Play {
            id,
            signal_after_ms,
            failsafe_ms,
        } => {
            if let Some(failsafe_ms) = failsafe_ms {
                config.playback.failsafe_ms = failsafe_ms;
            }
            run_play(&config, &id, signal_after_ms).await
        }
    }
}

fn assembler(config: &EngineConfig) -> Assembler<JsonFileStore> {
    Assembler::new(JsonFileStore::new(&config.store.path))
}

async fn run_generate(config: &EngineConfig, record: &ProgramComposite) -> warmup_choreo_core::Result<()> {
    tracing::info!(id = %record.id, store = %config.store.path, "generating program");
    let id = assembler(config).upsert(record).await?;
    println!("{id} ({}s)", record.total_duration_seconds);
    Ok(())
}

async fn run_show(config: &EngineConfig, id: &str) -> warmup_choreo_core::Result<()> {
    let record = assembler(config)
        .load(id)
        .await?
        .ok_or_else(|| ChoreoError::msg(format!("no program with id `{id}`")))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_revoke(config: &EngineConfig, id: &str) -> warmup_choreo_core::Result<()> {
    if !assembler(config).revoke(id).await? {
        tracing::warn!(id, "nothing to revoke");
    }
    Ok(())
}

fn run_profiles(tier: Option<AudienceTier>) -> warmup_choreo_core::Result<()> {
    let tiers = tier.map_or_else(|| AudienceTier::ALL.to_vec(), |t| vec![t]);
    let profiles: Vec<_> = tiers.into_iter().map(timing::TimingProfiles::for_tier).collect();
    println!("{}", serde_json::to_string_pretty(&profiles)?);
    Ok(())
}

fn run_grid(diagonal: bool) -> warmup_choreo_core::Result<()> {
    let rows = if diagonal {
        grid::diagonal_grid()
    } else {
        grid::canonical_grid()
    };
    for row in rows {
        println!("{:<8}{}", row[0], row[1]);
    }
    Ok(())
}

async fn run_play(
    config: &EngineConfig,
    id: &str,
    signal_after_ms: Option<u64>,
) -> warmup_choreo_core::Result<()> {
    let record = assembler(config)
        .load(id)
        .await?
        .ok_or_else(|| ChoreoError::msg(format!("no program with id `{id}`")))?;

    let (tx, rx) = mpsc::channel(8);
    let synchronizer = PlaybackSynchronizer::new(config.playback.clone());
    let session = synchronizer.mount(record.group_key.clone(), rx, |reason| {
        tracing::info!(?reason, "completion callback invoked");
    })?;

    // Stand-in for the embedded surface: post `ended` after the delay, or stay
    // silent and let the failsafe close the session.
    if let Some(delay) = signal_after_ms {
        let origin = config.playback.host_origin.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let _ = tx.send(SurfaceMessage::ended(origin)).await;
        });
    }

    let reason = session.finished().await;
    println!("{}", serde_json::to_string(&session.snapshot())?);
    if let Some(reason) = reason {
        println!("ended: {}", serde_json::to_string(&reason)?);
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Warmup program choreography engine", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, default_value = "choreo.json")]
    config: PathBuf,
    /// Program store, overriding the configured path.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Tempo used for challenge phases.
    #[arg(long, global = true, default_value_t = 100)]
    bpm: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a warmup from the selected actions and store it.
    Generate {
        /// Program id; an existing program with this id is replaced.
        #[arg(long)]
        id: String,
        /// Schedule group the program belongs to (e.g. a week key).
        #[arg(long)]
        group: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Comma separated action ids, exactly five.
        #[arg(long, value_delimiter = ',', required = true)]
        actions: Vec<String>,
        /// Append a two-symbol think phase for this tier.
        #[arg(long)]
        think: Option<AudienceTier>,
        /// Append a memory-recall flow phase for this tier.
        #[arg(long)]
        flow: Option<AudienceTier>,
        /// Append a grid challenge at this level.
        #[arg(long)]
        challenge: Option<u8>,
    },
    /// Print a stored program.
    Show { id: String },
    /// Delete a stored program.
    Revoke { id: String },
    /// Print cue/blank timing for one or all audience tiers.
    Profiles {
        #[arg(long)]
        tier: Option<AudienceTier>,
    },
    /// Print the color grid.
    Grid {
        /// Show the diagonal variant.
        #[arg(long)]
        diagonal: bool,
    },
    /// Play a stored program against a simulated surface.
    Play {
        id: String,
        /// Post the `ended` signal after this many milliseconds.
        #[arg(long)]
        signal_after_ms: Option<u64>,
        /// Override the configured failsafe window.
        #[arg(long)]
        failsafe_ms: Option<u64>,
    },
}
