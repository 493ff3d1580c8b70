//! # Humantic — resumable, flood-aware activity scheduler
//!
//! Drives scripted join/leave/message activity across many actors, one
//! campaign at a time, resuming after crashes without repeating actions.
//!
//! Usage:
//!   humantic run                          # One run now (resumes a recent checkpoint)
//!   humantic serve                        # Periodic trigger loop until Ctrl-C
//!   humantic status                       # System sleep, cadence, checkpoint
//!   humantic actors add 7 --session acc_7 --api-id 123 --api-hash abc
//!   humantic checkpoint clear             # Forget the current run

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use humantic_core::config::{CheckpointBackend, ConfigFileSettings, HumanticConfig};
use humantic_core::traits::{ActorDirectory, SystemStateStore};
use humantic_core::types::{Actor, ActorId, Credentials};
use humantic_scheduler::{
    CheckpointStore, Collaborators, DispatchNotifier, FileCheckpointStore, LinkPoolDir,
    Orchestrator, SchedulerDb, spawn_trigger_loop,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "humantic",
    version,
    about = "🤖 Humantic — resumable multi-actor activity scheduler"
)]
struct Cli {
    /// Config file (default: ~/.humantic/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if none exists
    Init,
    #[command(flatten)]
    App(AppCommand),
}

/// Commands that need the database and the scheduler.
#[derive(Subcommand)]
enum AppCommand {
    /// Run (or resume) one campaign now, ignoring the run interval
    Run,
    /// Check periodically and start runs when due
    Serve,
    /// Show system state and checkpoint
    Status,
    /// Manage actors
    Actors {
        #[command(subcommand)]
        action: ActorsCommand,
    },
    /// Inspect or reset the run checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommand,
    },
    /// Lift a system-wide deep sleep
    WakeSystem,
}

#[derive(Subcommand)]
enum ActorsCommand {
    List,
    Add {
        id: ActorId,
        #[arg(long, default_value = "")]
        label: String,
        #[arg(long)]
        session: String,
        #[arg(long)]
        api_id: i64,
        #[arg(long)]
        api_hash: String,
    },
    Remove {
        id: ActorId,
    },
    /// Clear an actor's deep sleep
    Wake {
        id: ActorId,
    },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    Show,
    Clear,
}

struct App {
    config: HumanticConfig,
    db: Arc<SchedulerDb>,
    checkpoints: Arc<dyn CheckpointStore>,
    orchestrator: Arc<Orchestrator>,
}

impl App {
    fn build(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            HumanticConfig::load_from(config_path)?
        } else {
            tracing::info!("📄 No config at {}, using defaults", config_path.display());
            HumanticConfig::default()
        };

        let db = Arc::new(SchedulerDb::open(&config.paths.database_path())?);
        let checkpoints: Arc<dyn CheckpointStore> = match config.paths.checkpoint_backend {
            CheckpointBackend::File => {
                Arc::new(FileCheckpointStore::new(&config.paths.checkpoint_path()))
            }
            CheckpointBackend::Sqlite => db.clone(),
        };

        let orchestrator = Orchestrator::new(Collaborators {
            directory: db.clone(),
            sessions: humantic_bridge::factory_from_config(&config.bridge),
            checkpoints: checkpoints.clone(),
            settings: Arc::new(ConfigFileSettings::new(config_path)),
            pools: Arc::new(LinkPoolDir::new(&config.paths.links_pool_dir())),
            state: db.clone(),
            notifier: Arc::new(DispatchNotifier::from_config(&config.notify)),
        });

        Ok(Self {
            config,
            db,
            checkpoints,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Cancel the orchestrator on Ctrl-C. The in-flight action finishes first.
    fn cancel_on_ctrl_c(&self) {
        let token = self.orchestrator.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("🛑 Ctrl-C received, stopping after the current action");
                token.cancel();
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "humantic=debug,humantic_scheduler=debug,humantic_bridge=debug,humantic_core=debug"
    } else {
        "humantic=info,humantic_scheduler=info,humantic_bridge=info,humantic_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(HumanticConfig::default_path);

    match cli.command {
        Command::Init => init_config(&config_path),
        Command::App(command) => execute(App::build(&config_path)?, command).await,
    }
}

fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("⚠️  Config already exists: {}", config_path.display());
    } else {
        HumanticConfig::default().save_to(config_path)?;
        println!("✅ Wrote default config: {}", config_path.display());
    }
    Ok(())
}

async fn execute(app: App, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Run => {
            app.cancel_on_ctrl_c();
            let hooks = app.orchestrator.store_hooks();
            let report = app.orchestrator.run_all_actors(&hooks).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        AppCommand::Serve => {
            app.cancel_on_ctrl_c();
            let interval = app.config.scheduler.check_interval();
            let hooks = Arc::new(app.orchestrator.store_hooks());
            let handle = spawn_trigger_loop(app.orchestrator.clone(), hooks, interval);
            handle.await?;
        }
        AppCommand::Status => {
            let now = chrono::Utc::now();
            let sleep_until = app.db.system_sleep_until().await?;
            println!("🤖 Humantic status");
            match sleep_until {
                Some(until) if until > now => println!("   System:      😴 sleeping until {until}"),
                _ => println!("   System:      ✅ awake"),
            }
            println!("   Enabled:     {}", app.config.scheduler.enabled);
            println!("   Last run:    {}", fmt_time(app.db.last_run_at().await?));
            println!("   Next run:    {}", fmt_time(app.db.next_run_at().await?));
            let actors = app.db.list_actors().await?;
            let sleeping = actors.iter().filter(|a| a.is_sleeping(now)).count();
            println!("   Actors:      {} ({} sleeping)", actors.len(), sleeping);
            match app.checkpoints.load() {
                Some(cp) => {
                    let recent = cp.is_recent(now, app.config.scheduler.checkpoint_freshness());
                    println!(
                        "   Checkpoint:  run {} ({}), {} done, current={:?}",
                        cp.run_id,
                        if recent { "resumable" } else { "stale" },
                        cp.completed_actor_ids.len(),
                        cp.current
                    );
                }
                None => println!("   Checkpoint:  none"),
            }
        }
        AppCommand::Actors { action } => match action {
            ActorsCommand::List => {
                let now = chrono::Utc::now();
                for actor in app.db.list_actors().await? {
                    let state = match actor.sleep_until {
                        Some(until) if until > now => format!("😴 until {until}"),
                        _ => "✅ awake".to_string(),
                    };
                    let creds = if actor.credentials.is_complete() { "" } else { " ⚠️ incomplete credentials" };
                    println!("{:>6}  {:<12} {state}{creds}", actor.id, actor.short_label());
                }
            }
            ActorsCommand::Add {
                id,
                label,
                session,
                api_id,
                api_hash,
            } => {
                let actor = Actor::new(
                    id,
                    &label,
                    Credentials {
                        session,
                        api_id: Some(api_id),
                        api_hash,
                    },
                );
                app.db.upsert_actor(&actor)?;
                println!("✅ Actor {id} saved");
            }
            ActorsCommand::Remove { id } => {
                if !app.db.remove_actor(id)? {
                    bail!("actor {id} not found");
                }
                println!("🗑️  Actor {id} removed");
            }
            ActorsCommand::Wake { id } => {
                app.db.set_actor_sleep(id, None).await?;
                println!("✅ Actor {id} awake");
            }
        },
        AppCommand::Checkpoint { action } => match action {
            CheckpointCommand::Show => match app.checkpoints.load() {
                Some(cp) => println!("{}", serde_json::to_string_pretty(&cp)?),
                None => println!("No checkpoint"),
            },
            CheckpointCommand::Clear => {
                app.checkpoints.clear()?;
                println!("🧹 Checkpoint cleared");
            }
        },
        AppCommand::WakeSystem => {
            app.db.set_system_sleep_until(None).await?;
            println!("✅ System sleep lifted");
        }
    }
    Ok(())
}

fn fmt_time(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_init_is_separate_from_app_commands() {
        let cli = Cli::try_parse_from(["humantic", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));

        let cli = Cli::try_parse_from(["humantic", "-v", "run"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::App(AppCommand::Run)));

        let cli = Cli::try_parse_from(["humantic", "checkpoint", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::App(AppCommand::Checkpoint {
                action: CheckpointCommand::Clear
            })
        ));
    }
}
