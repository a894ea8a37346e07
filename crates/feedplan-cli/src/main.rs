mod assets;
mod generate;
mod runs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use feedplan_core::NarrativePhase;
use feedplan_db::PipelineStore;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "feedplan-cli")]
#[command(about = "Plan, write, and review social media posts for a campaign")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Register and inspect campaign images
    Assets {
        #[command(subcommand)]
        command: AssetsCommands,
    },
    /// Run the pipeline and commit a new run
    Generate {
        /// Campaign to generate for
        #[arg(long)]
        campaign: Uuid,
        /// Number of days to plan
        #[arg(long, default_value = "7")]
        days: usize,
        /// Narrative phase (introduction, build-up, launch, sustain)
        #[arg(long, default_value = "introduction")]
        phase: NarrativePhase,
        /// Restrict to these assets (repeatable); defaults to every unused asset
        #[arg(long = "asset")]
        assets: Vec<Uuid>,
        /// Free-form notes passed to the planner
        #[arg(long)]
        notes: Option<String>,
        /// Generate graphics for items that request one
        #[arg(long)]
        illustrate: bool,
    },
    /// Inspect and delete committed runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum AssetsCommands {
    /// Store an image and register it with a campaign
    Add {
        #[arg(long)]
        campaign: Uuid,
        /// Blob key to store the bytes under; defaults to `assets/<campaign>/<file name>`
        #[arg(long)]
        blob: Option<String>,
        /// Image file to upload
        path: PathBuf,
    },
    /// List a campaign's assets and whether a run has used them
    List {
        #[arg(long)]
        campaign: Uuid,
    },
}

#[derive(Debug, Subcommand)]
enum RunsCommands {
    /// List retained runs, newest first
    List {
        #[arg(long)]
        campaign: Uuid,
    },
    /// Print one run's items and captions
    Show {
        #[arg(long)]
        campaign: Uuid,
        /// Run number; defaults to the latest run
        #[arg(long)]
        run: Option<u32>,
    },
    /// Delete a run; its numbers are never reissued
    Delete {
        #[arg(long)]
        campaign: Uuid,
        #[arg(long)]
        run: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = feedplan_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = feedplan_db::PoolConfig::from_app_config(&config);
    let pool = feedplan_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                feedplan_db::ping(&pool).await?;
                println!("database reachable");
            }
            DbCommands::Migrate => {
                let applied = feedplan_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Assets { command } => {
            let store = feedplan_db::PgStore::new(pool);
            match command {
                AssetsCommands::Add {
                    campaign,
                    blob,
                    path,
                } => assets::run_assets_add(&store, campaign, blob, &path).await?,
                AssetsCommands::List { campaign } => {
                    assets::run_assets_list(&store, campaign).await?;
                }
            }
        }
        Commands::Generate {
            campaign,
            days,
            phase,
            assets,
            notes,
            illustrate,
        } => {
            let request = feedplan_pipeline::GenerationRequest {
                campaign_id: campaign,
                target_days: days,
                phase,
                asset_ids: assets,
                notes,
                illustrate,
            };
            let store: Arc<dyn PipelineStore> = Arc::new(feedplan_db::PgStore::new(pool));
            generate::run_generate(store, &config, request).await?;
        }
        Commands::Runs { command } => {
            let store = feedplan_db::PgStore::new(pool);
            match command {
                RunsCommands::List { campaign } => runs::run_runs_list(&store, campaign).await?,
                RunsCommands::Show { campaign, run } => {
                    runs::run_runs_show(&store, campaign, run).await?;
                }
                RunsCommands::Delete { campaign, run } => {
                    runs::run_runs_delete(&store, campaign, run).await?;
                }
            }
        }
    }

    Ok(())
}
