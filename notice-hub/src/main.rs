use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use notice_hub::config::NotificationConfig;
use notice_hub::database::{
    self,
    repositories::{SqlxNoticeTypeRepository, SqlxUserRepository},
};
use notice_hub::logging;
use notice_hub::notification::{DispatchEngine, NoticeTypeService, QueueDrainer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "NOTICE_HUB_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Create or update a notice type
    CreateNoticeType {
        label: String,
        display: String,
        description: String,
        /// Sensitivity threshold; media with sensitivity <= this are on by default
        #[arg(long, default_value_t = 2)]
        default: i64,
    },
    /// Send queued notice batches
    DrainQueue {
        /// Keep draining every N seconds until interrupted
        #[arg(long)]
        watch: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = logging::init_logging(args.log_dir.as_deref())?;
    let config = NotificationConfig::from_env()?;

    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    match args.command {
        Command::Migrate => {
            tracing::info!("Database is up to date");
        }
        Command::CreateNoticeType {
            label,
            display,
            description,
            default,
        } => {
            let service =
                NoticeTypeService::new(Arc::new(SqlxNoticeTypeRepository::new(pool.clone())));
            let outcome = service
                .create_notice_type(&label, &display, &description, default)
                .await?;
            println!("{label}: {outcome:?}");
        }
        Command::DrainQueue { watch } => {
            let engine = Arc::new(
                DispatchEngine::from_config(pool.clone(), &config)
                    .context("Failed to set up dispatch")?,
            );
            let drainer =
                QueueDrainer::new(engine, Arc::new(SqlxUserRepository::new(pool.clone())));

            match watch {
                None => {
                    let stats = drainer.drain().await?;
                    println!(
                        "batches: {}, notices: {}, failed batches: {}",
                        stats.batches, stats.notices, stats.failed_batches
                    );
                }
                Some(secs) => {
                    let cancel_token = CancellationToken::new();
                    let shutdown = cancel_token.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            tracing::info!("Interrupt received, stopping");
                        }
                        shutdown.cancel();
                    });
                    drainer
                        .run(Duration::from_secs(secs.max(1)), cancel_token)
                        .await;
                }
            }
        }
    }

    pool.close().await;
    Ok(())
}
