//! CLI for jobrelay
//!
//! Subcommands:
//! - `server`: run the relay, optionally seeding it with jobs from a JSON file
//! - `watch`: subscribe to a relay and log what arrives (useful for smoke tests)

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use jobrelay::client::JobSubscription;
use jobrelay::config::{Settings, load_config};
use jobrelay::directory::InMemoryJobDirectory;
use jobrelay::model::Job;
use jobrelay::notify::Notifier;
use jobrelay::router::{self, TopicRouter};
use jobrelay::transport::start_websocket_server;
use jobrelay::utils::logging;

#[derive(Parser)]
#[command(name = "jobrelay")]
enum Command {
    /// Start the relay server
    Server {
        /// JSON array of jobs to publish at startup
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Subscribe to a relay and log job events
    Watch {
        /// Also watch this category's topic
        #[arg(long)]
        category: Option<String>,
        /// Receive application updates for this user
        #[arg(long)]
        user: Option<String>,
        /// Relay URL; overrides `client.url` from configuration
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return;
        }
    };
    logging::init(&config.log.level);

    let result = match cmd {
        Command::Server { seed } => run_server(config, seed.as_deref()).await,
        Command::Watch {
            category,
            user,
            url,
        } => run_watch(config, category, user, url).await,
    };

    if let Err(e) = result {
        error!("jobrelay failed: {e}");
    }
}

async fn run_server(config: Settings, seed: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let router = router::shared(TopicRouter::new());
    let directory = Arc::new(InMemoryJobDirectory::new());
    let notifier = Notifier::new(router.clone()).with_directory(directory.clone());

    if let Some(path) = seed {
        let count = seed_jobs(&notifier, path).await?;
        info!(count, path = %path.display(), "seeded jobs");
    }

    tokio::select! {
        result = start_websocket_server(config, router, directory) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn seed_jobs(notifier: &Notifier, path: &Path) -> Result<usize, Box<dyn Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let jobs: Vec<Job> = serde_json::from_str(&raw)?;
    for job in &jobs {
        notifier.notify_new_job(job)?;
    }
    Ok(jobs.len())
}

async fn run_watch(
    config: Settings,
    category: Option<String>,
    user: Option<String>,
    url: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut settings = config.client;
    if let Some(url) = url {
        settings.url = url;
    }

    let subscription = JobSubscription::spawn(settings, category);
    if let Some(user) = &user {
        subscription.watch_user(user)?;
    }

    let mut states = subscription.state_changes();
    let mut revisions = subscription.feed_changes();

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(?state, "connection state changed");
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                revisions.borrow_and_update();
                let feed = subscription.feed();
                match feed.jobs().first() {
                    Some(job) => info!(
                        jobs = feed.jobs().len(),
                        latest = %job.id,
                        category = %job.category,
                        "feed updated"
                    ),
                    None => info!("feed is empty"),
                }
                if let Some(update) = feed.application_updates().last() {
                    info!(job_id = %update.job_id, status = %update.status, "application update");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Closing subscription.");
                break;
            }
        }
    }

    subscription.close().await;
    Ok(())
}
