//! Cloudscan cache inspection tool
//!
//! Computes cache keys the way the scanner does and reports on the file
//! cache without talking to any remote API.
//!
//! # Usage
//! ```bash
//! # Show the canonical string and hash for one unit
//! cloudscan key --region us-east-1 --service ec2 --tag-key Env --tag-value Prod
//!
//! # List units holding a fresh entry
//! cloudscan status --regions us-east-1,eu-west-1 --services ec2,s3
//!
//! # Remove expired entries
//! cloudscan purge
//!
//! # Keep purging every CLOUDSCAN_REAP_INTERVAL seconds until Ctrl+C
//! cloudscan purge --watch
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cloudscan::cache::{CacheKey, CacheStore};
use cloudscan::config::Config;
use cloudscan::models::{ScanRequest, ScanScope, TagFilter};
use cloudscan::scan::{fresh_units, ShutdownSignal, UnitScope};
use cloudscan::tasks::{spawn_interrupt_listener, spawn_reaper_task};

// == CLI Definition ==
#[derive(Parser)]
#[command(name = "cloudscan")]
#[command(about = "Inspect the cloudscan result cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Cache directory (defaults to CLOUDSCAN_CACHE_DIR or the temp dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TagArgs {
    /// Tag key the scan is filtered on
    #[arg(long)]
    tag_key: Option<String>,

    /// Tag value the scan is filtered on
    #[arg(long)]
    tag_value: Option<String>,
}

impl TagArgs {
    fn filter(&self) -> TagFilter {
        TagFilter::new(self.tag_key.clone(), self.tag_value.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical key string and its hash for one unit
    Key {
        #[arg(long)]
        region: String,

        /// Single service scope
        #[arg(long, conflicts_with = "all_services")]
        service: Option<String>,

        /// Whole-region hybrid scope
        #[arg(long)]
        all_services: bool,

        #[command(flatten)]
        tags: TagArgs,
    },

    /// List units that would be answered from the cache
    Status {
        /// Comma-separated region list
        #[arg(long, value_delimiter = ',', required = true)]
        regions: Vec<String>,

        /// Comma-separated service list (defaults to the standard set)
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,

        #[arg(long)]
        all_services: bool,

        #[command(flatten)]
        tags: TagArgs,
    },

    /// Remove expired and unreadable entries
    Purge {
        /// Keep a reaper running until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "cloudscan=info", can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudscan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }

    match cli.command {
        Commands::Key {
            region,
            service,
            all_services,
            tags,
        } => {
            let scope = match (service, all_services) {
                (Some(service), false) => UnitScope::Service(service),
                (None, true) => UnitScope::AllServices,
                _ => bail!("either --service or --all-services is required"),
            };
            let filter = tags.filter();
            let (tag_key, tag_value) = (filter.key.as_deref(), filter.value.as_deref());
            println!("{}", CacheKey::canonical(&region, &scope, tag_key, tag_value));
            println!("{}", CacheKey::new(&region, &scope, tag_key, tag_value));
        }
        Commands::Status {
            regions,
            services,
            all_services,
            tags,
        } => {
            let scope = if all_services {
                ScanScope::AllServices
            } else if services.is_empty() {
                ScanScope::default_services()
            } else {
                ScanScope::Services(services)
            };
            let request =
                ScanRequest::from_config(regions, scope, &config).with_filter(tags.filter());

            let store = CacheStore::from_config(&config);
            info!(cache_dir = %config.cache_dir.display(), "Checking cache");
            let fresh = fresh_units(&store, &request).await;
            if fresh.is_empty() {
                println!("No cached results");
            }
            for unit in fresh {
                println!("{}\t{}", unit, unit.cache_key());
            }
        }
        Commands::Purge { watch } => {
            let store = Arc::new(CacheStore::from_config(&config));
            let removed = store.purge_expired().await;
            println!("Removed {} expired entries", removed);

            if watch {
                let shutdown = ShutdownSignal::new();
                let listener = spawn_interrupt_listener(shutdown.clone());
                let reaper = spawn_reaper_task(store, config.reap_interval);
                info!(
                    interval_secs = config.reap_interval.as_secs(),
                    "Watching cache, press Ctrl+C to stop"
                );

                shutdown.cancelled().await;
                reaper.abort();
                let _ = listener.await;
                info!("Cache reaper stopped");
            }
        }
    }

    Ok(())
}
