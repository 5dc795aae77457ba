use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use proof_api::batch::{self, Job};
use proof_api::config::Config;
use proof_api::crawlers::{self, sources, ActivitySource};
use proof_api::server::{start_server, AppState};
use proof_api::{db, logging, metrics};

#[derive(Parser)]
#[command(name = "proof")]
#[command(about = "PROOF reflection journaling API, batch jobs and activity crawler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a maintenance job once
    Batch {
        #[arg(value_enum)]
        job: Job,
    },
    /// Crawl activity listings into the activities table
    Crawl {
        /// Sources to crawl (comma-separated). Available: linkareer, wevity, thinkpool, onoffmix
        #[arg(long)]
        sources: Option<String>,
    },
}

fn selected_sources(arg: Option<&str>) -> Vec<Box<dyn ActivitySource>> {
    let names: Vec<String> = match arg {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => sources::ALL_SOURCES.iter().map(|s| s.to_string()).collect(),
    };
    names
        .iter()
        .filter_map(|name| {
            let source = sources::create_source(name);
            if source.is_none() {
                warn!("Unknown source '{}', skipping", name);
            }
            source
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    logging::init_logging(&config.logging);
    metrics::init();

    let database = db::shared(&config)?;
    let today = chrono::Utc::now().date_naive();

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            info!(environment = %config.environment, "Starting PROOF API");
            start_server(AppState::new(Arc::clone(&database), config)).await?;
        }
        Commands::Batch { job } => {
            info!(job = job.name(), "Running batch job");
            match batch::run(database.as_ref(), job, today).await {
                Ok(reports) => {
                    for report in reports {
                        println!("\n📊 {}:", report.job);
                        println!("   Scanned: {}", report.scanned);
                        println!("   Affected: {}", report.affected);
                        println!("   Errors: {}", report.errors.len());
                        for e in &report.errors {
                            println!("     - {}", e);
                        }
                    }
                }
                Err(e) => {
                    error!("Batch job {} failed: {}", job.name(), e);
                    return Err(e.into());
                }
            }
        }
        Commands::Crawl { sources } => {
            let selected = selected_sources(sources.as_deref());
            if selected.is_empty() {
                anyhow::bail!("no valid sources selected");
            }
            let report = crawlers::run_crawl(database.as_ref(), selected, today).await?;
            println!("\n📊 Crawl results:");
            println!("   Collected: {}", report.collected);
            println!("   Saved: {}", report.saved);
            println!("   Updated: {}", report.updated);
            println!("   Errors: {}", report.errors.len());
        }
    }

    Ok(())
}
