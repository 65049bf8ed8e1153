use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use price_sentry::config::AppConfig;
use price_sentry::extractor::PriceExtractor;
use price_sentry::models::NewTrackedItem;
use price_sentry::monitor::PriceMonitor;
use price_sentry::notifier::EmailNotifier;
use price_sentry::renderer::ChromeRenderer;
use price_sentry::scheduler::MonitorScheduler;
use price_sentry::store::{SqliteItemStore, TrackedItemStore};

#[derive(Parser)]
#[command(name = "price-sentry", about = "Price drop monitoring and alerting service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and run until interrupted
    Run,
    /// Execute a single monitoring run now and print the report
    Check,
    /// Register a listing for monitoring
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        target_price: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("price_sentry=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let store = Arc::new(SqliteItemStore::connect(&config.database).await?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Add {
            name,
            url,
            target_price,
        } => {
            let item = store
                .insert(NewTrackedItem {
                    name,
                    url,
                    target_price,
                })
                .await?;
            info!("Tracking {} ({}) with target {:.2}", item.name, item.url, item.target_price);
        }
        Command::Check => {
            let monitor = build_monitor(&config, store)?;
            let report = monitor.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Run => {
            let monitor = build_monitor(&config, store)?;
            let mut scheduler =
                MonitorScheduler::new(&config.scheduler.check_interval, monitor).await?;
            scheduler.start().await?;

            info!("Price Sentry running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;

            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}

fn build_monitor(
    config: &AppConfig,
    store: Arc<SqliteItemStore>,
) -> Result<Arc<PriceMonitor>> {
    let renderer = Arc::new(ChromeRenderer::new(&config.scraper)?);
    let notifier = Arc::new(EmailNotifier::new(&config.smtp)?);
    let extractor = PriceExtractor::new(&config.scraper.price_selectors)?;

    Ok(Arc::new(PriceMonitor::new(
        store,
        renderer,
        notifier,
        extractor,
        config.scraper.max_concurrent_checks,
    )))
}
