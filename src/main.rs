use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use kv_spider::config::Config;
use kv_spider::crawler::fetcher::{FetchSettings, Fetcher};
use kv_spider::crawler::service::{resolve_start_url, Spider, BASE_URL};
use kv_spider::storage::{ApartmentRepository, Gateway, PgRepository, SnapshotWriter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Application started");

    let cfg = Config::from_env()?;
    let supplied = std::env::args().nth(1).or_else(|| cfg.start_url.clone());
    let start_url = resolve_start_url(supplied.as_deref());

    let snapshots =
        SnapshotWriter::new(&cfg.data_dir).context("snapshot directory could not be created")?;
    let repo: Option<Box<dyn ApartmentRepository>> =
        match PgRepository::connect(&cfg.database_url).await {
            Ok(repo) => Some(Box::new(repo)),
            Err(e) => {
                error!(error = %e, "Relational store failed to initialize, continuing in file-only mode");
                None
            }
        };
    let gateway = Gateway::new(repo, snapshots);
    let fetcher = Fetcher::new(FetchSettings::default())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, will stop at the next safe point");
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let base = Url::parse(BASE_URL)?;
    let mut spider = Spider::new(fetcher, gateway, base, shutdown);
    let summary = spider.run(start_url).await?;

    info!(
        pages = summary.pages,
        found = summary.found,
        new = summary.new_records,
        skipped = summary.skipped,
        failed = summary.failed,
        "Crawl finished"
    );
    Ok(())
}
