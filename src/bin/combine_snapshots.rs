use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use kv_spider::storage::snapshot::combine_snapshots;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));

    let (output, records) = combine_snapshots(&dir)?;
    println!("Combined {} records into {}", records, output.display());
    Ok(())
}
