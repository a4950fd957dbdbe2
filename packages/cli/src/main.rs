#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the NPI harvesting pipeline.
//!
//! Acquires the day's identifier list (local file or public S3 bucket),
//! resolves every identifier against the lookup API, and writes flattened
//! records to per-state CSV partition files under `npi-data/`.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use npi_harvest_engine::EngineConfig;
use npi_harvest_resolve::{HttpResolver, ResolveConfig};
use npi_harvest_writer::PartitionWriter;

#[derive(Parser)]
#[command(name = "npi_harvest_cli", about = "NPI data harvesting tool")]
struct Cli {
    /// Lookup API URL; the identifier is sent as the `npi` query parameter
    #[arg(long)]
    api_url: String,

    /// Identifier list file name. The local copy is prefixed with the run
    /// date (e.g., `29-08-2026-npi_list.txt`)
    #[arg(long, default_value = "npi_list.txt")]
    list_file: String,

    /// Base directory for the dated list file and the `npi-data/` output
    /// directory
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Public S3 bucket to download the identifier list from when no
    /// local dated copy exists
    #[arg(long)]
    bucket: Option<String>,

    /// Object key of the list in the bucket (defaults to the list file
    /// name)
    #[arg(long)]
    list_key: Option<String>,

    /// AWS region of the bucket
    #[arg(long, default_value = "us-east-2")]
    region: String,

    /// Maximum number of concurrent lookups
    #[arg(long, default_value = "200")]
    workers: usize,

    /// Maximum lookup attempts per identifier
    #[arg(long, default_value = "10")]
    retries: u32,

    /// Backoff base in seconds (wait grows as base^attempt)
    #[arg(long, default_value = "3")]
    backoff_base: u64,

    /// Cap on a single backoff wait, in seconds
    #[arg(long, default_value = "15")]
    backoff_cap: u64,

    /// Keep re-dispatching until every identifier has been processed,
    /// instead of stopping after one pass
    #[arg(long)]
    loop_until_done: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let date = chrono::Local::now().format("%d-%m-%Y").to_string();
    let list_path = cli.base_dir.join(format!("{date}-{}", cli.list_file));

    let identifiers = if let Some(ref bucket) = cli.bucket {
        let key = cli.list_key.as_deref().unwrap_or(&cli.list_file);
        npi_harvest_s3::load_identifiers(&list_path, bucket, key, &cli.region).await?
    } else {
        let text = std::fs::read_to_string(&list_path).map_err(|e| {
            format!(
                "Cannot read {} and no --bucket was given: {e}",
                list_path.display()
            )
        })?;
        npi_harvest_s3::parse_identifier_list(&text)
    };

    log::info!("# of NPI numbers: {} for {date}", identifiers.len());

    let data_dir = cli.base_dir.join("npi-data");
    let writer = PartitionWriter::new(&data_dir, &format!("npi_data_{date}"))?;

    let resolver = HttpResolver::new(
        ResolveConfig::new(&cli.api_url)
            .with_retries(cli.retries)
            .with_backoff_base_secs(cli.backoff_base)
            .with_backoff_cap_secs(cli.backoff_cap),
    )?;

    let config = EngineConfig::new()
        .with_workers(cli.workers)
        .with_loop_until_done(cli.loop_until_done);

    let start = Instant::now();
    let stats = npi_harvest_engine::run(&resolver, &writer, &config, identifiers).await;
    let elapsed = start.elapsed();

    log::info!("Finished saving data for {date}");
    log::info!("Run complete: {stats}, took {:.1}s", elapsed.as_secs_f64());

    // Unresolved identifiers are recorded in the failed partition; they
    // do not fail the process.
    Ok(())
}
