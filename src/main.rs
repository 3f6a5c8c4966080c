use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use collegelinks::config::Config;
use collegelinks::constants;
use collegelinks::logging;
use collegelinks::pipeline::storage::{JsonSnapshotStore, ResultStore};
use collegelinks::pipeline::tasks::{self, RunParams};

#[derive(Parser)]
#[command(name = "collegelinks")]
#[command(about = "Batch geocoding pipeline for Indian educational institutions")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a CSV of institutions, geocode them, and export artifacts
    Run {
        /// Input CSV file with institution records
        #[arg(long)]
        input: PathBuf,
        /// Directory for exports, the result snapshot, and the cache
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Geocoding provider (nominatim, google); overrides the config
        #[arg(long)]
        provider: Option<String>,
        /// Re-geocode records that already have a settled result
        #[arg(long)]
        force_refresh: bool,
    },
    /// Re-export CSV/GeoJSON artifacts from the stored results
    Export {
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Print status and confidence-band counts for the stored results
    Stats {
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}

fn open_store(output_dir: &std::path::Path) -> Result<Arc<dyn ResultStore>, Box<dyn std::error::Error>> {
    let path = output_dir.join(constants::RESULTS_SNAPSHOT_FILE);
    Ok(Arc::new(JsonSnapshotStore::open(&path)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging and pick up provider API keys from .env
    logging::init_logging();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            input,
            output_dir,
            provider,
            force_refresh,
        } => {
            println!("🔄 Running geocoding pipeline...");
            std::fs::create_dir_all(&output_dir)?;
            let store = open_store(&output_dir)?;
            let params = RunParams {
                input,
                output_dir: output_dir.clone(),
                provider,
                force_refresh,
            };
            match tasks::run_pipeline(&config, params, store).await {
                Ok(summary) => {
                    println!("\n📊 Pipeline Results:");
                    println!("   Total rows:        {}", summary.total_rows);
                    println!("   Invalid (skipped): {}", summary.skipped_invalid);
                    println!("   Duplicates:        {}", summary.duplicates_removed);
                    println!("   Settled (skipped): {}", summary.skipped_settled);
                    println!("   Cache hits:        {}", summary.cache_hits);
                    println!("   External lookups:  {}", summary.external_lookups);
                    println!("   ✅ Success:        {}", summary.success);
                    println!("   ⚠️  Low confidence: {}", summary.low_confidence);
                    println!("   ❌ Failed:         {}", summary.failed);
                    println!(
                        "\n   Exports written to {}/",
                        output_dir.display()
                    );
                }
                Err(e) => {
                    error!("Pipeline run failed: {}", e);
                    println!("❌ Pipeline run failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Export { output_dir } => {
            println!("📦 Exporting stored results...");
            let store = open_store(&output_dir)?;
            match tasks::export_only(&config, &output_dir, store).await {
                Ok(count) => {
                    println!("✅ Exported {} institutions to {}/", count, output_dir.display());
                }
                Err(e) => {
                    error!("Export failed: {}", e);
                    println!("❌ Export failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Stats { output_dir } => {
            let store = open_store(&output_dir)?;
            let stats = tasks::dataset_stats(&config, store).await?;
            println!("📊 Dataset statistics:");
            println!("   Total:          {}", stats.total);
            println!("   Success:        {}", stats.success);
            println!("   Low confidence: {}", stats.low_confidence);
            println!("   Failed:         {}", stats.failed);
            println!("   Not attempted:  {}", stats.not_attempted);
            println!("   Bands: high {} / medium {} / low {}", stats.high_band, stats.medium_band, stats.low_band);
        }
    }

    Ok(())
}
