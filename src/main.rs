//! ojsharvest - Open Journal Systems archive harvester
//!
//! Crawls every issue of a journal archive concurrently, normalizes the
//! article metadata, fetches abstracts through a headless browser and writes
//! the records as CSV and JSON.
//!
//! ## Usage
//!
//! ```bash
//! ojsharvest harvest --output ./output
//! ojsharvest harvest --from 100 --to 105 --no-abstracts
//! ojsharvest discover
//! ojsharvest schema > schema.json
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use ojsharvest::abstracts::ChromiumRenderer;
use ojsharvest::config::HarvestConfig;
use ojsharvest::pipeline::{self, Harvester, RangeRequest};
use ojsharvest::schema::SelectorSchema;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Open Journal Systems archive harvester
#[derive(Parser)]
#[command(name = "ojsharvest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl an issue range and write the normalized records
    Harvest {
        /// First issue id (default: 1)
        #[arg(long)]
        from: Option<u32>,

        /// Last issue id (default: latest issue on the archive page)
        #[arg(long)]
        to: Option<u32>,

        /// Output directory; each run writes into a timestamped subfolder
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Skip the headless-browser abstract stage
        #[arg(long)]
        no_abstracts: bool,

        /// Config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Selector schema file (JSON)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Print the latest issue id from the archive page
    Discover {
        /// Config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Selector schema file (JSON)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Print the built-in selector schema, or validate a schema file
    Schema {
        /// Schema file to validate
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Harvest {
            from,
            to,
            output,
            no_abstracts,
            config,
            schema,
        } => {
            run_harvest(
                RangeRequest { from, to },
                output,
                no_abstracts,
                config.as_deref(),
                schema.as_deref(),
            )
            .await
        }
        Commands::Discover { config, schema } => {
            run_discover(config.as_deref(), schema.as_deref()).await
        }
        Commands::Schema { check } => handle_schema(check.as_deref()),
    }
}

// ============================================================================
// Harvest
// ============================================================================

fn build_harvester(config: Option<&Path>, schema: Option<&Path>) -> Result<Harvester> {
    let config = HarvestConfig::load(config).context("Failed to load configuration")?;
    let schema = SelectorSchema::load(schema).context("Invalid selector schema")?;
    Harvester::new(config, schema).context("Failed to initialize harvester")
}

async fn run_harvest(
    range: RangeRequest,
    output_dir: PathBuf,
    no_abstracts: bool,
    config: Option<&Path>,
    schema: Option<&Path>,
) -> Result<()> {
    let start_time = std::time::Instant::now();
    let harvester = build_harvester(config, schema)?;

    let mut output = harvester
        .run(range)
        .await
        .context("Issue discovery failed, no crawl range available")?;

    if no_abstracts {
        info!("Abstract stage skipped");
    } else {
        match ChromiumRenderer::launch(harvester.config().browser_executable.as_deref()).await {
            Ok(renderer) => {
                harvester.fetch_abstracts(&mut output, &renderer).await;
                renderer.shutdown().await;
            }
            Err(e) => {
                warn!(error = %e, "Headless browser unavailable; abstracts left empty");
            }
        }
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let output_folder = output_dir.join(timestamp);
    let written =
        pipeline::write_output(&output_folder, &output).context("Failed to write output")?;

    println!("Harvested {} articles", output.records.len());
    if !output.report.failed_issues.is_empty() {
        println!("Failed issues:");
        for failed in &output.report.failed_issues {
            println!("  {}: {}", failed.issue_id, failed.error);
        }
    }
    for path in &written {
        println!("Saved: {}", path.display());
    }

    let elapsed = start_time.elapsed();
    info!(
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn run_discover(config: Option<&Path>, schema: Option<&Path>) -> Result<()> {
    let harvester = build_harvester(config, schema)?;
    let latest = harvester
        .discover()
        .await
        .context("Failed to read the archive page")?;
    println!("{}", latest);
    Ok(())
}

// ============================================================================
// Schema
// ============================================================================

fn handle_schema(check: Option<&Path>) -> Result<()> {
    match check {
        Some(path) => {
            SelectorSchema::from_file(path)
                .and_then(|schema| schema.compile())
                .with_context(|| format!("Schema {} is invalid", path.display()))?;
            println!("Schema {} is valid", path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&SelectorSchema::default())
                .context("Failed to serialize schema")?;
            println!("{}", json);
        }
    }
    Ok(())
}
