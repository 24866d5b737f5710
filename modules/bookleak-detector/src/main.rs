use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use bookleak_common::Config;
use bookleak_detector::{build_detector, BatchCoordinator};

#[derive(Parser)]
#[command(name = "bookleak", about = "Find where a book image has been posted and flag likely leaks")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Domain table TOML, replacing the built-in one
    #[arg(long, global = true, env = "BOOKLEAK_DOMAINS_FILE")]
    domains: Option<PathBuf>,

    /// Data directory for uploads, results and history
    #[arg(long, global = true, env = "BOOKLEAK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an image for analysis
    Upload { file: PathBuf },
    /// Search for an uploaded image and classify every match
    Analyze { image_id: Uuid },
    /// Analyse several uploads concurrently
    Batch {
        #[arg(required = true)]
        image_ids: Vec<Uuid>,
    },
    /// Latest result for an upload
    Results { image_id: Uuid },
    /// Past runs for an upload and the latest diff
    History { image_id: Uuid },
    /// Classify a single URL without an image search
    CheckUrl { url: String },
    /// List uploads, newest first
    Uploads,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = Config::from_env()?;
    if let Some(path) = cli.domains {
        config.domains_file = Some(path);
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let detector = build_detector(&config).await?;

    match cli.command {
        Command::Upload { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let record = detector.upload(bytes, &name).await?;
            print_json(&record)?;
        }
        Command::Analyze { image_id } => {
            let analysis = detector.analyze_image(image_id).await?;
            print_json(&analysis)?;
        }
        Command::Batch { image_ids } => {
            let batch = BatchCoordinator::new(Arc::new(detector), config.batch_concurrency);
            let job_id = batch.submit(image_ids);
            info!(%job_id, "Waiting for batch to finish");
            let status = batch
                .wait(job_id)
                .await
                .context("Batch job disappeared")?;
            print_json(&status)?;
        }
        Command::Results { image_id } => {
            print_json(&detector.results(image_id).await?)?;
        }
        Command::History { image_id } => {
            let (entries, latest_diff) = detector.image_history(image_id).await?;
            print_json(&serde_json::json!({
                "entries": entries,
                "latest_diff": latest_diff,
            }))?;
        }
        Command::CheckUrl { url } => {
            print_json(&detector.check_url(&url).await)?;
        }
        Command::Uploads => {
            for record in detector.uploads().await? {
                println!(
                    "{}  {:<10}  {:>3} urls  {}",
                    record.id,
                    format!("{:?}", record.analysis_status).to_lowercase(),
                    record.found_urls_count,
                    record.original_filename
                );
            }
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
