//! `deckflow` command line: batch upload and single-deck analysis.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use deckflow_lib::config::{self, AppConfig};
use deckflow_lib::models::{CallerContext, Snapshot, SourceDocument};
use deckflow_lib::pipeline::analysis::{
    AnalysisPipeline, DocumentRasterizer, HttpAnalyzer, PdfiumRasterizer, StageEvent,
};
use deckflow_lib::pipeline::cancel::CancelSignal;
use deckflow_lib::pipeline::intake::{load_document, load_documents, Validator};
use deckflow_lib::pipeline::transfer::{Batch, BatchOutcome, BatchTransfer, TransferEvent};
use deckflow_lib::storage::{hand_off, LocalStorageSink, SqliteStore};

#[derive(Parser)]
#[command(name = "deckflow")]
#[command(about = "Pitch deck intake and analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/Deckflow/deckflow.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Emit events and results as JSON lines on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and transfer a batch of files
    Upload {
        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Submitting user
        #[arg(long)]
        caller: String,

        #[arg(long)]
        referral: Option<String>,

        /// Files in flight at once (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Run one pitch document through the analysis pipeline
    Analyze {
        file: PathBuf,

        #[arg(long)]
        caller: String,

        #[arg(long)]
        referral: Option<String>,

        /// Hand the snapshot to the deal store
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    deckflow_lib::init_tracing();
    info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let app_config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut signal = CancelSignal::new();
    if let Some(secs) = cli.timeout_secs {
        signal = signal.with_timeout(Duration::from_secs(secs));
    }
    let token = signal.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    match cli.command {
        Commands::Upload {
            files,
            caller,
            referral,
            concurrency,
        } => {
            let caller = caller_context(caller, referral);
            let concurrency = concurrency.unwrap_or(app_config.transfer_concurrency);
            upload(&files, &caller, &app_config, concurrency, &signal, cli.json).await
        }
        Commands::Analyze {
            file,
            caller,
            referral,
            save,
        } => {
            let caller = caller_context(caller, referral);
            analyze(&file, &caller, &app_config, save, &signal, cli.json).await
        }
    }
}

fn caller_context(caller: String, referral: Option<String>) -> CallerContext {
    let context = CallerContext::new(caller);
    match referral {
        Some(code) => context.with_referral(code),
        None => context,
    }
}

async fn upload(
    files: &[PathBuf],
    caller: &CallerContext,
    app_config: &AppConfig,
    concurrency: usize,
    signal: &CancelSignal,
    json: bool,
) -> Result<()> {
    let (documents, unreadable) = load_documents(files.iter().map(PathBuf::as_path));

    let mut batch = Batch::new(app_config.batch_policy);
    let report = batch.submit_all(documents);
    for rejection in unreadable.iter().chain(&report.rejected) {
        if json {
            print_json(&serde_json::json!({ "type": "Rejected", "rejection": rejection }))?;
        } else {
            eprintln!("rejected  {rejection}");
        }
    }
    if batch.is_empty() {
        bail!("No files accepted for upload");
    }

    let sink = LocalStorageSink::new(config::storage_root());
    let store = SqliteStore::open(&config::database_path()).context("Failed to open database")?;
    let transfer =
        BatchTransfer::new(Arc::new(sink), Arc::new(store)).with_concurrency(concurrency);

    let observer = move |event: TransferEvent| print_transfer_event(json, &event);
    let outcome = transfer.run(batch, caller, signal, Some(&observer)).await;

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }
    if outcome.failed_count() > 0 {
        bail!(
            "{} of {} files failed to transfer",
            outcome.failed_count(),
            outcome.total_count()
        );
    }
    Ok(())
}

async fn analyze(
    path: &Path,
    caller: &CallerContext,
    app_config: &AppConfig,
    save: bool,
    signal: &CancelSignal,
    json: bool,
) -> Result<()> {
    let document: SourceDocument = load_document(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    Validator::new(app_config.single_document_policy)
        .validate_single(&document)
        .with_context(|| format!("{} was rejected", document.name()))?;

    let analyzer = HttpAnalyzer::new(&app_config.analyzer_url, app_config.analyzer_timeout_secs)?;
    let rasterizer = DocumentRasterizer::new(Box::new(PdfiumRasterizer::new()));
    let pipeline = AnalysisPipeline::new(
        Arc::new(rasterizer),
        Arc::new(analyzer),
        app_config.conversion,
    );

    let observer = move |event: StageEvent| print_stage_event(json, &event);
    let snapshot = pipeline
        .analyze(&document, caller, signal, Some(&observer))
        .await?;

    if json {
        print_json(&serde_json::json!({ "type": "Snapshot", "snapshot": &snapshot }))?;
    } else {
        print_snapshot(&snapshot);
    }

    if save {
        let store =
            SqliteStore::open(&config::database_path()).context("Failed to open database")?;
        let deal_id = hand_off(&store, &snapshot, caller).await?;
        if json {
            print_json(&serde_json::json!({ "type": "Saved", "dealId": deal_id }))?;
        } else {
            println!("saved as deal {deal_id}");
        }
    }
    Ok(())
}

// ── Output ──

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_transfer_event(json: bool, event: &TransferEvent) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    match event {
        TransferEvent::Started { total, .. } => eprintln!("uploading {total} file(s)"),
        TransferEvent::Item { item } => match &item.error {
            Some(error) => eprintln!("{:<12} {} ({error})", item.status.as_str(), item.name),
            None => eprintln!("{:<12} {}", item.status.as_str(), item.name),
        },
        TransferEvent::Progress { percent, .. } => eprintln!("progress     {percent}%"),
        TransferEvent::Completed { .. } => {}
    }
}

fn print_stage_event(json: bool, event: &StageEvent) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    eprintln!("{} ({}) {}", event.stage, event.label(), event.state);
}

fn print_outcome(outcome: &BatchOutcome) {
    println!(
        "batch {}: {} stored, {} failed",
        outcome.batch_id,
        outcome.completed_count(),
        outcome.failed_count()
    );
    for item in &outcome.items {
        println!("  {:<10} {}", item.status.as_str(), item.storage_path);
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("{} ({}/100)", snapshot.company_name, snapshot.deal_quality.score);
    if !snapshot.tagline.is_empty() {
        println!("{}", snapshot.tagline);
    }
    println!("revenue: {}", snapshot.tags.revenue.label());
    for paragraph in snapshot.debrief_paragraphs() {
        println!("\n{paragraph}");
    }
    for strength in &snapshot.key_strengths {
        println!("+ {strength}");
    }
    for risk in &snapshot.key_risks {
        println!("- {risk}");
    }
}
