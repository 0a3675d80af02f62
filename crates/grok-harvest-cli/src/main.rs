mod commands;
mod logging;
mod progress;
mod retriever;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use grok_harvest_core::debounce::debouncer;
use grok_harvest_core::observation::{self, ApiCreatedPost, ApiPostList, ScannedMedia};
use grok_harvest_core::storage::{KvStore, RocksKv};
use grok_harvest_core::{AppConfig, ContextKind, HarvestEngine, RunOutcome};
use progress::CliReporter;
use retriever::HttpRetriever;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScanDocument {
    images: Vec<ScannedMedia>,
    videos: Vec<ScannedMedia>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match grok_harvest_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    let command = match args.command {
        Some(command) => command,
        None => {
            let _ = Cli::command().print_long_help();
            return Ok(());
        }
    };

    if let Commands::PrintConfig = command {
        println!("Configuration: {:?}", config);
        return Ok(());
    }

    let kv: Arc<dyn KvStore> = Arc::new(
        RocksKv::open(&config.store_path)
            .with_context(|| format!("opening store at {}", config.store_path))?,
    );
    let mut engine = HarvestEngine::new(&config, kv, &args.path);

    if let Err(err) = dispatch(command, &mut engine, &config).await {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

async fn dispatch(command: Commands, engine: &mut HarvestEngine, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Ingest { files, api } => run_ingest(engine, &files, api)?,
        Commands::Scan { file } => {
            let document: ScanDocument = read_json(&file)?;
            if engine.context().kind() == ContextKind::Ephemeral {
                let added = engine.ingest_session_scan(&document.images);
                info!(
                    "Session scan: {} new, session holds {}",
                    format!("{}", added).green(),
                    engine.session().len(),
                );
            } else {
                let report = engine.ingest_scan(&document.images, &document.videos);
                info!(
                    "Scan merged: {} new, {} skipped",
                    format!("{}", report.inserted).green(),
                    format!("{}", report.skipped).yellow(),
                );
            }
        }
        Commands::Session {
            files,
            run,
            export_dir,
        } => run_session(engine, config, &files, run, &export_dir).await?,
        Commands::Follow => run_follow(engine, config).await?,
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats_for_context())?);
        }
        Commands::Backlog => {
            let backlog = engine.compute_backlog();
            for asset in &backlog {
                println!("{}  {}", asset.id.cyan(), asset.filename);
            }
            info!("{} outstanding", format!("{}", backlog.len()).yellow());
        }
        Commands::Run => run_retrieval(engine, config).await?,
        Commands::Group { id } => {
            let retriever = HttpRetriever::new(&config.output_dir, config.request_timeout())?;
            let result = engine.retrieve_group(&id, &retriever).await;
            info!(
                "Group {}: {} retrieved, {} failed",
                id,
                format!("{}", result.succeeded).green(),
                format!("{}", result.failed).red(),
            );
        }
        Commands::Dedupe => {
            let removed = engine.dedupe();
            info!("Removed {} duplicates", format!("{}", removed).red());
        }
        Commands::ResetStore => {
            if prompt_confirm(
                &format!("Clear all stored media for {}?", engine.context().key()),
                Some(false),
            )? {
                engine.reset_store();
                println!("Media store cleared");
            }
        }
        Commands::ResetHistory => {
            if prompt_confirm(
                "Are you SURE you want to forget every retrieved asset?",
                Some(false),
            )? {
                engine.reset_history();
                println!("Retrieval history cleared");
            }
        }
        Commands::PrintConfig => println!("Configuration: {:?}", config),
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn run_ingest(engine: &mut HarvestEngine, files: &[PathBuf], api: bool) -> Result<()> {
    for file in files {
        let report = if api {
            let response: ApiPostList = read_json(file)?;
            engine.ingest_api_response(&response)
        } else {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            engine.ingest(observation::parse_batch(&raw)?)
        };
        info!(
            "{}: {} subjects, {} new items, {} skipped",
            file.display(),
            report.subjects,
            format!("{}", report.inserted).green(),
            format!("{}", report.skipped).yellow(),
        );
    }
    Ok(())
}

async fn run_session(
    engine: &mut HarvestEngine,
    config: &AppConfig,
    files: &[PathBuf],
    run: bool,
    export_dir: &Path,
) -> Result<()> {
    for file in files {
        let created: ApiCreatedPost = read_json(file)?;
        match created.post {
            Some(post) if engine.ingest_created_post(&post) => {}
            _ => warn!("{}: no new post tracked", file.display()),
        }
    }
    info!("Session holds {} posts", engine.session().len());

    if run {
        run_retrieval(engine, config).await?;
    }

    let export = engine.export_session();
    let target = export_dir.join(export.file_name());
    std::fs::create_dir_all(export_dir)?;
    std::fs::write(&target, serde_json::to_string_pretty(&export)?)?;
    info!("Session exported to {}", target.display());
    Ok(())
}

async fn run_retrieval(engine: &mut HarvestEngine, config: &AppConfig) -> Result<()> {
    let retriever = HttpRetriever::new(&config.output_dir, config.request_timeout())?;
    let reporter = CliReporter::new();

    let control = engine.run_control();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            control.cancel();
        }
    });

    let outcome = engine.start_run(&retriever, &reporter).await;
    watcher.abort();

    let summary = outcome.summary();
    match outcome {
        RunOutcome::Completed { failed: 0, .. } | RunOutcome::Rejected(_) => {
            println!("{}", summary.green())
        }
        RunOutcome::Completed { .. } => println!("{}", summary.red()),
        RunOutcome::Cancelled { .. } => println!("{}", summary.yellow()),
    }
    Ok(())
}

/// Treat each stdin line as a post listing response and report once per quiet period.
async fn run_follow(engine: &mut HarvestEngine, config: &AppConfig) -> Result<()> {
    let (trigger, mut bursts) = debouncer(config.debounce_window());
    let pending: Arc<Mutex<Vec<ApiPostList>>> = Arc::new(Mutex::new(Vec::new()));

    let queue = pending.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ApiPostList>(&line) {
                Ok(response) => {
                    queue.lock().unwrap().push(response);
                    trigger.trigger();
                }
                Err(e) => warn!("Ignoring unreadable line: {}", e),
            }
        }
    });

    while let Some(merged) = bursts.next_burst().await {
        let responses: Vec<ApiPostList> = std::mem::take(&mut *pending.lock().unwrap());
        for response in &responses {
            engine.ingest_api_response(response);
        }
        let stats = engine.stats_for_context();
        info!(
            "{} responses merged, {} groups, {} outstanding",
            merged,
            stats.store.entries,
            format!("{}", stats.backlog).yellow(),
        );
    }

    reader.await?;
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
