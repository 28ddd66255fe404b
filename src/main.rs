//! # Image Optimizer - Main Entry Point
//!
//! Punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento del file di configurazione e override da CLI
//! - Avvio dell'optimizer e inoltro di Ctrl-C / SIGTERM come segnale di stop
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (directory, quality, max width, workers, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica la config utente e applica gli argomenti sopra
//! 4. Istanzia MediaOptimizer e avvia la conversione
//! 5. Exit code non zero se ci sono fallimenti
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-optimizer ~/Pictures/export --max-width 1600 --quality 75 --workers 8
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::broadcast;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use image_optimizer::{json_output::JsonMessage, Config, MediaOptimizer, TerminalBell};

#[derive(Parser)]
#[command(name = "image-optimizer", version)]
#[command(about = "Convert PNG, JPEG and TIFF images to WebP, mirroring the directory tree")]
struct Args {
    /// Directory containing images to convert
    source: PathBuf,

    /// Output directory (default: "<source>_webp" next to the source)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// WebP quality (0-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Maximum output width in pixels, 0 keeps the original size
    #[arg(short = 'w', long)]
    max_width: Option<u32>,

    /// Number of parallel workers (default: all cores)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Decode memory ceiling per worker in MiB, 0 disables it
    #[arg(long)]
    memory_limit_mb: Option<u64>,

    /// Only print the final summary
    #[arg(long)]
    quiet: bool,

    /// Skip files whose WebP output already exists
    #[arg(long)]
    skip_existing: bool,

    /// Do not ring the terminal bell when done
    #[arg(long)]
    no_sound: bool,

    /// Output progress and results as JSON
    #[arg(long)]
    json: bool,

    /// Show a progress spinner
    #[arg(long)]
    progress: bool,

    /// Configuration file (default: <config dir>/image-optimizer/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if args.json {
        // stdout resta riservato agli eventi JSON
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => return Ok(report_fatal(args.json, &e)),
    };

    let bell = config.notify.then(|| TerminalBell::for_config(&config));
    let optimizer = match MediaOptimizer::new(config) {
        Ok(optimizer) => optimizer,
        Err(e) => return Ok(report_fatal(args.json, &anyhow::Error::from(e))),
    };
    let optimizer = match bell {
        Some(bell) => optimizer.with_notifier(Box::new(bell)),
        None => optimizer,
    };

    let (stop_tx, stop_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupted, finishing files in progress...");
        let _ = stop_tx.send(());
    });

    let summary = match optimizer.run_with_cancellation(stop_rx).await {
        Ok(summary) => summary,
        Err(e) => return Ok(report_fatal(args.json, &anyhow::Error::from(e))),
    };

    if summary.is_success() && !summary.cancelled {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Si completa al primo Ctrl-C o SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Config utente (se presente) con gli argomenti CLI applicati sopra
async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            Config::from_file(path).await?
        }
        None => match Config::default_path() {
            Some(path) => Config::from_file(&path).await?,
            None => Config::default(),
        },
    };

    config.source_root = args.source.clone();
    config.output_root = match &args.output {
        Some(output) => output.clone(),
        None => default_output_root(&args.source)?,
    };
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(max_width) = args.max_width {
        config.max_width = max_width;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(limit) = args.memory_limit_mb {
        config.memory_limit_mb = limit;
    }
    config.quiet |= args.quiet;
    config.skip_existing |= args.skip_existing;
    config.json_output |= args.json;
    config.show_progress |= args.progress;
    if args.no_sound {
        config.notify = false;
    }

    Ok(config)
}

/// `<source>_webp` accanto alla directory sorgente
fn default_output_root(source: &Path) -> Result<PathBuf> {
    let source = source
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Media directory does not exist: {} ({})", source.display(), e))?;
    let name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Cannot derive an output directory from {}", source.display()))?;

    let mut output_name = name.to_os_string();
    output_name.push("_webp");
    Ok(source.with_file_name(output_name))
}

fn report_fatal(json: bool, e: &anyhow::Error) -> ExitCode {
    if json {
        JsonMessage::error(e.to_string(), e.chain().nth(1).map(|cause| cause.to_string())).emit();
    }
    error!("{}", e);
    ExitCode::FAILURE
}
