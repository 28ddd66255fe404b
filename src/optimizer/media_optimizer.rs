//! # Media Optimizer Main Orchestrator
//!
//! Orchestratore principale che collega scanner, worker pool e aggregatore.
//!
//! ## Flusso di esecuzione:
//! 1. **Inizializzazione**: valida config, risolve le root, rifiuta root annidate
//! 2. **Discovery**: lo scanner (thread bloccante dedicato) produce `Task` in una
//!    coda limitata
//! 3. **Dispatch**: un semaforo con `workers` permessi limita le conversioni
//!    concorrenti; ogni task gira su un thread bloccante di tokio
//! 4. **Aggregazione**: il `ProgressTracker` consuma il canale dei risultati
//! 5. **Report**: summary finale e notifica di completamento
//!
//! ## Gestione concorrenza:
//! - Coda task limitata (`workers * 2`): lo scanner non corre troppo avanti
//! - Un panic in un worker diventa un risultato Failed per quel solo task
//! - Canale risultati: i worker non condividono contatori
//! - Segnale di stop: nessun nuovo dispatch, i task in coda diventano Skipped,
//!   quelli in corso terminano normalmente
//!
//! ## Esempio:
//! ```rust,ignore
//! let optimizer = MediaOptimizer::new(config)?;
//! let summary = optimizer.run().await?;
//! ```

use crate::{
    config::Config,
    error::{ErrorKind, OptimizeError},
    file_manager::{FileManager, ScanEntry},
    image_processor::{ImageCodec, ImageProcessor},
    json_output::JsonMessage,
    notifier::CompletionNotifier,
    optimizer::{
        path_resolver::PathResolver,
        progress_tracker::{ProgressTracker, Reporting},
        task_optimizer::TaskOptimizer,
    },
    progress::RunSummary,
    task::{Task, TaskResult},
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::{self, error::SendError, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

const CANCELLED: &str = "cancelled before dispatch";
const ABORTED: &str = "run aborted before dispatch";

/// Orchestratore principale
pub struct MediaOptimizer {
    config: Config,
    resolver: Arc<PathResolver>,
    codec: Arc<dyn ImageCodec>,
    notifier: Option<Box<dyn CompletionNotifier>>,
}

impl MediaOptimizer {
    /// Crea nuova istanza dell'ottimizzatore.
    ///
    /// Fallisce con `OptimizeError::Config` prima di qualsiasi conversione se la
    /// configurazione è invalida o se sorgente e output sono annidati.
    pub fn new(config: Config) -> Result<Self, OptimizeError> {
        config.validate()?;

        let output_root = PathResolver::unique_output_root(&config.output_root);
        if output_root != config.output_root {
            warn!(
                "{} exists as a file, writing to {} instead",
                config.output_root.display(),
                output_root.display()
            );
        }
        let resolver = PathResolver::new(&config.source_root, &output_root)?;
        let codec = Arc::new(ImageProcessor::new(config.decode_limit_bytes()));

        Ok(Self {
            config,
            resolver: Arc::new(resolver),
            codec,
            notifier: None,
        })
    }

    /// Sostituisce il codec di default
    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Imposta chi riceve il segnale di fine run
    pub fn with_notifier(mut self, notifier: Box<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output root effettiva (assoluta)
    pub fn output_root(&self) -> &Path {
        self.resolver.output_root()
    }

    /// Esegue il processo di conversione
    pub async fn run(&self) -> Result<RunSummary, OptimizeError> {
        self.execute(None).await
    }

    /// Come `run`, ma interrompe il dispatch alla ricezione di un segnale di stop
    pub async fn run_with_cancellation(
        &self,
        stop_receiver: broadcast::Receiver<()>,
    ) -> Result<RunSummary, OptimizeError> {
        self.execute(Some(stop_receiver)).await
    }

    async fn execute(
        &self,
        mut stop: Option<broadcast::Receiver<()>>,
    ) -> Result<RunSummary, OptimizeError> {
        let start_time = Instant::now();

        std::fs::create_dir_all(self.output_root()).map_err(|e| {
            OptimizeError::Config(format!(
                "Cannot create output directory {}: {}",
                self.output_root().display(),
                e
            ))
        })?;

        self.emit_start_message();

        let (task_tx, task_rx) = mpsc::channel::<Task>(self.config.workers.saturating_mul(2));
        let (result_tx, result_rx) = mpsc::unbounded_channel::<TaskResult>();

        let scanner = self.spawn_scanner(task_tx, result_tx.clone());
        let tracker = ProgressTracker::new(
            self.output_root().to_path_buf(),
            self.reporting(),
            self.config.show_progress,
        );

        let (outcome, mut summary) = tokio::join!(
            self.dispatch(task_rx, result_tx, scanner, &mut stop),
            tracker.consume(result_rx)
        );

        match outcome {
            Ok(cancelled) => summary.cancelled = cancelled,
            Err(e) => {
                error!("Run aborted: {}", e);
                summary.aborted = Some(e.to_string());
            }
        }
        summary.elapsed = start_time.elapsed();

        self.print_final_stats(&summary);

        if self.config.notify {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&summary);
            }
        }

        Ok(summary)
    }

    fn reporting(&self) -> Reporting {
        if self.config.json_output {
            Reporting::Json
        } else if self.config.quiet {
            Reporting::Quiet
        } else {
            Reporting::Log
        }
    }

    /// Scanner su thread bloccante: produce task nella coda limitata,
    /// i file non leggibili vanno direttamente nel canale dei risultati
    fn spawn_scanner(
        &self,
        tasks: mpsc::Sender<Task>,
        results: UnboundedSender<TaskResult>,
    ) -> JoinHandle<usize> {
        let resolver = Arc::clone(&self.resolver);

        tokio::task::spawn_blocking(move || {
            let mut claimed = HashSet::new();
            let mut discovered = 0usize;

            for entry in FileManager::scan(resolver.source_root()) {
                let id = discovered;
                discovered += 1;

                let source_path = match entry {
                    ScanEntry::File(path) => path,
                    ScanEntry::Unreadable { path, reason } => {
                        let relative = resolver.relative_path(&path).unwrap_or(path);
                        let _ = results.send(TaskResult::failed(id, relative, ErrorKind::Scan, reason));
                        continue;
                    }
                };

                let task = match Self::build_task(&resolver, id, &source_path, &mut claimed) {
                    Ok(task) => task,
                    Err(e) => {
                        let relative = resolver
                            .relative_path(&source_path)
                            .unwrap_or_else(|_| source_path.clone());
                        let _ = results.send(TaskResult::failed(id, relative, e.kind(), e.detail()));
                        continue;
                    }
                };

                if let Err(SendError(task)) = tasks.blocking_send(task) {
                    // Coda chiusa: il dispatch si è fermato
                    let _ = results.send(TaskResult::skipped(&task, 0, CANCELLED));
                    break;
                }
            }

            debug!("Scanner finished after {} files", discovered);
            discovered
        })
    }

    fn build_task(
        resolver: &PathResolver,
        id: usize,
        source_path: &Path,
        claimed: &mut HashSet<PathBuf>,
    ) -> Result<Task, OptimizeError> {
        let relative_path = resolver.relative_path(source_path)?;
        let mut output_path = resolver.resolve(source_path)?;

        if !claimed.insert(output_path.clone()) {
            let alternative = resolver.disambiguate(source_path)?;
            warn!(
                "{} collides with another source on {}, writing {} instead",
                relative_path.display(),
                output_path.display(),
                alternative.display()
            );
            if !claimed.insert(alternative.clone()) {
                return Err(OptimizeError::Write(format!(
                    "output path {} is already used by another source",
                    alternative.display()
                )));
            }
            output_path = alternative;
        }

        Ok(Task {
            id,
            source_path: source_path.to_path_buf(),
            relative_path,
            output_path,
        })
    }

    /// Distribuisce i task ai worker. Restituisce `true` se il run è stato cancellato.
    async fn dispatch(
        &self,
        mut tasks: mpsc::Receiver<Task>,
        results: UnboundedSender<TaskResult>,
        scanner: JoinHandle<usize>,
        stop: &mut Option<broadcast::Receiver<()>>,
    ) -> Result<bool, OptimizeError> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let task_optimizer = Arc::new(TaskOptimizer::new(
            &self.config,
            Arc::clone(&self.codec),
            Arc::clone(&self.resolver),
        ));
        let mut workers = JoinSet::new();
        let mut cancelled = false;
        let mut failure: Option<OptimizeError> = None;

        loop {
            let task = tokio::select! {
                biased;
                _ = stop_requested(stop) => {
                    cancelled = true;
                    break;
                }
                next = tasks.recv() => match next {
                    Some(task) => task,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = stop_requested(stop) => {
                    cancelled = true;
                    let _ = results.send(TaskResult::skipped(&task, 0, CANCELLED));
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };

            match permit {
                Ok(permit) => Self::spawn_worker(
                    &mut workers,
                    Arc::clone(&task_optimizer),
                    task,
                    permit,
                    results.clone(),
                ),
                Err(e) => {
                    let _ = results.send(TaskResult::skipped(&task, 0, ABORTED));
                    failure = Some(OptimizeError::Pool(format!("worker slots unavailable: {}", e)));
                    break;
                }
            }
        }

        if cancelled {
            info!("Stop requested: no new conversions will be started");
        }

        // Tutto ciò che resta in coda non raggiungerà mai un worker
        tasks.close();
        let reason = if failure.is_some() { ABORTED } else { CANCELLED };
        while let Some(task) = tasks.recv().await {
            let _ = results.send(TaskResult::skipped(&task, 0, reason));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker wrapper failed: {}", e);
            }
        }

        match scanner.await {
            Ok(discovered) => debug!("Dispatch finished, {} files discovered", discovered),
            Err(e) => {
                if failure.is_none() {
                    failure = Some(OptimizeError::Pool(format!("directory scanner failed: {}", e)));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(cancelled),
        }
    }

    /// Avvia la conversione di un task su un thread bloccante.
    /// Il permesso resta acquisito fino alla fine della conversione.
    fn spawn_worker(
        workers: &mut JoinSet<()>,
        task_optimizer: Arc<TaskOptimizer>,
        task: Task,
        permit: OwnedSemaphorePermit,
        results: UnboundedSender<TaskResult>,
    ) {
        workers.spawn(async move {
            let _permit = permit;
            let id = task.id;
            let relative_path = task.relative_path.clone();

            let result = match tokio::task::spawn_blocking(move || task_optimizer.transform(&task)).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Worker failed on {}: {}", relative_path.display(), e);
                    TaskResult::failed(id, relative_path, ErrorKind::Internal, format!("worker failed: {}", e))
                }
            };

            let _ = results.send(result);
        });
    }

    /// Invia messaggio di inizio
    fn emit_start_message(&self) {
        if self.config.json_output {
            JsonMessage::start(
                self.resolver.source_root().to_path_buf(),
                self.output_root().to_path_buf(),
                &self.config,
            )
            .emit();
            return;
        }

        info!("Starting image optimization in: {}", self.resolver.source_root().display());
        info!("Quality: {}", self.config.quality);
        if self.config.max_width > 0 {
            info!("Resize: max width {}px", self.config.max_width);
        } else {
            info!("Resize: Original");
        }
        info!("Workers: {}", self.config.workers);
        info!("Output: {}", self.output_root().display());
        if self.config.skip_existing {
            info!("Skip mode: Will skip files where output already exists");
        }
    }

    /// Stampa statistiche finali
    fn print_final_stats(&self, summary: &RunSummary) {
        if self.config.json_output {
            JsonMessage::complete(summary).emit();
            return;
        }

        if summary.total() == 0 && summary.aborted.is_none() {
            warn!("No images found.");
        }

        info!("=== Optimization Complete ===");
        info!("Converted: {}", summary.converted);
        info!("Skipped: {}", summary.skipped);
        info!("Failed: {}", summary.failed);
        info!(
            "Size: {} -> {} ({:.1}% saved)",
            FileManager::format_size(summary.bytes_in),
            FileManager::format_size(summary.bytes_out),
            summary.overall_reduction_percent()
        );
        info!("Elapsed: {:.2}s", summary.elapsed.as_secs_f64());
        info!("Path: {}", summary.output_root.display());

        for failure in &summary.failures {
            error!(
                "Failed: {} ({}: {})",
                failure.relative_path.display(),
                failure.kind,
                failure.message
            );
        }
        if summary.cancelled {
            warn!("Run cancelled before all files were dispatched");
        }
        if let Some(reason) = &summary.aborted {
            error!("Run aborted: {}", reason);
        }
    }
}

/// Si completa alla ricezione di un segnale di stop; mai se non c'è un receiver
/// o se il sender è stato chiuso
async fn stop_requested(stop: &mut Option<broadcast::Receiver<()>>) {
    match stop {
        Some(receiver) => match receiver.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        },
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use sha2::{Digest, Sha256};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_image(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_fn(width, height, |x, y| image::Rgb([(x * 7) as u8, (y * 3) as u8, 200]))
            .save(path)
            .unwrap();
    }

    fn dimensions(path: &Path) -> (u32, u32) {
        let img = image::open(path).unwrap();
        (img.width(), img.height())
    }

    fn hash_tree(root: &Path) -> BTreeMap<PathBuf, String> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let digest = Sha256::digest(std::fs::read(e.path()).unwrap());
                (e.path().strip_prefix(root).unwrap().to_path_buf(), hex::encode(digest))
            })
            .collect()
    }

    fn config(source: &Path, output: &Path, max_width: u32) -> Config {
        Config {
            max_width,
            quiet: true,
            workers: 2,
            ..Config::new(source, output)
        }
    }

    /// Delega al codec reale; va in panic sui file che iniziano con "PANIC"
    struct PanickingCodec(ImageProcessor);

    impl ImageCodec for PanickingCodec {
        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, OptimizeError> {
            if bytes.starts_with(b"PANIC") {
                panic!("decoder blew up");
            }
            self.0.decode(bytes)
        }

        fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
            self.0.resize(image, width, height)
        }

        fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
            self.0.encode(image, quality)
        }
    }

    /// Misura il numero massimo di decode concorrenti
    #[derive(Default)]
    struct CountingCodec {
        inner: ImageProcessor,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ImageCodec for CountingCodec {
        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, OptimizeError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            let result = self.inner.decode(bytes);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
            self.inner.resize(image, width, height)
        }

        fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
            self.inner.encode(image, quality)
        }
    }

    /// Invia lo stop durante il primo decode, poi lo completa lentamente
    struct StopDuringDecode {
        inner: ImageProcessor,
        stop: broadcast::Sender<()>,
        fired: AtomicBool,
    }

    impl ImageCodec for StopDuringDecode {
        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, OptimizeError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let _ = self.stop.send(());
                std::thread::sleep(Duration::from_millis(100));
            }
            self.inner.decode(bytes)
        }

        fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
            self.inner.resize(image, width, height)
        }

        fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
            self.inner.encode(image, quality)
        }
    }

    struct CountingNotifier(Arc<AtomicUsize>);

    impl CompletionNotifier for CountingNotifier {
        fn notify(&self, _summary: &RunSummary) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resizes_wide_and_keeps_small() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 600, 400);
        write_image(&source.join("b.jpg"), 80, 60);

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("webp"), 384)).unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.is_success());
        assert_eq!(dimensions(&optimizer.output_root().join("a.webp")), (384, 256));
        assert_eq!(dimensions(&optimizer.output_root().join("b.webp")), (80, 60));
        assert!(summary.bytes_in > 0 && summary.bytes_out > 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("good.png"), 40, 40);
        std::fs::write(source.join("broken.png"), b"garbage bytes, not a png").unwrap();

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].relative_path, PathBuf::from("broken.png"));
        assert_eq!(summary.failures[0].kind, ErrorKind::Decode);
        assert!(!optimizer.output_root().join("broken.webp").exists());
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_output_inside_source_fails_before_any_work() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 10, 10);
        let nested = source.join("optimized_webp");

        let result = MediaOptimizer::new(config(&source, &nested, 0));
        assert!(matches!(result, Err(OptimizeError::Config(_))));
        assert!(!nested.exists());
    }

    #[tokio::test]
    async fn test_invalid_quality_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        std::fs::create_dir_all(&source).unwrap();
        let cfg = Config {
            quality: 150,
            ..config(&source, &tmp.path().join("out"), 0)
        };
        assert!(matches!(MediaOptimizer::new(cfg), Err(OptimizeError::Config(_))));
    }

    #[tokio::test]
    async fn test_oversized_worker_count_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 8, 8);
        let cfg = Config {
            workers: usize::MAX / 2,
            ..config(&source, &tmp.path().join("out"), 0)
        };

        assert!(matches!(MediaOptimizer::new(cfg), Err(OptimizeError::Config(_))));
        assert!(!tmp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_zero_max_width_never_resizes() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("panorama.png"), 900, 50);
        write_image(&source.join("tall.tiff"), 30, 700);

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(dimensions(&optimizer.output_root().join("panorama.webp")), (900, 50));
        assert_eq!(dimensions(&optimizer.output_root().join("tall.webp")), (30, 700));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_every_file_yields_one_result_and_tree_is_mirrored() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        let mut expected = Vec::new();
        for dir in ["", "2021", "2021/summer", "2022/winter/raw"] {
            for name in ["one.png", "two.jpg", "three.tif"] {
                let relative = Path::new(dir).join(name);
                write_image(&source.join(&relative), 12, 9);
                expected.push(relative.with_extension("webp"));
            }
        }
        std::fs::write(source.join("2021/readme.txt"), b"ignored").unwrap();
        std::fs::write(source.join("2022/corrupt.jpeg"), b"nope").unwrap();
        let before = hash_tree(&source);

        let optimizer = MediaOptimizer::new(Config {
            workers: 3,
            ..config(&source, &tmp.path().join("out"), 8)
        })
        .unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.total(), expected.len() + 1);
        assert_eq!(summary.converted, expected.len());
        assert_eq!(summary.failed, 1);
        for relative in &expected {
            let output = optimizer.output_root().join(relative);
            assert!(output.is_file(), "missing {}", output.display());
            assert_eq!(dimensions(&output), (8, 6));
        }
        assert_eq!(hash_tree(&source), before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_is_scan_failure() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 8, 8);
        write_image(&source.join("sub/b.jpg"), 8, 8);
        std::os::unix::fs::symlink(source.join("missing.png"), source.join("sub/dangling.png")).unwrap();

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].kind, ErrorKind::Scan);
        assert_eq!(summary.failures[0].relative_path, PathBuf::from("sub/dangling.png"));
        assert!(optimizer.output_root().join("sub/b.webp").is_file());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_panic_is_isolated() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("fine.png"), 16, 16);
        write_image(&source.join("also_fine.jpg"), 16, 16);
        std::fs::write(source.join("boom.png"), b"PANIC please").unwrap();

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0))
            .unwrap()
            .with_codec(Arc::new(PanickingCodec(ImageProcessor::default())));
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].kind, ErrorKind::Internal);
        assert!(summary.aborted.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded_by_workers() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        for i in 0..12 {
            write_image(&source.join(format!("img_{:02}.png", i)), 8, 8);
        }

        let codec = Arc::new(CountingCodec::default());
        let optimizer = MediaOptimizer::new(Config {
            workers: 3,
            ..config(&source, &tmp.path().join("out"), 0)
        })
        .unwrap()
        .with_codec(codec.clone());
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 12);
        let peak = codec.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency {}", peak);
    }

    #[tokio::test]
    async fn test_cancelled_run_dispatches_nothing() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        for i in 0..6 {
            write_image(&source.join(format!("{}.png", i)), 8, 8);
        }

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let (stop_tx, stop_rx) = broadcast::channel(1);
        stop_tx.send(()).unwrap();

        let summary = optimizer.run_with_cancellation(stop_rx).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.converted, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total(), summary.skipped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_mid_run_lets_in_flight_finish() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        for i in 0..8 {
            write_image(&source.join(format!("{}.png", i)), 8, 8);
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let codec = Arc::new(StopDuringDecode {
            inner: ImageProcessor::default(),
            stop: stop_tx.clone(),
            fired: AtomicBool::new(false),
        });
        let optimizer = MediaOptimizer::new(Config {
            workers: 1,
            ..config(&source, &tmp.path().join("out"), 0)
        })
        .unwrap()
        .with_codec(codec);

        let summary = optimizer.run_with_cancellation(stop_rx).await.unwrap();

        assert!(summary.cancelled);
        // Il task in corso al momento dello stop termina normalmente
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed, 0);
        assert!(summary.skipped >= 1);
        assert_eq!(summary.total(), summary.converted + summary.skipped);
        assert!(summary.total() <= 8);
        assert!(optimizer.output_root().join("0.webp").is_file());
        let written = std::fs::read_dir(optimizer.output_root()).unwrap().count();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_unused_stop_channel_does_not_interfere() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 8, 8);

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
        drop(stop_tx);

        let summary = optimizer.run_with_cancellation(stop_rx).await.unwrap();
        assert!(!summary.cancelled);
        assert_eq!(summary.converted, 1);
    }

    #[tokio::test]
    async fn test_notifier_fires_once_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 8, 8);

        let calls = Arc::new(AtomicUsize::new(0));
        let optimizer = MediaOptimizer::new(Config {
            notify: true,
            ..config(&source, &tmp.path().join("out"), 0)
        })
        .unwrap()
        .with_notifier(Box::new(CountingNotifier(calls.clone())));
        optimizer.run().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let silent_calls = Arc::new(AtomicUsize::new(0));
        let silent = MediaOptimizer::new(Config {
            notify: false,
            ..config(&source, &tmp.path().join("out2"), 0)
        })
        .unwrap()
        .with_notifier(Box::new(CountingNotifier(silent_calls.clone())));
        silent.run().await.unwrap();
        assert_eq!(silent_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_runs_report_same_counts() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 20, 10);
        write_image(&source.join("x/b.jpg"), 10, 20);
        std::fs::write(source.join("x/c.png"), b"broken").unwrap();

        let first = MediaOptimizer::new(config(&source, &tmp.path().join("run1"), 0))
            .unwrap()
            .run()
            .await
            .unwrap();
        let second = MediaOptimizer::new(config(&source, &tmp.path().join("run2"), 0))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(
            (first.converted, first.skipped, first.failed),
            (second.converted, second.skipped, second.failed)
        );
    }

    #[tokio::test]
    async fn test_skip_existing_reports_skipped() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        let output = tmp.path().join("out");
        write_image(&source.join("a.png"), 8, 8);
        write_image(&source.join("b.png"), 8, 8);

        MediaOptimizer::new(config(&source, &output, 0)).unwrap().run().await.unwrap();
        std::fs::remove_file(output.join("b.webp")).unwrap();

        let summary = MediaOptimizer::new(Config {
            skip_existing: true,
            ..config(&source, &output, 0)
        })
        .unwrap()
        .run()
        .await
        .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.converted, 1);
    }

    #[tokio::test]
    async fn test_same_stem_sources_do_not_overwrite_each_other() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.jpg"), 8, 8);
        write_image(&source.join("a.png"), 16, 16);

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.converted, 2);
        // "a.jpg" viene prima in ordine di nome e prende "a.webp"
        assert_eq!(dimensions(&optimizer.output_root().join("a.webp")), (8, 8));
        assert_eq!(dimensions(&optimizer.output_root().join("a.png.webp")), (16, 16));
    }

    #[tokio::test]
    async fn test_empty_source_is_a_successful_run() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        std::fs::create_dir_all(&source).unwrap();

        let optimizer = MediaOptimizer::new(config(&source, &tmp.path().join("out"), 0)).unwrap();
        let summary = optimizer.run().await.unwrap();

        assert_eq!(summary.total(), 0);
        assert!(summary.is_success());
        assert!(optimizer.output_root().is_dir());
    }

    #[tokio::test]
    async fn test_output_root_taken_by_file_gets_suffix() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photos");
        write_image(&source.join("a.png"), 8, 8);
        let requested = tmp.path().join("optimized_webp");
        std::fs::write(&requested, b"a regular file").unwrap();

        let optimizer = MediaOptimizer::new(config(&source, &requested, 0)).unwrap();
        optimizer.run().await.unwrap();

        assert!(optimizer.output_root().ends_with("optimized_webp_1"));
        assert!(optimizer.output_root().join("a.webp").is_file());
        assert_eq!(std::fs::read(&requested).unwrap(), b"a regular file");
    }
}
