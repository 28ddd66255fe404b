//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di conversione.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - `RunSummary`: totali del run (per stato, byte in/out, tempo, fallimenti)
//! - Calcolo percentuali di riduzione e byte risparmiati
//!
//! ## Statistiche tracciate:
//! - **converted / skipped / failed**: conteggi per stato
//! - **bytes_in / bytes_out**: dimensioni originali e WebP dei file convertiti
//! - **failures**: path relativo, tipo di errore e dettaglio per ogni fallimento
//! - **aborted / cancelled**: run interrotto da errore del pool o da segnale di stop
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] 150 files [OK] photo.jpg: 1.20 MB -> 310.00 KB (74.2% saved)
//! ```

use crate::error::ErrorKind;
use crate::file_manager::FileManager;
use crate::task::{TaskResult, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Manages the interactive progress display
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a progress display; the scan is lazy so there is no known total
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")
        {
            bar.set_style(style);
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress display that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Print a line above the spinner so it is not overwritten
    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    /// Files counted so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One failed task in the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub relative_path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregated totals for an entire batch invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Original bytes of converted files
    pub bytes_in: u64,
    /// WebP bytes written
    pub bytes_out: u64,
    pub elapsed: Duration,
    pub output_root: PathBuf,
    pub failures: Vec<FailedTask>,
    /// Set when the worker pool failed and the run stopped early
    pub aborted: Option<String>,
    /// Set when a stop signal interrupted dispatching
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumula un risultato
    pub fn record(&mut self, result: &TaskResult) {
        match result.status {
            TaskStatus::Converted => {
                self.converted += 1;
                self.bytes_in += result.original_size;
                self.bytes_out += result.output_size.unwrap_or(0);
            }
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Failed => {
                self.failed += 1;
                let (kind, message) = match &result.error {
                    Some(error) => (error.kind, error.message.clone()),
                    None => (ErrorKind::Internal, "unknown failure".to_string()),
                };
                self.failures.push(FailedTask {
                    relative_path: result.relative_path.clone(),
                    kind,
                    message,
                });
            }
        }
    }

    /// Totale dei risultati registrati
    pub fn total(&self) -> usize {
        self.converted + self.skipped + self.failed
    }

    pub fn bytes_saved(&self) -> i64 {
        self.bytes_in as i64 - self.bytes_out as i64
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.bytes_in, self.bytes_out)
    }

    /// Il run è andato a buon fine: nessun fallimento e nessun abort
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.aborted.is_none()
    }

    pub fn format_summary(&self) -> String {
        let saved = self.bytes_saved();
        let saved_text = if saved >= 0 {
            FileManager::format_size(saved as u64)
        } else {
            format!("-{}", FileManager::format_size(saved.unsigned_abs()))
        };
        format!(
            "Processed: {} files | Converted: {} | Skipped: {} | Failed: {} | Total saved: {} ({:.1}%)",
            self.total(),
            self.converted,
            self.skipped,
            self.failed,
            saved_text,
            self.overall_reduction_percent()
        )
    }
}
