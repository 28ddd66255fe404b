//! # Progress Tracking Module
//!
//! Unico consumatore dello stream di `TaskResult`.
//!
//! Il tracker è l'unico a modificare il `RunSummary`: i worker comunicano solo
//! tramite il canale dei risultati, quindi i contatori non hanno bisogno di lock.
//! Gestisce sia output JSON che log per-file e progress bar tradizionale.

use crate::{
    json_output::JsonMessage,
    progress::{ProgressManager, RunSummary},
    task::{TaskId, TaskResult, TaskStatus},
};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

/// Come vengono riportati i risultati per-file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reporting {
    /// Una riga di log per file
    Log,
    /// Un evento JSON per file
    Json,
    /// Nessun output per-file
    Quiet,
}

/// Aggregatore dei risultati
pub struct ProgressTracker {
    summary: RunSummary,
    seen: HashSet<TaskId>,
    reporting: Reporting,
    progress_manager: Option<ProgressManager>,
}

impl ProgressTracker {
    /// Crea un nuovo tracker
    pub fn new(output_root: PathBuf, reporting: Reporting, show_progress: bool) -> Self {
        let summary = RunSummary {
            output_root,
            ..RunSummary::new()
        };
        Self {
            summary,
            seen: HashSet::new(),
            reporting,
            progress_manager: show_progress.then(ProgressManager::new),
        }
    }

    /// Consuma risultati finché tutti i sender non sono stati chiusi
    pub async fn consume(mut self, mut results: UnboundedReceiver<TaskResult>) -> RunSummary {
        while let Some(result) = results.recv().await {
            self.record(result);
        }
        self.finish()
    }

    /// Registra un singolo risultato; i duplicati vengono ignorati
    pub fn record(&mut self, result: TaskResult) {
        if !self.seen.insert(result.id) {
            warn!(
                "Ignoring duplicate result for task {} ({})",
                result.id,
                result.relative_path.display()
            );
            return;
        }

        self.summary.record(&result);
        self.report(&result);
    }

    fn report(&self, result: &TaskResult) {
        match self.reporting {
            Reporting::Quiet => {}
            Reporting::Json => JsonMessage::file_complete(result).emit(),
            Reporting::Log => {
                let line = result.log_line();
                if let Some(progress) = &self.progress_manager {
                    progress.println(&line);
                } else if result.status == TaskStatus::Failed {
                    error!("{}", line);
                } else {
                    info!("{}", line);
                }
            }
        }

        if let Some(progress) = &self.progress_manager {
            progress.update(&result.relative_path.display().to_string());
        }
    }

    /// Sostituisce la progress bar (es. una nascosta)
    pub fn with_progress_manager(mut self, progress_manager: ProgressManager) -> Self {
        self.progress_manager = Some(progress_manager);
        self
    }

    /// Posizione della progress bar, se attiva
    pub fn progress_position(&self) -> Option<u64> {
        self.progress_manager.as_ref().map(ProgressManager::position)
    }

    /// Numero di risultati registrati finora
    pub fn recorded(&self) -> usize {
        self.seen.len()
    }

    /// Chiude la progress bar e restituisce il summary
    pub fn finish(self) -> RunSummary {
        if let Some(progress) = &self.progress_manager {
            progress.finish(&self.summary.format_summary());
        }
        self.summary
    }
}
