//! # Task Model Module
//!
//! Unità di lavoro e relativi esiti.
//!
//! ## Strutture dati:
//! - `Task`: un file da convertire (path sorgente, path relativo, path di output)
//! - `TaskResult`: esito di un task (Converted / Skipped / Failed) con metriche
//!
//! Ogni `TaskResult` porta lo stesso `TaskId` del task da cui nasce, così i risultati
//! possono essere riconciliati indipendentemente dall'ordine di completamento.

use crate::error::{ErrorKind, OptimizeError};
use crate::file_manager::FileManager;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Stable identifier assigned at discovery time
pub type TaskId = usize;

/// One file's pending conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Converted,
    Skipped,
    Failed,
}

/// Error detail of a Failed result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of processing one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskId,
    pub relative_path: PathBuf,
    pub status: TaskStatus,
    pub original_size: u64,
    pub output_size: Option<u64>,
    /// Source dimensions, when the image was decoded
    pub original_dimensions: Option<(u32, u32)>,
    /// Written dimensions, for converted images
    pub output_dimensions: Option<(u32, u32)>,
    pub elapsed: Duration,
    pub error: Option<TaskError>,
    /// Why the task was skipped
    pub skip_reason: Option<String>,
}

impl TaskResult {
    fn base(id: TaskId, relative_path: PathBuf, status: TaskStatus) -> Self {
        Self {
            id,
            relative_path,
            status,
            original_size: 0,
            output_size: None,
            original_dimensions: None,
            output_dimensions: None,
            elapsed: Duration::ZERO,
            error: None,
            skip_reason: None,
        }
    }

    pub fn converted(
        task: &Task,
        original_size: u64,
        output_size: u64,
        original_dimensions: (u32, u32),
        output_dimensions: (u32, u32),
        elapsed: Duration,
    ) -> Self {
        Self {
            original_size,
            output_size: Some(output_size),
            original_dimensions: Some(original_dimensions),
            output_dimensions: Some(output_dimensions),
            elapsed,
            ..Self::base(task.id, task.relative_path.clone(), TaskStatus::Converted)
        }
    }

    pub fn skipped(task: &Task, original_size: u64, reason: impl Into<String>) -> Self {
        Self {
            original_size,
            skip_reason: Some(reason.into()),
            ..Self::base(task.id, task.relative_path.clone(), TaskStatus::Skipped)
        }
    }

    pub fn failed(
        id: TaskId,
        relative_path: PathBuf,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(TaskError {
                kind,
                message: message.into(),
            }),
            ..Self::base(id, relative_path, TaskStatus::Failed)
        }
    }

    pub fn from_error(task: &Task, error: &OptimizeError) -> Self {
        Self::failed(task.id, task.relative_path.clone(), error.kind(), error.detail())
    }

    pub fn with_original_size(mut self, size: u64) -> Self {
        self.original_size = size;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_original_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.original_dimensions = dimensions;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Byte risparmiati rispetto all'originale (0 se l'output è più grande)
    pub fn bytes_saved(&self) -> u64 {
        self.output_size
            .map(|out| self.original_size.saturating_sub(out))
            .unwrap_or(0)
    }

    /// Riga leggibile per il log per-file
    pub fn log_line(&self) -> String {
        let path = self.relative_path.display();
        match self.status {
            TaskStatus::Converted => {
                let output_size = self.output_size.unwrap_or(0);
                let resized = match (self.original_dimensions, self.output_dimensions) {
                    (Some(a), Some(b)) if a != b => {
                        format!(" [{}x{} -> {}x{}]", a.0, a.1, b.0, b.1)
                    }
                    _ => String::new(),
                };
                format!(
                    "[OK] {}: {} -> {} ({:.1}% saved){}",
                    path,
                    FileManager::format_size(self.original_size),
                    FileManager::format_size(output_size),
                    FileManager::calculate_reduction(self.original_size, output_size),
                    resized
                )
            }
            TaskStatus::Skipped => format!(
                "[SKIP] {}: {}",
                path,
                self.skip_reason.as_deref().unwrap_or("skipped")
            ),
            TaskStatus::Failed => match &self.error {
                Some(error) => format!("[ERROR] {}: {}: {}", path, error.kind, error.message),
                None => format!("[ERROR] {}: failed", path),
            },
        }
    }
}
