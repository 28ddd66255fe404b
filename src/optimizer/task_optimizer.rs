//! # Task Optimizer Module
//!
//! Worker per la conversione di singoli file.
//! Separato dall'orchestratore principale per maggiore modularità.
//!
//! Pipeline per task: lettura → decode → resize (se serve) → encode WebP → scrittura
//! atomica. Ogni task viene tentato una sola volta; qualsiasi errore diventa un
//! `TaskResult` Failed e non esce mai da qui.

use crate::{
    config::Config,
    error::OptimizeError,
    file_manager::FileManager,
    image_processor::ImageCodec,
    optimizer::path_resolver::PathResolver,
    resize,
    task::{Task, TaskResult},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Dimensioni e size raccolte durante una conversione riuscita
struct Conversion {
    original_dimensions: (u32, u32),
    output_dimensions: (u32, u32),
    output_size: u64,
}

/// Worker condiviso: stateless, usato da tutti i thread di conversione
pub struct TaskOptimizer {
    quality: u8,
    max_width: u32,
    skip_existing: bool,
    codec: Arc<dyn ImageCodec>,
    resolver: Arc<PathResolver>,
}

impl TaskOptimizer {
    /// Crea nuovo task optimizer
    pub fn new(config: &Config, codec: Arc<dyn ImageCodec>, resolver: Arc<PathResolver>) -> Self {
        Self {
            quality: config.quality,
            max_width: config.max_width,
            skip_existing: config.skip_existing,
            codec,
            resolver,
        }
    }

    /// Converte un singolo file e ne riporta l'esito
    pub fn transform(&self, task: &Task) -> TaskResult {
        let start = Instant::now();

        let original_size = match std::fs::metadata(&task.source_path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                let error = OptimizeError::Scan(format!("cannot stat source: {}", e));
                return TaskResult::from_error(task, &error).with_elapsed(start.elapsed());
            }
        };

        if self.skip_existing && task.output_path.exists() {
            debug!("[OK] Skipping file, output already exists: {}", task.output_path.display());
            return TaskResult::skipped(task, original_size, "output already exists")
                .with_elapsed(start.elapsed());
        }

        let mut decoded_dimensions = None;
        match self.convert(task, &mut decoded_dimensions) {
            Ok(conversion) => TaskResult::converted(
                task,
                original_size,
                conversion.output_size,
                conversion.original_dimensions,
                conversion.output_dimensions,
                start.elapsed(),
            ),
            Err(error) => TaskResult::from_error(task, &error)
                .with_original_size(original_size)
                .with_original_dimensions(decoded_dimensions)
                .with_elapsed(start.elapsed()),
        }
    }

    fn convert(
        &self,
        task: &Task,
        decoded_dimensions: &mut Option<(u32, u32)>,
    ) -> Result<Conversion, OptimizeError> {
        let bytes = std::fs::read(&task.source_path)
            .map_err(|e| OptimizeError::Scan(format!("cannot read source: {}", e)))?;

        let image = self.codec.decode(&bytes)?;
        drop(bytes);

        let original_dimensions = (image.width(), image.height());
        *decoded_dimensions = Some(original_dimensions);

        let image = match resize::target_dimensions(image.width(), image.height(), self.max_width) {
            Some((width, height)) => {
                debug!(
                    "Resizing {} from {}x{} to {}x{}",
                    task.relative_path.display(),
                    original_dimensions.0,
                    original_dimensions.1,
                    width,
                    height
                );
                self.codec.resize(&image, width, height)
            }
            None => image,
        };
        let output_dimensions = (image.width(), image.height());

        let encoded = self.codec.encode(&image, self.quality)?;
        drop(image);

        self.resolver.ensure_parent_dir(&task.output_path)?;
        FileManager::write_atomic(&task.output_path, &encoded)?;

        Ok(Conversion {
            original_dimensions,
            output_dimensions,
            output_size: encoded.len() as u64,
        })
    }
}
