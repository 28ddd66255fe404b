//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione di una conversione batch.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di conversione
//! - Fornisce validazione dei parametri prima di qualsiasi I/O di conversione
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `source_root`: Directory sorgente (deve esistere)
//! - `output_root`: Directory di output (creata se assente)
//! - `quality`: Qualità WebP (0-100, default: 80)
//! - `max_width`: Larghezza massima (default: 1920, 0 = nessun resize)
//! - `quiet`: Sopprime i log per singolo file (default: false)
//! - `workers`: Numero di worker paralleli (default: tutti i core, massimo `MAX_WORKERS`)
//! - `skip_existing`: Salta i file il cui output esiste già (default: false)
//! - `memory_limit_mb`: Limite di allocazione per decode (default: 512, 0 = nessun limite)
//! - `notify`: Segnale di completamento a fine run (default: true)
//! - `json_output`: Eventi JSON su stdout al posto dei log (default: false)
//! - `show_progress`: Progress bar `indicatif` (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     source_root: PathBuf::from("photos"),
//!     output_root: PathBuf::from("photos_webp"),
//!     quality: 85,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::OptimizeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default maximum output width
pub const DEFAULT_MAX_WIDTH: u32 = 1920;

/// Upper bound for `workers`; each worker holds a decoded image in memory
pub const MAX_WORKERS: usize = 4096;

/// Configuration for a batch conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned recursively for images
    pub source_root: PathBuf,
    /// Directory receiving the mirrored WebP tree
    pub output_root: PathBuf,
    /// WebP quality (0-100)
    pub quality: u8,
    /// Maximum output width, 0 disables resizing
    pub max_width: u32,
    /// Suppress per-file log lines
    pub quiet: bool,
    /// Number of parallel workers
    pub workers: usize,
    /// Skip files whose output already exists
    pub skip_existing: bool,
    /// Per-worker decode allocation ceiling in MiB (0 = unlimited)
    pub memory_limit_mb: u64,
    /// Trigger the completion notifier at the end of the run
    pub notify: bool,
    /// Output progress and results as JSON for programmatic use
    pub json_output: bool,
    /// Show an interactive progress bar
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            output_root: PathBuf::new(),
            quality: 80,
            max_width: DEFAULT_MAX_WIDTH,
            quiet: false,
            workers: num_cpus::get().clamp(1, MAX_WORKERS),
            skip_existing: false,
            memory_limit_mb: 512,
            notify: true,
            json_output: false,
            show_progress: false,
        }
    }
}

impl Config {
    /// Build a configuration for the given roots with default options
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.quality > 100 {
            return Err(OptimizeError::Config(format!(
                "WebP quality must be between 0 and 100 (got {})",
                self.quality
            )));
        }

        if self.workers == 0 {
            return Err(OptimizeError::Config(
                "Number of workers must be greater than 0".to_string(),
            ));
        }

        if self.workers > MAX_WORKERS {
            return Err(OptimizeError::Config(format!(
                "Number of workers must be at most {} (got {})",
                MAX_WORKERS, self.workers
            )));
        }

        if self.source_root.as_os_str().is_empty() {
            return Err(OptimizeError::Config("Source directory is not set".to_string()));
        }

        if !self.source_root.exists() {
            return Err(OptimizeError::Config(format!(
                "Source directory does not exist: {}",
                self.source_root.display()
            )));
        }

        if !self.source_root.is_dir() {
            return Err(OptimizeError::Config(format!(
                "Source path is not a directory: {}",
                self.source_root.display()
            )));
        }

        if self.output_root.as_os_str().is_empty() {
            return Err(OptimizeError::Config("Output directory is not set".to_string()));
        }

        Ok(())
    }

    /// Allocation ceiling for a single decode, `None` when unlimited
    pub fn decode_limit_bytes(&self) -> Option<u64> {
        match self.memory_limit_mb {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    /// Default location of the user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("image-optimizer").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self, OptimizeError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<(), OptimizeError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
