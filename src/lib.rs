//! # Image Optimizer Library
//!
//! Modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore e classificazione per-file
//! - `task`: Unità di lavoro e relativo esito
//! - `file_manager`: Discovery delle immagini e scrittura atomica
//! - `image_processor`: Decode, resize ed encode WebP
//! - `resize`: Calcolo delle dimensioni di output
//! - `optimizer`: Orchestratore principale del processo
//! - `progress`: Progress bar e summary del run
//! - `json_output`: Eventi JSON per uso programmatico
//! - `notifier`: Segnale di fine run
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use image_optimizer::{Config, MediaOptimizer};
//!
//! let config = Config::new("photos", "photos_webp");
//! let optimizer = MediaOptimizer::new(config)?;
//! let summary = optimizer.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod notifier;
pub mod optimizer;
pub mod progress;
pub mod resize;
pub mod task;

pub use config::Config;
pub use error::{ErrorKind, OptimizeError};
pub use image_processor::{ImageCodec, ImageProcessor};
pub use notifier::{BellTarget, CompletionNotifier, TerminalBell};
pub use optimizer::MediaOptimizer;
pub use progress::RunSummary;
pub use task::{Task, TaskResult, TaskStatus};
