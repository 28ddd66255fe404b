//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `media_optimizer`: Orchestratore principale (scanner, worker pool, aggregazione)
//! - `task_optimizer`: Worker per singoli file
//! - `progress_tracker`: Consumatore unico dei risultati
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod media_optimizer;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task_optimizer;

pub use media_optimizer::MediaOptimizer;
pub use path_resolver::PathResolver;
pub use progress_tracker::{ProgressTracker, Reporting};
pub use task_optimizer::TaskOptimizer;
