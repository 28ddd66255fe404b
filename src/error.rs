//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Definisce `ErrorKind`, la tassonomia per-file riportata nei `TaskResult`
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Config`: Configurazione invalida o output annidato nella sorgente (fatale)
//! - `Scan`: File non leggibile durante la discovery (per-file)
//! - `Decode` / `Encode` / `Write`: Errori di conversione per-file
//! - `Pool`: Il worker pool non può partire o proseguire (fatale)
//! - `Io` / `Serialization`: Lettura/scrittura del file di configurazione
//!
//! ## Esempio:
//! ```rust,ignore
//! if config.workers == 0 {
//!     return Err(OptimizeError::Config("Number of workers must be greater than 0".into()));
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Custom error types for image optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OptimizeError {
    /// Classifica l'errore nella tassonomia per-file
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptimizeError::Scan(_) => ErrorKind::Scan,
            OptimizeError::Decode(_) => ErrorKind::Decode,
            OptimizeError::Encode(_) => ErrorKind::Encode,
            OptimizeError::Write(_) | OptimizeError::Io(_) => ErrorKind::Write,
            OptimizeError::Config(_)
            | OptimizeError::Pool(_)
            | OptimizeError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Messaggio senza il prefisso della categoria
    pub fn detail(&self) -> String {
        match self {
            OptimizeError::Config(msg)
            | OptimizeError::Scan(msg)
            | OptimizeError::Decode(msg)
            | OptimizeError::Encode(msg)
            | OptimizeError::Write(msg)
            | OptimizeError::Pool(msg) => msg.clone(),
            OptimizeError::Io(e) => e.to_string(),
            OptimizeError::Serialization(e) => e.to_string(),
        }
    }
}

/// Kind of failure attached to a Failed task result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Scan,
    Decode,
    Encode,
    Write,
    /// A worker panicked while processing the task
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Scan => "ScanError",
            ErrorKind::Decode => "DecodeError",
            ErrorKind::Encode => "EncodeError",
            ErrorKind::Write => "WriteError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}
