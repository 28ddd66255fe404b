//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Riutilizza `TaskResult` e `RunSummary` così come sono
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run con la configurazione risolta
//! - `file_complete`: Esito di un singolo file
//! - `complete`: Fine del run con il `RunSummary` completo
//! - `error`: Errore fatale prima o durante il run

use crate::config::Config;
use crate::progress::RunSummary;
use crate::task::TaskResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio del processo di conversione
    #[serde(rename = "start")]
    Start {
        source_root: PathBuf,
        output_root: PathBuf,
        config: JsonConfig,
    },

    /// Fine elaborazione di un file specifico
    #[serde(rename = "file_complete")]
    FileComplete { result: TaskResult },

    /// Processo completato
    #[serde(rename = "complete")]
    Complete { summary: RunSummary },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonConfig {
    pub quality: u8,
    pub max_width: u32,
    pub workers: usize,
    pub skip_existing: bool,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(source_root: PathBuf, output_root: PathBuf, config: &Config) -> Self {
        Self::Start {
            source_root,
            output_root,
            config: JsonConfig::from(config),
        }
    }

    pub fn file_complete(result: &TaskResult) -> Self {
        Self::FileComplete {
            result: result.clone(),
        }
    }

    pub fn complete(summary: &RunSummary) -> Self {
        Self::Complete {
            summary: summary.clone(),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            quality: config.quality,
            max_width: config.max_width,
            workers: config.workers,
            skip_existing: config.skip_existing,
        }
    }
}
