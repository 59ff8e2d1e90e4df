//! # JSON Output Module
//!
//! Output strutturato in JSON (una riga per evento) per l'uso programmatico,
//! ad esempio da uno script di build del sito.
//!
//! ## Tipi di messaggi:
//! - `start`: inizio del batch
//! - `file_complete`: fine elaborazione di un file, con esito
//! - `complete`: fine del batch con le statistiche finali
//! - `large_file`: una riga dell'elenco `--list-large`
//! - `error`: errore fatale

use crate::config::OptimizationConfig;
use crate::optimizer::task_optimizer::FileReport;
use crate::progress::RunStatistics;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio del processo di ottimizzazione
    #[serde(rename = "start")]
    Start {
        source_root: PathBuf,
        total_files: usize,
        dry_run: bool,
        config: JsonConfig,
    },

    /// Fine elaborazione di un file specifico
    #[serde(rename = "file_complete")]
    FileComplete {
        path: PathBuf,
        outcome: &'static str,
        original_size: u64,
        new_size: Option<u64>,
        derived_created: bool,
        variants_created: usize,
        error: Option<String>,
    },

    /// Processo completato
    #[serde(rename = "complete")]
    Complete {
        statistics: RunStatistics,
        savings_percent: f64,
        duration_seconds: f64,
    },

    /// File sopra la soglia di `--list-large`
    #[serde(rename = "large_file")]
    LargeFile { path: PathBuf, size: u64 },

    /// Errore generale
    #[serde(rename = "error")]
    Error { message: String },
}

/// Configurazione riportata nel messaggio `start`
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub jpeg_quality: u8,
    pub webp_quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub min_savings: f64,
    pub workers: usize,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(source_root: PathBuf, total_files: usize, dry_run: bool, config: &OptimizationConfig) -> Self {
        Self::Start {
            source_root,
            total_files,
            dry_run,
            config: JsonConfig::from(config),
        }
    }

    pub fn file_complete(report: &FileReport) -> Self {
        Self::FileComplete {
            path: report.path.clone(),
            outcome: report.outcome.label(),
            original_size: report.original_size,
            new_size: report.outcome.new_size(),
            derived_created: report.derived_created,
            variants_created: report.variants_created,
            error: report.outcome.error_message().map(str::to_string),
        }
    }

    pub fn complete(statistics: &RunStatistics, duration_seconds: f64) -> Self {
        Self::Complete {
            statistics: statistics.clone(),
            savings_percent: statistics.savings_percent(),
            duration_seconds,
        }
    }

    pub fn error(message: String) -> Self {
        Self::Error { message }
    }
}

impl From<&OptimizationConfig> for JsonConfig {
    fn from(config: &OptimizationConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            webp_quality: config.webp_quality,
            max_width: config.max_width,
            max_height: config.max_height,
            min_savings: config.min_savings,
            workers: config.workers,
        }
    }
}
