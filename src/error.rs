//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore dell'ottimizzatore di immagini.
//!
//! ## Categorie di errori:
//! - `UnreadableImage`: il file non può essere decodificato (corrotto o codec non supportato)
//! - `Encode`: errore durante la ricodifica o la generazione della copia WebP
//! - `MissingDependency`: backend di imaging non disponibile (fatale, rilevato all'avvio)
//! - `Io`: errori di I/O (permessi, disco pieno, etc.)
//! - `Validation`: parametri di configurazione non validi
//! - `Config`: file di configurazione illeggibile
//!
//! Gli errori per singolo file vengono catturati dall'orchestratore, loggati e
//! contati in `RunStatistics`; solo `MissingDependency` interrompe l'esecuzione.
//!
//! ## Esempio:
//! ```ignore
//! if !ImageFormat::Jpeg.reading_enabled() {
//!     return Err(OptimizeError::MissingDependency("JPEG decoder".to_string()));
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for image optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable image {path}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Configuration file error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl OptimizeError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableImage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<image::ImageError> for OptimizeError {
    fn from(e: image::ImageError) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<png::EncodingError> for OptimizeError {
    fn from(e: png::EncodingError) -> Self {
        Self::Encode(e.to_string())
    }
}
