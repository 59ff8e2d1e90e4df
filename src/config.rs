//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione di una singola esecuzione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizationConfig`, immutabile per tutta la durata del batch
//! - Definisce `SiteLayout`, le quattro radici (sorgenti, backup, WebP, varianti)
//! - Validazione dei parametri e delle radici (non devono sovrapporsi)
//! - Caricamento/salvataggio della configurazione da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `jpeg_quality`: Qualità JPEG (1-100, default: 85)
//! - `webp_quality`: Qualità WebP (1-100, default: 80)
//! - `max_width` / `max_height`: Limiti di ridimensionamento (default: 1920x1080)
//! - `min_savings`: Riduzione minima per sostituire un file (default: 0.10)
//! - `min_file_size`: File più piccoli vengono saltati (default: 10 KB)
//! - `extensions`: Estensioni riconosciute (default: jpg, jpeg, png, gif)
//! - `workers`: Worker paralleli (default: 1, elaborazione sequenziale)
//! - `responsive` / `variant_widths`: Varianti responsive (default: off, [400, 800])
//!
//! ## Esempio:
//! ```ignore
//! let config = OptimizationConfig {
//!     jpeg_quality: 80,
//!     max_width: 1600,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::OptimizeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// JPEG re-encode quality (1-100)
    pub jpeg_quality: u8,
    /// WebP quality (1-100)
    pub webp_quality: u8,
    /// Downscale bound
    pub max_width: u32,
    pub max_height: u32,
    /// Minimum fractional savings required to replace a file (0.10 = 10%)
    pub min_savings: f64,
    /// Files smaller than this (bytes) are skipped
    pub min_file_size: u64,
    /// Recognized extensions, lowercase, without the dot
    pub extensions: Vec<String>,
    /// Number of parallel workers
    pub workers: usize,
    /// Emit responsive width variants
    pub responsive: bool,
    pub variant_widths: Vec<u32>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            webp_quality: 80,
            max_width: 1920,
            max_height: 1080,
            min_savings: 0.10,
            min_file_size: 10 * 1024,
            extensions: ["jpg", "jpeg", "png", "gif"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            workers: 1,
            responsive: false,
            variant_widths: vec![400, 800],
            json_output: false,
        }
    }
}

impl OptimizationConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(OptimizeError::Validation("JPEG quality must be between 1 and 100".into()));
        }

        if self.webp_quality == 0 || self.webp_quality > 100 {
            return Err(OptimizeError::Validation("WebP quality must be between 1 and 100".into()));
        }

        if self.max_width == 0 || self.max_height == 0 {
            return Err(OptimizeError::Validation("Maximum dimensions must be greater than 0".into()));
        }

        if !(0.0..1.0).contains(&self.min_savings) {
            return Err(OptimizeError::Validation("Minimum savings must be in [0.0, 1.0)".into()));
        }

        if self.extensions.is_empty() {
            return Err(OptimizeError::Validation("At least one file extension is required".into()));
        }

        if self.workers == 0 {
            return Err(OptimizeError::Validation("Number of workers must be greater than 0".into()));
        }

        if self.responsive && self.variant_widths.iter().any(|&w| w == 0) {
            return Err(OptimizeError::Validation("Variant widths must be greater than 0".into()));
        }

        Ok(())
    }

    /// Load configuration from file, falling back to defaults if it does not exist
    pub async fn from_file(path: &Path) -> Result<Self, OptimizeError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: OptimizationConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<(), OptimizeError> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Directory roots of the site's image assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    pub webp_root: PathBuf,
    pub responsive_root: PathBuf,
}

impl SiteLayout {
    /// Standard layout under `<site>/assets`
    pub fn for_site(site_root: &Path) -> Self {
        let assets = site_root.join("assets");
        Self {
            source_root: assets.join("img"),
            backup_root: assets.join("img_backup"),
            webp_root: assets.join("img_webp"),
            responsive_root: assets.join("img_responsive"),
        }
    }

    /// Output roots must never be re-scanned as sources, and vice versa.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let outputs = [&self.backup_root, &self.webp_root, &self.responsive_root];

        for output in outputs {
            if output.starts_with(&self.source_root) || self.source_root.starts_with(output) {
                return Err(OptimizeError::Validation(format!(
                    "Output root {} overlaps source root {}",
                    output.display(),
                    self.source_root.display()
                )));
            }
        }

        if self.backup_root == self.webp_root
            || self.backup_root == self.responsive_root
            || self.webp_root == self.responsive_root
        {
            return Err(OptimizeError::Validation("Output roots must be distinct".into()));
        }

        Ok(())
    }
}
