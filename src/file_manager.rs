//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sul filesystem.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva delle immagini (`scan`)
//! - Elenco dei file più grandi di una soglia (`list_oversized`)
//! - Backup una-tantum dell'originale (`backup_once`)
//! - Scrittura atomica via file temporaneo + rename (`write_atomic`)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Sicurezza operazioni:
//! - Il backup non viene mai sovrascritto una volta creato
//! - I file temporanei vengono rimossi automaticamente in caso di errore
//! - La creazione delle directory tollera race tra worker concorrenti
//!
//! ## Esempio:
//! ```ignore
//! let files = FileManager::scan(&layout.source_root, &config.extensions)?;
//! for file in files {
//!     // process image
//! }
//! ```

use anyhow::Result;
use std::fs::Permissions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Recursively find files whose extension (case-insensitive) is recognized.
    /// Result is sorted so runs are reproducible.
    pub fn scan(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if Self::has_extension(path, extensions) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|known| known.eq_ignore_ascii_case(&ext_lower))
        } else {
            false
        }
    }

    /// Files at or above `threshold_bytes`, largest first. Read-only.
    pub fn list_oversized(
        root: &Path,
        extensions: &[String],
        threshold_bytes: u64,
    ) -> Result<Vec<(PathBuf, u64)>> {
        Ok(Self::oversized_among(Self::scan(root, extensions)?, threshold_bytes))
    }

    /// Files that can't be stat'ed are logged and left out of the listing.
    fn oversized_among(paths: Vec<PathBuf>, threshold_bytes: u64) -> Vec<(PathBuf, u64)> {
        let mut large = Vec::new();

        for path in paths {
            let size = match std::fs::metadata(&path) {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!("Skipping {} in listing: {}", path.display(), e);
                    continue;
                }
            };
            if size >= threshold_bytes {
                large.push((path, size));
            }
        }

        // Ties broken by path so the listing is stable
        large.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        large
    }

    /// On-disk size of a file
    pub async fn file_size(path: &Path) -> Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Copy `original` to `backup_path` unless a backup already exists.
    ///
    /// Returns `true` if a new backup was written. The copy goes through a
    /// temporary file persisted without clobbering, so two workers racing on
    /// the same backup leave exactly one intact copy.
    pub async fn backup_once(original: &Path, backup_path: &Path) -> Result<bool> {
        if fs::try_exists(backup_path).await? {
            return Ok(false);
        }

        let parent = Self::parent_of(backup_path)?;
        fs::create_dir_all(&parent).await?;

        let original = original.to_path_buf();
        let backup_path = backup_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut source = std::fs::File::open(&original)?;
            let mut temp = tempfile::Builder::new()
                .prefix(".backup-")
                .tempfile_in(&parent)?;
            std::io::copy(&mut source, temp.as_file_mut())?;
            if let Some(permissions) = Self::output_permissions(&original) {
                temp.as_file().set_permissions(permissions)?;
            }
            temp.as_file().sync_all()?;

            match temp.persist_noclobber(&backup_path) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error.into()),
            }
        })
        .await?
    }

    /// Atomically replace (or create) `target` with `bytes`.
    ///
    /// The data is written to a hidden temporary file next to the target and
    /// renamed over it. If anything fails the temporary file is removed.
    pub async fn write_atomic(target: &Path, bytes: Vec<u8>) -> Result<()> {
        let parent = Self::parent_of(target)?;
        fs::create_dir_all(&parent).await?;

        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(".opt-")
                .tempfile_in(&parent)?;
            temp.write_all(&bytes)?;
            if let Some(permissions) = Self::output_permissions(&target) {
                temp.as_file().set_permissions(permissions)?;
            }
            temp.as_file().sync_all()?;
            temp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await?
    }

    /// Mode for a file about to be persisted: the reference file's own
    /// permissions when it exists, plain 0644 otherwise (temporary files
    /// start as 0600).
    fn output_permissions(reference: &Path) -> Option<Permissions> {
        match std::fs::metadata(reference) {
            Ok(metadata) if metadata.is_file() => Some(metadata.permissions()),
            _ => Self::default_permissions(),
        }
    }

    #[cfg(unix)]
    fn default_permissions() -> Option<Permissions> {
        use std::os::unix::fs::PermissionsExt;
        Some(Permissions::from_mode(0o644))
    }

    #[cfg(not(unix))]
    fn default_permissions() -> Option<Permissions> {
        None
    }

    fn parent_of(path: &Path) -> Result<PathBuf> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
            _ => Ok(PathBuf::from(".")),
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.1} {}", size, UNITS[unit_index])
    }

    /// Fractional savings: (original - new) / original
    pub fn fractional_savings(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            (original_size as f64 - new_size as f64) / original_size as f64
        }
    }
}
