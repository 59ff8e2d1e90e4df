//! # Path Resolution Module
//!
//! Centralizza il calcolo dei path speculari (backup, WebP, varianti).
//! Il path relativo alla radice sorgente viene preservato identico sotto
//! ciascuna radice di output.

use crate::config::SiteLayout;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps source files onto the mirrored output roots
#[derive(Debug, Clone)]
pub struct PathResolver {
    layout: SiteLayout,
}

impl PathResolver {
    pub fn new(layout: SiteLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    /// Path of `input` relative to the source root
    pub fn relative<'a>(&self, input: &'a Path) -> Result<&'a Path> {
        input.strip_prefix(&self.layout.source_root).map_err(|_| {
            anyhow::anyhow!(
                "{} is not under source root {}",
                input.display(),
                self.layout.source_root.display()
            )
        })
    }

    /// `assets/img/a/b.jpg` -> `assets/img_backup/a/b.jpg`
    pub fn backup_path(&self, input: &Path) -> Result<PathBuf> {
        let result = self.layout.backup_root.join(self.relative(input)?);
        debug!("Backup path: {} -> {}", input.display(), result.display());
        Ok(result)
    }

    /// `assets/img/a/b.jpg` -> `assets/img_webp/a/b.webp`
    pub fn webp_path(&self, input: &Path) -> Result<PathBuf> {
        let result = self
            .layout
            .webp_root
            .join(self.relative(input)?)
            .with_extension("webp");
        debug!("WebP path: {} -> {}", input.display(), result.display());
        Ok(result)
    }

    /// `assets/img/a/b.jpg` -> `assets/img_responsive/a/b-400w.jpg`
    pub fn variant_path(&self, input: &Path, width: u32, extension: &str) -> Result<PathBuf> {
        let relative = self.relative(input)?;
        let stem = relative
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", input.display()))?
            .to_string_lossy();
        let filename = format!("{}-{}w.{}", stem, width, extension);

        let parent = relative.parent().unwrap_or(Path::new(""));
        Ok(self.layout.responsive_root.join(parent).join(filename))
    }
}
