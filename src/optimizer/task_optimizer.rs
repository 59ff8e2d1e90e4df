//! # Task Optimizer Module
//!
//! Worker per l'elaborazione di un singolo file.
//!
//! ## Stati di un file:
//! ```text
//! Discovered ─┬─> SkippedTooSmall
//!             ├─> Errored
//!             └─> Processed ─┬─> Replaced
//!                            └─> KeptOriginal
//! ```
//! In dry-run l'elaborazione si ferma a `Processed` senza scrivere nulla.
//! La copia WebP è un effetto collaterale indipendente dalla transizione
//! principale: può riuscire o fallire senza cambiare l'esito.

use crate::{
    config::OptimizationConfig,
    file_manager::FileManager,
    image_processor::{ColorMode, ImageProcessor, Reencoded},
    optimizer::path_resolver::PathResolver,
    resize::{fitted_dimensions, ResponsiveVariants},
};
use anyhow::Result;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Terminal state of one file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Below the configured minimum size; never opened
    SkippedTooSmall,
    /// Decode, encode or write failure
    Errored(String),
    /// Dry run: inspected, nothing written
    Processed,
    /// Original replaced by the re-encoded bytes
    Replaced { new_size: u64 },
    /// Re-encode did not save enough; original untouched
    KeptOriginal { candidate_size: u64 },
    /// Recognized format with no re-encode strategy (GIF)
    NotOptimizable,
}

impl FileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SkippedTooSmall => "skipped_too_small",
            Self::Errored(_) => "errored",
            Self::Processed => "processed",
            Self::Replaced { .. } => "replaced",
            Self::KeptOriginal { .. } => "kept_original",
            Self::NotOptimizable => "not_optimizable",
        }
    }

    pub fn new_size(&self) -> Option<u64> {
        match self {
            Self::Replaced { new_size } => Some(*new_size),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Errored(message) => Some(message),
            _ => None,
        }
    }
}

/// Result of processing one file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub original_size: u64,
    pub outcome: FileOutcome,
    pub derived_created: bool,
    pub variants_created: usize,
}

impl FileReport {
    pub fn new(path: PathBuf, original_size: u64, outcome: FileOutcome) -> Self {
        Self {
            path,
            original_size,
            outcome,
            derived_created: false,
            variants_created: 0,
        }
    }
}

/// Encoded side outputs (WebP copy and responsive variants) of one file
struct DerivedOutputs {
    webp: Result<(PathBuf, Vec<u8>)>,
    variants: Result<Vec<(PathBuf, Vec<u8>)>>,
}

/// Worker that runs the per-file pipeline
#[derive(Clone)]
pub struct TaskOptimizer {
    config: OptimizationConfig,
    processor: ImageProcessor,
    resolver: PathResolver,
    variants: Option<ResponsiveVariants>,
}

impl TaskOptimizer {
    pub fn new(config: OptimizationConfig, resolver: PathResolver) -> Self {
        let processor = ImageProcessor::new(config.clone());
        let variants = config
            .responsive
            .then(|| ResponsiveVariants::new(config.variant_widths.clone()));

        Self {
            config,
            processor,
            resolver,
            variants,
        }
    }

    /// Process a single file. Never fails: errors become `FileOutcome::Errored`.
    pub async fn process(&self, file_path: PathBuf, dry_run: bool) -> FileReport {
        let original_size = match FileManager::file_size(&file_path).await {
            Ok(size) => size,
            Err(e) => {
                error!("Failed to read {}: {}", file_path.display(), e);
                return FileReport::new(file_path, 0, FileOutcome::Errored(e.to_string()));
            }
        };

        if original_size < self.config.min_file_size {
            debug!(
                "Skipping {} (too small: {})",
                file_path.display(),
                FileManager::format_size(original_size)
            );
            return FileReport::new(file_path, original_size, FileOutcome::SkippedTooSmall);
        }

        match self.optimize(&file_path, original_size, dry_run).await {
            Ok(report) => report,
            Err(e) => {
                error!("Failed to process {}: {}", file_path.display(), e);
                FileReport::new(file_path, original_size, FileOutcome::Errored(e.to_string()))
            }
        }
    }

    async fn optimize(&self, file_path: &Path, original_size: u64, dry_run: bool) -> Result<FileReport> {
        let processor = self.processor.clone();
        let path = file_path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || processor.inspect(&path)).await??;

        debug!(
            "Processing {}: {}x{}, {}",
            file_path.display(),
            loaded.asset.width,
            loaded.asset.height,
            FileManager::format_size(original_size)
        );

        if dry_run {
            let (width, height) = fitted_dimensions(
                loaded.asset.width,
                loaded.asset.height,
                self.config.max_width,
                self.config.max_height,
            );
            if (width, height) != (loaded.asset.width, loaded.asset.height) {
                info!(
                    "[DRY RUN] Would resize {}: {}x{} -> {}x{}",
                    file_path.display(),
                    loaded.asset.width,
                    loaded.asset.height,
                    width,
                    height
                );
            }
            return Ok(FileReport::new(file_path.to_path_buf(), original_size, FileOutcome::Processed));
        }

        let processor = self.processor.clone();
        let (loaded, reencoded) = tokio::task::spawn_blocking(move || {
            let reencoded = processor.reencode(&loaded);
            (loaded, reencoded)
        })
        .await?;

        let source_mode = loaded.asset.color_mode;
        let (outcome, derive_from, derive_mode) = match reencoded {
            Ok(Some(Reencoded { bytes, image, color_mode })) => {
                let new_size = bytes.len() as u64;
                let savings = FileManager::fractional_savings(original_size, new_size);

                if savings >= self.config.min_savings {
                    self.replace_original(file_path, bytes).await?;
                    info!(
                        "Optimized {}: {} -> {} ({:.1}% savings)",
                        file_path.display(),
                        FileManager::format_size(original_size),
                        FileManager::format_size(new_size),
                        savings * 100.0
                    );
                    (FileOutcome::Replaced { new_size }, image, color_mode)
                } else {
                    debug!(
                        "Savings too small for {} ({:.1}%), keeping original",
                        file_path.display(),
                        savings * 100.0
                    );
                    (FileOutcome::KeptOriginal { candidate_size: new_size }, loaded.image, source_mode)
                }
            }
            Ok(None) => {
                debug!("No re-encode strategy for {}", file_path.display());
                (FileOutcome::NotOptimizable, loaded.image, source_mode)
            }
            Err(e) => {
                error!("Error optimizing {}: {}", file_path.display(), e);
                (FileOutcome::Errored(e.to_string()), loaded.image, source_mode)
            }
        };

        let with_variants = !matches!(outcome, FileOutcome::Errored(_));
        let mut report = FileReport::new(file_path.to_path_buf(), original_size, outcome);

        let outputs = self.render_derived(file_path, derive_from, derive_mode, with_variants).await?;
        report.derived_created = Self::write_webp(file_path, outputs.webp).await;
        report.variants_created = Self::write_variants(file_path, outputs.variants).await;

        Ok(report)
    }

    /// Back up the original (first time only), then swap in the new bytes.
    async fn replace_original(&self, file_path: &Path, bytes: Vec<u8>) -> Result<()> {
        let backup_path = self.resolver.backup_path(file_path)?;
        if FileManager::backup_once(file_path, &backup_path).await? {
            debug!("Backed up {} to {}", file_path.display(), backup_path.display());
        }

        FileManager::write_atomic(file_path, bytes).await
    }

    async fn render_derived(
        &self,
        file_path: &Path,
        image: DynamicImage,
        color_mode: ColorMode,
        with_variants: bool,
    ) -> Result<DerivedOutputs> {
        let processor = self.processor.clone();
        let resolver = self.resolver.clone();
        let variants = self.variants.clone().filter(|_| with_variants);
        let path = file_path.to_path_buf();

        let outputs = tokio::task::spawn_blocking(move || {
            let webp = resolver.webp_path(&path).and_then(|webp_path| {
                let bytes = processor.derive_webp(&image, color_mode)?;
                Ok((webp_path, bytes))
            });

            let variants = match variants {
                Some(variants) => variants.render(&image, color_mode, &path, &resolver),
                None => Ok(Vec::new()),
            };

            DerivedOutputs { webp, variants }
        })
        .await?;

        Ok(outputs)
    }

    async fn write_webp(file_path: &Path, webp: Result<(PathBuf, Vec<u8>)>) -> bool {
        let result = match webp {
            Ok((webp_path, bytes)) => {
                let size = bytes.len() as u64;
                FileManager::write_atomic(&webp_path, bytes)
                    .await
                    .map(|_| (webp_path, size))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((webp_path, size)) => {
                debug!("WebP {}: {}", webp_path.display(), FileManager::format_size(size));
                true
            }
            Err(e) => {
                warn!("Error creating WebP for {}: {}", file_path.display(), e);
                false
            }
        }
    }

    async fn write_variants(file_path: &Path, variants: Result<Vec<(PathBuf, Vec<u8>)>>) -> usize {
        let rendered = match variants {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Error creating variants for {}: {}", file_path.display(), e);
                return 0;
            }
        };

        let mut written = 0;
        for (variant_path, bytes) in rendered {
            match FileManager::write_atomic(&variant_path, bytes).await {
                Ok(()) => written += 1,
                Err(e) => warn!("Error writing variant {}: {}", variant_path.display(), e),
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteLayout;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn noisy_rgb(width: u32, height: u32, seed: u32) -> RgbImage {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            let b = state.to_le_bytes();
            Rgb([b[1], b[2], b[3]])
        })
    }

    fn write_jpeg(path: &Path, img: &RgbImage) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut buffer = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 100);
        DynamicImage::ImageRgb8(img.clone()).write_with_encoder(encoder).unwrap();
        std::fs::write(path, buffer).unwrap();
    }

    fn setup(config: OptimizationConfig) -> (TempDir, SiteLayout, TaskOptimizer) {
        let temp = TempDir::new().unwrap();
        let layout = SiteLayout::for_site(temp.path());
        std::fs::create_dir_all(&layout.source_root).unwrap();
        let task = TaskOptimizer::new(config, PathResolver::new(layout.clone()));
        (temp, layout, task)
    }

    #[tokio::test]
    async fn test_small_file_is_skipped_untouched() {
        let (_temp, layout, task) = setup(OptimizationConfig::default());
        let path = layout.source_root.join("icon.png");
        DynamicImage::ImageRgb8(noisy_rgb(20, 20, 1)).save(&path).unwrap();
        let before = std::fs::read(&path).unwrap();
        assert!(before.len() < 10 * 1024);

        let report = task.process(path.clone(), false).await;

        assert_eq!(report.outcome, FileOutcome::SkippedTooSmall);
        assert!(!report.derived_created);
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!layout.backup_root.exists());
        assert!(!layout.webp_root.exists());
    }

    #[tokio::test]
    async fn test_replaced_file_has_identical_backup() {
        let config = OptimizationConfig {
            max_width: 160,
            max_height: 120,
            ..Default::default()
        };
        let (_temp, layout, task) = setup(config);
        let path = layout.source_root.join("projects/cover.jpg");
        write_jpeg(&path, &noisy_rgb(320, 240, 2));
        let original = std::fs::read(&path).unwrap();

        let report = task.process(path.clone(), false).await;

        assert!(matches!(report.outcome, FileOutcome::Replaced { .. }));
        assert!(report.derived_created);
        let backup = layout.backup_root.join("projects/cover.jpg");
        assert_eq!(std::fs::read(&backup).unwrap(), original);
        assert!(layout.webp_root.join("projects/cover.webp").exists());

        let replaced = image::open(&path).unwrap();
        assert_eq!((replaced.width(), replaced.height()), (160, 120));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replaced_outputs_stay_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let config = OptimizationConfig {
            max_width: 160,
            max_height: 120,
            ..Default::default()
        };
        let (_temp, layout, task) = setup(config);
        let path = layout.source_root.join("cover.jpg");
        write_jpeg(&path, &noisy_rgb(320, 240, 6));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let report = task.process(path.clone(), false).await;
        assert!(matches!(report.outcome, FileOutcome::Replaced { .. }));

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), 0o644);
        assert_eq!(mode(&layout.backup_root.join("cover.jpg")), 0o644);
        assert_eq!(mode(&layout.webp_root.join("cover.webp")), 0o644);
    }

    #[tokio::test]
    async fn test_insufficient_savings_keeps_original() {
        let config = OptimizationConfig {
            min_savings: 0.99,
            ..Default::default()
        };
        let (_temp, layout, task) = setup(config);
        let path = layout.source_root.join("photo.jpg");
        write_jpeg(&path, &noisy_rgb(128, 128, 3));
        let original = std::fs::read(&path).unwrap();

        let report = task.process(path.clone(), false).await;

        assert!(matches!(report.outcome, FileOutcome::KeptOriginal { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), original);
        assert!(!layout.backup_root.join("photo.jpg").exists());
        assert!(report.derived_created);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_errored() {
        let (_temp, layout, task) = setup(OptimizationConfig::default());
        let path = layout.source_root.join("broken.jpg");
        std::fs::write(&path, vec![0x13u8; 20 * 1024]).unwrap();

        let report = task.process(path.clone(), false).await;

        assert!(matches!(report.outcome, FileOutcome::Errored(_)));
        assert!(!report.derived_created);
        let leftovers: Vec<_> = std::fs::read_dir(&layout.source_root).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let (_temp, layout, task) = setup(OptimizationConfig::default());
        let path = layout.source_root.join("photo.jpg");
        write_jpeg(&path, &noisy_rgb(128, 128, 4));
        let original = std::fs::read(&path).unwrap();

        let report = task.process(path.clone(), true).await;

        assert_eq!(report.outcome, FileOutcome::Processed);
        assert_eq!(std::fs::read(&path).unwrap(), original);
        assert!(!layout.backup_root.exists());
        assert!(!layout.webp_root.exists());
    }

    #[tokio::test]
    async fn test_gif_gets_webp_only() {
        let (_temp, layout, task) = setup(OptimizationConfig {
            min_file_size: 0,
            ..Default::default()
        });
        let path = layout.source_root.join("badge.gif");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(24, 24, Rgba([200, 10, 10, 255])))
            .save(&path)
            .unwrap();
        let original = std::fs::read(&path).unwrap();

        let report = task.process(path.clone(), false).await;

        assert_eq!(report.outcome, FileOutcome::NotOptimizable);
        assert!(report.derived_created);
        assert_eq!(std::fs::read(&path).unwrap(), original);
        assert!(layout.webp_root.join("badge.webp").exists());
    }

    #[tokio::test]
    async fn test_responsive_variants_written() {
        let (_temp, layout, task) = setup(OptimizationConfig {
            responsive: true,
            variant_widths: vec![64, 96, 512],
            ..Default::default()
        });
        let path = layout.source_root.join("team/portrait.jpg");
        write_jpeg(&path, &noisy_rgb(200, 100, 5));

        let report = task.process(path.clone(), false).await;

        assert_eq!(report.variants_created, 2);
        assert!(layout.responsive_root.join("team/portrait-64w.jpg").exists());
        assert!(layout.responsive_root.join("team/portrait-96w.jpg").exists());
        assert!(!layout.responsive_root.join("team/portrait-512w.jpg").exists());
    }
}
