//! # Batch Optimizer Orchestrator
//!
//! Orchestratore principale: discovery → elaborazione per file → statistiche.
//!
//! ## Flusso di esecuzione:
//! 1. **Inizializzazione**: validazione config e layout, verifica backend di imaging
//! 2. **File discovery**: scansione ricorsiva di `assets/img`
//! 3. **Processing**: ogni file passa da `TaskOptimizer::process`
//! 4. **Statistics**: gli esiti vengono aggregati in un unico `RunStatistics`
//! 5. **Reporting**: report finale con byte risparmiati e percentuali
//!
//! ## Gestione concorrenza:
//! - Default: un worker, elaborazione strettamente sequenziale
//! - Con `workers > 1` i file vengono elaborati in parallelo; ogni file tocca
//!   solo i propri path, quindi non c'è coordinazione oltre all'aggregazione
//!
//! ## Error handling:
//! - Errori sui singoli file non bloccano il batch
//! - Anche un panic di un worker diventa un errore contato sul suo file

use crate::{
    config::{OptimizationConfig, SiteLayout},
    file_manager::FileManager,
    image_processor::ImageProcessor,
    json_output::JsonMessage,
    optimizer::{
        path_resolver::PathResolver,
        progress_tracker::ProgressTracker,
        task_optimizer::{FileOutcome, FileReport, TaskOptimizer},
    },
    progress::RunStatistics,
};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Maximum number of rows printed by the oversized listing
pub const LIST_LIMIT: usize = 50;

/// Main batch orchestrator
pub struct BatchOptimizer {
    config: OptimizationConfig,
    resolver: PathResolver,
    task: Arc<TaskOptimizer>,
}

impl BatchOptimizer {
    /// Validates configuration and checks the imaging backend before any
    /// filesystem access.
    pub fn new(config: OptimizationConfig, layout: SiteLayout) -> Result<Self> {
        ImageProcessor::check_dependencies()?;
        config.validate()?;
        layout.validate()?;

        let resolver = PathResolver::new(layout);
        let task = Arc::new(TaskOptimizer::new(config.clone(), resolver.clone()));

        Ok(Self {
            config,
            resolver,
            task,
        })
    }

    pub fn layout(&self) -> &SiteLayout {
        self.resolver.layout()
    }

    /// Scan the source root and process every image found
    pub async fn run_batch(&self, dry_run: bool) -> Result<RunStatistics> {
        let start_time = Instant::now();
        let source_root = &self.layout().source_root;

        if !source_root.is_dir() {
            return Err(anyhow::anyhow!(
                "Source directory does not exist: {}",
                source_root.display()
            ));
        }

        let files = FileManager::scan(source_root, &self.config.extensions)?;

        if self.config.json_output {
            JsonMessage::start(source_root.clone(), files.len(), dry_run, &self.config).emit();
        } else {
            self.log_configuration(files.len(), dry_run);
        }

        let mut stats = RunStatistics::new();
        if files.is_empty() {
            info!("No images found to process");
            return Ok(stats);
        }

        let tracker = ProgressTracker::new(files.len(), self.config.json_output);

        let mut results = stream::iter(files)
            .map(|path| {
                let task = Arc::clone(&self.task);
                async move {
                    let worker = tokio::spawn({
                        let path = path.clone();
                        async move { task.process(path, dry_run).await }
                    });
                    match worker.await {
                        Ok(report) => report,
                        Err(e) => {
                            error!("Worker for {} panicked: {}", path.display(), e);
                            let size = FileManager::file_size(&path).await.unwrap_or(0);
                            FileReport::new(path, size, FileOutcome::Errored(e.to_string()))
                        }
                    }
                }
            })
            .buffer_unordered(self.config.workers);

        while let Some(report) = results.next().await {
            stats.record(&report);
            tracker.file_done(&report);
        }

        let duration = start_time.elapsed().as_secs_f64();
        tracker.finish(&stats, duration);
        if !self.config.json_output {
            self.print_final_stats(&stats, dry_run);
        }

        Ok(stats)
    }

    /// Images at or above `threshold_kb` kilobytes, largest first
    pub fn list_oversized(&self, threshold_kb: u64) -> Result<Vec<(PathBuf, u64)>> {
        FileManager::list_oversized(
            &self.layout().source_root,
            &self.config.extensions,
            threshold_kb.saturating_mul(1024),
        )
    }

    /// Human-readable listing: top entries plus a total line
    pub fn format_listing(&self, threshold_kb: u64, large: &[(PathBuf, u64)]) -> Vec<String> {
        let source_root = &self.layout().source_root;
        let mut lines = vec![
            format!("Images larger than {}KB:", threshold_kb),
            "-".repeat(60),
        ];

        for (path, size) in large.iter().take(LIST_LIMIT) {
            let relative = path.strip_prefix(source_root).unwrap_or(path);
            lines.push(format!(
                "  {:>10}  {}",
                FileManager::format_size(*size),
                relative.display()
            ));
        }

        lines.push(String::new());
        lines.push(format!("Total: {} images", large.len()));
        lines
    }

    fn log_configuration(&self, total_files: usize, dry_run: bool) {
        let layout = self.layout();
        info!("Source:     {}", layout.source_root.display());
        info!("Backup:     {}", layout.backup_root.display());
        info!("WebP:       {}", layout.webp_root.display());
        info!("Quality:    {} (WebP {})", self.config.jpeg_quality, self.config.webp_quality);
        info!("Max size:   {}x{}px", self.config.max_width, self.config.max_height);
        if self.config.responsive {
            info!("Variants:   {:?} -> {}", self.config.variant_widths, layout.responsive_root.display());
        }
        if self.config.workers > 1 {
            info!("Workers:    {}", self.config.workers);
        }
        info!("Found {} images to process", total_files);

        if dry_run {
            info!("*** DRY RUN - No changes will be made ***");
        }
    }

    fn print_final_stats(&self, stats: &RunStatistics, dry_run: bool) {
        for line in stats.format_report() {
            info!("{}", line);
        }

        if !dry_run {
            info!("Backups saved to: {}", self.layout().backup_root.display());
            info!("WebP images saved to: {}", self.layout().webp_root.display());
        }
    }
}

/// Convenience entry point: build an optimizer for `site_root` and run it
pub async fn run_batch(site_root: &Path, config: OptimizationConfig, dry_run: bool) -> Result<RunStatistics> {
    BatchOptimizer::new(config, SiteLayout::for_site(site_root))?
        .run_batch(dry_run)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn noisy_rgb(width: u32, height: u32, seed: u32) -> RgbImage {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            let b = state.to_le_bytes();
            Rgb([b[1], b[2], b[3]])
        })
    }

    fn write_jpeg(path: &Path, img: &RgbImage, quality: u8) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut buffer = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        DynamicImage::ImageRgb8(img.clone()).write_with_encoder(encoder).unwrap();
        std::fs::write(path, buffer).unwrap();
    }

    /// Every file under `root` with its contents
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().to_path_buf(), std::fs::read(e.path()).unwrap()))
            .collect()
    }

    fn site() -> (TempDir, SiteLayout) {
        let temp = TempDir::new().unwrap();
        let layout = SiteLayout::for_site(temp.path());
        std::fs::create_dir_all(&layout.source_root).unwrap();
        (temp, layout)
    }

    #[tokio::test]
    async fn test_large_jpeg_is_downscaled_backed_up_and_derived() {
        let (temp, layout) = site();
        let path = layout.source_root.join("hero.jpg");
        write_jpeg(&path, &noisy_rgb(4000, 3000, 11), 90);
        let original = std::fs::read(&path).unwrap();

        let stats = run_batch(temp.path(), OptimizationConfig::default(), false)
            .await
            .unwrap();

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.derived_created, 1);
        let replaced = image::open(&path).unwrap();
        assert!(replaced.width() <= 1920 && replaced.height() <= 1080);
        assert_eq!(std::fs::read(layout.backup_root.join("hero.jpg")).unwrap(), original);
        assert!(layout.webp_root.join("hero.webp").exists());
        assert!(stats.resulting_bytes < stats.original_bytes);
    }

    #[tokio::test]
    async fn test_small_png_left_untouched() {
        let (temp, layout) = site();
        let path = layout.source_root.join("favicon.png");
        DynamicImage::ImageRgb8(noisy_rgb(30, 30, 12)).save(&path).unwrap();
        let before = std::fs::read(&path).unwrap();
        assert!(before.len() < 10 * 1024);

        let stats = run_batch(temp.path(), OptimizationConfig::default(), false)
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.derived_created, 0);
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!layout.backup_root.exists());
        assert!(!layout.webp_root.exists());
    }

    #[tokio::test]
    async fn test_list_oversized_scenario() {
        let (temp, layout) = site();
        std::fs::write(layout.source_root.join("a.jpg"), vec![1u8; 700 * 1024]).unwrap();
        std::fs::create_dir_all(layout.source_root.join("projects")).unwrap();
        std::fs::write(layout.source_root.join("projects/b.png"), vec![2u8; 900 * 1024]).unwrap();
        std::fs::write(layout.source_root.join("c.gif"), vec![3u8; 600 * 1024]).unwrap();
        std::fs::write(layout.source_root.join("d.jpg"), vec![4u8; 100 * 1024]).unwrap();
        let before = snapshot(temp.path());

        let optimizer = BatchOptimizer::new(
            OptimizationConfig::default(),
            SiteLayout::for_site(temp.path()),
        )
        .unwrap();
        let large = optimizer.list_oversized(500).unwrap();
        let sizes: Vec<u64> = large.iter().map(|(_, s)| *s).collect();
        assert_eq!(sizes, vec![900 * 1024, 700 * 1024, 600 * 1024]);

        let lines = optimizer.format_listing(500, &large);
        assert_eq!(lines.last().unwrap(), "Total: 3 images");
        assert!(lines[2].ends_with("projects/b.png"));
        assert_eq!(snapshot(temp.path()), before);
    }

    #[tokio::test]
    async fn test_huge_listing_threshold_does_not_overflow() {
        let (temp, layout) = site();
        std::fs::write(layout.source_root.join("a.jpg"), vec![1u8; 2048]).unwrap();

        let optimizer = BatchOptimizer::new(
            OptimizationConfig::default(),
            SiteLayout::for_site(temp.path()),
        )
        .unwrap();
        let large = optimizer.list_oversized(u64::MAX).unwrap();
        assert!(large.is_empty());
        assert_eq!(optimizer.format_listing(u64::MAX, &large).last().unwrap(), "Total: 0 images");
    }

    #[tokio::test]
    async fn test_one_corrupt_file_among_ten() {
        let (temp, layout) = site();
        for i in 0..9 {
            write_jpeg(
                &layout.source_root.join(format!("gallery/photo{}.jpg", i)),
                &noisy_rgb(128, 128, 100 + i),
                100,
            );
        }
        std::fs::write(layout.source_root.join("gallery/corrupt.jpg"), vec![0xAAu8; 30 * 1024]).unwrap();

        let stats = run_batch(temp.path(), OptimizationConfig::default(), false)
            .await
            .unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_files(), 10);
        assert_eq!(stats.processed + stats.skipped, 9);
        assert_eq!(stats.derived_created, 9);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let (temp, layout) = site();
        write_jpeg(&layout.source_root.join("a.jpg"), &noisy_rgb(256, 256, 21), 100);
        write_jpeg(&layout.source_root.join("sub/b.jpg"), &noisy_rgb(2400, 200, 22), 100);
        DynamicImage::ImageRgb8(noisy_rgb(20, 20, 23))
            .save(layout.source_root.join("tiny.png"))
            .unwrap();
        let before = snapshot(temp.path());

        let stats = run_batch(temp.path(), OptimizationConfig::default(), true)
            .await
            .unwrap();

        assert_eq!(snapshot(temp.path()), before);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.original_bytes, stats.resulting_bytes);
        assert!(!layout.backup_root.exists());
        assert!(!layout.webp_root.exists());
    }

    #[tokio::test]
    async fn test_backup_survives_second_run() {
        let (temp, layout) = site();
        let path = layout.source_root.join("cover.jpg");
        write_jpeg(&path, &noisy_rgb(2400, 1200, 31), 100);
        let original = std::fs::read(&path).unwrap();

        let first = run_batch(temp.path(), OptimizationConfig::default(), false)
            .await
            .unwrap();
        assert_eq!(first.processed, 1);
        assert_ne!(std::fs::read(&path).unwrap(), original);

        let config = OptimizationConfig {
            min_savings: 0.0,
            jpeg_quality: 40,
            ..Default::default()
        };
        run_batch(temp.path(), config, false).await.unwrap();

        assert_eq!(std::fs::read(layout.backup_root.join("cover.jpg")).unwrap(), original);
    }

    #[tokio::test]
    async fn test_parallel_workers_match_sequential_totals() {
        let (temp, layout) = site();
        for i in 0..6 {
            write_jpeg(
                &layout.source_root.join(format!("p{}.jpg", i)),
                &noisy_rgb(160, 160, 200 + i),
                100,
            );
        }
        std::fs::write(layout.source_root.join("broken.png"), vec![7u8; 12 * 1024]).unwrap();

        let config = OptimizationConfig {
            workers: 4,
            ..Default::default()
        };
        let stats = run_batch(temp.path(), config, false).await.unwrap();

        assert_eq!(stats.total_files(), 7);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.derived_created, 6);
    }

    #[tokio::test]
    async fn test_missing_source_root_is_error() {
        let temp = TempDir::new().unwrap();
        let result = run_batch(temp.path(), OptimizationConfig::default(), false).await;
        assert!(result.is_err());
    }
}
