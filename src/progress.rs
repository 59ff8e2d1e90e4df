//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di un'esecuzione.
//!
//! ## Componenti principali:
//! - `ProgressManager`: progress bar `indicatif` con messaggio per ogni file
//! - `RunStatistics`: accumulatore creato a inizio run, aggiornato una volta per
//!   file e letto alla fine per il report
//!
//! ## Statistiche tracciate:
//! - **processed**: file sostituiti (o che lo sarebbero, in dry-run)
//! - **skipped**: file troppo piccoli, risparmio insufficiente o formato non ricodificabile
//! - **errors**: file illeggibili o falliti durante la ricodifica/scrittura
//! - **derived_created**: copie WebP scritte
//! - **variants_created**: varianti responsive scritte
//! - **original_bytes** / **resulting_bytes**: totali prima e dopo
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 31/50 (62%) [OK] hero.jpg: 41.3% saved
//! ```

use crate::file_manager::FileManager;
use crate::optimizer::task_optimizer::{FileOutcome, FileReport};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Manages progress reporting for a batch run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Aggregate counters for one invocation
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub derived_created: usize,
    pub variants_created: usize,
    pub original_bytes: u64,
    pub resulting_bytes: u64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file's result into the totals
    pub fn record(&mut self, report: &FileReport) {
        self.original_bytes += report.original_size;

        match &report.outcome {
            FileOutcome::Replaced { new_size } => {
                self.processed += 1;
                self.resulting_bytes += new_size;
            }
            FileOutcome::Processed => {
                self.processed += 1;
                self.resulting_bytes += report.original_size;
            }
            FileOutcome::SkippedTooSmall
            | FileOutcome::KeptOriginal { .. }
            | FileOutcome::NotOptimizable => {
                self.skipped += 1;
                self.resulting_bytes += report.original_size;
            }
            FileOutcome::Errored(_) => {
                self.errors += 1;
                self.resulting_bytes += report.original_size;
            }
        }

        if report.derived_created {
            self.derived_created += 1;
        }
        self.variants_created += report.variants_created;
    }

    pub fn total_files(&self) -> usize {
        self.processed + self.skipped + self.errors
    }

    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.resulting_bytes)
    }

    pub fn savings_percent(&self) -> f64 {
        if self.original_bytes > 0 {
            (self.bytes_saved() as f64 / self.original_bytes as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} | Skipped: {} | Errors: {} | WebP: {} | Total saved: {} ({:.1}%)",
            self.processed,
            self.skipped,
            self.errors,
            self.derived_created,
            FileManager::format_size(self.bytes_saved()),
            self.savings_percent()
        )
    }

    /// Multi-line end-of-run report
    pub fn format_report(&self) -> Vec<String> {
        let mut lines = vec![
            "=== Optimization Report ===".to_string(),
            format!("Images processed: {}", self.processed),
            format!("Images skipped:   {}", self.skipped),
            format!("Errors:           {}", self.errors),
            format!("WebP created:     {}", self.derived_created),
        ];

        if self.variants_created > 0 {
            lines.push(format!("Variants created: {}", self.variants_created));
        }

        if self.original_bytes > 0 {
            lines.push(format!("Original size:  {}", FileManager::format_size(self.original_bytes)));
            lines.push(format!("New size:       {}", FileManager::format_size(self.resulting_bytes)));
            lines.push(format!(
                "Total savings:  {} ({:.1}%)",
                FileManager::format_size(self.bytes_saved()),
                self.savings_percent()
            ));
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report(outcome: FileOutcome, original_size: u64, derived: bool) -> FileReport {
        FileReport {
            path: PathBuf::from("assets/img/x.jpg"),
            original_size,
            outcome,
            derived_created: derived,
            variants_created: 0,
        }
    }

    #[test]
    fn test_record_accounting() {
        let mut stats = RunStatistics::new();
        stats.record(&report(FileOutcome::Replaced { new_size: 400 }, 1000, true));
        stats.record(&report(FileOutcome::KeptOriginal { candidate_size: 950 }, 1000, true));
        stats.record(&report(FileOutcome::SkippedTooSmall, 500, false));
        stats.record(&report(FileOutcome::Errored("corrupt".into()), 2000, false));

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.derived_created, 2);
        assert_eq!(stats.original_bytes, 4500);
        assert_eq!(stats.resulting_bytes, 3900);
        assert_eq!(stats.bytes_saved(), 600);
        assert_eq!(stats.total_files(), 4);
    }

    #[test]
    fn test_dry_run_outcome_counts_as_processed() {
        let mut stats = RunStatistics::new();
        stats.record(&report(FileOutcome::Processed, 1000, false));
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.resulting_bytes, 1000);
        assert_eq!(stats.savings_percent(), 0.0);
    }

    #[test]
    fn test_empty_report_has_no_size_lines() {
        let stats = RunStatistics::new();
        let report = stats.format_report();
        assert!(report.iter().all(|line| !line.contains("Original size")));
        assert_eq!(stats.savings_percent(), 0.0);
    }

    #[test]
    fn test_summary_format() {
        let mut stats = RunStatistics::new();
        stats.record(&report(FileOutcome::Replaced { new_size: 500 }, 1000, true));
        assert_eq!(
            stats.format_summary(),
            "Processed: 1 | Skipped: 0 | Errors: 0 | WebP: 1 | Total saved: 500.0 B (50.0%)"
        );
    }
}
