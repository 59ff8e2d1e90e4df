//! # Progress Tracking Module
//!
//! Unifica progress bar e output JSON. Le statistiche vengono aggregate
//! in un solo punto (l'orchestratore), quindi il tracker non ha stato condiviso.

use crate::{
    json_output::JsonMessage,
    optimizer::task_optimizer::{FileOutcome, FileReport},
    progress::{ProgressManager, RunStatistics},
};

/// Reports per-file completion either as a progress bar or as JSON events
pub struct ProgressTracker {
    json_output: bool,
    progress_manager: Option<ProgressManager>,
}

impl ProgressTracker {
    pub fn new(total_files: usize, json_output: bool) -> Self {
        let progress_manager = (!json_output).then(|| ProgressManager::new(total_files as u64));
        Self {
            json_output,
            progress_manager,
        }
    }

    /// Emit the completion of one file
    pub fn file_done(&self, report: &FileReport) {
        if self.json_output {
            JsonMessage::file_complete(report).emit();
            return;
        }

        if let Some(ref bar) = self.progress_manager {
            bar.update(&Self::status_line(report));
        }
    }

    pub fn finish(&self, stats: &RunStatistics, duration_seconds: f64) {
        if self.json_output {
            JsonMessage::complete(stats, duration_seconds).emit();
        } else if let Some(ref bar) = self.progress_manager {
            bar.finish(&stats.format_summary());
        }
    }

    fn status_line(report: &FileReport) -> String {
        let name = report
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();

        match &report.outcome {
            FileOutcome::Replaced { new_size } => {
                let saved = crate::file_manager::FileManager::fractional_savings(report.original_size, *new_size);
                format!("[OK] {}: {:.1}% saved", name, saved * 100.0)
            }
            FileOutcome::KeptOriginal { .. } => format!("[KEEP] {}: savings too small", name),
            FileOutcome::SkippedTooSmall => format!("[SKIP] {}: too small", name),
            FileOutcome::NotOptimizable => format!("[SKIP] {}: webp only", name),
            FileOutcome::Processed => format!("[DRY] {}", name),
            FileOutcome::Errored(_) => format!("[ERROR] {}: error", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_line() {
        let report = FileReport::new(
            PathBuf::from("assets/img/hero.jpg"),
            1000,
            FileOutcome::Replaced { new_size: 250 },
        );
        assert_eq!(ProgressTracker::status_line(&report), "[OK] hero.jpg: 75.0% saved");

        let report = FileReport::new(
            PathBuf::from("assets/img/bad.png"),
            1000,
            FileOutcome::Errored("x".into()),
        );
        assert_eq!(ProgressTracker::status_line(&report), "[ERROR] bad.png: error");
    }
}
