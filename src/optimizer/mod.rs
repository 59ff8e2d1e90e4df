//! # Optimizer Module
//!
//! Separa le responsabilità in sottomoduli:
//! - `batch_optimizer`: Orchestratore principale
//! - `task_optimizer`: Worker per singoli file
//! - `progress_tracker`: Progress bar o eventi JSON
//! - `path_resolver`: Calcolo dei path derivati (backup, WebP, varianti)

pub mod batch_optimizer;
pub mod task_optimizer;
pub mod progress_tracker;
pub mod path_resolver;

pub use batch_optimizer::{run_batch, BatchOptimizer};
pub use task_optimizer::{FileOutcome, FileReport, TaskOptimizer};
pub use progress_tracker::ProgressTracker;
pub use path_resolver::PathResolver;
