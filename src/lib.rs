//! # Portfolio Image Optimizer Library
//!
//! Modulo principale della libreria che espone le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per gli script di build
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione, validazione parametri e layout delle directory
//! - `error`: Tipi di errore custom
//! - `file_manager`: Discovery immagini, backup e scritture atomiche
//! - `image_processor`: Decodifica e ricodifica (JPEG/PNG/WebP)
//! - `resize`: Ridimensionamento e varianti responsive
//! - `optimizer`: Orchestratore del batch e worker per file
//! - `progress`: Progress bar e statistiche
//! - `json_output`: Eventi JSON per uso programmatico
//!
//! ## Utilizzo:
//! ```no_run
//! use portfolio_image_optimizer::{BatchOptimizer, OptimizationConfig, SiteLayout};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let layout = SiteLayout::for_site(std::path::Path::new("."));
//! let optimizer = BatchOptimizer::new(OptimizationConfig::default(), layout)?;
//! let stats = optimizer.run_batch(false).await?;
//! println!("{}", stats.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod resize;

pub use config::{OptimizationConfig, SiteLayout};
pub use error::OptimizeError;
pub use optimizer::{run_batch, BatchOptimizer, FileOutcome, FileReport};
pub use progress::RunStatistics;
