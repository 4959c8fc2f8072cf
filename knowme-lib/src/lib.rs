//! # KnowMe Library
//!
//! Batch lookups of identifiers (document numbers) against per-record
//! verification services, under a fixed bound on requests in flight.
//!
//! A [`BatchRunner`] owns one run: it opens a shared HTTP session, spawns a
//! gated task per identifier, and collects the classified rows in the order
//! the lookups finish while reporting progress after each one. A failed
//! lookup becomes an `Error` row; only a failure to open the session aborts
//! the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use knowme_lib::{BatchRunner, DefuncionesConfig, DefuncionesService, ProgressState};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DefuncionesConfig::new("https://validity.example/consulta")
//!         .with_max_concurrent(50)
//!         .with_ip_interval(100)
//!         .with_timeout(Duration::from_secs(10));
//!     let mut runner = BatchRunner::new(DefuncionesService::new(config)?);
//!
//!     let ids = vec!["1020304050".to_string()];
//!     let table = runner.run(&ids, |p: ProgressState| eprintln!("{}", p)).await?;
//!     for row in &table {
//!         println!("{} -> {}", row.documento, row.vigencia);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Services
//!
//! - **defunciones**: document validity; rotates a synthetic source address
//!   every `ip_interval` identifiers
//! - **deudores**: debtor status; limits per-host connections instead

pub use address::{AddressRotator, AddressSource};
pub use config::{
    load_env_config, load_env_config_from, parse_timeout_string, resolve_defunciones,
    resolve_deudores, ConfigManager, EnvConfig, FileConfig, ServiceSection,
    MAX_CONCURRENCY_LIMIT,
};
pub use error::KnowMeError;
pub use export::{default_export_name, to_csv_string, to_json_string, write_csv};
pub use gate::{Admission, ConcurrencyGate};
pub use input::{
    load_identifiers, parse_lines, parse_single_column_csv, parse_single_column_range,
};
pub use runner::{plan_jobs, BatchRunner};
pub use services::{
    Classifier, DebtorRecord, DebtorStatus, DefuncionesService, DeudoresService, ValidityRecord,
    Vigencia,
};
pub use types::{
    BatchJob, DefuncionesConfig, DeudoresConfig, Identifier, NoProgress, OutcomeKind,
    ProgressSink, ProgressState, ResultRow, ResultTable, ServiceKind, SyntheticAddress,
};

pub mod services;

mod address;
mod config;
mod error;
mod export;
mod gate;
mod input;
mod runner;
mod types;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, KnowMeError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
