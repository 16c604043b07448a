//! exeda - automated, explainable exploratory data analysis
//!
//! A fixed sequence of analysis stages runs over one shared tabular
//! dataset: profile, clean, visualize, analyze, recommend, train, explain,
//! report. Every repair applied to the data is captured in an audit log the
//! final report renders verbatim.
//!
//! # Architecture
//!
//! - One `DatasetStore` per run holds the immutable original snapshot, the
//!   current working snapshot, the change log, and typed stage metadata
//! - Stages implement `StageHandler` and receive the outputs of their
//!   declared dependencies; transient failures are retried per stage
//! - A lock-protected `ProgressTracker` lets pollers observe the run; the
//!   orchestrator mirrors it to `status.json` after every transition
//! - Before export, a fallback pass imputes anything the cleaning stage
//!   could not, so `cleaned_data.csv` never contains missing values
//!
//! # Modules
//!
//! - `domain`: dataset, change log, metadata, and model record types
//! - `store`: per-run dataset store and model registry
//! - `stages`: the handler trait and the eight built-in stages
//! - `pipeline`: orchestrator, retry policy, fallback pass
//! - `progress`: shared run state machine
//! - `io`: CSV ingestion and export
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Analyze a CSV file
//! exeda run data.csv --output results
//!
//! # Check run status
//! exeda status --output results
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod stages;
pub mod store;

// Re-export main types at crate root for convenience
pub use domain::{ChangeAction, ChangeEntry, Column, ColumnType, Dataset, Value};
pub use error::ExedaError;
pub use pipeline::{fallback_consistency_pass, Orchestrator, RetryPolicy, RunOutcome, RunReport};
pub use progress::{ProgressTracker, RunStatus, StatusSnapshot};
pub use stages::{StageContext, StageHandler, StageId, StageOutput};
pub use store::{DatasetStore, ModelRegistry};
