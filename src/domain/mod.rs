//! Core domain types: dataset snapshots, audit records, stage metadata,
//! and the trained-model record.

pub mod changelog;
pub mod dataset;
pub mod metadata;
pub mod model;

pub use changelog::{ChangeAction, ChangeEntry, ColumnSummary, ImputeMethod};
pub use dataset::{Column, ColumnType, Dataset, Value};
pub use metadata::{MetadataKey, MetadataValue};
pub use model::{ModelMetrics, ModelRecord, ProblemType};
