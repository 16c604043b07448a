//! Audit records for dataset mutations.
//!
//! Every repair the pipeline applies to the dataset is captured as a
//! `ChangeEntry`: which column, what was done, the fill value, how many rows
//! were touched, and a before/after statistical summary. The report stage
//! renders these verbatim as the decision audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::dataset::Column;
use crate::error::ExedaError;

/// Maximum number of row indices kept as a sample on each entry.
pub const SAMPLE_INDEX_CAP: usize = 10;

/// What kind of mutation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Missing values filled during the cleaning stage.
    Impute,
    /// Rows or a column removed.
    Drop,
    /// Missing values filled by the end-of-run consistency pass.
    FallbackImpute,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeAction::Impute => "impute",
            ChangeAction::Drop => "drop",
            ChangeAction::FallbackImpute => "fallback_impute",
        };
        write!(f, "{}", s)
    }
}

/// Strategy used to pick the fill value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeMethod {
    Mean,
    Median,
    Mode,
}

impl std::fmt::Display for ImputeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImputeMethod::Mean => "mean",
            ImputeMethod::Median => "median",
            ImputeMethod::Mode => "mode",
        };
        write!(f, "{}", s)
    }
}

/// Compact statistical snapshot of one column, taken before and after a
/// mutation so the report can show cleaning impact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub missing_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ColumnSummary {
    pub fn of(column: &Column) -> Self {
        if column.is_numeric() {
            Self {
                missing_count: column.missing_count(),
                mean: column.mean(),
                median: column.median(),
                std_dev: column.std_dev(),
                mode: None,
            }
        } else {
            Self {
                missing_count: column.missing_count(),
                mean: None,
                median: None,
                std_dev: None,
                mode: column.mode(),
            }
        }
    }
}

/// One audited dataset mutation. Append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub column: String,
    pub action: ChangeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ImputeMethod>,
    pub value_used: String,
    pub affected_rows: usize,
    /// At most `SAMPLE_INDEX_CAP` of the affected row indices.
    pub sample_indices: Vec<usize>,
    pub before: ColumnSummary,
    pub after: ColumnSummary,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEntry {
    /// Shape checks applied before an entry enters the log.
    pub fn validate(&self) -> Result<(), ExedaError> {
        if self.column.trim().is_empty() {
            return Err(ExedaError::Validation(
                "change entry has an empty column name".to_string(),
            ));
        }
        if self.sample_indices.len() > self.affected_rows {
            return Err(ExedaError::Validation(format!(
                "change entry for '{}' samples {} indices but affects only {} rows",
                self.column,
                self.sample_indices.len(),
                self.affected_rows
            )));
        }
        if self.sample_indices.len() > SAMPLE_INDEX_CAP {
            return Err(ExedaError::Validation(format!(
                "change entry for '{}' carries {} sample indices, cap is {}",
                self.column,
                self.sample_indices.len(),
                SAMPLE_INDEX_CAP
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{ColumnType, Value};

    fn entry(column: &str, affected: usize, samples: Vec<usize>) -> ChangeEntry {
        let col = Column::new(
            column,
            ColumnType::Numeric,
            vec![Value::Number(1.0), Value::Missing],
        );
        ChangeEntry {
            column: column.to_string(),
            action: ChangeAction::Impute,
            method: Some(ImputeMethod::Mean),
            value_used: "1.0".to_string(),
            affected_rows: affected,
            sample_indices: samples,
            before: ColumnSummary::of(&col),
            after: ColumnSummary::of(&col),
            reason: "test".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_valid_entry_passes() {
        assert!(entry("age", 3, vec![0, 1, 2]).validate().is_ok());
    }

    #[test]
    fn test_empty_column_rejected() {
        let result = entry("  ", 1, vec![0]).validate();
        assert!(matches!(result, Err(ExedaError::Validation(_))));
    }

    #[test]
    fn test_sample_larger_than_affected_rejected() {
        let result = entry("age", 1, vec![0, 1]).validate();
        assert!(matches!(result, Err(ExedaError::Validation(_))));
    }

    #[test]
    fn test_summary_of_numeric_column_carries_stats() {
        let col = Column::new(
            "x",
            ColumnType::Numeric,
            vec![Value::Number(2.0), Value::Number(4.0), Value::Missing],
        );
        let summary = ColumnSummary::of(&col);
        assert_eq!(summary.missing_count, 1);
        assert_eq!(summary.mean, Some(3.0));
        assert!(summary.mode.is_none());
    }
}
