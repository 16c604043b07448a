//! Data cleaning stage.
//!
//! Detects outliers with the IQR rule, then repairs missing values: mean
//! fill for numeric columns, mode fill for everything else. Each repaired
//! column gets one audit entry with before/after summaries. Columns without
//! a computable fill value (entirely missing) are left for the end-of-run
//! fallback pass.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::domain::changelog::{
    ChangeAction, ChangeEntry, ColumnSummary, ImputeMethod, SAMPLE_INDEX_CAP,
};
use crate::domain::dataset::{Column, Dataset, Value};
use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Cleaner;

/// IQR whisker multiplier.
const IQR_FACTOR: f64 = 1.5;

fn outlier_report(dataset: &Dataset) -> serde_json::Value {
    let mut per_column = Vec::new();
    for col in dataset.numeric_columns() {
        let (q1, q3) = match (col.quantile(0.25), col.quantile(0.75)) {
            (Some(q1), Some(q3)) => (q1, q3),
            _ => continue,
        };
        let iqr = q3 - q1;
        let lower = q1 - IQR_FACTOR * iqr;
        let upper = q3 + IQR_FACTOR * iqr;
        let outliers: Vec<usize> = col
            .values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_number().map(|n| (i, n)))
            .filter(|(_, n)| *n < lower || *n > upper)
            .map(|(i, _)| i)
            .collect();
        per_column.push(json!({
            "column": col.name,
            "lower_bound": lower,
            "upper_bound": upper,
            "outlier_count": outliers.len(),
            "outlier_rows": outliers.iter().take(SAMPLE_INDEX_CAP).collect::<Vec<_>>(),
        }));
    }
    json!({ "method": "iqr", "factor": IQR_FACTOR, "columns": per_column })
}

/// The fill value and method for one column, if computable. Mode fills are
/// parsed back into the column's value type so boolean and datetime columns
/// keep typed cells.
fn fill_plan(column: &Column) -> Option<(Value, ImputeMethod, String)> {
    if column.is_numeric() {
        let mean = column.mean()?;
        Some((Value::Number(mean), ImputeMethod::Mean, format!("{:.4}", mean)))
    } else {
        let mode = column.mode()?;
        let fill = match crate::io::parse_cell(&mode, column.column_type) {
            Value::Missing => Value::Text(mode.clone()),
            typed => typed,
        };
        Some((fill, ImputeMethod::Mode, mode))
    }
}

#[async_trait]
impl StageHandler for Cleaner {
    fn id(&self) -> StageId {
        StageId::Cleaning
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let outliers = outlier_report(ctx.data.current()?);
        ctx.data.set_metadata(
            MetadataKey::OutlierReport,
            MetadataValue::Report(outliers.clone()),
        )?;

        let mut repaired = ctx.data.current()?.clone();
        let mut entries: Vec<ChangeEntry> = Vec::new();
        let mut descriptions: Vec<String> = Vec::new();

        for col in repaired.columns_mut() {
            let missing = col.missing_indices();
            if missing.is_empty() {
                continue;
            }
            let (fill, method, rendered) = match fill_plan(col) {
                Some(plan) => plan,
                None => {
                    debug!(column = %col.name, "no fill value computable, deferring");
                    continue;
                }
            };
            let before = ColumnSummary::of(col);
            for &i in &missing {
                col.values[i] = fill.clone();
            }
            let after = ColumnSummary::of(col);
            descriptions.push(format!(
                "filled {} missing values in '{}' with {} ({})",
                missing.len(),
                col.name,
                method,
                rendered
            ));
            entries.push(ChangeEntry {
                column: col.name.clone(),
                action: ChangeAction::Impute,
                method: Some(method),
                value_used: rendered,
                affected_rows: missing.len(),
                sample_indices: missing.iter().take(SAMPLE_INDEX_CAP).copied().collect(),
                before,
                after,
                reason: "automatic missing-value repair".to_string(),
                timestamp: Utc::now(),
            });
        }

        let repaired_columns = entries.len();
        if repaired_columns > 0 {
            for entry in entries {
                ctx.data.record_change(entry)?;
            }
            ctx.data
                .replace_current(repaired, descriptions.join("; "))?;
        }

        info!(repaired_columns, "cleaning complete");

        Ok(StageOutput {
            stage: StageId::Cleaning,
            summary: format!("Repaired missing values in {} columns", repaired_columns),
            details: json!({
                "repaired_columns": repaired_columns,
                "outlier_report": outliers,
                "remaining_missing": ctx.data.current()?.total_missing(),
            }),
            files: Vec::new(),
        })
    }
}
