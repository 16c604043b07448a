//! End-of-run consistency pass.
//!
//! The export contract promises a dataset with zero missing values, even
//! when the cleaning stage could not compute a fill for some column.
//! This pass sweeps whatever is left: mean (or 0.0) for numeric columns,
//! mode (or a literal "Unknown") for everything else, each fill audited
//! like any other change.

use chrono::Utc;
use tracing::info;

use crate::domain::changelog::{ChangeAction, ChangeEntry, ColumnSummary, SAMPLE_INDEX_CAP};
use crate::domain::dataset::Value;
use crate::error::ExedaError;
use crate::store::DatasetStore;

/// Placeholder for non-numeric columns with no observable mode.
const UNKNOWN_PLACEHOLDER: &str = "Unknown";

/// Impute every remaining missing value in the current snapshot, appending
/// one `FallbackImpute` entry per repaired column. Returns the number of
/// columns repaired. Running it twice is a no-op the second time.
pub fn fallback_consistency_pass(store: &mut DatasetStore) -> Result<usize, ExedaError> {
    let mut dataset = store.current()?.clone();
    let mut entries = Vec::new();
    let mut descriptions = Vec::new();

    for col in dataset.columns_mut() {
        let missing = col.missing_indices();
        if missing.is_empty() {
            continue;
        }
        let (fill, rendered) = if col.is_numeric() {
            let value = col.mean().unwrap_or(0.0);
            (Value::Number(value), format!("{:.4}", value))
        } else {
            match col.mode() {
                // Parse the mode back into the column's value type so typed
                // columns stay typed after the fill.
                Some(mode) => {
                    let fill = match crate::io::parse_cell(&mode, col.column_type) {
                        Value::Missing => Value::Text(mode.clone()),
                        typed => typed,
                    };
                    (fill, mode)
                }
                None => (
                    Value::Text(UNKNOWN_PLACEHOLDER.to_string()),
                    UNKNOWN_PLACEHOLDER.to_string(),
                ),
            }
        };

        let before = ColumnSummary::of(col);
        for &i in &missing {
            col.values[i] = fill.clone();
        }
        let after = ColumnSummary::of(col);

        descriptions.push(format!(
            "fallback-filled {} missing values in '{}' with {}",
            missing.len(),
            col.name,
            rendered
        ));
        entries.push(ChangeEntry {
            column: col.name.clone(),
            action: ChangeAction::FallbackImpute,
            method: None,
            value_used: rendered,
            affected_rows: missing.len(),
            sample_indices: missing.iter().take(SAMPLE_INDEX_CAP).copied().collect(),
            before,
            after,
            reason: "consistency pass before export".to_string(),
            timestamp: Utc::now(),
        });
    }

    let repaired = entries.len();
    if repaired > 0 {
        for entry in entries {
            store.record_change(entry)?;
        }
        store.replace_current(dataset, descriptions.join("; "))?;
        info!(columns = repaired, "fallback consistency pass repaired columns");
    }
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{Column, ColumnType, Dataset};

    fn store_with_gaps() -> DatasetStore {
        let mut store = DatasetStore::new();
        store
            .initialize(
                Dataset::new(vec![
                    Column::new(
                        "age",
                        ColumnType::Numeric,
                        vec![Value::Number(10.0), Value::Missing, Value::Number(30.0)],
                    ),
                    Column::new(
                        "label",
                        ColumnType::Categorical,
                        vec![Value::Missing, Value::Missing, Value::Missing],
                    ),
                ])
                .unwrap(),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_fills_leftovers_and_logs() {
        let mut store = store_with_gaps();
        let repaired = fallback_consistency_pass(&mut store).unwrap();
        assert_eq!(repaired, 2);

        let current = store.current().unwrap();
        assert_eq!(current.total_missing(), 0);
        assert_eq!(
            current.column("age").unwrap().values[1],
            Value::Number(20.0)
        );
        assert_eq!(
            current.column("label").unwrap().values[0],
            Value::Text("Unknown".into())
        );
        assert!(store
            .change_log()
            .iter()
            .all(|e| e.action == ChangeAction::FallbackImpute));
    }

    #[test]
    fn test_typed_columns_stay_typed_after_fill() {
        use chrono::TimeZone;
        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let mut store = DatasetStore::new();
        store
            .initialize(
                Dataset::new(vec![Column::new(
                    "joined",
                    ColumnType::Datetime,
                    vec![Value::Timestamp(ts), Value::Timestamp(ts), Value::Missing],
                )])
                .unwrap(),
            )
            .unwrap();

        fallback_consistency_pass(&mut store).unwrap();
        assert_eq!(
            store.current().unwrap().column("joined").unwrap().values[2],
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let mut store = store_with_gaps();
        fallback_consistency_pass(&mut store).unwrap();
        let log_len = store.change_log().len();

        let repaired = fallback_consistency_pass(&mut store).unwrap();
        assert_eq!(repaired, 0);
        assert_eq!(store.change_log().len(), log_len);
    }
}
