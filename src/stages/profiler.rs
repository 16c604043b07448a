//! Dataset profiling stage.
//!
//! Produces a per-column profile (type, missingness, cardinality, basic
//! stats) and a list of quality flags for columns that look problematic.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::domain::dataset::Column;
use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Profiler;

/// Columns with more than this share of missing cells get flagged.
const MISSING_FLAG_THRESHOLD: f64 = 0.5;

fn column_profile(column: &Column, rows: usize) -> serde_json::Value {
    let missing = column.missing_count();
    let missing_pct = if rows > 0 {
        missing as f64 / rows as f64 * 100.0
    } else {
        0.0
    };
    let mut profile = json!({
        "name": column.name,
        "type": column.column_type.to_string(),
        "missing_count": missing,
        "missing_pct": missing_pct,
        "unique_count": column.unique_count(),
    });
    if column.is_numeric() {
        profile["mean"] = json!(column.mean());
        profile["std_dev"] = json!(column.std_dev());
        profile["min"] = json!(column.min());
        profile["max"] = json!(column.max());
    } else {
        profile["mode"] = json!(column.mode());
    }
    profile
}

fn quality_flags(column: &Column, rows: usize) -> Vec<String> {
    let mut flags = Vec::new();
    let missing = column.missing_count();
    if rows > 0 {
        let ratio = missing as f64 / rows as f64;
        if ratio > MISSING_FLAG_THRESHOLD {
            flags.push(format!(
                "{}: MISSING_VALUES({:.1}%)",
                column.name,
                ratio * 100.0
            ));
        }
    }
    let unique = column.unique_count();
    let non_missing = rows - missing;
    if non_missing > 1 && unique == 1 {
        flags.push(format!("{}: CONSTANT_COLUMN", column.name));
    }
    if non_missing > 1 && unique == non_missing {
        let name = column.name.to_lowercase();
        if name == "id" || name.ends_with("_id") || name.starts_with("id_") {
            flags.push(format!("{}: ID_CANDIDATE", column.name));
        }
    }
    flags
}

#[async_trait]
impl StageHandler for Profiler {
    fn id(&self) -> StageId {
        StageId::Profiling
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let dataset = ctx.data.current()?;
        let rows = dataset.row_count();
        let column_count = dataset.column_count();
        let total_missing = dataset.total_missing();

        let profiles: Vec<serde_json::Value> = dataset
            .columns()
            .iter()
            .map(|c| column_profile(c, rows))
            .collect();
        let flags: Vec<String> = dataset
            .columns()
            .iter()
            .flat_map(|c| quality_flags(c, rows))
            .collect();

        debug!(columns = column_count, flags = flags.len(), "profiled dataset");

        let summary_report = json!({
            "rows": rows,
            "columns": column_count,
            "total_missing": total_missing,
            "column_profiles": profiles,
        });
        ctx.data.set_metadata(
            MetadataKey::ProfilingSummary,
            MetadataValue::Report(summary_report.clone()),
        )?;
        ctx.data
            .set_metadata(MetadataKey::QualityFlags, MetadataValue::Flags(flags.clone()))?;

        Ok(StageOutput {
            stage: StageId::Profiling,
            summary: format!(
                "Profiled {} columns x {} rows; {} quality flags",
                column_count,
                rows,
                flags.len()
            ),
            details: json!({ "profile": summary_report, "quality_flags": flags }),
            files: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{ColumnType, Dataset, Value};
    use crate::store::{DatasetStore, ModelRegistry};
    use std::collections::HashMap;

    fn store_with(columns: Vec<Column>) -> DatasetStore {
        let mut store = DatasetStore::new();
        store.initialize(Dataset::new(columns).unwrap()).unwrap();
        store
    }

    #[tokio::test]
    async fn test_flags_mostly_missing_and_constant_columns() {
        let mut store = store_with(vec![
            Column::new(
                "sparse",
                ColumnType::Numeric,
                vec![
                    Value::Number(1.0),
                    Value::Missing,
                    Value::Missing,
                    Value::Missing,
                ],
            ),
            Column::new(
                "fixed",
                ColumnType::Categorical,
                vec![
                    Value::Text("x".into()),
                    Value::Text("x".into()),
                    Value::Text("x".into()),
                    Value::Text("x".into()),
                ],
            ),
        ]);
        let mut models = ModelRegistry::new();
        let ctx = StageContext {
            data: &mut store,
            models: &mut models,
            output_dir: std::path::Path::new("."),
            target_override: None,
            deps: HashMap::new(),
        };

        let output = Profiler.execute(ctx).await.unwrap();
        assert_eq!(output.stage, StageId::Profiling);

        let flags = match store.get_metadata(MetadataKey::QualityFlags) {
            Some(MetadataValue::Flags(flags)) => flags.clone(),
            other => panic!("unexpected metadata: {:?}", other),
        };
        assert!(flags.iter().any(|f| f.contains("MISSING_VALUES(75.0%)")));
        assert!(flags.iter().any(|f| f == "fixed: CONSTANT_COLUMN"));
    }

    #[tokio::test]
    async fn test_id_column_flagged() {
        let mut store = store_with(vec![Column::new(
            "user_id",
            ColumnType::Numeric,
            vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)],
        )]);
        let mut models = ModelRegistry::new();
        let ctx = StageContext {
            data: &mut store,
            models: &mut models,
            output_dir: std::path::Path::new("."),
            target_override: None,
            deps: HashMap::new(),
        };

        Profiler.execute(ctx).await.unwrap();
        let flags = match store.get_metadata(MetadataKey::QualityFlags) {
            Some(MetadataValue::Flags(flags)) => flags.clone(),
            other => panic!("unexpected metadata: {:?}", other),
        };
        assert!(flags.iter().any(|f| f == "user_id: ID_CANDIDATE"));
    }
}
