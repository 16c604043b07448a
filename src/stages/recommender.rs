//! Model recommendation stage.
//!
//! Picks a target column (caller override or heuristic), classifies the
//! prediction problem, and emits ranked model suggestions with reasoning.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::domain::dataset::{Column, Dataset};
use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::domain::model::ProblemType;
use crate::error::ExedaError;
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Recommender;

/// Numeric columns with more distinct values than this are treated as
/// continuous targets.
const REGRESSION_UNIQUE_THRESHOLD: usize = 10;

/// Categorical targets with more classes than this are not suggested.
const MAX_TARGET_CLASSES: usize = 10;

/// Target heuristic: binary column first, then a low-cardinality
/// categorical, then the last numeric column.
fn pick_target(dataset: &Dataset) -> Option<&Column> {
    if let Some(col) = dataset.columns().iter().find(|c| c.unique_count() == 2) {
        return Some(col);
    }
    if let Some(col) = dataset.columns().iter().find(|c| {
        !c.is_numeric() && (2..=MAX_TARGET_CLASSES).contains(&c.unique_count())
    }) {
        return Some(col);
    }
    dataset.numeric_columns().into_iter().last()
}

fn classify_problem(target: &Column) -> ProblemType {
    if target.is_numeric() && target.unique_count() > REGRESSION_UNIQUE_THRESHOLD {
        ProblemType::Regression
    } else {
        ProblemType::Classification
    }
}

fn suggestions(problem: ProblemType, rows: usize) -> Vec<serde_json::Value> {
    let small = rows < 1000;
    match problem {
        ProblemType::Classification => vec![
            json!({
                "rank": 1,
                "model": "logistic_regression",
                "reason": "interpretable baseline for classification; coefficients map directly to feature effects",
            }),
            json!({
                "rank": 2,
                "model": "random_forest_classifier",
                "reason": "handles non-linear interactions and mixed feature types without scaling",
            }),
            json!({
                "rank": 3,
                "model": "gradient_boosting_classifier",
                "reason": if small {
                    "strong accuracy on tabular data, though prone to overfitting on small samples"
                } else {
                    "strong accuracy on tabular data at this sample size"
                },
            }),
        ],
        ProblemType::Regression => vec![
            json!({
                "rank": 1,
                "model": "linear_regression",
                "reason": "interpretable baseline for continuous targets",
            }),
            json!({
                "rank": 2,
                "model": "random_forest_regressor",
                "reason": "captures non-linear relationships without feature engineering",
            }),
            json!({
                "rank": 3,
                "model": "gradient_boosting_regressor",
                "reason": "typically the strongest tabular regressor once tuned",
            }),
        ],
    }
}

#[async_trait]
impl StageHandler for Recommender {
    fn id(&self) -> StageId {
        StageId::Recommendation
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let (target_name, problem, chosen_by) = {
            let dataset = ctx.data.current()?;
            match ctx.target_override {
                Some(name) => {
                    let col = dataset
                        .column(name)
                        .ok_or_else(|| ExedaError::UnknownColumn(name.to_string()))?;
                    (col.name.clone(), classify_problem(col), "caller override")
                }
                None => match pick_target(dataset) {
                    Some(col) => (col.name.clone(), classify_problem(col), "heuristic"),
                    None => {
                        // No usable target at all; training will skip.
                        return Ok(StageOutput {
                            stage: StageId::Recommendation,
                            summary: "No suitable target column found; model training will be skipped"
                                .to_string(),
                            details: json!({ "target": null }),
                            files: Vec::new(),
                        });
                    }
                },
            }
        };

        let rows = ctx.data.current()?.row_count();
        let ranked = suggestions(problem, rows);
        let report = json!({
            "target": target_name,
            "chosen_by": chosen_by,
            "problem_type": problem.to_string(),
            "suggestions": ranked,
        });

        ctx.data.set_metadata(
            MetadataKey::ModelRecommendations,
            MetadataValue::Report(report.clone()),
        )?;
        ctx.data.set_metadata(
            MetadataKey::TargetColumn,
            MetadataValue::ColumnName(target_name.clone()),
        )?;
        ctx.data.set_metadata(
            MetadataKey::ProblemType,
            MetadataValue::Label(problem.to_string()),
        )?;

        info!(target = %target_name, problem = %problem, "recommendation ready");

        Ok(StageOutput {
            stage: StageId::Recommendation,
            summary: format!(
                "Recommended {} models for target '{}' ({})",
                problem, target_name, chosen_by
            ),
            details: report,
            files: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{ColumnType, Value};
    use crate::store::{DatasetStore, ModelRegistry};
    use std::collections::HashMap;

    fn dataset_with_binary() -> Dataset {
        Dataset::new(vec![
            Column::new(
                "income",
                ColumnType::Numeric,
                (0..12).map(|i| Value::Number(1000.0 + i as f64)).collect(),
            ),
            Column::new(
                "churn",
                ColumnType::Categorical,
                (0..12)
                    .map(|i| Value::Text(if i % 3 == 0 { "yes" } else { "no" }.into()))
                    .collect(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_binary_column_preferred_as_target() {
        let dataset = dataset_with_binary();
        assert_eq!(pick_target(&dataset).unwrap().name, "churn");
    }

    #[test]
    fn test_numeric_high_cardinality_is_regression() {
        let col = Column::new(
            "price",
            ColumnType::Numeric,
            (0..20).map(|i| Value::Number(i as f64)).collect(),
        );
        assert_eq!(classify_problem(&col), ProblemType::Regression);
    }

    #[tokio::test]
    async fn test_override_wins_and_unknown_override_errors() {
        let mut store = DatasetStore::new();
        store.initialize(dataset_with_binary()).unwrap();
        let mut models = ModelRegistry::new();

        let ctx = StageContext {
            data: &mut store,
            models: &mut models,
            output_dir: std::path::Path::new("."),
            target_override: Some("income"),
            deps: HashMap::new(),
        };
        Recommender.execute(ctx).await.unwrap();
        assert_eq!(
            store.get_metadata(MetadataKey::TargetColumn),
            Some(&MetadataValue::ColumnName("income".into()))
        );

        let ctx = StageContext {
            data: &mut store,
            models: &mut models,
            output_dir: std::path::Path::new("."),
            target_override: Some("no_such_column"),
            deps: HashMap::new(),
        };
        let err = Recommender.execute(ctx).await.unwrap_err();
        assert!(err.downcast_ref::<ExedaError>().is_some());
    }
}
