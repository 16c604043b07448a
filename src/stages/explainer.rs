//! Explainability stage.
//!
//! Turns the trained model's feature importances into a human-readable
//! summary: a global importance chart plus an attribution for the first row.
//! Runs as a no-op when no model was trained.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::stages::visualizer::bar_svg;
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Explainer;

#[async_trait]
impl StageHandler for Explainer {
    fn id(&self) -> StageId {
        StageId::Explainability
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let record = match ctx.models.get() {
            Some(record) => record.clone(),
            None => {
                info!("no trained model, explainability skipped");
                return Ok(StageOutput {
                    stage: StageId::Explainability,
                    summary: "Explainability skipped: no trained model".to_string(),
                    details: json!({ "skipped": true, "reason": "no trained model" }),
                    files: Vec::new(),
                });
            }
        };

        let importances = &record.metrics.feature_importances;
        let top = importances.first();

        // Attribution for the first row: each feature's value weighted by
        // its global importance, with deviation from the column mean giving
        // the direction for numeric features.
        let row_attribution: Vec<serde_json::Value> = {
            let dataset = ctx.data.current()?;
            importances
                .iter()
                .filter_map(|(name, importance)| {
                    let col = dataset.column(name)?;
                    let value = col.values.first()?;
                    let direction = match (value.as_number(), col.mean()) {
                        (Some(v), Some(mean)) if col.is_numeric() => {
                            if v >= mean {
                                "above average"
                            } else {
                                "below average"
                            }
                        }
                        _ => "categorical",
                    };
                    Some(json!({
                        "feature": name,
                        "value": value.to_string(),
                        "importance": importance,
                        "direction": direction,
                    }))
                })
                .collect()
        };

        let report = json!({
            "target": record.target,
            "problem_type": record.problem_type.to_string(),
            "model_score": { "name": record.metrics.score_name, "value": record.metrics.score },
            "global_importance": importances
                .iter()
                .map(|(name, v)| json!({ "feature": name, "importance": v }))
                .collect::<Vec<_>>(),
            "top_feature": top.map(|(name, _)| name.clone()),
            "row_0_attribution": row_attribution,
        });
        ctx.data.set_metadata(
            MetadataKey::ExplainabilitySummary,
            MetadataValue::Report(report.clone()),
        )?;

        let charts_dir = ctx.charts_dir();
        tokio::fs::create_dir_all(&charts_dir)
            .await
            .with_context(|| format!("creating charts directory {}", charts_dir.display()))?;
        let svg = bar_svg(
            &format!("Feature Importance for '{}'", record.target),
            importances,
        );
        let path = charts_dir.join("importance_summary.svg");
        tokio::fs::write(&path, svg)
            .await
            .with_context(|| format!("writing chart {}", path.display()))?;

        let summary = match top {
            Some((name, weight)) => format!(
                "Most influential feature for '{}': {} (weight {:.2})",
                record.target, name, weight
            ),
            None => format!("No measurable feature influence for '{}'", record.target),
        };

        Ok(StageOutput {
            stage: StageId::Explainability,
            summary,
            details: report,
            files: vec![std::path::PathBuf::from("charts").join("importance_summary.svg")],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{Column, ColumnType, Dataset, Value};
    use crate::domain::model::{
        CategoryEncoder, ModelArtifact, ModelMetrics, ModelRecord, ProblemType,
    };
    use crate::store::{DatasetStore, ModelRegistry};
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::TempDir;

    fn store_and_model() -> (DatasetStore, ModelRegistry) {
        let mut store = DatasetStore::new();
        store
            .initialize(
                Dataset::new(vec![
                    Column::new(
                        "age",
                        ColumnType::Numeric,
                        vec![Value::Number(60.0), Value::Number(20.0), Value::Number(30.0)],
                    ),
                    Column::new(
                        "churn",
                        ColumnType::Categorical,
                        vec![
                            Value::Text("yes".into()),
                            Value::Text("no".into()),
                            Value::Text("no".into()),
                        ],
                    ),
                ])
                .unwrap(),
            )
            .unwrap();
        let mut models = ModelRegistry::new();
        models.set_model(ModelRecord {
            artifact: ModelArtifact::MajorityClass { label: "no".into() },
            problem_type: ProblemType::Classification,
            target: "churn".into(),
            features: vec!["age".into()],
            encoders: BTreeMap::from([(
                "churn".to_string(),
                CategoryEncoder::fit(["yes", "no"].into_iter()),
            )]),
            metrics: ModelMetrics {
                score: 0.66,
                score_name: "accuracy".into(),
                feature_importances: vec![("age".into(), 1.0)],
                confusion: None,
                train_samples: 2,
                test_samples: 1,
                trained_at: Utc::now(),
            },
        });
        (store, models)
    }

    #[tokio::test]
    async fn test_importance_chart_and_metadata() {
        let dir = TempDir::new().unwrap();
        let (mut store, mut models) = store_and_model();
        let ctx = StageContext {
            data: &mut store,
            models: &mut models,
            output_dir: dir.path(),
            target_override: None,
            deps: HashMap::new(),
        };

        let output = Explainer.execute(ctx).await.unwrap();

        assert!(dir.path().join("charts/importance_summary.svg").exists());
        assert!(output.summary.contains("age"));
        let report = match store.get_metadata(MetadataKey::ExplainabilitySummary) {
            Some(MetadataValue::Report(report)) => report.clone(),
            other => panic!("unexpected metadata: {:?}", other),
        };
        // Row 0 age is 60, above the mean of ~36.7.
        assert_eq!(report["row_0_attribution"][0]["direction"], "above average");
    }

    #[tokio::test]
    async fn test_skips_without_model() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = store_and_model();
        let mut empty = ModelRegistry::new();
        let ctx = StageContext {
            data: &mut store,
            models: &mut empty,
            output_dir: dir.path(),
            target_override: None,
            deps: HashMap::new(),
        };

        let output = Explainer.execute(ctx).await.unwrap();
        assert_eq!(output.details["skipped"], true);
        assert!(output.files.is_empty());
    }
}
