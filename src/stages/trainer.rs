//! Model training stage.
//!
//! Fits a deterministic baseline on an 80/20 head/tail split: majority-class
//! prediction for classification, a least-squares line on the single most
//! correlated feature for regression. The resulting record lands in the
//! model registry and in `models/trained_model.json`. Without a usable
//! target the stage reports "skipped" rather than failing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::domain::dataset::{Column, Value};
use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::domain::model::{
    CategoryEncoder, ModelArtifact, ModelMetrics, ModelRecord, ProblemType,
};
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Trainer;

/// Below this many usable rows, training is skipped.
const MIN_TRAIN_ROWS: usize = 5;

const REGRESSION_UNIQUE_THRESHOLD: usize = 10;

fn skipped(reason: &str) -> StageOutput {
    StageOutput {
        stage: StageId::Training,
        summary: format!("Model training skipped: {}", reason),
        details: json!({ "skipped": true, "reason": reason }),
        files: Vec::new(),
    }
}

/// A column rendered as numeric codes, with its encoder when categorical.
fn encode_column(column: &Column) -> (Vec<Option<f64>>, Option<CategoryEncoder>) {
    if column.is_numeric() {
        (column.values.iter().map(Value::as_number).collect(), None)
    } else {
        let rendered: Vec<Option<String>> = column
            .values
            .iter()
            .map(|v| (!v.is_missing()).then(|| v.to_string()))
            .collect();
        let encoder = CategoryEncoder::fit(rendered.iter().flatten().map(String::as_str));
        let codes = rendered
            .iter()
            .map(|v| v.as_deref().and_then(|s| encoder.encode(s)))
            .collect();
        (codes, Some(encoder))
    }
}

fn pearson_slice(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 3 || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

#[async_trait]
impl StageHandler for Trainer {
    fn id(&self) -> StageId {
        StageId::Training
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let target_name = match ctx.data.get_metadata(MetadataKey::TargetColumn) {
            Some(MetadataValue::ColumnName(name)) => name.clone(),
            _ => return Ok(skipped("no target column selected")),
        };

        let (record, importances) = {
            let dataset = ctx.data.current()?;
            let target = match dataset.column(&target_name) {
                Some(col) => col,
                None => return Ok(skipped("target column no longer present")),
            };
            let problem =
                if target.is_numeric() && target.unique_count() > REGRESSION_UNIQUE_THRESHOLD {
                    ProblemType::Regression
                } else {
                    ProblemType::Classification
                };

            let (target_codes, target_encoder) = encode_column(target);

            // Feature matrix over columns with at least one usable value.
            let mut encoders: BTreeMap<String, CategoryEncoder> = BTreeMap::new();
            let mut features: Vec<(String, Vec<Option<f64>>)> = Vec::new();
            for col in dataset.columns() {
                if col.name == target_name {
                    continue;
                }
                let (codes, encoder) = encode_column(col);
                if codes.iter().all(Option::is_none) {
                    continue;
                }
                if let Some(enc) = encoder {
                    encoders.insert(col.name.clone(), enc);
                }
                features.push((col.name.clone(), codes));
            }

            // Keep rows where the target is present; missing feature cells
            // fall back to zero.
            let usable: Vec<usize> = (0..dataset.row_count())
                .filter(|&i| target_codes[i].is_some())
                .collect();
            if usable.len() < MIN_TRAIN_ROWS {
                return Ok(skipped("too few rows with a target value"));
            }
            let y: Vec<f64> = usable.iter().map(|&i| target_codes[i].unwrap_or(0.0)).collect();
            let xs: Vec<(String, Vec<f64>)> = features
                .iter()
                .map(|(name, codes)| {
                    (
                        name.clone(),
                        usable.iter().map(|&i| codes[i].unwrap_or(0.0)).collect(),
                    )
                })
                .collect();

            let split = (usable.len() * 4) / 5;
            let split = split.clamp(1, usable.len() - 1);
            let (y_train, y_test) = y.split_at(split);

            let mut importances: Vec<(String, f64)> = xs
                .iter()
                .map(|(name, col)| {
                    (name.clone(), pearson_slice(col, &y).map(f64::abs).unwrap_or(0.0))
                })
                .collect();
            let total: f64 = importances.iter().map(|(_, v)| v).sum();
            if total > 0.0 {
                for (_, v) in importances.iter_mut() {
                    *v /= total;
                }
            }
            importances.sort_by(|a, b| {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            });

            let (artifact, score, score_name, confusion) = match problem {
                ProblemType::Classification => {
                    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                    for &code in y_train {
                        let label = target_encoder
                            .as_ref()
                            .and_then(|e| e.decode(code).map(str::to_string))
                            .unwrap_or_else(|| format!("{}", code));
                        *counts.entry(label).or_insert(0) += 1;
                    }
                    let majority = counts
                        .iter()
                        .max_by_key(|(_, c)| **c)
                        .map(|(l, _)| l.clone())
                        .unwrap_or_default();
                    let majority_code = target_encoder
                        .as_ref()
                        .and_then(|e| e.encode(&majority))
                        .unwrap_or_else(|| majority.parse().unwrap_or(0.0));

                    let hits = y_test.iter().filter(|&&v| v == majority_code).count();
                    let accuracy = hits as f64 / y_test.len().max(1) as f64;

                    // Confusion matrix only for binary targets; the positive
                    // class is encoder label index 1.
                    let confusion = target_encoder.as_ref().and_then(|enc| {
                        if enc.labels.len() != 2 {
                            return None;
                        }
                        let mut m = [[0usize; 2]; 2];
                        for &actual in y_test {
                            let a = if actual == 1.0 { 1 } else { 0 };
                            let p = if majority_code == 1.0 { 1 } else { 0 };
                            m[a][p] += 1;
                        }
                        Some(m)
                    });
                    (
                        ModelArtifact::MajorityClass { label: majority },
                        accuracy,
                        "accuracy".to_string(),
                        confusion,
                    )
                }
                ProblemType::Regression => {
                    let best = xs
                        .iter()
                        .filter_map(|(name, col)| {
                            pearson_slice(&col[..split], y_train)
                                .map(|r| (name.clone(), col, r.abs()))
                        })
                        .max_by(|a, b| {
                            a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal)
                        });
                    let y_mean = y_train.iter().sum::<f64>() / y_train.len() as f64;
                    let (feature, slope, intercept) = match best {
                        Some((name, col, _)) => {
                            let x_train = &col[..split];
                            let x_mean = x_train.iter().sum::<f64>() / x_train.len() as f64;
                            let mut num = 0.0;
                            let mut den = 0.0;
                            for (x, y) in x_train.iter().zip(y_train) {
                                num += (x - x_mean) * (y - y_mean);
                                den += (x - x_mean).powi(2);
                            }
                            let slope = if den > 0.0 { num / den } else { 0.0 };
                            (Some(name), slope, y_mean - slope * x_mean)
                        }
                        None => (None, 0.0, y_mean),
                    };

                    let predict = |i: usize| -> f64 {
                        match &feature {
                            Some(name) => {
                                let col = xs.iter().find(|(n, _)| n == name).map(|(_, c)| c);
                                let x = col.map(|c| c[split + i]).unwrap_or(0.0);
                                slope * x + intercept
                            }
                            None => intercept,
                        }
                    };
                    let test_mean = y_test.iter().sum::<f64>() / y_test.len().max(1) as f64;
                    let mut ss_res = 0.0;
                    let mut ss_tot = 0.0;
                    for (i, &actual) in y_test.iter().enumerate() {
                        ss_res += (actual - predict(i)).powi(2);
                        ss_tot += (actual - test_mean).powi(2);
                    }
                    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
                    (
                        ModelArtifact::LinearBaseline {
                            feature,
                            slope,
                            intercept,
                        },
                        r2,
                        "r2".to_string(),
                        None,
                    )
                }
            };

            let record = ModelRecord {
                artifact,
                problem_type: problem,
                target: target_name.clone(),
                features: xs.iter().map(|(n, _)| n.clone()).collect(),
                encoders,
                metrics: ModelMetrics {
                    score,
                    score_name,
                    feature_importances: importances.clone(),
                    confusion,
                    train_samples: split,
                    test_samples: usable.len() - split,
                    trained_at: Utc::now(),
                },
            };
            (record, importances)
        };

        ctx.data.set_metadata(
            MetadataKey::FeatureImportance,
            MetadataValue::Scores(importances),
        )?;

        let models_dir = ctx.models_dir();
        tokio::fs::create_dir_all(&models_dir)
            .await
            .with_context(|| format!("creating models directory {}", models_dir.display()))?;
        let path = models_dir.join("trained_model.json");
        let payload = serde_json::to_vec_pretty(&record).context("serializing model record")?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("writing model record {}", path.display()))?;

        info!(
            target = %record.target,
            score = record.metrics.score,
            metric = %record.metrics.score_name,
            "baseline model trained"
        );

        let summary = format!(
            "Trained {} baseline on '{}' ({} = {:.3})",
            record.problem_type, record.target, record.metrics.score_name, record.metrics.score
        );
        let details = json!({
            "target": record.target,
            "problem_type": record.problem_type.to_string(),
            "score": record.metrics.score,
            "score_name": record.metrics.score_name,
            "train_samples": record.metrics.train_samples,
            "test_samples": record.metrics.test_samples,
        });
        ctx.models.set_model(record);

        Ok(StageOutput {
            stage: StageId::Training,
            summary,
            details,
            files: vec![PathBuf::from("models").join("trained_model.json")],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{ColumnType, Dataset};
    use crate::store::{DatasetStore, ModelRegistry};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn classification_dataset() -> Dataset {
        Dataset::new(vec![
            Column::new(
                "age",
                ColumnType::Numeric,
                (0..10).map(|i| Value::Number(20.0 + i as f64)).collect(),
            ),
            Column::new(
                "churn",
                ColumnType::Categorical,
                (0..10)
                    .map(|i| Value::Text(if i < 7 { "no" } else { "yes" }.into()))
                    .collect(),
            ),
        ])
        .unwrap()
    }

    async fn run_trainer(dataset: Dataset, target: Option<&str>, dir: &TempDir) -> (StageOutput, ModelRegistry) {
        let mut store = DatasetStore::new();
        store.initialize(dataset).unwrap();
        if let Some(name) = target {
            store
                .set_metadata(
                    MetadataKey::TargetColumn,
                    MetadataValue::ColumnName(name.to_string()),
                )
                .unwrap();
        }
        let mut models = ModelRegistry::new();
        let output = {
            let ctx = StageContext {
                data: &mut store,
                models: &mut models,
                output_dir: dir.path(),
                target_override: None,
                deps: HashMap::new(),
            };
            Trainer.execute(ctx).await.unwrap()
        };
        (output, models)
    }

    #[tokio::test]
    async fn test_majority_class_baseline() {
        let dir = TempDir::new().unwrap();
        let (output, models) = run_trainer(classification_dataset(), Some("churn"), &dir).await;

        let record = models.get().unwrap();
        assert_eq!(record.problem_type, ProblemType::Classification);
        match &record.artifact {
            ModelArtifact::MajorityClass { label } => assert_eq!(label, "no"),
            other => panic!("unexpected artifact: {:?}", other),
        }
        // Test split is rows 8..10, both "yes"; constant "no" scores 0.
        assert_eq!(record.metrics.score, 0.0);
        assert_eq!(record.metrics.train_samples, 8);
        assert_eq!(record.metrics.test_samples, 2);
        assert!(record.metrics.confusion.is_some());
        assert!(dir.path().join("models/trained_model.json").exists());
        assert!(output.summary.contains("classification"));
    }

    #[tokio::test]
    async fn test_regression_tracks_correlated_feature() {
        let dir = TempDir::new().unwrap();
        let dataset = Dataset::new(vec![
            Column::new(
                "size",
                ColumnType::Numeric,
                (0..20).map(|i| Value::Number(i as f64)).collect(),
            ),
            Column::new(
                "price",
                ColumnType::Numeric,
                (0..20).map(|i| Value::Number(10.0 + 3.0 * i as f64)).collect(),
            ),
        ])
        .unwrap();
        let (_, models) = run_trainer(dataset, Some("price"), &dir).await;

        let record = models.get().unwrap();
        assert_eq!(record.problem_type, ProblemType::Regression);
        match &record.artifact {
            ModelArtifact::LinearBaseline { feature, slope, .. } => {
                assert_eq!(feature.as_deref(), Some("size"));
                assert!((slope - 3.0).abs() < 1e-9);
            }
            other => panic!("unexpected artifact: {:?}", other),
        }
        assert!((record.metrics.score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_skips_without_target() {
        let dir = TempDir::new().unwrap();
        let (output, models) = run_trainer(classification_dataset(), None, &dir).await;
        assert!(models.get().is_none());
        assert_eq!(output.details["skipped"], true);
    }
}
