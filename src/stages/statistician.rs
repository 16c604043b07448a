//! Statistical analysis stage.
//!
//! Four independent sub-analyses: descriptive statistics with normality
//! tests, pairwise correlations, categorical breakdowns, and structural
//! pattern detection. A failing sub-analysis is recorded in the report and
//! the rest still run; the stage itself only fails if the dataset is gone.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::domain::dataset::{pearson, Dataset};
use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Statistician;

/// Correlations weaker than this are not reported.
const CORRELATION_THRESHOLD: f64 = 0.5;

fn interpret_skewness(skew: f64) -> &'static str {
    if skew.abs() < 0.5 {
        "approximately symmetric"
    } else if skew.abs() < 1.0 {
        if skew > 0.0 {
            "moderately right-skewed"
        } else {
            "moderately left-skewed"
        }
    } else if skew > 0.0 {
        "highly right-skewed"
    } else {
        "highly left-skewed"
    }
}

fn correlation_strength(r: f64) -> &'static str {
    if r.abs() >= 0.8 {
        "strong"
    } else if r.abs() >= 0.65 {
        "moderate"
    } else {
        "weak"
    }
}

/// Jarque-Bera normality statistic with its chi-squared (2 dof) p-value.
fn jarque_bera(n: usize, skewness: f64, kurtosis: f64) -> (f64, f64) {
    let jb = n as f64 / 6.0 * (skewness.powi(2) + kurtosis.powi(2) / 4.0);
    // Exact survival function of chi-squared with 2 degrees of freedom.
    let p = (-jb / 2.0).exp();
    (jb, p)
}

fn descriptive_stats(dataset: &Dataset) -> serde_json::Value {
    let mut columns = Vec::new();
    for col in dataset.numeric_columns() {
        let mut entry = json!({
            "column": col.name,
            "count": col.numeric_values().len(),
            "mean": col.mean(),
            "std_dev": col.std_dev(),
            "min": col.min(),
            "q1": col.quantile(0.25),
            "median": col.median(),
            "q3": col.quantile(0.75),
            "max": col.max(),
        });
        if let Some(skew) = col.skewness() {
            entry["skewness"] = json!(skew);
            entry["skewness_interpretation"] = json!(interpret_skewness(skew));
        }
        if let Some(kurt) = col.kurtosis() {
            entry["kurtosis"] = json!(kurt);
        }
        columns.push(entry);
    }
    json!({ "columns": columns })
}

fn normality_tests(dataset: &Dataset) -> serde_json::Value {
    let mut tests = Vec::new();
    for col in dataset.numeric_columns() {
        let (skew, kurt) = match (col.skewness(), col.kurtosis()) {
            (Some(s), Some(k)) => (s, k),
            _ => continue,
        };
        let n = col.numeric_values().len();
        let (jb, p) = jarque_bera(n, skew, kurt);
        tests.push(json!({
            "column": col.name,
            "test": "jarque_bera",
            "statistic": jb,
            "p_value": p,
            "normal_at_0_05": p > 0.05,
        }));
    }
    json!({ "tests": tests })
}

fn correlation_analysis(dataset: &Dataset) -> serde_json::Value {
    let numeric = dataset.numeric_columns();
    let mut pairs = Vec::new();
    for i in 0..numeric.len() {
        for j in (i + 1)..numeric.len() {
            let r = match pearson(numeric[i], numeric[j]) {
                Some(r) => r,
                None => continue,
            };
            if r.abs() < CORRELATION_THRESHOLD {
                continue;
            }
            pairs.push(json!({
                "a": numeric[i].name,
                "b": numeric[j].name,
                "r": r,
                "strength": correlation_strength(r),
                "direction": if r > 0.0 { "positive" } else { "negative" },
            }));
        }
    }
    pairs.sort_by(|a, b| {
        let ra = a["r"].as_f64().unwrap_or(0.0).abs();
        let rb = b["r"].as_f64().unwrap_or(0.0).abs();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    json!({ "threshold": CORRELATION_THRESHOLD, "pairs": pairs })
}

fn categorical_analysis(dataset: &Dataset) -> serde_json::Value {
    let mut columns = Vec::new();
    for col in dataset.columns().iter().filter(|c| !c.is_numeric()) {
        let counts = col.value_counts();
        let total: usize = counts.iter().map(|(_, c)| c).sum();
        let entropy: f64 = counts
            .iter()
            .filter(|(_, c)| *c > 0)
            .map(|(_, c)| {
                let p = *c as f64 / total.max(1) as f64;
                -p * p.log2()
            })
            .sum();
        columns.push(json!({
            "column": col.name,
            "unique_count": counts.len(),
            "mode": col.mode(),
            "entropy": entropy,
            "top_values": counts.iter().take(5).map(|(v, c)| json!({"value": v, "count": c})).collect::<Vec<_>>(),
        }));
    }
    json!({ "columns": columns })
}

fn pattern_report(dataset: &Dataset) -> serde_json::Value {
    let rows = dataset.row_count();
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = 0usize;
    for i in 0..rows {
        if !seen.insert(dataset.row_key(i)) {
            duplicates += 1;
        }
    }

    let mut constant = Vec::new();
    let mut binary = Vec::new();
    let mut id_candidates = Vec::new();
    for col in dataset.columns() {
        let unique = col.unique_count();
        let non_missing = rows - col.missing_count();
        if non_missing > 1 && unique == 1 {
            constant.push(col.name.clone());
        }
        if unique == 2 {
            binary.push(col.name.clone());
        }
        if non_missing > 1 && unique == non_missing {
            id_candidates.push(col.name.clone());
        }
    }
    json!({
        "duplicate_rows": duplicates,
        "constant_columns": constant,
        "binary_columns": binary,
        "id_candidates": id_candidates,
    })
}

#[async_trait]
impl StageHandler for Statistician {
    fn id(&self) -> StageId {
        StageId::Statistics
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let steps: [(&str, MetadataKey, fn(&Dataset) -> serde_json::Value); 5] = [
            ("descriptive_stats", MetadataKey::DescriptiveStats, descriptive_stats),
            ("normality_tests", MetadataKey::NormalityTests, normality_tests),
            ("correlation_analysis", MetadataKey::CorrelationAnalysis, correlation_analysis),
            ("categorical_analysis", MetadataKey::CategoricalAnalysis, categorical_analysis),
            ("pattern_report", MetadataKey::PatternReport, pattern_report),
        ];

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut details = serde_json::Map::new();

        for (name, key, step) in steps {
            let dataset = ctx.data.current()?;
            let report = step(dataset);
            match ctx.data.set_metadata(key, MetadataValue::Report(report.clone())) {
                Ok(()) => {
                    details.insert(name.to_string(), report);
                    completed.push(name);
                }
                Err(err) => {
                    // Partial analysis: keep going with what did work.
                    warn!(step = name, error = %err, "analysis sub-step failed");
                    details.insert(name.to_string(), json!({ "error": err.to_string() }));
                    failed.push(name);
                }
            }
        }

        Ok(StageOutput {
            stage: StageId::Statistics,
            summary: format!(
                "Statistical analysis: {} of {} sub-analyses completed",
                completed.len(),
                completed.len() + failed.len()
            ),
            details: serde_json::Value::Object(details),
            files: Vec::new(),
        })
    }
}
