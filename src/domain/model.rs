//! Record of the model trained during a run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of prediction problem the target column implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Classification,
    Regression,
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemType::Classification => write!(f, "classification"),
            ProblemType::Regression => write!(f, "regression"),
        }
    }
}

/// Mapping from category labels to the numeric codes used during training.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryEncoder {
    pub labels: Vec<String>,
}

impl CategoryEncoder {
    /// Build an encoder over the distinct labels, in first-seen order.
    pub fn fit<'a>(labels: impl Iterator<Item = &'a str>) -> Self {
        let mut seen = Vec::new();
        for label in labels {
            if !seen.iter().any(|s: &String| s == label) {
                seen.push(label.to_string());
            }
        }
        Self { labels: seen }
    }

    pub fn encode(&self, label: &str) -> Option<f64> {
        self.labels.iter().position(|l| l == label).map(|i| i as f64)
    }

    pub fn decode(&self, code: f64) -> Option<&str> {
        let idx = code.round();
        if idx < 0.0 {
            return None;
        }
        self.labels.get(idx as usize).map(String::as_str)
    }
}

/// The fitted predictor itself. Opaque to everything but the trainer and
/// explainer; serializable so the record can be exported as a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Predicts the majority class of the training split.
    MajorityClass { label: String },
    /// Least-squares line on the single most correlated feature,
    /// falling back to the target mean when no feature correlates.
    LinearBaseline {
        feature: Option<String>,
        slope: f64,
        intercept: f64,
    },
}

/// Evaluation results from the held-out split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy for classification, R² for regression.
    pub score: f64,
    pub score_name: String,
    /// Feature importances, highest first.
    pub feature_importances: Vec<(String, f64)>,
    /// [[tn, fp], [fn, tp]] for binary classification targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion: Option<[[usize; 2]; 2]>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub trained_at: DateTime<Utc>,
}

/// Everything downstream stages need to know about the trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub artifact: ModelArtifact,
    pub problem_type: ProblemType,
    pub target: String,
    pub features: Vec<String>,
    pub encoders: BTreeMap<String, CategoryEncoder>,
    pub metrics: ModelMetrics,
}
