//! Typed metadata exchanged between stages.
//!
//! Stages communicate intermediate findings through a keyed bag on the
//! dataset store. The key set is closed and each key admits one value shape,
//! checked at write time, so a downstream stage never has to guess what an
//! upstream stage stored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExedaError;

/// The complete set of keys stages may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    ProfilingSummary,
    QualityFlags,
    OutlierReport,
    CorrelationAnalysis,
    DescriptiveStats,
    NormalityTests,
    CategoricalAnalysis,
    PatternReport,
    ModelRecommendations,
    TargetColumn,
    ProblemType,
    FeatureImportance,
    ExplainabilitySummary,
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetadataKey::ProfilingSummary => "profiling_summary",
            MetadataKey::QualityFlags => "quality_flags",
            MetadataKey::OutlierReport => "outlier_report",
            MetadataKey::CorrelationAnalysis => "correlation_analysis",
            MetadataKey::DescriptiveStats => "descriptive_stats",
            MetadataKey::NormalityTests => "normality_tests",
            MetadataKey::CategoricalAnalysis => "categorical_analysis",
            MetadataKey::PatternReport => "pattern_report",
            MetadataKey::ModelRecommendations => "model_recommendations",
            MetadataKey::TargetColumn => "target_column",
            MetadataKey::ProblemType => "problem_type",
            MetadataKey::FeatureImportance => "feature_importance",
            MetadataKey::ExplainabilitySummary => "explainability_summary",
        };
        write!(f, "{}", s)
    }
}

/// Value shapes admitted by the bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataValue {
    /// Structured report payload (profiles, stats, recommendations).
    Report(serde_json::Value),
    /// Short labels attached to columns, e.g. quality flags.
    Flags(Vec<String>),
    /// A single column name.
    ColumnName(String),
    /// A short classification label, e.g. "classification".
    Label(String),
    /// Named scores, e.g. feature importances.
    Scores(Vec<(String, f64)>),
}

impl MetadataValue {
    fn shape_name(&self) -> &'static str {
        match self {
            MetadataValue::Report(_) => "report",
            MetadataValue::Flags(_) => "flags",
            MetadataValue::ColumnName(_) => "column_name",
            MetadataValue::Label(_) => "label",
            MetadataValue::Scores(_) => "scores",
        }
    }
}

/// Which shape each key expects. Writes with any other shape are rejected.
fn expected_shape(key: MetadataKey) -> &'static str {
    match key {
        MetadataKey::ProfilingSummary
        | MetadataKey::OutlierReport
        | MetadataKey::CorrelationAnalysis
        | MetadataKey::DescriptiveStats
        | MetadataKey::NormalityTests
        | MetadataKey::CategoricalAnalysis
        | MetadataKey::PatternReport
        | MetadataKey::ModelRecommendations
        | MetadataKey::ExplainabilitySummary => "report",
        MetadataKey::QualityFlags => "flags",
        MetadataKey::TargetColumn => "column_name",
        MetadataKey::ProblemType => "label",
        MetadataKey::FeatureImportance => "scores",
    }
}

/// Check that `value` has the shape `key` admits.
pub fn validate_pair(key: MetadataKey, value: &MetadataValue) -> Result<(), ExedaError> {
    let expected = expected_shape(key);
    let actual = value.shape_name();
    if expected != actual {
        return Err(ExedaError::Validation(format!(
            "metadata key '{}' expects a {} value, got {}",
            key, expected, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_key_accepts_report() {
        let value = MetadataValue::Report(serde_json::json!({"rows": 5}));
        assert!(validate_pair(MetadataKey::ProfilingSummary, &value).is_ok());
    }

    #[test]
    fn test_target_column_rejects_report_shape() {
        let value = MetadataValue::Report(serde_json::json!("age"));
        let result = validate_pair(MetadataKey::TargetColumn, &value);
        assert!(matches!(result, Err(ExedaError::Validation(_))));
    }

    #[test]
    fn test_feature_importance_takes_scores() {
        let value = MetadataValue::Scores(vec![("age".into(), 0.7)]);
        assert!(validate_pair(MetadataKey::FeatureImportance, &value).is_ok());
    }
}
