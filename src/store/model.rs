//! Registry for the model trained during a run.

use crate::domain::model::ModelRecord;

/// Holds at most one trained model. Absence means training has not run or
/// was skipped; downstream stages treat that as a skip condition.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    record: Option<ModelRecord>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale replacement of whatever was stored before.
    pub fn set_model(&mut self, record: ModelRecord) {
        self.record = Some(record);
    }

    pub fn get(&self) -> Option<&ModelRecord> {
        self.record.as_ref()
    }

    pub fn clear(&mut self) {
        self.record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ModelArtifact, ModelMetrics, ProblemType};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record() -> ModelRecord {
        ModelRecord {
            artifact: ModelArtifact::MajorityClass {
                label: "yes".into(),
            },
            problem_type: ProblemType::Classification,
            target: "churn".into(),
            features: vec!["age".into()],
            encoders: BTreeMap::new(),
            metrics: ModelMetrics {
                score: 0.8,
                score_name: "accuracy".into(),
                feature_importances: vec![("age".into(), 1.0)],
                confusion: None,
                train_samples: 8,
                test_samples: 2,
                trained_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_set_get_clear() {
        let mut registry = ModelRegistry::new();
        assert!(registry.get().is_none());
        registry.set_model(record());
        assert_eq!(registry.get().map(|r| r.target.as_str()), Some("churn"));
        registry.clear();
        assert!(registry.get().is_none());
    }
}
