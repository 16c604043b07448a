//! Shared dataset state for one pipeline run.
//!
//! Holds the original snapshot captured at initialization, the current
//! working snapshot, the audited change log, a human-readable changelog of
//! dataset replacements, and the typed metadata bag. Constructed fresh per
//! run; never a global.

use std::collections::BTreeMap;

use crate::domain::changelog::ChangeEntry;
use crate::domain::dataset::Dataset;
use crate::domain::metadata::{validate_pair, MetadataKey, MetadataValue};
use crate::error::ExedaError;

#[derive(Debug, Default)]
pub struct DatasetStore {
    original: Option<Dataset>,
    current: Option<Dataset>,
    change_log: Vec<ChangeEntry>,
    descriptions: Vec<String>,
    metadata: BTreeMap<MetadataKey, MetadataValue>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset, resetting all run state. The input becomes both the
    /// immutable original and the initial working snapshot.
    pub fn initialize(&mut self, dataset: Dataset) -> Result<(), ExedaError> {
        if dataset.column_count() == 0 {
            return Err(ExedaError::InvalidInput(
                "dataset has no columns".to_string(),
            ));
        }
        self.original = Some(dataset.clone());
        self.current = Some(dataset);
        self.change_log.clear();
        self.descriptions.clear();
        self.metadata.clear();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Result<&Dataset, ExedaError> {
        self.current
            .as_ref()
            .ok_or_else(|| ExedaError::InvalidInput("no dataset loaded".to_string()))
    }

    /// The snapshot captured at initialization. Never mutated afterwards.
    pub fn original(&self) -> Result<&Dataset, ExedaError> {
        self.original
            .as_ref()
            .ok_or_else(|| ExedaError::InvalidInput("no dataset loaded".to_string()))
    }

    /// Swap in a new working snapshot and note what changed.
    pub fn replace_current(
        &mut self,
        dataset: Dataset,
        description: impl Into<String>,
    ) -> Result<(), ExedaError> {
        if self.current.is_none() {
            return Err(ExedaError::InvalidInput(
                "cannot replace a dataset that was never loaded".to_string(),
            ));
        }
        self.current = Some(dataset);
        self.descriptions.push(description.into());
        Ok(())
    }

    /// Validate and append one audit entry.
    pub fn record_change(&mut self, entry: ChangeEntry) -> Result<(), ExedaError> {
        entry.validate()?;
        self.change_log.push(entry);
        Ok(())
    }

    pub fn change_log(&self) -> &[ChangeEntry] {
        &self.change_log
    }

    pub fn changelog_descriptions(&self) -> &[String] {
        &self.descriptions
    }

    /// Store a metadata value, rejecting shapes the key does not admit.
    /// Last write wins.
    pub fn set_metadata(
        &mut self,
        key: MetadataKey,
        value: MetadataValue,
    ) -> Result<(), ExedaError> {
        validate_pair(key, &value)?;
        self.metadata.insert(key, value);
        Ok(())
    }

    /// Absent keys are a normal condition, not an error.
    pub fn get_metadata(&self, key: MetadataKey) -> Option<&MetadataValue> {
        self.metadata.get(&key)
    }

    pub fn metadata(&self) -> &BTreeMap<MetadataKey, MetadataValue> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changelog::{ChangeAction, ColumnSummary, ImputeMethod};
    use crate::domain::dataset::{Column, ColumnType, Value};
    use chrono::Utc;

    fn small_dataset() -> Dataset {
        Dataset::new(vec![Column::new(
            "age",
            ColumnType::Numeric,
            vec![Value::Number(30.0), Value::Missing],
        )])
        .unwrap()
    }

    #[test]
    fn test_initialize_rejects_empty_dataset() {
        let mut store = DatasetStore::new();
        let result = store.initialize(Dataset::new(vec![]).unwrap());
        assert!(matches!(result, Err(ExedaError::InvalidInput(_))));
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_initialize_clears_previous_run_state() {
        let mut store = DatasetStore::new();
        store.initialize(small_dataset()).unwrap();
        store
            .set_metadata(
                MetadataKey::TargetColumn,
                MetadataValue::ColumnName("age".into()),
            )
            .unwrap();
        store
            .replace_current(small_dataset(), "no-op swap")
            .unwrap();

        store.initialize(small_dataset()).unwrap();
        assert!(store.get_metadata(MetadataKey::TargetColumn).is_none());
        assert!(store.changelog_descriptions().is_empty());
        assert!(store.change_log().is_empty());
    }

    #[test]
    fn test_original_survives_replacement() {
        let mut store = DatasetStore::new();
        store.initialize(small_dataset()).unwrap();

        let repaired = Dataset::new(vec![Column::new(
            "age",
            ColumnType::Numeric,
            vec![Value::Number(30.0), Value::Number(30.0)],
        )])
        .unwrap();
        store.replace_current(repaired, "imputed age").unwrap();

        assert_eq!(store.original().unwrap().total_missing(), 1);
        assert_eq!(store.current().unwrap().total_missing(), 0);
        assert_eq!(store.changelog_descriptions(), ["imputed age"]);
    }

    #[test]
    fn test_record_change_validates() {
        let mut store = DatasetStore::new();
        store.initialize(small_dataset()).unwrap();
        let col = store.current().unwrap().column("age").unwrap().clone();
        let bad = ChangeEntry {
            column: "".to_string(),
            action: ChangeAction::Impute,
            method: Some(ImputeMethod::Mean),
            value_used: "30".to_string(),
            affected_rows: 1,
            sample_indices: vec![1],
            before: ColumnSummary::of(&col),
            after: ColumnSummary::of(&col),
            reason: "test".to_string(),
            timestamp: Utc::now(),
        };
        assert!(store.record_change(bad).is_err());
        assert!(store.change_log().is_empty());
    }

    #[test]
    fn test_metadata_shape_enforced() {
        let mut store = DatasetStore::new();
        store.initialize(small_dataset()).unwrap();
        let result = store.set_metadata(
            MetadataKey::TargetColumn,
            MetadataValue::Flags(vec!["nope".into()]),
        );
        assert!(matches!(result, Err(ExedaError::Validation(_))));
    }
}
