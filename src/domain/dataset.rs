//! Tabular dataset snapshots.
//!
//! A `Dataset` is an ordered set of named, typed columns. Cell values carry
//! an explicit `Missing` marker so cleaning stages can distinguish "absent"
//! from any real value. Two snapshots exist per run: the immutable original
//! captured at ingestion and the current one mutated by cleaning.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExedaError;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Timestamp(ts) => Some(ts.timestamp() as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Missing => write!(f, ""),
        }
    }
}

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Datetime => "datetime",
            ColumnType::Boolean => "boolean",
        };
        write!(f, "{}", s)
    }
}

/// A named, typed column of values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            column_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.column_type == ColumnType::Numeric
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Indices of rows where this column is missing.
    pub fn missing_indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_missing())
            .map(|(i, _)| i)
            .collect()
    }

    /// Non-missing values interpreted as numbers.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(|v| v.as_number()).collect()
    }

    pub fn unique_count(&self) -> usize {
        let mut seen: BTreeMap<String, ()> = BTreeMap::new();
        for v in self.values.iter().filter(|v| !v.is_missing()) {
            seen.insert(v.to_string(), ());
        }
        seen.len()
    }

    /// Value frequencies among non-missing cells, most frequent first.
    /// Ties break on first occurrence order.
    pub fn value_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for v in self.values.iter().filter(|v| !v.is_missing()) {
            let key = v.to_string();
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, c)) => *c += 1,
                None => counts.push((key, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Most frequent non-missing value, rendered as a string.
    pub fn mode(&self) -> Option<String> {
        self.value_counts().into_iter().next().map(|(v, _)| v)
    }

    pub fn mean(&self) -> Option<f64> {
        let xs = self.numeric_values();
        if xs.is_empty() {
            return None;
        }
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }

    pub fn median(&self) -> Option<f64> {
        self.quantile(0.5)
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        let xs = self.numeric_values();
        if xs.len() < 2 {
            return None;
        }
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
        Some(var.sqrt())
    }

    pub fn min(&self) -> Option<f64> {
        self.numeric_values()
            .into_iter()
            .fold(None, |acc, x| match acc {
                None => Some(x),
                Some(m) => Some(m.min(x)),
            })
    }

    pub fn max(&self) -> Option<f64> {
        self.numeric_values()
            .into_iter()
            .fold(None, |acc, x| match acc {
                None => Some(x),
                Some(m) => Some(m.max(x)),
            })
    }

    /// Linear-interpolated quantile over non-missing numeric values.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let mut xs = self.numeric_values();
        if xs.is_empty() {
            return None;
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let pos = q.clamp(0.0, 1.0) * (xs.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        if lo == hi {
            Some(xs[lo])
        } else {
            let frac = pos - lo as f64;
            Some(xs[lo] * (1.0 - frac) + xs[hi] * frac)
        }
    }

    /// Adjusted Fisher-Pearson sample skewness.
    pub fn skewness(&self) -> Option<f64> {
        let xs = self.numeric_values();
        let n = xs.len();
        if n < 3 {
            return None;
        }
        let mean = xs.iter().sum::<f64>() / n as f64;
        let std = self.std_dev()?;
        if std == 0.0 {
            return Some(0.0);
        }
        let m3 = xs.iter().map(|x| ((x - mean) / std).powi(3)).sum::<f64>();
        let nf = n as f64;
        Some(nf / ((nf - 1.0) * (nf - 2.0)) * m3)
    }

    /// Excess kurtosis (normal distribution scores 0).
    pub fn kurtosis(&self) -> Option<f64> {
        let xs = self.numeric_values();
        let n = xs.len();
        if n < 4 {
            return None;
        }
        let mean = xs.iter().sum::<f64>() / n as f64;
        let m2 = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        if m2 == 0.0 {
            return Some(0.0);
        }
        let m4 = xs.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n as f64;
        Some(m4 / (m2 * m2) - 3.0)
    }
}

/// An ordered collection of columns with equal row counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset, checking that every column has the same row count.
    pub fn new(columns: Vec<Column>) -> Result<Self, ExedaError> {
        if let Some(first) = columns.first() {
            let rows = first.len();
            for col in &columns {
                if col.len() != rows {
                    return Err(ExedaError::InvalidInput(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.len(),
                        rows
                    )));
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn numeric_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.is_numeric()).collect()
    }

    /// Total number of missing cells across all columns.
    pub fn total_missing(&self) -> usize {
        self.columns.iter().map(|c| c.missing_count()).sum()
    }

    /// One row rendered as display strings (used for duplicate detection).
    pub fn row_key(&self, index: usize) -> String {
        let mut parts = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            parts.push(
                col.values
                    .get(index)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        parts.join("\u{1f}")
    }
}

/// Pearson correlation over rows where both columns are non-missing.
pub fn pearson(a: &Column, b: &Column) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .values
        .iter()
        .zip(b.values.iter())
        .filter_map(|(x, y)| Some((x.as_number()?, y.as_number()?)))
        .collect();
    if pairs.len() < 3 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let my = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in &pairs {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}
