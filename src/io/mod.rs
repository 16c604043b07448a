//! CSV ingestion with type inference, and dataset export.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::domain::dataset::{Column, ColumnType, Dataset, Value};

/// Cell contents treated as missing, compared case-insensitively.
const MISSING_TOKENS: [&str; 6] = ["", "na", "n/a", "null", "none", "nan"];

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d"];

fn is_missing_token(raw: &str) -> bool {
    let t = raw.trim().to_lowercase();
    MISSING_TOKENS.contains(&t.as_str())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

/// Inference order: numeric, then boolean, then datetime, then categorical.
/// A column only gets a type if every non-missing cell parses as it.
fn infer_type(cells: &[String]) -> ColumnType {
    let present: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|c| !is_missing_token(c))
        .collect();
    if present.is_empty() {
        return ColumnType::Categorical;
    }
    if present.iter().all(|c| c.trim().parse::<f64>().is_ok()) {
        return ColumnType::Numeric;
    }
    if present.iter().all(|c| parse_bool(c).is_some()) {
        return ColumnType::Boolean;
    }
    if present.iter().all(|c| parse_datetime(c).is_some()) {
        return ColumnType::Datetime;
    }
    ColumnType::Categorical
}

/// Parse one rendered cell into the column's value type; unparseable or
/// missing-token input becomes `Missing`.
pub(crate) fn parse_cell(raw: &str, column_type: ColumnType) -> Value {
    if is_missing_token(raw) {
        return Value::Missing;
    }
    match column_type {
        ColumnType::Numeric => raw
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or(Value::Missing),
        ColumnType::Boolean => parse_bool(raw).map(Value::Bool).unwrap_or(Value::Missing),
        ColumnType::Datetime => parse_datetime(raw)
            .map(Value::Timestamp)
            .unwrap_or(Value::Missing),
        ColumnType::Categorical => Value::Text(raw.trim().to_string()),
    }
}

/// Load a headered CSV file, inferring one type per column.
pub fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading header row of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row_idx, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("reading row {} of {}", row_idx + 1, path.display()))?;
        for (col_idx, cell) in record.iter().enumerate() {
            raw_columns[col_idx].push(cell.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw_columns)
        .map(|(name, cells)| {
            let column_type = infer_type(&cells);
            let values = cells.iter().map(|c| parse_cell(c, column_type)).collect();
            Column::new(name, column_type, values)
        })
        .collect();

    Dataset::new(columns).map_err(anyhow::Error::from)
}

/// Export a dataset as CSV; missing cells become empty fields.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    writer
        .write_record(dataset.column_names())
        .context("writing CSV header")?;
    for row in 0..dataset.row_count() {
        let record: Vec<String> = dataset
            .columns()
            .iter()
            .map(|c| c.values[row].to_string())
            .collect();
        writer
            .write_record(&record)
            .with_context(|| format!("writing CSV row {}", row))?;
    }
    writer.flush().context("flushing CSV writer")?;
    Ok(())
}
