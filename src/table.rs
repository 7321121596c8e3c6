//! Header-indexed CSV tables.
//!
//! The capture-time sync table and the trajectory tables are plain CSV with
//! one header row. Columns are addressed by name; a missing column is a fatal
//! error at the call site, never a silent default.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context as _, Result};

use crate::storage::ArtifactStore;

#[derive(Clone, Debug)]
pub struct CsvTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn from_store(store: &dyn ArtifactStore, path: &Path) -> Result<Self> {
        let raw = store
            .get(path)
            .with_context(|| format!("failed to read table {}", path.display()))?;
        Self::from_bytes(&path.display().to_string(), &raw)
    }

    pub fn from_bytes(name: &str, raw: &[u8]) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(raw);
        let headers = reader
            .headers()
            .with_context(|| format!("{}: no header row", name))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("{}: malformed row", name))?;
            rows.push(record.iter().map(|v| v.trim().to_string()).collect());
        }
        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| anyhow!("{}: no column `{}`", self.name, column))
    }

    pub fn str_at(&self, column: &str, row: usize) -> Result<&str> {
        let col = self.column_index(column)?;
        let row_values = self
            .rows
            .get(row)
            .ok_or_else(|| anyhow!("{}: row {} out of range ({} rows)", self.name, row, self.len()))?;
        Ok(row_values[col].as_str())
    }

    pub fn f64_at(&self, column: &str, row: usize) -> Result<f64> {
        let value = self.str_at(column, row)?;
        value
            .parse::<f64>()
            .map_err(|_| anyhow!("{}: column `{}` row {}: not a number: `{}`", self.name, column, row, value))
    }

    pub fn u64_at(&self, column: &str, row: usize) -> Result<u64> {
        // Frame-number columns sometimes carry a trailing `.0`.
        let value = self.f64_at(column, row)?;
        Ok(value.round() as u64)
    }

    /// Every value of one column, parsed as f64.
    pub fn f64_column(&self, column: &str) -> Result<Vec<f64>> {
        (0..self.len()).map(|row| self.f64_at(column, row)).collect()
    }

    /// Index of the first row whose `column` equals `value` exactly.
    pub fn find_first(&self, column: &str, value: &str) -> Result<Option<usize>> {
        let col = self.column_index(column)?;
        Ok(self.rows.iter().position(|row| row[col] == value))
    }

    /// One whole row as a name -> value map (stable key order).
    pub fn row_map(&self, row: usize) -> Result<BTreeMap<String, String>> {
        let row_values = self
            .rows
            .get(row)
            .ok_or_else(|| anyhow!("{}: row {} out of range ({} rows)", self.name, row, self.len()))?;
        Ok(self
            .headers
            .iter()
            .cloned()
            .zip(row_values.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CsvTable {
        CsvTable::from_bytes(
            "test.csv",
            b"tracking_timestamp_us,tx,ty\n1000,0.5,1.0\n2000,0.6,1.1\n3000,0.7,1.2\n",
        )
        .expect("table")
    }

    #[test]
    fn reads_columns_by_name() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert!(t.has_column("tx"));
        assert_eq!(t.f64_at("tracking_timestamp_us", 1).expect("f64"), 2000.0);
        assert_eq!(t.str_at("ty", 2).expect("str"), "1.2");
    }

    #[test]
    fn missing_column_is_an_error_naming_the_table() {
        let t = table();
        let err = t.f64_at("tz", 0).expect_err("missing column");
        assert!(err.to_string().contains("test.csv"));
        assert!(err.to_string().contains("tz"));
    }

    #[test]
    fn u64_tolerates_float_formatted_frame_numbers() {
        let t = CsvTable::from_bytes("frames.csv", b"cam01_frame_number\n12.0\n13.0\n")
            .expect("table");
        assert_eq!(t.u64_at("cam01_frame_number", 1).expect("u64"), 13);
    }

    #[test]
    fn find_first_matches_exact_values_only() {
        let t = table();
        assert_eq!(t.find_first("tx", "0.6").expect("find"), Some(1));
        assert_eq!(t.find_first("tx", "0.60").expect("find"), None);
    }
}
