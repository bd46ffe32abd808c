//! Transaction table and labeled dataset structures

use crate::error::{PipelineError, Result};
use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Label value of a fraudulent transaction
pub const FRAUD: u8 = 1;
/// Label value of a legitimate transaction
pub const NON_FRAUD: u8 = 0;

/// Raw numeric transaction table as read from disk.
///
/// Every column is numeric, including `Time`, `Amount` and `Class`.
#[derive(Debug, Clone)]
pub struct TransactionTable {
    /// Column names in file order
    pub columns: Vec<String>,
    /// Row-major values, one row per transaction
    pub values: Array2<f64>,
}

impl TransactionTable {
    /// Create a table from column names and values
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Self {
        debug_assert_eq!(columns.len(), values.ncols());
        Self { columns, values }
    }

    /// Load a headered CSV file
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let table = Self::from_csv(reader)?;

        info!(
            path = %path.display(),
            rows = table.len(),
            columns = table.columns.len(),
            "Transaction table loaded"
        );

        Ok(table)
    }

    /// Load a headered CSV from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_csv(ReaderBuilder::new().has_headers(true).from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_matches('"').to_string())
            .collect();

        let mut flat = Vec::new();
        let mut n_rows = 0;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for (col, field) in record.iter().enumerate() {
                let field = field.trim().trim_matches('"');
                let value = field.parse::<f64>().map_err(|_| PipelineError::Parse {
                    row: row + 1,
                    column: columns.get(col).cloned().unwrap_or_default(),
                    value: field.to_string(),
                })?;
                flat.push(value);
            }
            n_rows += 1;
        }

        let values = Array2::from_shape_vec((n_rows, columns.len()), flat).map_err(|e| {
            PipelineError::Parse {
                row: n_rows,
                column: String::new(),
                value: e.to_string(),
            }
        })?;

        Ok(Self { columns, values })
    }

    /// Number of transactions
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Position of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Position of a named column, or `MissingColumn`
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }
}

/// Feature matrix with its label vector.
///
/// Labels are kept apart from the features and are never a model input.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub feature_names: Vec<String>,
    pub features: Array2<f64>,
    pub labels: Array1<u8>,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of rows labeled fraud
    pub fn fraud_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == FRAUD).count()
    }

    /// Fraction of rows labeled fraud (0 for an empty set)
    pub fn fraud_fraction(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.fraud_count() as f64 / self.len() as f64
        }
    }
}
