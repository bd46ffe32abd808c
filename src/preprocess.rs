//! Preprocessing of raw transaction tables into model inputs.
//!
//! `Amount` and `Time` are standardized into `scaled_amount` and
//! `scaled_time`, which lead the feature columns; the remaining features keep
//! their file order and the `Class` label is split off into its own vector.

use crate::error::{PipelineError, Result};
use crate::types::transaction::{LabeledDataset, TransactionTable};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::debug;

pub const AMOUNT_COLUMN: &str = "Amount";
pub const TIME_COLUMN: &str = "Time";
pub const LABEL_COLUMN: &str = "Class";

/// Zero-mean, unit-variance scaling fitted on one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    pub mean: f64,
    /// Population standard deviation, replaced by 1.0 for constant columns
    pub scale: f64,
}

impl StandardScaler {
    /// Fit on a column of values
    pub fn fit(values: ArrayView1<f64>) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                scale: 1.0,
            };
        }
        let mean = values.mean().unwrap_or(0.0);
        let std = values.std(0.0);
        let scale = if std > 1e-12 { std } else { 1.0 };
        Self { mean, scale }
    }

    pub fn transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|x| (x - self.mean) / self.scale)
    }
}

/// Turns a raw transaction table into features and labels
#[derive(Debug, Clone)]
pub struct Preprocessor {
    amount_column: String,
    time_column: String,
    label_column: String,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            amount_column: AMOUNT_COLUMN.to_string(),
            time_column: TIME_COLUMN.to_string(),
            label_column: LABEL_COLUMN.to_string(),
        }
    }

    /// Scale `Amount` and `Time`, drop the originals, and split off the label.
    ///
    /// Scaling statistics come from the whole table, test rows included.
    pub fn transform(&self, table: &TransactionTable) -> Result<LabeledDataset> {
        let amount_idx = table.require_column(&self.amount_column)?;
        let time_idx = table.require_column(&self.time_column)?;
        let label_idx = table.require_column(&self.label_column)?;

        let amount = table.values.column(amount_idx);
        let time = table.values.column(time_idx);

        let amount_scaler = StandardScaler::fit(amount);
        let time_scaler = StandardScaler::fit(time);
        debug!(
            amount_mean = amount_scaler.mean,
            amount_scale = amount_scaler.scale,
            time_mean = time_scaler.mean,
            time_scale = time_scaler.scale,
            "Fitted standard scalers"
        );

        let passthrough: Vec<usize> = (0..table.columns.len())
            .filter(|&i| i != amount_idx && i != time_idx && i != label_idx)
            .collect();

        let mut feature_names = Vec::with_capacity(passthrough.len() + 2);
        feature_names.push("scaled_amount".to_string());
        feature_names.push("scaled_time".to_string());
        feature_names.extend(passthrough.iter().map(|&i| table.columns[i].clone()));

        let mut features = Array2::zeros((table.len(), feature_names.len()));
        features
            .column_mut(0)
            .assign(&amount_scaler.transform(amount));
        features.column_mut(1).assign(&time_scaler.transform(time));
        for (dst, &src) in passthrough.iter().enumerate() {
            features
                .column_mut(dst + 2)
                .assign(&table.values.column(src));
        }

        let labels = table
            .values
            .index_axis(Axis(1), label_idx)
            .iter()
            .enumerate()
            .map(|(row, &v)| label_from_value(row + 1, v))
            .collect::<Result<Array1<u8>>>()?;

        Ok(LabeledDataset {
            feature_names,
            features,
            labels,
        })
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `row` is 1-based, counted after the header
fn label_from_value(row: usize, value: f64) -> Result<u8> {
    if value == 0.0 {
        Ok(0)
    } else if value == 1.0 {
        Ok(1)
    } else {
        Err(PipelineError::Parse {
            row,
            column: LABEL_COLUMN.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn table() -> TransactionTable {
        TransactionTable::new(
            vec![
                "Time".to_string(),
                "V1".to_string(),
                "V2".to_string(),
                "Amount".to_string(),
                "Class".to_string(),
            ],
            array![
                [0.0, 1.0, 10.0, 100.0, 0.0],
                [10.0, 2.0, 20.0, 200.0, 0.0],
                [20.0, 3.0, 30.0, 300.0, 1.0],
                [30.0, 4.0, 40.0, 400.0, 0.0],
            ],
        )
    }

    #[test]
    fn test_feature_layout() {
        let ds = Preprocessor::new().transform(&table()).unwrap();

        assert_eq!(
            ds.feature_names,
            vec!["scaled_amount", "scaled_time", "V1", "V2"]
        );
        assert_eq!(ds.features.dim(), (4, 4));
        assert_eq!(ds.labels, array![0, 0, 1, 0]);
        assert_eq!(ds.features[[2, 2]], 3.0);
        assert_eq!(ds.features[[3, 3]], 40.0);
    }

    #[test]
    fn test_scaled_columns_are_standardized() {
        let ds = Preprocessor::new().transform(&table()).unwrap();

        for col in 0..2 {
            let c = ds.features.column(col);
            assert!(c.mean().unwrap().abs() < 1e-12);
            assert!((c.std(0.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_column_scales_to_zero() {
        let scaler = StandardScaler::fit(array![5.0, 5.0, 5.0].view());
        assert_eq!(scaler.scale, 1.0);
        assert_eq!(scaler.transform(array![5.0].view())[0], 0.0);
    }

    #[test]
    fn test_missing_column() {
        let table = TransactionTable::new(
            vec!["Time".to_string(), "Class".to_string()],
            array![[0.0, 0.0]],
        );
        let err = Preprocessor::new().transform(&table).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == "Amount"));
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let table = TransactionTable::new(
            vec!["Time".to_string(), "Amount".to_string(), "Class".to_string()],
            array![[0.0, 1.0, 2.0]],
        );
        assert!(Preprocessor::new().transform(&table).is_err());
    }

    #[test]
    fn test_bad_label_reports_its_row() {
        let table = TransactionTable::new(
            vec!["Time".to_string(), "Amount".to_string(), "Class".to_string()],
            array![[0.0, 1.0, 0.0], [1.0, 2.0, 2.0], [2.0, 3.0, 1.0]],
        );
        let err = Preprocessor::new().transform(&table).unwrap_err();
        match err {
            PipelineError::Parse { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, "Class");
                assert_eq!(value, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
