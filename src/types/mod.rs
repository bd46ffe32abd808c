//! Type definitions for the fraud benchmark pipeline

pub mod outcome;
pub mod transaction;

pub use outcome::{ModelFailure, ModelResult};
pub use transaction::{LabeledDataset, TransactionTable, FRAUD, NON_FRAUD};
