//! End-to-end benchmark: load → preprocess → split → fit → score → rank.
//!
//! Trainers only read the finalized split and each produces its own
//! result, so they can run concurrently. Results are always collected in
//! trainer order, which keeps the comparison table reproducible.

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::export::{self, RunSummary};
use crate::metrics::ClassificationMetrics;
use crate::models::{default_trainers, Trainer};
use crate::preprocess::Preprocessor;
use crate::selection::ComparisonTable;
use crate::split::{stratified_split, DatasetSplit};
use crate::types::outcome::{ModelFailure, ModelResult};
use crate::types::transaction::TransactionTable;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

/// Everything a finished run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub split: Arc<DatasetSplit>,
    pub table: ComparisonTable,
    pub failures: Vec<ModelFailure>,
}

/// Files written by [`PipelineOutcome::export`]
#[derive(Debug, Clone)]
pub struct ExportedArtifacts {
    pub predictions: PathBuf,
    pub confusion_matrices: Vec<PathBuf>,
    pub summary: PathBuf,
}

impl PipelineOutcome {
    /// Write predictions of the best model, confusion matrices and the run summary
    pub fn export(&self, config: &AppConfig) -> Result<ExportedArtifacts> {
        let best = self.table.best().ok_or(PipelineError::AllTrainersFailed)?;

        let predictions = config.data.output_path.clone();
        export::write_predictions(&predictions, &self.split, best)?;

        let confusion_matrices = export::write_confusion_matrices(&config.data.artifacts_dir, &self.table)?;

        let summary = config.data.artifacts_dir.join("run_summary.json");
        RunSummary::new(&self.split, &self.table, &self.failures).write(&summary)?;

        Ok(ExportedArtifacts {
            predictions,
            confusion_matrices,
            summary,
        })
    }
}

/// Runs the benchmark with a fixed list of trainers
pub struct Pipeline {
    config: AppConfig,
    trainers: Vec<Arc<dyn Trainer>>,
}

impl Pipeline {
    /// Pipeline with the Isolation Forest, One-Class SVM and autoencoder trainers
    pub fn new(config: AppConfig) -> Self {
        let trainers = default_trainers(&config);
        Self { config, trainers }
    }

    pub fn with_trainers(config: AppConfig, trainers: Vec<Arc<dyn Trainer>>) -> Self {
        Self { config, trainers }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Load the configured dataset and run
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let table = TransactionTable::from_csv_path(&self.config.data.dataset_path)?;
        self.run_on_table(&table).await
    }

    pub async fn run_on_table(&self, table: &TransactionTable) -> Result<PipelineOutcome> {
        let split = Arc::new(self.prepare(table)?);
        let (results, failures) = self.train_all(Arc::clone(&split)).await;

        if results.is_empty() {
            error!(
                failed = failures.len(),
                "Every trainer failed, nothing to compare"
            );
            return Err(PipelineError::AllTrainersFailed);
        }

        let table = ComparisonTable::from_results(results);
        if let Some(best) = table.best() {
            info!(
                model = %best.name(),
                roc_auc = best.metrics.roc_auc,
                "Best model selected"
            );
        }

        Ok(PipelineOutcome {
            split,
            table,
            failures,
        })
    }

    /// Preprocess and split
    pub fn prepare(&self, table: &TransactionTable) -> Result<DatasetSplit> {
        let dataset = Preprocessor::new().transform(table)?;
        info!(
            rows = dataset.len(),
            features = dataset.n_features(),
            fraud = dataset.fraud_count(),
            "Dataset preprocessed"
        );
        stratified_split(&dataset, self.config.split.test_fraction, self.config.split.seed)
    }

    fn timeout(&self) -> Option<Duration> {
        (self.config.pipeline.timeout_ms > 0)
            .then(|| Duration::from_millis(self.config.pipeline.timeout_ms))
    }

    /// Fit and score every trainer; one failure never stops the others
    pub async fn train_all(&self, split: Arc<DatasetSplit>) -> (Vec<ModelResult>, Vec<ModelFailure>) {
        let timeout = self.timeout();
        let mut outcomes = Vec::with_capacity(self.trainers.len());

        if self.config.pipeline.parallel {
            let semaphore = Arc::new(Semaphore::new(self.config.pipeline.workers));
            let mut handles = Vec::with_capacity(self.trainers.len());

            for trainer in &self.trainers {
                let trainer = Arc::clone(trainer);
                let split = Arc::clone(&split);
                let semaphore = Arc::clone(&semaphore);
                let kind = trainer.kind();

                handles.push((
                    kind,
                    tokio::spawn(async move {
                        let permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| PipelineError::training(kind.name(), e.to_string()))?;
                        fit_and_score(trainer, split, permit, timeout).await
                    }),
                ));
            }

            for (kind, handle) in handles {
                let outcome = handle
                    .await
                    .unwrap_or_else(|e| Err(PipelineError::training(kind.name(), e.to_string())));
                outcomes.push((kind, outcome));
            }
        } else {
            // one permit, so a timed-out fit still blocks the next one
            let semaphore = Arc::new(Semaphore::new(1));
            for trainer in &self.trainers {
                let kind = trainer.kind();
                let outcome = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => fit_and_score(Arc::clone(trainer), Arc::clone(&split), permit, timeout).await,
                    Err(e) => Err(PipelineError::training(kind.name(), e.to_string())),
                };
                outcomes.push((kind, outcome));
            }
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(model = %kind, error = %e, "Trainer failed");
                    failures.push(ModelFailure {
                        kind,
                        error: e.to_string(),
                    });
                }
            }
        }
        (results, failures)
    }
}

/// Fit on the blocking pool, optionally bounded by `timeout`.
///
/// A timed-out fit is reported as failed; its worker thread is not
/// interrupted and runs to completion in the background. The worker permit
/// is held by that thread, so it is only released once the fit ends.
async fn fit_and_score(
    trainer: Arc<dyn Trainer>,
    split: Arc<DatasetSplit>,
    permit: OwnedSemaphorePermit,
    timeout: Option<Duration>,
) -> Result<ModelResult> {
    let kind = trainer.kind();
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        score_trainer(trainer.as_ref(), &split)
    });

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
            PipelineError::training(
                kind.name(),
                format!("timed out after {} ms", limit.as_millis()),
            )
        })?,
        None => task.await,
    };

    joined.unwrap_or_else(|e| Err(PipelineError::training(kind.name(), format!("worker failed: {e}"))))
}

/// Fit, predict the test split and compute metrics
pub fn score_trainer(trainer: &dyn Trainer, split: &DatasetSplit) -> Result<ModelResult> {
    let kind = trainer.kind();
    let start = Instant::now();
    let detector = trainer.fit(split)?;
    let fit_duration = start.elapsed();

    let predictions = detector.predict(split.x_test.view())?;
    if predictions.len() != split.y_test.len() {
        return Err(PipelineError::training(
            kind.name(),
            format!(
                "predicted {} labels for {} test rows",
                predictions.len(),
                split.y_test.len()
            ),
        ));
    }

    let metrics = ClassificationMetrics::from_predictions(split.y_test.view(), predictions.view())?;
    for undefined in metrics.undefined_metrics() {
        warn!(model = %kind, "{}", undefined);
    }

    info!(
        model = %kind,
        precision = metrics.precision,
        recall = metrics.recall,
        f1 = metrics.f1,
        roc_auc = metrics.roc_auc,
        fit_ms = fit_duration.as_millis() as u64,
        "Model evaluated"
    );

    Ok(ModelResult {
        kind,
        predictions,
        metrics,
        fit_duration,
        detector,
    })
}
