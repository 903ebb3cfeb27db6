// ============================================================
// Layer 6 — Training Metrics
// ============================================================
// Three records come out of a training run:
//
//   metrics.csv           one row per epoch, appended as training
//                         progresses (survives a crash mid-run)
//   history.json          the same numbers as per-metric arrays:
//                         {"loss": [...], "acc": [...],
//                          "val_loss": [...], "val_acc": [...]}
//   metrics_results.json  final loss/accuracy on train, valid, test
//
// Accuracy is masked token accuracy: the fraction of non-padding
// target words predicted exactly.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch:      usize,
    pub train_loss: f64,
    pub train_acc:  f64,
    pub val_loss:   f64,
    pub val_acc:    f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: SplitMetrics, valid: SplitMetrics) -> Self {
        Self {
            epoch,
            train_loss: train.loss,
            train_acc:  train.accuracy,
            val_loss:   valid.loss,
            val_acc:    valid.accuracy,
        }
    }
}

/// Loss and accuracy of the model on one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub loss:     f64,
    pub accuracy: f64,
}

impl SplitMetrics {
    /// Average per-batch loss and pooled token accuracy.
    pub fn from_totals(loss_sum: f64, batches: usize, correct: usize, total: usize) -> Self {
        let loss     = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        let accuracy = if total   > 0 { correct as f64 / total as f64 } else { 0.0 };
        Self { loss, accuracy }
    }

    /// e.g. "Valid Loss = 2.1034 - Valid Accuracy = 0.4211"
    pub fn describe(&self, split: &str) -> String {
        format!(
            "{split} Loss = {:.4} - {split} Accuracy = {:.4}",
            self.loss, self.accuracy
        )
    }
}

/// Per-metric arrays, one entry per completed epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss:     Vec<f64>,
    pub acc:      Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_acc:  Vec<f64>,
}

impl TrainingHistory {
    pub fn record(&mut self, m: &EpochMetrics) {
        self.loss.push(m.train_loss);
        self.acc.push(m.train_acc);
        self.val_loss.push(m.val_loss);
        self.val_acc.push(m.val_acc);
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }
}

/// Final metrics on the three splits, as human-readable lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MetricsResults {
    pub train_set: String,
    pub valid_set: String,
    pub test_set:  String,
}

impl MetricsResults {
    pub fn new(train: &SplitMetrics, valid: &SplitMetrics, test: &SplitMetrics) -> Self {
        Self {
            train_set: train.describe("Train"),
            valid_set: valid.describe("Valid"),
            test_set:  test.describe("Test"),
        }
    }
}

/// Appends epoch metrics to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the CSV (with header) inside `dir` if it does not exist yet.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,train_loss,train_acc,val_loss,val_acc")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.train_acc, m.val_loss, m.val_acc,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
