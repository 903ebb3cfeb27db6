// ============================================================
// Layer 5 — Early Stopping
// ============================================================
// Watches validation loss after every epoch. Training halts once
// `patience` consecutive epochs fail to improve on the best loss
// seen so far. The trainer keeps a copy of the model from the
// best epoch and restores it at the end.

pub const DEFAULT_PATIENCE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// New best: snapshot the model
    Improved,
    /// No improvement yet, keep going
    Waiting,
    /// Patience exhausted
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:   usize,
    best:       f64,
    best_epoch: Option<usize>,
    wait:       usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: f64::INFINITY, best_epoch: None, wait: 0 }
    }

    /// Record the validation loss of `epoch`. NaN never counts as an improvement.
    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> Decision {
        if val_loss < self.best {
            self.best       = val_loss;
            self.best_epoch = Some(epoch);
            self.wait       = 0;
            return Decision::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            Decision::Stop
        } else {
            Decision::Waiting
        }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_loss(&self) -> f64 {
        self.best
    }
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(DEFAULT_PATIENCE)
    }
}
