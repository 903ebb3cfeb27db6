// ============================================================
// Layer 5 — Learning-Rate Schedule
// ============================================================
// Inverse-square-root schedule with linear warmup
// (Vaswani et al., 2017, §5.3):
//
//   lr(step) = d^-0.5 · min(step^-0.5, step · warmup^-1.5)
//
// The rate grows linearly for `warmup_steps` optimiser steps,
// peaks at step == warmup_steps, then decays as 1/√step.
// Steps are counted from 1.

pub const DEFAULT_WARMUP_STEPS: usize = 4000;

#[derive(Debug, Clone)]
pub struct WarmupSchedule {
    embed_dim:    usize,
    warmup_steps: usize,
    step:         usize,
}

impl WarmupSchedule {
    pub fn new(embed_dim: usize, warmup_steps: usize) -> Self {
        Self { embed_dim, warmup_steps: warmup_steps.max(1), step: 0 }
    }

    /// Learning rate at an explicit (1-based) step.
    pub fn lr_at(&self, step: usize) -> f64 {
        let step   = step.max(1) as f64;
        let warmup = self.warmup_steps as f64;
        let arg1   = step.powf(-0.5);
        let arg2   = step * warmup.powf(-1.5);
        (self.embed_dim as f64).powf(-0.5) * arg1.min(arg2)
    }

    /// Advance one optimiser step and return its learning rate.
    pub fn next_lr(&mut self) -> f64 {
        self.step += 1;
        self.lr_at(self.step)
    }

    /// Number of optimiser steps taken so far
    pub fn steps(&self) -> usize {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_at_warmup() {
        let s    = WarmupSchedule::new(512, 4000);
        let peak = s.lr_at(4000);
        assert!(s.lr_at(3999) < peak);
        assert!(s.lr_at(4001) < peak);
        let expected = 512f64.powf(-0.5) * 4000f64.powf(-0.5);
        assert!((peak - expected).abs() < 1e-12);
    }

    #[test]
    fn test_linear_warmup() {
        let s = WarmupSchedule::new(256, 100);
        let ratio = s.lr_at(20) / s.lr_at(10);
        assert!((ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_next_lr_counts_from_one() {
        let mut s = WarmupSchedule::new(64, 10);
        let first = s.next_lr();
        assert_eq!(s.steps(), 1);
        assert_eq!(first, s.lr_at(1));
        assert!(first > 0.0);
    }

    #[test]
    fn test_step_zero_is_treated_as_one() {
        let s = WarmupSchedule::new(64, 10);
        assert_eq!(s.lr_at(0), s.lr_at(1));
    }
}
