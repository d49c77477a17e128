//! Plateau-based learning-rate reduction.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::neural::LearningRate;

/// Multiplies the learning rate by `factor` once the monitored validation
/// loss has failed to improve on its best value by more than `threshold`
/// (absolute) for `patience` consecutive epochs.
///
/// The counter resets on every improvement and on every reduction. The
/// learning rate never drops below `min_lr`.
///
/// # Examples
///
/// ```
/// use latent_inversion_core::neural::{AdamOptimizer, LearningRate};
/// use latent_inversion_core::scheduler::PlateauScheduler;
///
/// let mut optimizer = AdamOptimizer::new(1e-3, (0.5, 0.999), 0.0);
/// let mut scheduler = PlateauScheduler::new(0.5, 2);
/// scheduler.step(1.0, &mut optimizer);
/// scheduler.step(1.0, &mut optimizer);
/// assert!(scheduler.step(1.0, &mut optimizer));
/// assert!((optimizer.learning_rate() - 5e-4).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauScheduler {
    factor: f32,
    patience: usize,
    threshold: f32,
    min_lr: f32,
    best: Option<f32>,
    num_bad_epochs: usize,
    num_reductions: usize,
}

impl PlateauScheduler {
    pub fn new(factor: f32, patience: usize) -> Self {
        Self {
            factor,
            patience,
            threshold: 1e-4,
            min_lr: 0.0,
            best: None,
            num_bad_epochs: 0,
            num_reductions: 0,
        }
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }

    pub fn num_bad_epochs(&self) -> usize {
        self.num_bad_epochs
    }

    pub fn num_reductions(&self) -> usize {
        self.num_reductions
    }

    /// Feeds one epoch's validation loss. Returns `true` if the learning rate
    /// of `target` was lowered.
    pub fn step<T: LearningRate + ?Sized>(&mut self, val_loss: f32, target: &mut T) -> bool {
        let improved = match self.best {
            None => true,
            Some(best) => val_loss < best - self.threshold,
        };

        if improved {
            self.best = Some(val_loss);
            self.num_bad_epochs = 0;
            return false;
        }

        self.num_bad_epochs += 1;
        if self.num_bad_epochs < self.patience {
            return false;
        }

        self.num_bad_epochs = 0;
        let current = target.learning_rate();
        let reduced = (current * self.factor).max(self.min_lr);
        if reduced >= current {
            return false;
        }

        target.set_learning_rate(reduced);
        self.num_reductions += 1;
        info!(
            "Validation loss plateaued at {:.6}; learning rate {:.3e} -> {:.3e}",
            self.best.unwrap_or(val_loss),
            current,
            reduced
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32);

    impl LearningRate for Fixed {
        fn learning_rate(&self) -> f32 {
            self.0
        }

        fn set_learning_rate(&mut self, lr: f32) {
            self.0 = lr;
        }
    }

    #[test]
    fn reduces_only_after_patience_bad_epochs() {
        let mut lr = Fixed(0.1);
        let mut scheduler = PlateauScheduler::new(0.5, 3);

        assert!(!scheduler.step(1.0, &mut lr));
        assert!(!scheduler.step(1.0, &mut lr));
        assert!(!scheduler.step(1.0, &mut lr));
        assert_eq!(lr.0, 0.1);
        assert!(scheduler.step(1.0, &mut lr));
        assert_eq!(lr.0, 0.05);
        assert_eq!(scheduler.num_bad_epochs(), 0);
    }

    #[test]
    fn improvement_resets_counter() {
        let mut lr = Fixed(0.1);
        let mut scheduler = PlateauScheduler::new(0.5, 2);

        scheduler.step(1.0, &mut lr);
        scheduler.step(1.0, &mut lr);
        assert_eq!(scheduler.num_bad_epochs(), 1);
        scheduler.step(0.5, &mut lr);
        assert_eq!(scheduler.num_bad_epochs(), 0);
        assert_eq!(scheduler.best(), Some(0.5));
        assert_eq!(lr.0, 0.1);
    }

    #[test]
    fn improvement_within_threshold_counts_as_bad() {
        let mut lr = Fixed(0.1);
        let mut scheduler = PlateauScheduler::new(0.5, 1).threshold(0.01);
        scheduler.step(1.0, &mut lr);
        assert!(scheduler.step(0.995, &mut lr));
        assert_eq!(scheduler.best(), Some(1.0));
    }

    #[test]
    fn floor_is_respected() {
        let mut lr = Fixed(1e-3);
        let mut scheduler = PlateauScheduler::new(0.1, 1).min_lr(5e-4);
        scheduler.step(1.0, &mut lr);
        assert!(scheduler.step(1.0, &mut lr));
        assert_eq!(lr.0, 5e-4);
        assert!(!scheduler.step(1.0, &mut lr));
        assert_eq!(lr.0, 5e-4);
        assert_eq!(scheduler.num_reductions(), 1);
    }
}
