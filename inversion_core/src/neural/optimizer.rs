//! Optimizers for training the encoder.

use std::collections::HashMap;

use ndarray::{Array, ArrayD, Dimension, Zip};

/// Read/write access to an optimizer's learning rate.
///
/// Schedulers only need this, not the update rule itself.
pub trait LearningRate {
    fn learning_rate(&self) -> f32;
    fn set_learning_rate(&mut self, lr: f32);
}

/// Adam optimizer (Adaptive Moment Estimation).
///
/// Implements the update rule:
/// ```text
/// g  = gradient + weight_decay * param
/// m  = beta1 * m + (1 - beta1) * g
/// v  = beta2 * v + (1 - beta2) * g²
/// param -= lr * m̂ / (sqrt(v̂) + epsilon)
/// ```
/// where `m̂`, `v̂` are the bias-corrected moments for step `t`.
pub struct AdamOptimizer {
    /// Learning rate
    pub learning_rate: f32,
    /// Exponential decay rate for first moment
    pub beta1: f32,
    /// Exponential decay rate for second moment
    pub beta2: f32,
    /// Small constant for numerical stability
    pub epsilon: f32,
    /// L2 penalty folded into the gradient
    pub weight_decay: f32,
    first_moments: HashMap<String, ArrayD<f32>>,
    second_moments: HashMap<String, ArrayD<f32>>,
    t: usize,
}

impl AdamOptimizer {
    /// Creates a new Adam optimizer.
    ///
    /// # Examples
    ///
    /// ```
    /// use latent_inversion_core::neural::AdamOptimizer;
    ///
    /// let optimizer = AdamOptimizer::new(1e-3, (0.5, 0.999), 1e-4);
    /// assert_eq!(optimizer.step_count(), 0);
    /// ```
    pub fn new(learning_rate: f32, betas: (f32, f32), weight_decay: f32) -> Self {
        Self {
            learning_rate,
            beta1: betas.0,
            beta2: betas.1,
            epsilon: 1e-8,
            weight_decay,
            first_moments: HashMap::new(),
            second_moments: HashMap::new(),
            t: 0,
        }
    }

    /// Starts a new optimizer step. Call once before updating the parameters
    /// of one batch so that all of them share the same bias correction.
    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    /// Number of optimizer steps taken so far.
    pub fn step_count(&self) -> usize {
        self.t
    }

    /// Names of the parameters with moment estimates, sorted.
    pub fn bound_parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.first_moments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Updates one named parameter in place.
    pub fn update<D: Dimension>(
        &mut self,
        param_name: &str,
        param: &mut Array<f32, D>,
        gradient: &Array<f32, D>,
    ) {
        assert_eq!(param.shape(), gradient.shape(), "gradient shape mismatch");
        let t = self.t.max(1) as i32;
        let (beta1, beta2) = (self.beta1, self.beta2);
        let (lr, eps, decay) = (self.learning_rate, self.epsilon, self.weight_decay);
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);

        let shape = param.shape().to_vec();
        let m = self
            .first_moments
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(shape.clone()));
        let v = self
            .second_moments
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(shape));

        let mut param = param.view_mut().into_dyn();
        let gradient = gradient.view().into_dyn();

        Zip::from(&mut param)
            .and(&gradient)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                let g = g + decay * *p;
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

impl LearningRate for AdamOptimizer {
    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
