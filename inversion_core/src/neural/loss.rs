//! Reconstruction losses and distances.

use ndarray::{Array2, Zip};

/// Computes the pixel-wise mean squared error and its gradient.
///
/// # Arguments
///
/// * `predicted` - Reconstructed batch `[N, D]`
/// * `target` - Original batch `[N, D]`
///
/// # Returns
///
/// Tuple of (mean loss over all `N·D` elements, gradient w.r.t. `predicted`)
pub fn mse_loss_with_gradients(
    predicted: &Array2<f32>,
    target: &Array2<f32>,
) -> (f32, Array2<f32>) {
    assert_eq!(predicted.dim(), target.dim(), "shape mismatch for MSE");

    let diff = predicted - target;
    let n = diff.len().max(1) as f32;
    let loss = squared_sum(&diff) as f32 / n;

    // Gradient = 2 * (predicted - target) / N
    let gradient = diff * (2.0 / n);

    (loss, gradient)
}

/// Pixel-wise mean squared error without a gradient.
pub fn mse_loss(predicted: &Array2<f32>, target: &Array2<f32>) -> f32 {
    assert_eq!(predicted.dim(), target.dim(), "shape mismatch for MSE");
    let n = predicted.len().max(1) as f64;
    let mut sum = 0.0f64;
    Zip::from(predicted).and(target).for_each(|&p, &t| {
        let d = (p - t) as f64;
        sum += d * d;
    });
    (sum / n) as f32
}

/// Sum of absolute differences over every element of the batch.
pub fn l1_distance_sum(predicted: &Array2<f32>, target: &Array2<f32>) -> f64 {
    assert_eq!(predicted.dim(), target.dim(), "shape mismatch for L1");
    Zip::from(predicted)
        .and(target)
        .fold(0.0f64, |acc, &p, &t| acc + (p - t).abs() as f64)
}

/// Sum of squared differences over every element of the batch.
pub fn l2_distance_sum(predicted: &Array2<f32>, target: &Array2<f32>) -> f64 {
    assert_eq!(predicted.dim(), target.dim(), "shape mismatch for L2");
    Zip::from(predicted).and(target).fold(0.0f64, |acc, &p, &t| {
        let d = (p - t) as f64;
        acc + d * d
    })
}

fn squared_sum(values: &Array2<f32>) -> f64 {
    values.fold(0.0f64, |acc, &v| acc + (v as f64) * (v as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse_loss() {
        let predicted = array![[1.0, 2.0], [3.0, 4.0]];
        let target = array![[1.0, 0.0], [3.0, 2.0]];

        let (loss, gradient) = mse_loss_with_gradients(&predicted, &target);

        assert!((loss - 2.0).abs() < 1e-6);
        assert_eq!(gradient, array![[0.0, 1.0], [0.0, 1.0]]);
        assert!((mse_loss(&predicted, &target) - loss).abs() < 1e-6);
    }

    #[test]
    fn test_distance_sums() {
        let predicted = array![[0.5, -0.5, 1.0]];
        let target = array![[0.0, 0.0, 0.0]];
        assert!((l1_distance_sum(&predicted, &target) - 2.0).abs() < 1e-9);
        assert!((l2_distance_sum(&predicted, &target) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_sums_follow_row_major_order() {
        let predicted = Array2::from_shape_fn((64, 97), |(r, c)| {
            ((r * 131 + c * 17) % 251) as f32 * 1e-3 - 0.1
        });
        let target = Array2::from_shape_fn((64, 97), |(r, c)| ((r * 7 + c * 3) % 13) as f32 * 1e-2);
        let mut l1 = 0.0f64;
        let mut l2 = 0.0f64;
        for (&p, &t) in predicted.iter().zip(target.iter()) {
            let d = (p - t) as f64;
            l1 += d.abs();
            l2 += d * d;
        }
        assert_eq!(l1_distance_sum(&predicted, &target), l1);
        assert_eq!(l2_distance_sum(&predicted, &target), l2);
        assert_eq!(mse_loss(&predicted, &target), (l2 / predicted.len() as f64) as f32);
    }

    #[test]
    fn test_identical_inputs_have_zero_loss() {
        let x = array![[0.1, 0.2], [0.3, 0.4]];
        let (loss, gradient) = mse_loss_with_gradients(&x, &x);
        assert_eq!(loss, 0.0);
        assert!(gradient.iter().all(|&g| g == 0.0));
        assert_eq!(l1_distance_sum(&x, &x), 0.0);
    }
}
