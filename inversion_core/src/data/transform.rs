//! Sample transforms: normalization and light augmentation.
//!
//! A transform turns a raw `[0, 1]` image into the normalized array the
//! encoder consumes. Random transforms draw from the generator handed to them
//! so the loader controls reproducibility.

use std::fmt::Debug;

use ndarray::{s, Array3, Axis};
use rand::rngs::StdRng;
use rand::Rng;

/// Per-channel mean of CIFAR-10 training images.
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// Per-channel standard deviation of CIFAR-10 training images.
pub const CIFAR10_STD: [f32; 3] = [0.247, 0.243, 0.261];

/// Given a raw image, produce a transformed image of the same shape.
pub trait SampleTransform: Send + Sync + Debug {
    fn apply(&self, image: &Array3<f32>, rng: &mut StdRng) -> Array3<f32>;
}

/// `(x - mean[c]) / std[c]` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Self {
        assert_eq!(mean.len(), std.len(), "mean/std channel count mismatch");
        Self { mean, std }
    }

    pub fn cifar10() -> Self {
        Self::new(CIFAR10_MEAN.to_vec(), CIFAR10_STD.to_vec())
    }

    /// Statistics for `channels` channels: CIFAR-10 for RGB, `0.5/0.5` otherwise.
    pub fn for_channels(channels: usize) -> Self {
        if channels == 3 {
            Self::cifar10()
        } else {
            Self::new(vec![0.5; channels], vec![0.5; channels])
        }
    }

    /// Maps a normalized image back to `[0, 1]`, clamping out-of-range values.
    pub fn denormalize(&self, image: &Array3<f32>) -> Array3<f32> {
        let mut out = image.clone();
        for (channel, mut plane) in out.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = self.stats(channel);
            plane.mapv_inplace(|v| (v * std + mean).clamp(0.0, 1.0));
        }
        out
    }

    fn stats(&self, channel: usize) -> (f32, f32) {
        let idx = channel.min(self.mean.len() - 1);
        (self.mean[idx], self.std[idx])
    }
}

impl SampleTransform for Normalize {
    fn apply(&self, image: &Array3<f32>, _rng: &mut StdRng) -> Array3<f32> {
        let mut out = image.clone();
        for (channel, mut plane) in out.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = self.stats(channel);
            plane.mapv_inplace(|v| (v - mean) / std);
        }
        out
    }
}

/// Zero-pads each side by `padding` pixels and crops back to the original
/// size at a random offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomCrop {
    pub padding: usize,
}

impl SampleTransform for RandomCrop {
    fn apply(&self, image: &Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        if self.padding == 0 {
            return image.clone();
        }
        let (channels, height, width) = image.dim();
        let pad = self.padding;
        let mut padded = Array3::zeros((channels, height + 2 * pad, width + 2 * pad));
        padded
            .slice_mut(s![.., pad..pad + height, pad..pad + width])
            .assign(image);

        let top = rng.gen_range(0..=2 * pad);
        let left = rng.gen_range(0..=2 * pad);
        padded
            .slice(s![.., top..top + height, left..left + width])
            .to_owned()
    }
}

/// Mirrors the image left-right with probability `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomHorizontalFlip {
    pub p: f64,
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self { p: 0.5 }
    }
}

impl SampleTransform for RandomHorizontalFlip {
    fn apply(&self, image: &Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        if rng.gen_bool(self.p) {
            image.slice(s![.., .., ..;-1]).to_owned()
        } else {
            image.clone()
        }
    }
}

/// Applies transforms in order.
#[derive(Debug, Default)]
pub struct Compose {
    steps: Vec<Box<dyn SampleTransform>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<T: SampleTransform + 'static>(mut self, step: T) -> Self {
        self.steps.push(Box::new(step));
        self
    }
}

impl SampleTransform for Compose {
    fn apply(&self, image: &Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        let mut current = image.clone();
        for step in &self.steps {
            current = step.apply(&current, rng);
        }
        current
    }
}

/// Crop + flip + normalize, as used for the training split.
pub fn train_transform(normalize: Normalize) -> Compose {
    Compose::new()
        .then(RandomCrop { padding: 4 })
        .then(RandomHorizontalFlip::default())
        .then(normalize)
}

/// Normalize only, as used for validation and inference.
pub fn eval_transform(normalize: Normalize) -> Compose {
    Compose::new().then(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ramp() -> Array3<f32> {
        Array3::from_shape_fn((3, 4, 4), |(c, h, w)| (c * 16 + h * 4 + w) as f32 / 48.0)
    }

    #[test]
    fn normalize_then_denormalize_roundtrips() {
        let mut rng = StdRng::seed_from_u64(0);
        let normalize = Normalize::cifar10();
        let image = ramp();
        let back = normalize.denormalize(&normalize.apply(&image, &mut rng));
        for (a, b) in image.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn flip_always_mirrors_columns() {
        let mut rng = StdRng::seed_from_u64(0);
        let image = ramp();
        let flipped = RandomHorizontalFlip { p: 1.0 }.apply(&image, &mut rng);
        assert_eq!(flipped[[1, 2, 0]], image[[1, 2, 3]]);
        assert_eq!(flipped[[0, 0, 3]], image[[0, 0, 0]]);
    }

    #[test]
    fn crop_keeps_shape_and_is_seeded() {
        let image = ramp();
        let crop = RandomCrop { padding: 2 };
        let a = crop.apply(&image, &mut StdRng::seed_from_u64(4));
        let b = crop.apply(&image, &mut StdRng::seed_from_u64(4));
        assert_eq!(a.dim(), image.dim());
        assert_eq!(a, b);
    }

    #[test]
    fn compose_runs_in_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let image = Array3::from_elem((1, 2, 2), 1.0);
        let pipeline = eval_transform(Normalize::new(vec![0.5], vec![0.5]));
        let out = pipeline.apply(&image, &mut rng);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }
}
