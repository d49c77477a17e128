//! Reconstruction-fidelity metrics over a split.

use serde::Serialize;
use tracing::info;

use crate::data::DataLoader;
use crate::error::{InversionError, InversionResult};
use crate::logging::Metric;
use crate::model::{reconstruct, Encoder, FrozenDecoder};
use crate::neural::{l1_distance_sum, l2_distance_sum};

/// Summed and per-sample L1/L2 distances between originals and their
/// reconstructions. Sums are over every pixel of every sample; means divide
/// the sums by `count`, the number of samples in the split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceReport {
    pub count: usize,
    pub sum_l1: f64,
    pub sum_l2: f64,
    pub mean_l1: f64,
    pub mean_l2: f64,
}

impl DistanceReport {
    fn from_sums(count: usize, sum_l1: f64, sum_l2: f64) -> Self {
        Self {
            count,
            sum_l1,
            sum_l2,
            mean_l1: sum_l1 / count as f64,
            mean_l2: sum_l2 / count as f64,
        }
    }
}

/// Runs every sample of `split` through `decode(encode(x))` and accumulates
/// distances. Nothing is recorded for backprop.
///
/// Fails with [`InversionError::EmptySplit`] if the loader has no samples.
pub fn evaluate_distances(
    encoder: &Encoder,
    decoder: &FrozenDecoder,
    split: &DataLoader,
    split_name: &str,
) -> InversionResult<DistanceReport> {
    if split.is_empty() {
        return Err(InversionError::EmptySplit {
            split: split_name.to_string(),
        });
    }

    let mut sum_l1 = 0.0;
    let mut sum_l2 = 0.0;
    let mut count = 0;
    split.for_each_batch::<InversionError, _>(0, |_, batch| {
        let output = reconstruct(encoder, decoder, &batch.images);
        sum_l1 += l1_distance_sum(&output, &batch.images);
        sum_l2 += l2_distance_sum(&output, &batch.images);
        count += batch.len();
        Ok(())
    })?;

    let report = DistanceReport::from_sums(count, sum_l1, sum_l2);
    info!(
        "{} split: {} samples, L1 {:.4} (mean {:.4}), L2 {:.4} (mean {:.4})",
        split_name, report.count, report.sum_l1, report.mean_l1, report.sum_l2, report.mean_l2
    );
    Ok(report)
}

/// Distances over the known and unknown splits of one inference run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceReport {
    pub checkpoint_epoch: usize,
    pub known: DistanceReport,
    pub unknown: DistanceReport,
}

impl InferenceReport {
    /// The eight scalars forwarded to the metrics sink.
    pub fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::scalar("known L1 distance", self.known.sum_l1),
            Metric::scalar("unknown L1 distance", self.unknown.sum_l1),
            Metric::scalar("known mean L1 distance", self.known.mean_l1),
            Metric::scalar("unknown mean L1 distance", self.unknown.mean_l1),
            Metric::scalar("known L2 distance", self.known.sum_l2),
            Metric::scalar("unknown L2 distance", self.unknown.sum_l2),
            Metric::scalar("known mean L2 distance", self.known.mean_l2),
            Metric::scalar("unknown mean L2 distance", self.unknown.mean_l2),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{eval_transform, DatasetView, ImageShape, LabeledImageDataset, Normalize, Sample};
    use crate::model::{CriticArtifact, GeneratorArtifact};
    use crate::rng::RngContext;
    use ndarray::Array3;
    use std::sync::Arc;

    fn fixture(count: usize) -> (Encoder, FrozenDecoder, DataLoader) {
        let rng = RngContext::new(21);
        let shape = ImageShape::new(1, 2, 3);
        let samples = (0..count)
            .map(|i| Sample {
                image: Array3::from_elem((1, 2, 3), (i % 5) as f32 / 5.0),
                label: 0,
            })
            .collect();
        let dataset = LabeledImageDataset::new(shape, 1, samples).unwrap();
        let loader = DataLoader::new(
            DatasetView::full(&dataset),
            4,
            Arc::new(eval_transform(Normalize::for_channels(1))),
            rng,
        );
        let decoder = FrozenDecoder::from_artifacts(
            GeneratorArtifact::random(3, &[5], 6, &rng),
            CriticArtifact::random(6, &[4], &rng),
        )
        .unwrap();
        (Encoder::new(6, &[5], 3, &rng), decoder, loader)
    }

    #[test]
    fn means_divide_sums_by_split_size() {
        let (encoder, decoder, loader) = fixture(10);
        let report = evaluate_distances(&encoder, &decoder, &loader, "known").unwrap();
        assert_eq!(report.count, 10);
        assert_eq!(report.mean_l1, report.sum_l1 / 10.0);
        assert_eq!(report.mean_l2, report.sum_l2 / 10.0);
        assert!(report.sum_l1 > 0.0);
    }

    #[test]
    fn empty_split_fails() {
        let (encoder, decoder, _) = fixture(1);
        let empty = LabeledImageDataset::new(ImageShape::new(1, 2, 3), 1, Vec::new()).unwrap();
        let loader = DataLoader::new(
            DatasetView::full(&empty),
            4,
            Arc::new(eval_transform(Normalize::for_channels(1))),
            RngContext::new(0),
        );
        let err = evaluate_distances(&encoder, &decoder, &loader, "unknown").unwrap_err();
        assert!(matches!(err, InversionError::EmptySplit { ref split } if split == "unknown"));
    }

    #[test]
    fn inference_report_has_eight_named_scalars() {
        let known = DistanceReport::from_sums(4, 8.0, 2.0);
        let unknown = DistanceReport::from_sums(2, 3.0, 1.0);
        let report = InferenceReport {
            checkpoint_epoch: 100,
            known,
            unknown,
        };
        let metrics = report.metrics();
        assert_eq!(metrics.len(), 8);
        assert_eq!(metrics[2], Metric::scalar("known mean L1 distance", 2.0));
        assert_eq!(metrics[7], Metric::scalar("unknown mean L2 distance", 0.5));
    }
}
