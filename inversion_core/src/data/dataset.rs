//! Labeled image collections.

use std::fmt;
use std::sync::Arc;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Fixed `C×H×W` geometry shared by every sample of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Number of scalars in one flattened image.
    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }
}

/// A single image with its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Array3<f32>,
    pub label: usize,
}

/// Errors raised while building or reading datasets.
#[derive(Debug)]
pub enum DatasetError {
    Io(std::io::Error),
    /// A sample does not have the dataset's shape.
    ShapeMismatch {
        index: usize,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
    /// A label is outside `0..num_classes`.
    LabelOutOfRange {
        index: usize,
        label: usize,
        num_classes: usize,
    },
    /// An on-disk file did not have the expected layout.
    InvalidFormat(String),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Io(err) => write!(f, "I/O error while reading dataset: {err}"),
            DatasetError::ShapeMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "Sample {index} has shape {found:?}, dataset expects {expected:?}"
            ),
            DatasetError::LabelOutOfRange {
                index,
                label,
                num_classes,
            } => write!(
                f,
                "Sample {index} has label {label}, dataset has {num_classes} classes"
            ),
            DatasetError::InvalidFormat(msg) => write!(f, "Invalid dataset file: {msg}"),
        }
    }
}

impl std::error::Error for DatasetError {}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        DatasetError::Io(err)
    }
}

/// An immutable, validated collection of samples.
///
/// Samples are shared behind an [`Arc`] so views and loader threads can read
/// them without copying.
#[derive(Debug, Clone)]
pub struct LabeledImageDataset {
    shape: ImageShape,
    num_classes: usize,
    samples: Arc<Vec<Sample>>,
}

impl LabeledImageDataset {
    /// Validates every sample against `shape` and `num_classes`.
    pub fn new(
        shape: ImageShape,
        num_classes: usize,
        samples: Vec<Sample>,
    ) -> Result<Self, DatasetError> {
        for (index, sample) in samples.iter().enumerate() {
            if sample.image.dim() != shape.dims() {
                return Err(DatasetError::ShapeMismatch {
                    index,
                    expected: shape.dims(),
                    found: sample.image.dim(),
                });
            }
            if sample.label >= num_classes {
                return Err(DatasetError::LabelOutOfRange {
                    index,
                    label: sample.label,
                    num_classes,
                });
            }
        }

        Ok(Self {
            shape,
            num_classes,
            samples: Arc::new(samples),
        })
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per label, indexed by label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for sample in self.samples.iter() {
            counts[sample.label] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: usize) -> Sample {
        Sample {
            image: Array3::zeros((3, 2, 2)),
            label,
        }
    }

    #[test]
    fn test_validation_rejects_bad_shape() {
        let bad = Sample {
            image: Array3::zeros((1, 2, 2)),
            label: 0,
        };
        let err = LabeledImageDataset::new(ImageShape::new(3, 2, 2), 2, vec![sample(0), bad])
            .unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { index: 1, .. }));
    }

    #[test]
    fn test_validation_rejects_bad_label() {
        let err =
            LabeledImageDataset::new(ImageShape::new(3, 2, 2), 2, vec![sample(2)]).unwrap_err();
        assert!(matches!(err, DatasetError::LabelOutOfRange { label: 2, .. }));
    }

    #[test]
    fn test_class_counts() {
        let dataset = LabeledImageDataset::new(
            ImageShape::new(3, 2, 2),
            3,
            vec![sample(0), sample(2), sample(2)],
        )
        .unwrap();
        assert_eq!(dataset.class_counts(), vec![1, 0, 2]);
        assert_eq!(dataset.shape().numel(), 12);
    }
}
