//! CIFAR-10 binary batch reader.
//!
//! Each record is one label byte followed by 3072 pixel bytes: the red, green
//! and blue 32×32 planes in row-major order.

use std::fs;
use std::path::Path;

use ndarray::Array3;
use tracing::info;

use crate::data::dataset::{DatasetError, ImageShape, LabeledImageDataset, Sample};

pub const CIFAR10_CLASSES: usize = 10;
pub const CIFAR10_SIDE: usize = 32;

const RECORD_PIXELS: usize = 3 * CIFAR10_SIDE * CIFAR10_SIDE;
const RECORD_BYTES: usize = 1 + RECORD_PIXELS;

pub const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
pub const TEST_BATCH: &str = "test_batch.bin";

/// Which half of CIFAR-10 to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarPart {
    Train,
    Test,
}

impl CifarPart {
    fn files(self) -> &'static [&'static str] {
        match self {
            CifarPart::Train => &TRAIN_BATCHES,
            CifarPart::Test => std::slice::from_ref(&TEST_BATCH),
        }
    }
}

/// Loads `part` from `root`, which may be the extracted
/// `cifar-10-batches-bin` directory or its parent.
pub fn load_cifar10<P: AsRef<Path>>(
    root: P,
    part: CifarPart,
) -> Result<LabeledImageDataset, DatasetError> {
    let root = root.as_ref();
    let nested = root.join("cifar-10-batches-bin");
    let dir = if nested.is_dir() { nested } else { root.to_path_buf() };

    let mut samples = Vec::new();
    for name in part.files() {
        let bytes = fs::read(dir.join(name))?;
        samples.extend(decode_records(&bytes, name)?);
    }

    info!(
        "Loaded {} CIFAR-10 {:?} samples from {}",
        samples.len(),
        part,
        dir.display()
    );
    LabeledImageDataset::new(
        ImageShape::new(3, CIFAR10_SIDE, CIFAR10_SIDE),
        CIFAR10_CLASSES,
        samples,
    )
}

/// Decodes raw records, scaling pixels to `[0, 1]`.
pub fn decode_records(bytes: &[u8], source: &str) -> Result<Vec<Sample>, DatasetError> {
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(DatasetError::InvalidFormat(format!(
            "{source}: {} bytes is not a multiple of the {RECORD_BYTES}-byte record size",
            bytes.len()
        )));
    }

    bytes
        .chunks_exact(RECORD_BYTES)
        .map(|record| {
            let label = record[0] as usize;
            let pixels = record[1..].iter().map(|&b| b as f32 / 255.0).collect();
            let image = Array3::from_shape_vec((3, CIFAR10_SIDE, CIFAR10_SIDE), pixels)
                .map_err(|err| DatasetError::InvalidFormat(format!("{source}: {err}")))?;
            Ok(Sample { image, label })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut bytes = vec![label];
        bytes.extend(std::iter::repeat(fill).take(RECORD_PIXELS));
        bytes
    }

    #[test]
    fn decodes_label_and_scales_pixels() {
        let mut bytes = record(3, 255);
        bytes.extend(record(7, 0));
        bytes[1 + 1024] = 51; // first green pixel of record 0
        let samples = decode_records(&bytes, "mem").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, 3);
        assert_eq!(samples[0].image[[0, 0, 0]], 1.0);
        assert!((samples[0].image[[1, 0, 0]] - 0.2).abs() < 1e-6);
        assert_eq!(samples[1].image.sum(), 0.0);
    }

    #[test]
    fn truncated_file_is_invalid() {
        let bytes = record(1, 10);
        let err = decode_records(&bytes[..100], "short").unwrap_err();
        assert!(matches!(err, DatasetError::InvalidFormat(_)));
    }

    #[test]
    fn reads_test_batch_from_directory() {
        let dir = std::env::temp_dir().join(format!("cifar_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let mut bytes = record(0, 128);
        bytes.extend(record(9, 64));
        fs::write(dir.join(TEST_BATCH), bytes).unwrap();

        let dataset = load_cifar10(&dir, CifarPart::Test).unwrap();
        fs::remove_dir_all(&dir).ok();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.class_counts()[9], 1);
    }
}
