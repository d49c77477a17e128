#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use latent_inversion_core::checkpoint::Checkpointable;
use latent_inversion_core::data::{
    eval_transform, DataLoader, DatasetView, ImageShape, LabeledImageDataset, Normalize, Sample,
};
use latent_inversion_core::model::{CriticArtifact, FrozenDecoder, GeneratorArtifact};
use latent_inversion_core::rng::RngContext;
use ndarray::Array3;

pub fn temp_dir(stem: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{stem}_{}", uuid::Uuid::new_v4()))
}

/// `counts[label]` samples per label, each a deterministic ramp.
pub fn labeled_dataset(shape: ImageShape, counts: &[usize]) -> LabeledImageDataset {
    let mut samples = Vec::new();
    for (label, &count) in counts.iter().enumerate() {
        for i in 0..count {
            let image = Array3::from_shape_fn(shape.dims(), |(c, h, w)| {
                ((label * 7 + i * 3 + c * 5 + h * 2 + w) % 17) as f32 / 17.0
            });
            samples.push(Sample { image, label });
        }
    }
    LabeledImageDataset::new(shape, counts.len(), samples).expect("valid dataset")
}

pub fn eval_loader(view: DatasetView, batch_size: usize, channels: usize) -> DataLoader {
    DataLoader::new(
        view,
        batch_size,
        Arc::new(eval_transform(Normalize::for_channels(channels))),
        RngContext::new(0),
    )
}

pub fn random_decoder(latent_dim: usize, image_dim: usize) -> FrozenDecoder {
    let rng = RngContext::new(77);
    FrozenDecoder::from_artifacts(
        GeneratorArtifact::random(latent_dim, &[16], image_dim, &rng),
        CriticArtifact::random(image_dim, &[8], &rng),
    )
    .expect("matching artifacts")
}

/// Writes random generator/critic artifacts and returns their paths.
pub fn write_artifacts(dir: &Path, latent_dim: usize, image_dim: usize) -> (PathBuf, PathBuf) {
    let rng = RngContext::new(77);
    let generator = dir.join("generator.bin");
    let discriminator = dir.join("discriminator.bin");
    GeneratorArtifact::random(latent_dim, &[16], image_dim, &rng)
        .save_checkpoint(&generator)
        .expect("write generator");
    CriticArtifact::random(image_dim, &[8], &rng)
        .save_checkpoint(&discriminator)
        .expect("write critic");
    (generator, discriminator)
}

pub fn toml_path(path: &Path) -> String {
    format!("{:?}", path.display().to_string())
}
