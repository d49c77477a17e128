//! Encoder and frozen decoder.
//!
//! Both implement [`DifferentiableMap`]. The encoder owns its parameters and
//! can be updated by an optimizer; the decoder is sealed at load time.

pub mod decoder;
pub mod encoder;
mod map;

pub use decoder::{CriticArtifact, FrozenDecoder, GeneratorArtifact};
pub use encoder::{Encoder, EncoderGradients};
pub use map::DifferentiableMap;

use ndarray::Array2;

use crate::error::{InversionError, InversionResult};

/// Checks that `encoder → decoder` chains and both agree with the image size.
pub fn ensure_compatible(
    encoder: &Encoder,
    decoder: &FrozenDecoder,
    image_dim: usize,
) -> InversionResult<()> {
    InversionError::check_dim("encoder input vs image size", image_dim, encoder.input_dim())?;
    InversionError::check_dim(
        "encoder latent vs decoder input",
        decoder.latent_dim(),
        encoder.latent_dim(),
    )?;
    InversionError::check_dim("decoder output vs image size", image_dim, decoder.image_dim())
}

/// `decode(encode(images))` without recording anything for backprop.
pub fn reconstruct(encoder: &Encoder, decoder: &FrozenDecoder, images: &Array2<f32>) -> Array2<f32> {
    decoder.decode(&encoder.encode(images))
}
