//! Reconstruction grids.
//!
//! Originals and reconstructions are interleaved (`orig₀, recon₀, orig₁, …`),
//! mapped back to `[0, 1]` and tiled 8 per row with a 2-pixel border, then
//! written as a PNG through the plotters bitmap backend.

use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array3, ArrayView1};
use plotters::prelude::*;
use tracing::debug;

use crate::data::{ImageShape, Normalize};
use crate::error::{InversionError, InversionResult};
use crate::model::{reconstruct, Encoder, FrozenDecoder};

pub const TILES_PER_ROW: usize = 8;
pub const PADDING: usize = 2;

/// Reconstructs `images` and writes the interleaved grid to `output_path`.
///
/// Returns the path written.
pub fn render_grid(
    encoder: &Encoder,
    decoder: &FrozenDecoder,
    images: &Array2<f32>,
    shape: ImageShape,
    normalize: &Normalize,
    output_path: impl AsRef<Path>,
) -> InversionResult<PathBuf> {
    let output_path = output_path.as_ref();
    let recons = reconstruct(encoder, decoder, images);
    let tiles = interleave(images, &recons, shape, normalize);
    let grid = compose_grid(&tiles, shape);
    write_png(&grid, output_path).map_err(|reason| InversionError::Render {
        path: output_path.to_path_buf(),
        reason,
    })?;
    debug!("Wrote {} tiles to {}", tiles.len(), output_path.display());
    Ok(output_path.to_path_buf())
}

/// Denormalized `(original, reconstruction)` tiles in display order.
pub fn interleave(
    originals: &Array2<f32>,
    recons: &Array2<f32>,
    shape: ImageShape,
    normalize: &Normalize,
) -> Vec<Array3<f32>> {
    let to_tile = |row: ArrayView1<f32>| {
        let image = Array3::from_shape_fn(shape.dims(), |(c, h, w)| {
            row[(c * shape.height + h) * shape.width + w]
        });
        normalize.denormalize(&image)
    };

    originals
        .rows()
        .into_iter()
        .zip(recons.rows())
        .flat_map(|(orig, recon)| [to_tile(orig), to_tile(recon)])
        .collect()
}

/// Lays `tiles` out on an RGB canvas `[H, W, 3]` with a black border.
/// Single-channel tiles are shown as grey.
pub fn compose_grid(tiles: &[Array3<f32>], shape: ImageShape) -> Array3<f32> {
    let cols = TILES_PER_ROW.min(tiles.len()).max(1);
    let rows = tiles.len().div_ceil(cols).max(1);
    let cell_h = shape.height + PADDING;
    let cell_w = shape.width + PADDING;
    let mut canvas = Array3::zeros((rows * cell_h + PADDING, cols * cell_w + PADDING, 3));

    for (index, tile) in tiles.iter().enumerate() {
        let top = (index / cols) * cell_h + PADDING;
        let left = (index % cols) * cell_w + PADDING;
        for rgb in 0..3 {
            let channel = rgb.min(shape.channels - 1);
            canvas
                .slice_mut(s![top..top + shape.height, left..left + shape.width, rgb])
                .assign(&tile.slice(s![channel, .., ..]));
        }
    }
    canvas
}

fn write_png(canvas: &Array3<f32>, path: &Path) -> Result<(), String> {
    let (rows, cols, _) = canvas.dim();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }

    let backend = BitMapBackend::new(path, (cols as u32, rows as u32));
    let drawing_area = backend.into_drawing_area();
    drawing_area
        .fill(&RGBColor(0, 0, 0))
        .map_err(|err| err.to_string())?;

    for row in 0..rows {
        for col in 0..cols {
            let pixel = canvas.slice(s![row, col, ..]);
            let color = RGBColor(
                float_to_byte(pixel[0]),
                float_to_byte(pixel[1]),
                float_to_byte(pixel[2]),
            );
            drawing_area
                .draw_pixel((col as i32, row as i32), &color)
                .map_err(|err| err.to_string())?;
        }
    }

    drawing_area.present().map_err(|err| err.to_string())
}

fn float_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
