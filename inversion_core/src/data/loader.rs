//! Mini-batch loading with bounded prefetch.
//!
//! A producer thread assembles batches (transforming samples in parallel on
//! the rayon pool) and hands them to the consumer through a bounded
//! `sync_channel`. The consumer sees a plain blocking "next batch".

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use ndarray::Array2;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::debug;

use crate::data::split::DatasetView;
use crate::data::transform::SampleTransform;
use crate::rng::{RngContext, RngStream};

/// Flattened images `[N, C·H·W]` with their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: Array2<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub struct DataLoader {
    view: DatasetView,
    batch_size: usize,
    shuffle: bool,
    prefetch: usize,
    transform: Arc<dyn SampleTransform>,
    rng: RngContext,
}

impl DataLoader {
    pub fn new(
        view: DatasetView,
        batch_size: usize,
        transform: Arc<dyn SampleTransform>,
        rng: RngContext,
    ) -> Self {
        Self {
            view,
            batch_size: batch_size.max(1),
            shuffle: false,
            prefetch: 2,
            transform,
            rng,
        }
    }

    pub fn shuffled(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Number of batches the producer may run ahead of the consumer.
    pub fn with_prefetch(mut self, depth: usize) -> Self {
        self.prefetch = depth.max(1);
        self
    }

    pub fn view(&self) -> &DatasetView {
        &self.view
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Batches per epoch; the final batch may be partial.
    pub fn num_batches(&self) -> usize {
        self.view.len().div_ceil(self.batch_size)
    }

    /// Positions into the view for `epoch`, shuffled if enabled.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.view.len()).collect();
        if self.shuffle {
            let mut rng = self.rng.stream(RngStream::Shuffle {
                epoch: epoch as u64,
            });
            order.shuffle(&mut rng);
        }
        order
    }

    /// The first `count` samples of the view, in view order, transformed as
    /// for epoch 0. Used for fixed visualization batches.
    pub fn head(&self, count: usize) -> Option<Batch> {
        let count = count.min(self.view.len());
        if count == 0 {
            return None;
        }
        let positions: Vec<usize> = (0..count).collect();
        Some(self.assemble(0, &positions, 0))
    }

    /// Feeds every batch of `epoch` to `consume`, in order.
    ///
    /// Stops at the first error returned by `consume`; the producer thread is
    /// joined before returning either way.
    pub fn for_each_batch<E, F>(&self, epoch: usize, mut consume: F) -> Result<(), E>
    where
        F: FnMut(usize, Batch) -> Result<(), E>,
    {
        let order = self.epoch_order(epoch);
        let batch_size = self.batch_size;

        thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<Batch>(self.prefetch);
            let order = &order;

            scope.spawn(move || {
                for (batch_index, positions) in order.chunks(batch_size).enumerate() {
                    let batch = self.assemble(epoch, positions, batch_index * batch_size);
                    if tx.send(batch).is_err() {
                        debug!("Loader consumer hung up after batch {}", batch_index);
                        return;
                    }
                }
            });

            for (batch_index, batch) in rx.iter().enumerate() {
                consume(batch_index, batch)?;
            }
            Ok(())
        })
    }

    fn assemble(&self, epoch: usize, positions: &[usize], offset: usize) -> Batch {
        let numel = self.view.dataset().shape().numel();
        let transformed: Vec<(Vec<f32>, usize)> = positions
            .par_iter()
            .enumerate()
            .map(|(i, &position)| {
                let sample = self.view.sample(position);
                let mut rng = self.rng.stream(RngStream::Augment {
                    epoch: epoch as u64,
                    position: (offset + i) as u64,
                });
                let image = self.transform.apply(&sample.image, &mut rng);
                (image.iter().copied().collect(), sample.label)
            })
            .collect();

        let mut images = Array2::zeros((positions.len(), numel));
        let mut labels = Vec::with_capacity(positions.len());
        for (mut row, (pixels, label)) in images.rows_mut().into_iter().zip(transformed) {
            for (dst, src) in row.iter_mut().zip(pixels) {
                *dst = src;
            }
            labels.push(label);
        }
        Batch { images, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{ImageShape, LabeledImageDataset, Sample};
    use crate::data::transform::{train_transform, Compose, Normalize};
    use ndarray::Array3;

    fn view(count: usize) -> DatasetView {
        let samples = (0..count)
            .map(|i| Sample {
                image: Array3::from_elem((1, 2, 2), i as f32),
                label: i % 2,
            })
            .collect();
        let dataset = LabeledImageDataset::new(ImageShape::new(1, 2, 2), 2, samples).unwrap();
        DatasetView::full(&dataset)
    }

    fn identity() -> Arc<dyn SampleTransform> {
        Arc::new(Compose::new())
    }

    #[test]
    fn partial_final_batch_is_kept() {
        let loader = DataLoader::new(view(7), 3, identity(), RngContext::new(0));
        assert_eq!(loader.num_batches(), 3);
        let mut sizes = Vec::new();
        loader
            .for_each_batch::<(), _>(0, |_, batch| {
                sizes.push(batch.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn unshuffled_order_is_view_order() {
        let loader = DataLoader::new(view(5), 2, identity(), RngContext::new(0));
        let mut firsts = Vec::new();
        loader
            .for_each_batch::<(), _>(0, |_, batch| {
                firsts.extend(batch.images.column(0).iter().copied());
                Ok(())
            })
            .unwrap();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn shuffle_is_seeded_per_epoch() {
        let loader = DataLoader::new(view(32), 8, identity(), RngContext::new(4)).shuffled(true);
        assert_eq!(loader.epoch_order(1), loader.epoch_order(1));
        assert_ne!(loader.epoch_order(1), loader.epoch_order(2));
        let mut sorted = loader.epoch_order(3);
        sorted.sort_unstable();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn augmented_batches_are_deterministic() {
        let transform: Arc<dyn SampleTransform> =
            Arc::new(train_transform(Normalize::new(vec![0.5], vec![0.5])));
        let collect = || {
            let loader = DataLoader::new(view(12), 5, transform.clone(), RngContext::new(9))
                .shuffled(true)
                .with_prefetch(1);
            let mut out = Vec::new();
            loader
                .for_each_batch::<(), _>(2, |_, batch| {
                    out.push(batch);
                    Ok(())
                })
                .unwrap();
            out
        };
        assert_eq!(collect(), collect());
    }

    #[test]
    fn consumer_error_stops_iteration() {
        let loader = DataLoader::new(view(10), 2, identity(), RngContext::new(0)).with_prefetch(1);
        let mut seen = 0;
        let result = loader.for_each_batch(0, |index, _| {
            seen += 1;
            if index == 1 {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, 2);
    }

    #[test]
    fn head_takes_leading_samples() {
        let loader = DataLoader::new(view(5), 2, identity(), RngContext::new(0)).shuffled(true);
        let head = loader.head(3).unwrap();
        assert_eq!(head.labels, vec![0, 1, 0]);
        assert!(loader.head(0).is_none());
    }
}
