//! Known/unknown class partitioning.
//!
//! A [`SplitPolicy`] turns a split index into a [`SplitAssignment`]: the
//! labels the encoder is trained on ("known") and the complement held out for
//! generalization checks ("unknown"). [`restrict_to`] then materializes the
//! matching sample indices once as a [`DatasetView`].

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::data::dataset::{LabeledImageDataset, Sample};
use crate::error::{InversionError, InversionResult};
use crate::rng::{RngContext, RngStream};

/// How known labels are chosen for a split index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Split `i` keeps labels `i, i+1, …, i+num_known-1` (mod `num_classes`).
    #[default]
    Rotating,
    /// Split `i` keeps the first `num_known` labels of a permutation drawn
    /// from the split's own random stream.
    Shuffled,
}

/// Partition of the label universe for one split index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    pub split_index: usize,
    pub known: BTreeSet<usize>,
    pub unknown: BTreeSet<usize>,
}

#[derive(Debug, Clone)]
pub struct SplitPolicy {
    num_classes: usize,
    num_known: usize,
    strategy: SplitStrategy,
    rng: RngContext,
}

impl SplitPolicy {
    /// Creates a rotating policy over `num_classes` labels keeping
    /// `num_known` of them.
    pub fn new(num_classes: usize, num_known: usize) -> Self {
        Self {
            num_classes,
            num_known,
            strategy: SplitStrategy::Rotating,
            rng: RngContext::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SplitStrategy, rng: RngContext) -> Self {
        self.strategy = strategy;
        self.rng = rng;
        self
    }

    /// Split indices are valid in `0..num_splits()`.
    pub fn num_splits(&self) -> usize {
        self.num_classes
    }

    /// Computes the assignment for `split_index`.
    ///
    /// Fails with [`InversionError::InvalidSplit`] when the index is out of
    /// range or the policy could not leave both sides non-empty.
    pub fn partition(
        &self,
        dataset: &LabeledImageDataset,
        split_index: usize,
    ) -> InversionResult<SplitAssignment> {
        let invalid = |reason: &str| InversionError::InvalidSplit {
            split_index,
            supported: self.num_splits(),
            reason: reason.to_string(),
        };

        if dataset.num_classes() != self.num_classes {
            return Err(invalid(&format!(
                "dataset has {} classes, policy expects {}",
                dataset.num_classes(),
                self.num_classes
            )));
        }
        if self.num_known == 0 || self.num_known >= self.num_classes {
            return Err(invalid(&format!(
                "{} known of {} classes leaves an empty side",
                self.num_known, self.num_classes
            )));
        }
        if split_index >= self.num_splits() {
            return Err(invalid("index out of range"));
        }

        let order: Vec<usize> = match self.strategy {
            SplitStrategy::Rotating => (0..self.num_classes)
                .map(|k| (split_index + k) % self.num_classes)
                .collect(),
            SplitStrategy::Shuffled => {
                let mut labels: Vec<usize> = (0..self.num_classes).collect();
                let mut rng = self.rng.stream(RngStream::Split(split_index as u64));
                labels.shuffle(&mut rng);
                labels
            }
        };

        let known: BTreeSet<usize> = order[..self.num_known].iter().copied().collect();
        let unknown: BTreeSet<usize> = order[self.num_known..].iter().copied().collect();

        Ok(SplitAssignment {
            split_index,
            known,
            unknown,
        })
    }
}

/// A dataset restricted to a materialized list of sample indices.
#[derive(Debug, Clone)]
pub struct DatasetView {
    dataset: LabeledImageDataset,
    indices: Vec<usize>,
}

impl DatasetView {
    /// View over every sample of `dataset`.
    pub fn full(dataset: &LabeledImageDataset) -> Self {
        Self {
            dataset: dataset.clone(),
            indices: (0..dataset.len()).collect(),
        }
    }

    pub fn dataset(&self) -> &LabeledImageDataset {
        &self.dataset
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The `position`-th sample of the view.
    pub fn sample(&self, position: usize) -> &Sample {
        &self.dataset.samples()[self.indices[position]]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.indices.iter().map(move |&idx| &self.dataset.samples()[idx])
    }
}

/// Samples of `dataset` whose label is in `labels`, in their original order.
pub fn restrict_to(dataset: &LabeledImageDataset, labels: &BTreeSet<usize>) -> DatasetView {
    let indices = dataset
        .samples()
        .iter()
        .enumerate()
        .filter(|(_, sample)| labels.contains(&sample.label))
        .map(|(idx, _)| idx)
        .collect();

    DatasetView {
        dataset: dataset.clone(),
        indices,
    }
}
