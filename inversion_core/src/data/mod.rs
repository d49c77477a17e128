//! Labeled image data: storage, readers, transforms, splits and batching.

pub mod cifar;
pub mod dataset;
pub mod loader;
pub mod split;
pub mod synthetic;
pub mod transform;

pub use cifar::{load_cifar10, CifarPart};
pub use dataset::{DatasetError, ImageShape, LabeledImageDataset, Sample};
pub use loader::{Batch, DataLoader};
pub use split::{restrict_to, DatasetView, SplitAssignment, SplitPolicy, SplitStrategy};
pub use synthetic::SyntheticConfig;
pub use transform::{
    eval_transform, train_transform, Compose, Normalize, RandomCrop, RandomHorizontalFlip,
    SampleTransform,
};
