//! Error types for the inversion harness.
//!
//! Every fatal condition a run can hit is a variant of [`InversionError`].
//! Module-level errors ([`ConfigError`], [`CheckpointError`], [`DatasetError`])
//! convert into it so orchestration code can use `?` throughout.

use std::fmt;
use std::path::PathBuf;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::data::DatasetError;

/// Result type alias used by orchestration-level functions.
pub type InversionResult<T> = Result<T, InversionError>;

/// Fatal errors raised by the harness. None of them are retried.
#[derive(Debug)]
pub enum InversionError {
    /// The split index is outside the range supported by the policy.
    InvalidSplit {
        split_index: usize,
        supported: usize,
        reason: String,
    },
    /// A pretrained or checkpoint artifact is absent or does not deserialize.
    MissingArtifact { path: PathBuf, reason: String },
    /// An evaluation was attempted over a split with zero samples.
    EmptySplit { split: String },
    /// Two components disagree on a dimensionality.
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
    /// The loss became NaN or infinite.
    NonFiniteLoss {
        epoch: usize,
        batch: usize,
        value: f32,
    },
    /// Writing an output image failed.
    Render { path: PathBuf, reason: String },
    Io(std::io::Error),
    Config(ConfigError),
    Checkpoint(CheckpointError),
    Dataset(DatasetError),
}

impl fmt::Display for InversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InversionError::InvalidSplit {
                split_index,
                supported,
                reason,
            } => write!(
                f,
                "Invalid split index {split_index} (supported: 0..{supported}): {reason}"
            ),
            InversionError::MissingArtifact { path, reason } => {
                write!(f, "Missing artifact {}: {reason}", path.display())
            }
            InversionError::EmptySplit { split } => {
                write!(f, "Cannot evaluate over empty split '{split}'")
            }
            InversionError::ShapeMismatch {
                context,
                expected,
                found,
            } => write!(
                f,
                "Shape mismatch in {context}: expected {expected}, found {found}"
            ),
            InversionError::NonFiniteLoss {
                epoch,
                batch,
                value,
            } => write!(
                f,
                "Loss became non-finite ({value}) at epoch {epoch}, batch {batch}"
            ),
            InversionError::Render { path, reason } => {
                write!(f, "Failed to render grid to {}: {reason}", path.display())
            }
            InversionError::Io(err) => write!(f, "I/O error: {err}"),
            InversionError::Config(err) => write!(f, "Configuration error: {err}"),
            InversionError::Checkpoint(err) => write!(f, "Checkpoint error: {err}"),
            InversionError::Dataset(err) => write!(f, "Dataset error: {err}"),
        }
    }
}

impl std::error::Error for InversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InversionError::Io(err) => Some(err),
            InversionError::Config(err) => Some(err),
            InversionError::Checkpoint(err) => Some(err),
            InversionError::Dataset(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InversionError {
    fn from(err: std::io::Error) -> Self {
        InversionError::Io(err)
    }
}

impl From<ConfigError> for InversionError {
    fn from(err: ConfigError) -> Self {
        InversionError::Config(err)
    }
}

impl From<CheckpointError> for InversionError {
    fn from(err: CheckpointError) -> Self {
        InversionError::Checkpoint(err)
    }
}

impl From<DatasetError> for InversionError {
    fn from(err: DatasetError) -> Self {
        InversionError::Dataset(err)
    }
}

impl InversionError {
    /// Wraps a checkpoint failure for `path` as a missing-artifact error.
    pub fn missing_artifact(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        InversionError::MissingArtifact {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Fails with [`InversionError::ShapeMismatch`] unless `expected == found`.
    pub fn check_dim(context: &str, expected: usize, found: usize) -> InversionResult<()> {
        if expected != found {
            return Err(InversionError::ShapeMismatch {
                context: context.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }
}
