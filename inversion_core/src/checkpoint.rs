//! Checkpoint trait and error handling for deterministic state persistence.
//!
//! This module provides a reusable [`Checkpointable`] trait that enforces a
//! deterministic, versioned serialization contract for model components.
//! Implementations are responsible for storing a version header alongside the
//! serialized payload so that incompatible files are rejected during load.
//!
//! [`EncoderCheckpointer`] builds on it to persist encoder snapshots whose file
//! names embed the epoch number (`ckpt{epoch}.bin`).

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::Options;
use tracing::info;

use crate::error::{InversionError, InversionResult};
use crate::model::Encoder;

/// Errors that can occur while saving or loading checkpoints.
#[derive(Debug)]
pub enum CheckpointError {
    /// Underlying I/O failure while reading or writing checkpoint files.
    Io(std::io::Error),
    /// Serialization or deserialization error from the binary codec.
    Serialization(bincode::Error),
    /// The checkpoint file was well formed but produced an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },
    /// The checkpoint file did not match the expected structure.
    InvalidFormat(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "I/O error while accessing checkpoint: {err}"),
            CheckpointError::Serialization(err) => {
                write!(f, "Failed to (de)serialize checkpoint payload: {err}")
            }
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "Checkpoint version mismatch: expected {expected}, found {found}",
            ),
            CheckpointError::InvalidFormat(msg) => {
                write!(f, "Checkpoint file has invalid structure: {msg}")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Serialization(err)
    }
}

/// Deterministic binary codec options shared by all checkpoint implementations.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

/// Components that support deterministic persistence implement this trait.
pub trait Checkpointable: Sized {
    /// Save the current state to `path` using the deterministic codec.
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError>;

    /// Load a state from `path`.
    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError>;

    /// Utility for writing a serializable snapshot with the shared codec.
    fn write_snapshot<P, T>(snapshot: &T, path: P) -> Result<(), CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::Serialize,
    {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        codec().serialize_into(&mut writer, snapshot)?;
        writer.flush()?;
        Ok(())
    }

    /// Utility for reading a serializable snapshot with the shared codec.
    fn read_snapshot<P, T>(path: P) -> Result<T, CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::de::DeserializeOwned,
    {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Ok(codec().deserialize_from(&mut reader)?)
    }
}

/// An encoder restored from disk together with the epoch it was taken at.
#[derive(Debug, Clone)]
pub struct EncoderCheckpoint {
    pub epoch: usize,
    pub encoder: Encoder,
}

/// Writes and reads encoder snapshots under a single directory.
///
/// Only the training loop writes through this type; inference runs load a
/// private copy of a snapshot and never write back.
#[derive(Debug, Clone)]
pub struct EncoderCheckpointer {
    directory: PathBuf,
}

impl EncoderCheckpointer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the snapshot for `epoch` (1-based, as tagged on save).
    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.directory.join(format!("ckpt{epoch}.bin"))
    }

    /// Persists `encoder` tagged with `epoch` and returns the artifact path.
    pub fn save(&self, encoder: &Encoder, epoch: usize) -> InversionResult<PathBuf> {
        let path = self.path_for(epoch);
        encoder.save_tagged(&path, epoch)?;
        info!("Saved encoder checkpoint for epoch {} to {}", epoch, path.display());
        Ok(path)
    }

    /// Loads the snapshot at `path`.
    ///
    /// A missing or undecodable file is reported as
    /// [`InversionError::MissingArtifact`].
    pub fn load<P: AsRef<Path>>(path: P) -> InversionResult<EncoderCheckpoint> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(InversionError::missing_artifact(
                path,
                "checkpoint file does not exist",
            ));
        }
        let (encoder, epoch) =
            Encoder::load_tagged(path).map_err(|err| InversionError::missing_artifact(path, err))?;
        Ok(EncoderCheckpoint { epoch, encoder })
    }

    /// Loads the snapshot tagged with `epoch` from this directory.
    pub fn load_epoch(&self, epoch: usize) -> InversionResult<EncoderCheckpoint> {
        Self::load(self.path_for(epoch))
    }

    /// Existing snapshots in this directory, sorted by epoch.
    pub fn list(&self) -> InversionResult<Vec<(usize, PathBuf)>> {
        if !self.directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let epoch = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_epoch);
            if let Some(epoch) = epoch {
                found.push((epoch, path));
            }
        }
        found.sort_by_key(|(epoch, _)| *epoch);
        Ok(found)
    }
}

fn parse_epoch(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("ckpt")?
        .strip_suffix(".bin")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_epoch_accepts_only_checkpoint_names() {
        assert_eq!(parse_epoch("ckpt25.bin"), Some(25));
        assert_eq!(parse_epoch("ckpt.bin"), None);
        assert_eq!(parse_epoch("recons_epoch3.png"), None);
        assert_eq!(parse_epoch("ckpt7.pth"), None);
    }

    #[test]
    fn path_embeds_epoch() {
        let checkpointer = EncoderCheckpointer::new("ckpt/wgan_encoder/split1");
        assert_eq!(
            checkpointer.path_for(100),
            PathBuf::from("ckpt/wgan_encoder/split1/ckpt100.bin")
        );
    }

    #[test]
    fn loading_nonexistent_path_is_missing_artifact() {
        let mut path = std::env::temp_dir();
        path.push(format!("encoder_ckpt_missing_{}.bin", uuid::Uuid::new_v4()));
        let err = EncoderCheckpointer::load(&path).unwrap_err();
        assert!(matches!(err, InversionError::MissingArtifact { .. }));
    }
}
