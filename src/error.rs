//! Error types for the provisioning run.
//!
//! Every variant of [`ProvisionError`] is fatal: it ends the run and is
//! reported by the caller of [`provision`](crate::provision). The only
//! recoverable failure of the protocol, a volume that refuses to unmount, is
//! not an error at all but an [`UnmountOutcome`](crate::UnmountOutcome).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::utils::ArtifactDigest;

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Fatal errors of a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The settings are missing a required value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The artifact could not be opened or hashed.
    #[error("failed to read artifact {path}: {source}")]
    ArtifactRead { path: PathBuf, source: io::Error },

    /// The serial port could not be opened or configured.
    #[error("failed to open serial port {path}: {source}")]
    SerialOpen {
        path: String,
        source: serialport::Error,
    },

    /// Writing to the board console failed.
    #[error("failed to write to the serial console: {0}")]
    SerialWrite(#[source] io::Error),

    /// The mount table could not be read or parsed.
    #[error("failed to list mounts: {0}")]
    MountList(#[from] MountError),

    /// No volume showed up after the board entered UMS mode.
    #[error("no new mount point appeared after {attempts} attempts")]
    NoNewMount { attempts: u32 },

    /// New volumes showed up but none of them holds the disk marker.
    #[error("none of the new mount points {candidates:?} contains a `*{marker}` entry")]
    NoEligibleDisk {
        candidates: Vec<PathBuf>,
        marker: String,
    },

    /// A step that needs the target disk ran before one was selected.
    #[error("no target disk has been selected")]
    NoTargetDisk,

    /// The artifact could not be copied onto the target volume.
    #[error("failed to copy artifact to {destination}: {source}")]
    Copy {
        destination: PathBuf,
        source: io::Error,
    },

    /// The copied artifact could not be read back.
    #[error("failed to read back {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// The copy on the target volume differs from the artifact.
    #[error("hash mismatch between artifact ({expected}) and copy ({actual})")]
    IntegrityMismatch {
        expected: ArtifactDigest,
        actual: ArtifactDigest,
    },

    /// The dispatcher could not enqueue the next step because the board
    /// flooded the queue with markers.
    #[error("action queue is full, cannot enqueue {0}")]
    QueueOverflow(String),

    /// Every producer of the action queue is gone.
    #[error("action queue closed")]
    QueueClosed,
}

/// Errors while reading the mount table.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record that does not look like a mount table line. A corrupt table
    /// means a broken host, there is no partial recovery.
    #[error("malformed mount record at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_errors_convert_into_fatal_errors() {
        let err: ProvisionError = MountError::Parse {
            line: 3,
            reason: "expected at least 5 fields, got 2".into(),
        }
        .into();
        assert!(matches!(err, ProvisionError::MountList(_)));
        assert_eq!(
            err.to_string(),
            "failed to list mounts: malformed mount record at line 3: expected at least 5 fields, got 2"
        );
    }

    #[test]
    fn mismatch_message_shows_both_digests() {
        let expected = ArtifactDigest::of_bytes(b"a");
        let actual = ArtifactDigest::of_bytes(b"b");
        let msg = ProvisionError::IntegrityMismatch { expected, actual }.to_string();
        assert!(msg.contains(&expected.to_string()));
        assert!(msg.contains(&actual.to_string()));
    }
}
