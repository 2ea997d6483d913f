//! Content hashing and verified copies of the artifact.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use log::trace;
use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 8192;

/// SHA-256 digest of a byte stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactDigest([u8; 32]);

impl ArtifactDigest {
    /// Hash everything `reader` yields until end of stream.
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..read]);
        }
        Ok(Self::from_slice(&hasher.finalize()))
    }

    pub fn of_file(path: &Path) -> io::Result<Self> {
        Self::of_reader(File::open(path)?)
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_slice(&Sha256::digest(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn from_slice(hash: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash);
        ArtifactDigest(bytes)
    }
}

impl fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactDigest({})", self)
    }
}

/// Copy `src` to `dst`, creating or truncating `dst`.
///
/// Returns once the data has been flushed and synced to the destination
/// device, so a short write shows up here as an error and never as a
/// truncated file.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    copy_stream(File::open(src)?, dst)
}

/// Copy everything `reader` yields into a new file at `dst`.
pub fn copy_stream<R: Read>(mut reader: R, dst: &Path) -> io::Result<u64> {
    let mut out = File::create(dst)?;
    let copied = io::copy(&mut reader, &mut out)?;
    out.flush()?;
    out.sync_all()?;
    trace!("{} bytes written to {}", copied, dst.display());
    Ok(copied)
}
