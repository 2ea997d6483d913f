//! Host side helpers: mount table, hashing and copies, unmount retries.

mod digest;
mod host;
mod mounts;
mod policy;
mod unmount;

pub use digest::{copy_file, copy_stream, ArtifactDigest};
pub use host::{Host, SystemHost};
pub use mounts::{list_mounts, new_mount_paths, parse_mounts, Mount, MAX_RECORD_LEN};
pub use policy::{PollPolicy, RetryPolicy};
pub use unmount::{unmount_with_retry, UnmountOutcome};

#[cfg(test)]
pub(crate) use host::fake::FakeHost;
