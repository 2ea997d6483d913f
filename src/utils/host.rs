//! Host operating system facilities used by the provisioning handlers.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use log::debug;

use super::mounts::{self, Mount};
use crate::error::MountError;

/// What the provisioning handlers need from the host: the mount table, a
/// global sync, `umount` and a clock to sleep on.
///
/// Files are read and written directly through `std::fs`; only the
/// operations that need root, touch global state or take wall-clock time go
/// through this trait.
pub trait Host {
    fn list_mounts(&self) -> Result<Vec<Mount>, MountError>;

    /// Flush all pending writes of all filesystems.
    fn sync(&self);

    fn unmount(&self, path: &Path) -> io::Result<()>;

    fn sleep(&self, duration: Duration);
}

/// The real thing.
#[derive(Debug, Clone)]
pub struct SystemHost {
    mount_table: PathBuf,
}

impl SystemHost {
    pub fn new(mount_table: impl Into<PathBuf>) -> Self {
        SystemHost {
            mount_table: mount_table.into(),
        }
    }
}

impl Host for SystemHost {
    fn list_mounts(&self) -> Result<Vec<Mount>, MountError> {
        mounts::list_mounts(&self.mount_table)
    }

    fn sync(&self) {
        // SAFETY: sync(2) takes no arguments and cannot fail.
        unsafe { libc::sync() }
    }

    fn unmount(&self, path: &Path) -> io::Result<()> {
        let output = Command::new("umount").arg(path).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("umount {} failed: {}", path.display(), stderr.trim()),
            ));
        }
        debug!("Unmounted {}", path.display());
        Ok(())
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted host: serves mount tables in order (repeating the last one),
    /// fails `umount` a given number of times and records every sleep.
    #[derive(Default)]
    pub(crate) struct FakeHost {
        pub tables: Mutex<VecDeque<Vec<Mount>>>,
        pub unmount_failures: Mutex<Option<u32>>,
        pub unmounts: Mutex<Vec<PathBuf>>,
        pub sleeps: Mutex<Vec<Duration>>,
        pub syncs: Mutex<u32>,
        pub listings: Mutex<u32>,
    }

    impl FakeHost {
        pub(crate) fn with_tables(tables: Vec<Vec<Mount>>) -> Self {
            FakeHost {
                tables: Mutex::new(tables.into()),
                unmount_failures: Mutex::new(Some(0)),
                ..Default::default()
            }
        }

        /// `None` makes every unmount attempt fail.
        pub(crate) fn failing_unmounts(self, failures: Option<u32>) -> Self {
            *self.unmount_failures.lock().unwrap() = failures;
            self
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    impl Host for FakeHost {
        fn list_mounts(&self) -> Result<Vec<Mount>, MountError> {
            *self.listings.lock().unwrap() += 1;
            let mut tables = self.tables.lock().unwrap();
            match tables.len() {
                0 => Err(MountError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no mount table",
                ))),
                1 => Ok(tables[0].clone()),
                _ => Ok(tables.pop_front().unwrap_or_default()),
            }
        }

        fn sync(&self) {
            *self.syncs.lock().unwrap() += 1;
        }

        fn unmount(&self, path: &Path) -> io::Result<()> {
            self.unmounts.lock().unwrap().push(path.to_path_buf());
            let mut failures = self.unmount_failures.lock().unwrap();
            match failures.as_mut() {
                Some(0) => Ok(()),
                Some(left) => {
                    *left -= 1;
                    Err(io::Error::new(io::ErrorKind::Other, "target is busy"))
                }
                None => Err(io::Error::new(io::ErrorKind::Other, "target is busy")),
            }
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }
}
