//! Unmounting the target volume, with retries while it is busy.

use std::path::Path;

use log::{debug, warn};

use super::host::Host;
use super::policy::RetryPolicy;

/// How an unmount request ended. Never fatal: the caller decides what a
/// failure means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// `umount` succeeded on the given attempt.
    Unmounted { attempts: u32 },
    /// An attempt failed and the failure was accepted as good enough.
    Forced { attempts: u32 },
    /// Every attempt failed.
    Failed { attempts: u32 },
}

impl UnmountOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UnmountOutcome::Failed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            UnmountOutcome::Unmounted { attempts }
            | UnmountOutcome::Forced { attempts }
            | UnmountOutcome::Failed { attempts } => attempts,
        }
    }
}

/// Try to unmount `path` up to `policy.max_attempts` times, sleeping on the
/// host clock between attempts.
///
/// With `force_after_failure`, the first failure ends the loop as a
/// [`Forced`](UnmountOutcome::Forced) success; the volume is probably
/// already gone.
pub fn unmount_with_retry<H: Host + ?Sized>(
    host: &H,
    path: &Path,
    policy: &RetryPolicy,
    force_after_failure: bool,
) -> UnmountOutcome {
    for retry in 0..policy.max_attempts {
        let attempts = retry + 1;
        match host.unmount(path) {
            Ok(()) => {
                debug!("{} unmounted after {} attempt(s)", path.display(), attempts);
                return UnmountOutcome::Unmounted { attempts };
            }
            Err(e) => {
                warn!("Failed to unmount disk {}: {}", path.display(), e);
                if force_after_failure {
                    return UnmountOutcome::Forced { attempts };
                }
                if attempts < policy.max_attempts {
                    host.sleep(policy.delay(retry));
                }
            }
        }
    }
    UnmountOutcome::Failed {
        attempts: policy.max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::utils::host::fake::FakeHost;

    #[test]
    fn always_failing_unmount_tries_ten_times_with_growing_delays() {
        let host = FakeHost::with_tables(vec![]).failing_unmounts(None);
        let outcome = unmount_with_retry(&host, Path::new("/media/a"), &RetryPolicy::default(), false);

        assert_eq!(outcome, UnmountOutcome::Failed { attempts: 10 });
        assert!(!outcome.is_success());
        assert_eq!(host.unmounts.lock().unwrap().len(), 10);
        let sleeps = host.sleeps();
        assert_eq!(sleeps.len(), 9);
        assert_eq!(sleeps[0], Duration::from_secs(1));
        assert!(sleeps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn forced_unmount_succeeds_on_first_failure() {
        let host = FakeHost::with_tables(vec![]).failing_unmounts(None);
        let outcome = unmount_with_retry(&host, Path::new("/media/a"), &RetryPolicy::default(), true);

        assert_eq!(outcome, UnmountOutcome::Forced { attempts: 1 });
        assert!(outcome.is_success());
        assert_eq!(host.unmounts.lock().unwrap().len(), 1);
        assert!(host.sleeps().is_empty());
    }

    #[test]
    fn busy_volume_is_unmounted_once_released() {
        let host = FakeHost::with_tables(vec![]).failing_unmounts(Some(2));
        let outcome = unmount_with_retry(&host, Path::new("/media/a"), &RetryPolicy::default(), false);

        assert_eq!(outcome, UnmountOutcome::Unmounted { attempts: 3 });
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(
            host.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }
}
