//! Umsflash is a utility to push a firmware artifact onto an embedded board
//! without touching it: it watches the U-Boot console over the serial port,
//! stops autoboot at the right moment, puts the board into USB mass storage
//! (UMS) mode, copies the artifact onto the volume the host mounts, verifies
//! the copy and boots the board again.
//!
//! The run is organized around a small state machine:
//!
//! * A **console reader** thread reads the serial console line by line and
//!   turns two well known boot log lines into **actions**.
//! * A bounded **action queue** carries the actions, in order, to the
//!   dispatcher.
//! * The **dispatcher** executes one action at a time on its own thread and
//!   enqueues the follow-up action when the step completed. All the state of
//!   the run lives in a [`Session`] owned by the dispatcher, so handlers never
//!   run concurrently and never need locking.
//!
//! The sequence of actions is fixed:
//!
//! ```text
//! StartUms -> TransferFile -> VerifyTransfer -> UnmountDisk -> StopSerialSession -> BootBoard
//! ```
//!
//! The first two actions are triggered by the board output, the others by the
//! handler of the previous step. Any error in a step is fatal and ends the
//! run with a [`ProvisionError`], except for a volume that cannot be
//! unmounted, which is only reported.
//!
//! Everything touching the host (mount table, `sync`, `umount`, sleeping) goes
//! through the [`Host`] trait so the state machine can be driven with a
//! scripted host.

mod error;
mod provisioning;
mod serial;
mod settings;
mod utils;

pub use error::{MountError, ProvisionError, ProvisionResult};
pub use provisioning::{
    action_queue, provision, Action, ActionReceiver, ActionSender, Dispatcher, Session,
    BOOT_COMMAND, INTERRUPT, QUEUE_CAPACITY, UMS_COMMAND,
};
pub use serial::{
    classify, defer, open_and_setup_port, ConsoleReader, SerialConsole, Trigger, NETWORK_MARKER,
    UMS_READY_MARKER,
};
pub use settings::{Settings, SettingsBuilder, Timings};
pub use utils::{
    copy_file, copy_stream, list_mounts, new_mount_paths, parse_mounts, unmount_with_retry,
    ArtifactDigest, Host, Mount, PollPolicy, RetryPolicy, SystemHost, UnmountOutcome,
    MAX_RECORD_LEN,
};
