//! Actions of the provisioning protocol.
//!
//! Refer to the [`dispatcher`](super::dispatcher) module for an overview of
//! the protocol and the order in which actions are executed.

use std::fmt;

// =============================================================================
// Public Interface
// =============================================================================

/// One step of the provisioning protocol.
///
/// Actions carry no data: everything a step needs lives in the
/// [`Session`](super::Session) owned by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Snapshot the mounts and ask U-Boot to expose its storage over USB.
    StartUms,
    /// Find the new volume and copy the artifact onto it.
    TransferFile,
    /// Read the copy back and compare digests.
    VerifyTransfer,
    /// Release the volume on the host side.
    UnmountDisk,
    /// Interrupt UMS mode on the board.
    StopSerialSession,
    /// Boot into the new firmware.
    BootBoard,
}

impl Action {
    /// The protocol, in execution order.
    pub const SEQUENCE: [Action; 6] = [
        Action::StartUms,
        Action::TransferFile,
        Action::VerifyTransfer,
        Action::UnmountDisk,
        Action::StopSerialSession,
        Action::BootBoard,
    ];

    /// The action allowed to run after this one, if any.
    pub fn successor(self) -> Option<Action> {
        match self {
            Action::StartUms => Some(Action::TransferFile),
            Action::TransferFile => Some(Action::VerifyTransfer),
            Action::VerifyTransfer => Some(Action::UnmountDisk),
            Action::UnmountDisk => Some(Action::StopSerialSession),
            Action::StopSerialSession => Some(Action::BootBoard),
            Action::BootBoard => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::StartUms => "start_ums",
            Action::TransferFile => "transfer_file",
            Action::VerifyTransfer => "verify_transfer",
            Action::UnmountDisk => "unmount_disk",
            Action::StopSerialSession => "stop_serial_session",
            Action::BootBoard => "boot_board",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successors_follow_the_sequence() {
        for pair in Action::SEQUENCE.windows(2) {
            assert_eq!(pair[0].successor(), Some(pair[1]));
        }
        assert_eq!(Action::BootBoard.successor(), None);
    }
}
