//! State shared by all the steps of one provisioning run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::actions::Action;
use crate::error::{ProvisionError, ProvisionResult};
use crate::utils::{ArtifactDigest, Mount};

/// The context threaded through the handlers.
///
/// Owned by the [`Dispatcher`](super::Dispatcher) and only ever touched from
/// its thread, one handler at a time.
#[derive(Debug, Clone)]
pub struct Session {
    artifact: PathBuf,
    artifact_name: OsString,
    artifact_digest: ArtifactDigest,
    premount: Vec<Mount>,
    target_disk: Option<PathBuf>,
    completed: Vec<Action>,
}

impl Session {
    /// Hash the artifact and start a new session for it.
    pub fn open(artifact: &Path) -> ProvisionResult<Self> {
        let digest =
            ArtifactDigest::of_file(artifact).map_err(|source| ProvisionError::ArtifactRead {
                path: artifact.to_path_buf(),
                source,
            })?;
        info!("Artifact sha256: {}", digest);
        Session::new(artifact, digest)
    }

    /// Start a session for an artifact whose digest is already known.
    pub fn new(artifact: &Path, artifact_digest: ArtifactDigest) -> ProvisionResult<Self> {
        let artifact_name = artifact.file_name().map(OsString::from).ok_or_else(|| {
            ProvisionError::Config(format!("artifact {} has no file name", artifact.display()))
        })?;
        Ok(Session {
            artifact: artifact.to_path_buf(),
            artifact_name,
            artifact_digest,
            premount: Vec::new(),
            target_disk: None,
            completed: Vec::new(),
        })
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn artifact_digest(&self) -> ArtifactDigest {
        self.artifact_digest
    }

    /// Mounts seen right before UMS mode was requested.
    pub fn premount(&self) -> &[Mount] {
        &self.premount
    }

    pub fn target_disk(&self) -> Option<&Path> {
        self.target_disk.as_deref()
    }

    /// Where the artifact goes on the target disk, once it is known.
    pub fn copied_artifact(&self) -> Option<PathBuf> {
        self.target_disk
            .as_ref()
            .map(|disk| disk.join(&self.artifact_name))
    }

    /// Actions executed so far, in order.
    pub fn completed(&self) -> &[Action] {
        &self.completed
    }

    /// The only action that may run next. `None` once the board was booted.
    pub fn expected_action(&self) -> Option<Action> {
        match self.completed.last() {
            None => Some(Action::StartUms),
            Some(last) => last.successor(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.last() == Some(&Action::BootBoard)
    }

    pub(crate) fn set_premount(&mut self, snapshot: Vec<Mount>) {
        self.premount = snapshot;
    }

    /// Select the target disk. The first selection sticks for the rest of
    /// the run.
    pub(crate) fn set_target_disk(&mut self, disk: PathBuf) -> &Path {
        if let Some(current) = &self.target_disk {
            if *current != disk {
                warn!(
                    "Target disk already set to {}, ignoring {}",
                    current.display(),
                    disk.display()
                );
            }
        }
        self.target_disk.get_or_insert(disk)
    }

    pub(crate) fn record(&mut self, action: Action) {
        self.completed.push(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Path::new("build/fw.bin"), ArtifactDigest::of_bytes(b"fw")).unwrap()
    }

    #[test]
    fn target_disk_is_set_once() {
        let mut session = session();
        assert_eq!(session.copied_artifact(), None);
        session.set_target_disk("/media/a".into());
        session.set_target_disk("/media/b".into());
        assert_eq!(session.target_disk(), Some(Path::new("/media/a")));
        assert_eq!(
            session.copied_artifact(),
            Some(PathBuf::from("/media/a/fw.bin"))
        );
    }

    #[test]
    fn expected_action_walks_the_sequence() {
        let mut session = session();
        for action in Action::SEQUENCE.iter() {
            assert_eq!(session.expected_action(), Some(*action));
            assert!(!session.is_complete());
            session.record(*action);
        }
        assert_eq!(session.expected_action(), None);
        assert!(session.is_complete());
    }

    #[test]
    fn artifact_without_file_name_is_rejected() {
        assert!(matches!(
            Session::new(Path::new("/"), ArtifactDigest::of_bytes(b"")),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn missing_artifact_cannot_be_opened() {
        assert!(matches!(
            Session::open(Path::new("/nonexistent/fw.bin")),
            Err(ProvisionError::ArtifactRead { .. })
        ));
    }
}
