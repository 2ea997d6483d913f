//! The work done for each [`Action`].
//!
//! Handlers run one at a time on the dispatcher thread. Each one returns the
//! action that must follow it, if the follow-up is not triggered by the board
//! itself. Any error they return is fatal for the run.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};

use super::actions::Action;
use super::session::Session;
use crate::error::{ProvisionError, ProvisionResult};
use crate::serial::SerialConsole;
use crate::settings::Settings;
use crate::utils::{copy_stream, new_mount_paths, unmount_with_retry, ArtifactDigest, Host, UnmountOutcome};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// U-Boot command exposing the eMMC as a USB mass storage device.
pub const UMS_COMMAND: &[u8] = b"ums 0 mmc 0\r\n";
/// Ctrl+C, ends the `ums` command.
pub const INTERRUPT: u8 = 0x03;
/// U-Boot command running the default boot script.
pub const BOOT_COMMAND: &[u8] = b"boot\r\n";

/// Everything a handler may touch.
pub(crate) struct Context<'a, H: Host + ?Sized> {
    pub settings: &'a Settings,
    pub session: &'a mut Session,
    pub host: &'a H,
    pub console: &'a SerialConsole,
}

/// Execute the handler for `action`.
pub(crate) fn run<H: Host + ?Sized>(
    action: Action,
    ctx: &mut Context<'_, H>,
) -> ProvisionResult<Option<Action>> {
    match action {
        Action::StartUms => start_ums(ctx),
        Action::TransferFile => transfer_file(ctx),
        Action::VerifyTransfer => verify_transfer(ctx),
        Action::UnmountDisk => unmount_disk(ctx),
        Action::StopSerialSession => stop_serial_session(ctx),
        Action::BootBoard => boot_board(ctx),
    }
}

// StartUMS ====================================================================

/// Remember what is mounted, then ask the board to expose its storage. The
/// follow-up comes from the board once UMS mode is up.
fn start_ums<H: Host + ?Sized>(ctx: &mut Context<'_, H>) -> ProvisionResult<Option<Action>> {
    info!("Starting UMS");
    let snapshot = ctx.host.list_mounts()?;
    debug!("{} mounts before UMS", snapshot.len());
    ctx.session.set_premount(snapshot);
    ctx.console
        .send(UMS_COMMAND)
        .map_err(ProvisionError::SerialWrite)?;
    Ok(None)
}

// TransferFile ================================================================

fn transfer_file<H: Host + ?Sized>(ctx: &mut Context<'_, H>) -> ProvisionResult<Option<Action>> {
    info!("Starting File Transfer");
    let candidates = wait_for_new_mounts(ctx)?;
    let marker = &ctx.settings.disk_marker;
    let target = find_target_disk(&candidates, marker).ok_or_else(|| {
        ProvisionError::NoEligibleDisk {
            candidates: candidates.clone(),
            marker: marker.clone(),
        }
    })?;
    info!("target disk: {}", target.display());
    ctx.session.set_target_disk(target);

    let destination = ctx
        .session
        .copied_artifact()
        .ok_or(ProvisionError::NoTargetDisk)?;
    copy_with_progress(ctx.session.artifact(), &destination)?;
    Ok(Some(Action::VerifyTransfer))
}

/// Poll the mount table until something that was not there before UMS mode
/// shows up.
fn wait_for_new_mounts<H: Host + ?Sized>(ctx: &Context<'_, H>) -> ProvisionResult<Vec<PathBuf>> {
    let policy = ctx.settings.timings.mount_poll;
    for attempt in 1..=policy.attempts {
        let current = ctx.host.list_mounts()?;
        let new_paths = new_mount_paths(ctx.session.premount(), &current);
        if !new_paths.is_empty() {
            debug!("New mounts after {} attempt(s): {:?}", attempt, new_paths);
            return Ok(new_paths);
        }
        debug!("No new mounts yet ({}/{})", attempt, policy.attempts);
        if attempt < policy.attempts {
            ctx.host.sleep(policy.interval);
        }
    }
    Err(ProvisionError::NoNewMount {
        attempts: policy.attempts,
    })
}

/// The first of `candidates` holding a top level entry named `*<marker>`.
///
/// Candidates come in mount table order, which the kernel does not promise to
/// keep stable when several volumes appear at once.
fn find_target_disk(candidates: &[PathBuf], marker: &str) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|disk| match fs::read_dir(disk) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .any(|entry| entry.file_name().to_string_lossy().ends_with(marker)),
            Err(e) => {
                warn!("failed to get contents of disk {}: {}", disk.display(), e);
                false
            }
        })
        .cloned()
}

fn copy_with_progress(source: &Path, destination: &Path) -> ProvisionResult<u64> {
    let input = File::open(source).map_err(|e| ProvisionError::ArtifactRead {
        path: source.to_path_buf(),
        source: e,
    })?;
    let size = input.metadata().map(|m| m.len()).unwrap_or(0);

    let pb = ProgressBar::new(size);
    pb.set_style(ProgressStyle::default_bar()
        .template("[UF] ⏩ Copying [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .progress_chars("=>-"));

    let copied = copy_stream(pb.wrap_read(input), destination).map_err(|e| {
        pb.abandon();
        ProvisionError::Copy {
            destination: destination.to_path_buf(),
            source: e,
        }
    })?;
    pb.finish_with_message("[UF] Artifact copied");
    info!("Copied {} bytes to {}", copied, destination.display());
    Ok(copied)
}

// VerifyTransfer ==============================================================

fn verify_transfer<H: Host + ?Sized>(ctx: &mut Context<'_, H>) -> ProvisionResult<Option<Action>> {
    // The volume is removable and vfat; make sure nothing is left in the page
    // cache before reading back.
    ctx.host.sync();
    ctx.host.sync();

    let copied = ctx
        .session
        .copied_artifact()
        .ok_or(ProvisionError::NoTargetDisk)?;
    let digest = ArtifactDigest::of_file(&copied).map_err(|source| ProvisionError::Read {
        path: copied.clone(),
        source,
    })?;
    info!("Copied artifact sha256: {}", digest);

    let expected = ctx.session.artifact_digest();
    if digest != expected {
        return Err(ProvisionError::IntegrityMismatch {
            expected,
            actual: digest,
        });
    }
    Ok(Some(Action::UnmountDisk))
}

// UnmountDisk =================================================================

/// Unmount failures are reported and otherwise ignored: a volume left
/// mounted on the host is better than a board that never boots.
fn unmount_disk<H: Host + ?Sized>(ctx: &mut Context<'_, H>) -> ProvisionResult<Option<Action>> {
    let disk = ctx.session.target_disk().ok_or(ProvisionError::NoTargetDisk)?;
    let outcome = unmount_with_retry(
        ctx.host,
        disk,
        &ctx.settings.timings.unmount_retry,
        ctx.settings.force_unmount,
    );
    match outcome {
        UnmountOutcome::Unmounted { attempts } => {
            info!("Unmounted {} ({} attempt(s))", disk.display(), attempts)
        }
        UnmountOutcome::Forced { .. } => {
            warn!("Unmount of {} forced after a failure", disk.display())
        }
        UnmountOutcome::Failed { attempts } => error!(
            "Failed to unmount disk {} after {} attempts",
            disk.display(),
            attempts
        ),
    }
    Ok(Some(Action::StopSerialSession))
}

// StopSerialSession ===========================================================

fn stop_serial_session<H: Host + ?Sized>(
    ctx: &mut Context<'_, H>,
) -> ProvisionResult<Option<Action>> {
    info!("Leaving UMS mode");
    ctx.console
        .send(&[INTERRUPT])
        .map_err(ProvisionError::SerialWrite)?;
    ctx.host.sleep(ctx.settings.timings.stop_settle);
    Ok(Some(Action::BootBoard))
}

// BootBoard ===================================================================

fn boot_board<H: Host + ?Sized>(ctx: &mut Context<'_, H>) -> ProvisionResult<Option<Action>> {
    info!("Requesting system boot...");
    ctx.console
        .send(BOOT_COMMAND)
        .map_err(ProvisionError::SerialWrite)?;
    Ok(None)
}

// =============================================================================
// Unit Tests
// =============================================================================
