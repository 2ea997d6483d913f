//! The provisioning state machine.
//!
//! The board drives the first two transitions through its console, every
//! other transition is requested by the handler of the previous step:
//!
//! ```text
//!        console: "FEC [PRIME], usb_ether"
//!                         |
//!                         v
//!                   .-----------.
//!                   | StartUms  |---> `ums 0 mmc 0`
//!                   '-----------'
//!                         |
//!        console: "UMS: LUN 0, dev 0, hwpart 0, sector 0x0"
//!                         |
//!                         v
//!                  .--------------.
//!                  | TransferFile |    new mount + `*-m4.dtb`, copy
//!                  '--------------'
//!                         v
//!                 .----------------.
//!                 | VerifyTransfer |   sync, sync, sha256
//!                 '----------------'
//!                         v
//!                   .-------------.
//!                   | UnmountDisk |    failures are only reported
//!                   '-------------'
//!                         v
//!               .-------------------.
//!               | StopSerialSession |---> Ctrl+C
//!               '-------------------'
//!                         v
//!                   .-----------.
//!                   | BootBoard |---> `boot`
//!                   '-----------'
//!                         |
//!                         v
//!                  idle until killed
//! ```
//!
//! Actions arriving out of this order are ignored. In particular a board
//! that prints its boot markers again after booting the new firmware does not
//! start a second round.

use std::sync::mpsc::{RecvTimeoutError, TrySendError};

use log::{debug, info, warn};

use super::actions::Action;
use super::handlers::{self, Context};
use super::queue::{action_queue, ActionReceiver, ActionSender};
use super::session::Session;
use crate::error::{ProvisionError, ProvisionResult};
use crate::serial::{open_and_setup_port, ConsoleReader, SerialConsole};
use crate::settings::Settings;
use crate::utils::{Host, SystemHost};

// =============================================================================
// Public Interface
// =============================================================================

/// Consumes the action queue and runs one handler at a time.
pub struct Dispatcher<H: Host> {
    settings: Settings,
    session: Session,
    host: H,
    console: SerialConsole,
    queue: ActionSender,
    actions: ActionReceiver,
}

impl<H: Host> Dispatcher<H> {
    /// `queue` and `actions` must be the two ends of the same
    /// [`action_queue`]: follow-up actions are enqueued on `queue`.
    pub fn new(
        settings: Settings,
        session: Session,
        host: H,
        console: SerialConsole,
        queue: ActionSender,
        actions: ActionReceiver,
    ) -> Self {
        Dispatcher {
            settings,
            session,
            host,
            console,
            queue,
            actions,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The dispatcher event loop. It only returns on a fatal error, or after
    /// the board was told to boot when `exit_after_boot` is set.
    pub fn run(&mut self) -> ProvisionResult<()> {
        let idle_timeout = self.settings.timings.idle_timeout;
        loop {
            match self.actions.recv_timeout(idle_timeout) {
                Ok(action) => {
                    self.dispatch(action)?;
                    if self.settings.exit_after_boot && self.session.is_complete() {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    info!("Nothing happened for {:?}, still waiting", idle_timeout);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ProvisionError::QueueClosed),
            }
        }
    }

    /// Execute `action` if it is the next step of the protocol and enqueue
    /// whatever must follow it. Returns the enqueued action.
    pub fn dispatch(&mut self, action: Action) -> ProvisionResult<Option<Action>> {
        let expected = self.session.expected_action();
        if expected != Some(action) {
            match expected {
                Some(expected) => warn!("Ignoring {} while waiting for {}", action, expected),
                None => warn!("Ignoring {}, the board was already told to boot", action),
            }
            return Ok(None);
        }

        info!("=> {}", action);
        let next = {
            let mut ctx = Context {
                settings: &self.settings,
                session: &mut self.session,
                host: &self.host,
                console: &self.console,
            };
            handlers::run(action, &mut ctx)?
        };
        self.session.record(action);

        if let Some(next) = next {
            // The dispatcher is the only consumer, blocking here would never
            // end.
            self.queue.try_send(next).map_err(|e| match e {
                TrySendError::Full(next) => ProvisionError::QueueOverflow(next.to_string()),
                TrySendError::Disconnected(_) => ProvisionError::QueueClosed,
            })?;
            debug!("{} done, {} queued", action, next);
        }
        Ok(next)
    }
}

/// Run a complete provisioning session with the given settings.
///
/// Hashes the artifact, opens the console, starts the console reader and
/// runs the dispatcher on the calling thread. The console handles are closed
/// before a fatal error is handed back to the caller.
///
/// **Example**
/// ```no_run
/// use umsflash::{provision, SettingsBuilder};
///
/// let settings = SettingsBuilder::new()
///     .path("/dev/ttyUSB0")
///     .artifact("firmware-m4.bin")
///     .finalize();
/// if let Err(e) = provision(settings) {
///     eprintln!("{}", e);
///     std::process::exit(1);
/// }
/// ```
pub fn provision(settings: Settings) -> ProvisionResult<()> {
    let path = settings
        .path
        .clone()
        .ok_or_else(|| ProvisionError::Config("no serial port given".into()))?;
    let artifact = settings
        .artifact
        .clone()
        .ok_or_else(|| ProvisionError::Config("no artifact given".into()))?;
    info!(
        "Writing {} to the board with control port at {}",
        artifact.display(),
        path
    );

    let session = Session::open(&artifact)?;

    let port = open_and_setup_port(&settings).map_err(|source| ProvisionError::SerialOpen {
        path: path.clone(),
        source,
    })?;
    let reader_port = port.try_clone().map_err(|source| ProvisionError::SerialOpen {
        path: path.clone(),
        source,
    })?;
    let console = SerialConsole::new(port);

    let (queue, actions) = action_queue();
    ConsoleReader::new(
        console.clone(),
        queue.clone(),
        settings.timings.wake_delay,
        settings.echo_console,
    )
    .spawn(reader_port)
    .map_err(|e| ProvisionError::SerialOpen {
        path: path.clone(),
        source: e.into(),
    })?;

    let host = SystemHost::new(&settings.mount_table);
    let mut dispatcher = Dispatcher::new(settings, session, host, console, queue, actions);
    let result = dispatcher.run();
    // Closes the write half; the reader thread owns the read half and goes
    // away with the process.
    drop(dispatcher);
    result
}

// =============================================================================
// Unit Tests
// =============================================================================
