//! Turns the board console output into provisioning actions.
//!
//! The reader runs on its own thread for the whole run. It only knows two
//! milestones of the U-Boot boot log:
//!
//! * the USB ethernet gadget coming up, which is the last line printed before
//!   the autoboot countdown. The reader waits a moment, presses a key to stop
//!   autoboot and requests [`Action::StartUms`]. This happens on a deferred
//!   task so that reading carries on in the meantime.
//! * U-Boot reporting that it exposes the eMMC over USB, which requests
//!   [`Action::TransferFile`] right away.

use std::io::{self, BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hexplay::HexViewBuilder;
use log::{debug, error, info, log_enabled, trace, warn, Level::Trace};

use super::port::SerialConsole;
use crate::provisioning::{Action, ActionSender};

// =============================================================================
// Public Interface
// =============================================================================

/// Printed by U-Boot once the USB ethernet gadget is registered.
pub const NETWORK_MARKER: &str = "FEC [PRIME], usb_ether";
/// Printed by U-Boot's `ums` command once the storage is exposed.
pub const UMS_READY_MARKER: &str = "UMS: LUN 0, dev 0, hwpart 0, sector 0x0";

/// A console milestone the reader reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    NetworkUp,
    UmsReady,
}

/// Match a console line against the known markers.
pub fn classify(line: &str) -> Option<Trigger> {
    if line.contains(NETWORK_MARKER) {
        Some(Trigger::NetworkUp)
    } else if line.contains(UMS_READY_MARKER) {
        Some(Trigger::UmsReady)
    } else {
        None
    }
}

/// Run `task` on a new named thread after `delay`, without blocking the
/// caller.
pub fn defer<F>(name: &str, delay: Duration, task: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        thread::sleep(delay);
        task()
    })
}

/// Reads console lines and feeds the action queue.
pub struct ConsoleReader {
    console: SerialConsole,
    queue: ActionSender,
    wake_delay: Duration,
    echo: bool,
}

impl ConsoleReader {
    /// `console` is used by the deferred wake-up task to press a key; the
    /// actions go to `queue`.
    pub fn new(console: SerialConsole, queue: ActionSender, wake_delay: Duration, echo: bool) -> Self {
        ConsoleReader {
            console,
            queue,
            wake_delay,
            echo,
        }
    }

    /// Start reading `port` on a dedicated thread.
    pub fn spawn<R: Read + Send + 'static>(self, port: R) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("console-reader".into())
            .spawn(move || match self.run(BufReader::new(port)) {
                Ok(()) => info!("Console stream closed"),
                Err(e) => error!("Stopped reading the console: {}", e),
            })
    }

    /// Read lines until the end of the stream or a read error.
    ///
    /// Read timeouts only mean the board is quiet. Whatever was read of the
    /// current line is kept and completed by the next read.
    pub fn run<R: BufRead>(&self, mut reader: R) -> io::Result<()> {
        let mut line = Vec::new();
        loop {
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    if !line.is_empty() {
                        self.process_line(&line);
                    }
                    return Ok(());
                }
                Ok(_) => {
                    if line.last() == Some(&b'\n') {
                        self.process_line(&line);
                        line.clear();
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    trace!("console read: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn process_line(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(|c| c == '\r' || c == '\n');
        if self.echo {
            info!(">>> {}", text);
        } else {
            debug!(">>> {}", text);
        }
        if log_enabled!(Trace) {
            let view = HexViewBuilder::new(raw)
                .address_offset(0)
                .row_width(16)
                .finish();
            trace!("\n{}", view);
        }

        match classify(text) {
            Some(Trigger::NetworkUp) => self.schedule_wake_up(),
            Some(Trigger::UmsReady) => {
                info!("UMS Ready");
                if self.queue.send(Action::TransferFile).is_err() {
                    warn!("Dispatcher is gone, dropping {}", Action::TransferFile);
                }
            }
            None => {}
        }
    }

    fn schedule_wake_up(&self) {
        info!("Board network is up, stopping autoboot in {:?}", self.wake_delay);
        let console = self.console.clone();
        let queue = self.queue.clone();
        let spawned = defer("wake-console", self.wake_delay, move || {
            // Any key stops the autoboot countdown.
            if let Err(e) = console.send(b" ") {
                error!("Failed to wake the console: {}", e);
            }
            if queue.send(Action::StartUms).is_err() {
                warn!("Dispatcher is gone, dropping {}", Action::StartUms);
            }
        });
        if let Err(e) = spawned {
            error!("Failed to schedule the console wake up: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::provisioning::action_queue;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<u8>>>);
    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Yields one chunk per read, with a timeout error between chunks.
    struct Stuttering {
        chunks: Vec<&'static [u8]>,
        timed_out: bool,
    }
    impl Read for Stuttering {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            if !self.timed_out {
                self.timed_out = true;
                return Err(io::ErrorKind::TimedOut.into());
            }
            self.timed_out = false;
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn classifies_markers() {
        assert_eq!(
            classify("Net:   FEC [PRIME], usb_ether"),
            Some(Trigger::NetworkUp)
        );
        assert_eq!(
            classify("UMS: LUN 0, dev 0, hwpart 0, sector 0x0, count 0x1d5a000"),
            Some(Trigger::UmsReady)
        );
        assert_eq!(classify("Hit any key to stop autoboot:  1"), None);
    }

    #[test]
    fn ums_ready_enqueues_transfer_immediately() {
        let (tx, rx) = action_queue();
        let reader = ConsoleReader::new(SerialConsole::new(io::sink()), tx, Duration::from_secs(60), false);
        reader
            .run(Cursor::new(
                "U-Boot 2020.04\r\nUMS: LUN 0, dev 0, hwpart 0, sector 0x0, count 0x1d5a000\r\n",
            ))
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(100)).unwrap(),
            Action::TransferFile
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn network_marker_wakes_console_then_starts_ums() {
        let (tx, rx) = action_queue();
        let recorder = Recorder::default();
        let reader = ConsoleReader::new(
            SerialConsole::new(recorder.clone()),
            tx,
            Duration::from_millis(20),
            true,
        );
        reader
            .run(Cursor::new("Net:   FEC [PRIME], usb_ether\nHit any key to stop autoboot\n"))
            .unwrap();

        // The reader is already done while the deferred task is pending.
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Action::StartUms
        );
        assert_eq!(&recorder.0.lock().unwrap()[..], b" ");
    }

    #[test]
    fn lines_split_by_read_timeouts_are_reassembled() {
        let (tx, rx) = action_queue();
        let reader = ConsoleReader::new(SerialConsole::new(io::sink()), tx, Duration::from_secs(60), false);
        let port = Stuttering {
            chunks: vec![b"UMS: LUN 0, dev 0, ", b"hwpart 0, sector 0x0", b", count 0x10\n"],
            timed_out: false,
        };
        reader.run(BufReader::new(port)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(100)).unwrap(),
            Action::TransferFile
        );
    }

    #[test]
    fn non_utf8_noise_is_tolerated() {
        let (tx, rx) = action_queue();
        let reader = ConsoleReader::new(SerialConsole::new(io::sink()), tx, Duration::from_secs(60), false);
        let mut feed = vec![0xff, 0xfe, b'\n'];
        feed.extend_from_slice(UMS_READY_MARKER.as_bytes());
        reader.run(Cursor::new(feed)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(100)).unwrap(),
            Action::TransferFile
        );
    }

    #[test]
    fn deferred_task_runs_after_its_delay() {
        let start = std::time::Instant::now();
        let (tx, rx) = std::sync::mpsc::channel();
        defer("test-defer", Duration::from_millis(30), move || tx.send(()).unwrap())
            .unwrap()
            .join()
            .unwrap();
        rx.recv().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
