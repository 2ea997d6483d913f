//! Serial port device manipulation.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info};
use serialport::SerialPort;

use crate::Settings;

//==============================================================================
// Public Interface
//==============================================================================

/// Open the board console with the values in `settings`.
///
/// USB serial adapters can take a moment to come back after the board was
/// power cycled, so opening is retried a few times before giving up.
pub fn open_and_setup_port(settings: &Settings) -> Result<Box<dyn SerialPort>, serialport::Error> {
    use retry::{delay, retry_with_index};

    let path = settings.path.clone().ok_or_else(|| {
        serialport::Error::new(serialport::ErrorKind::InvalidInput, "no serial port path")
    })?;

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(4),
        |index| -> Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {}", index);
            serialport::new(&path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .timeout(settings.read_timeout)
                .open()
        },
    );
    match result {
        Ok(port) => {
            info!(
                "Connected to {} at {} baud",
                port.name().unwrap_or_else(|| path.clone()),
                port.baud_rate()?
            );
            debug!("data_bits    : {:#?}", port.data_bits()?);
            debug!("stop_bits    : {:#?}", port.stop_bits()?);
            debug!("parity       : {:#?}", port.parity()?);
            debug!("flow control : {:#?}", port.flow_control()?);
            Ok(port)
        }
        Err(err) => match err {
            retry::Error::Operation {
                error,
                total_delay,
                tries,
            } => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error)
            }
            retry::Error::Internal(_) => {
                info!("Internal retry error while opening port");
                Err(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ))
            }
        },
    }
}

/// Write half of the board console, shared between the dispatcher and the
/// deferred tasks of the console reader. Every [`send`](SerialConsole::send)
/// holds the lock for the whole message, so writes never interleave.
#[derive(Clone)]
pub struct SerialConsole {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SerialConsole {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        SerialConsole {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write `bytes` to the console and flush them.
    pub fn send(&self, bytes: &[u8]) -> io::Result<()> {
        debug!("<<< {}", String::from_utf8_lossy(bytes).escape_debug());
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "console writer poisoned"))?;

        let mut written = 0;
        let mut stalls = 0;
        while written < bytes.len() {
            match writer.write(&bytes[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                // The port times out when its output buffer is full; give the
                // UART a moment to drain.
                Err(e) if e.kind() == io::ErrorKind::TimedOut && stalls < MAX_WRITE_STALLS => {
                    stalls += 1;
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        writer.flush()
    }
}

//==============================================================================
// Private stuff
//==============================================================================

const MAX_WRITE_STALLS: u32 = 20;
