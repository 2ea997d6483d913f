//! Settings related to the serial console, the artifact and the provisioning
//! protocol timings.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::path::PathBuf;
use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::utils::{PollPolicy, RetryPolicy};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by a provisioning run and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,
    /// How long a read on the port blocks before timing out. Timeouts are
    /// not errors for the console reader, they only bound each read call.
    pub read_timeout: Duration,

    /// Path to the artifact to be copied onto the board storage.
    pub artifact: Option<PathBuf>,
    /// Accept the first failed unmount of the target volume as a success.
    pub force_unmount: bool,
    /// Log every console line at `info` level instead of `debug`.
    pub echo_console: bool,
    /// Leave the dispatcher loop once the board has been told to boot,
    /// instead of idling until the process is killed.
    pub exit_after_boot: bool,

    /// The mount table to snapshot, in `/proc/self/mounts` format.
    pub mount_table: PathBuf,
    /// File name suffix identifying the board storage among the new volumes.
    pub disk_marker: String,

    pub timings: Timings,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// Delays and retry budgets of the provisioning protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Timings {
    /// Wait between the network marker and the key press that interrupts
    /// autoboot.
    pub wake_delay: Duration,
    /// How often and how long to look for the UMS volume to be mounted.
    pub mount_poll: PollPolicy,
    /// Retries of a busy `umount`.
    pub unmount_retry: RetryPolicy,
    /// Pause after interrupting UMS mode, so the console registers the
    /// interrupt before the next command.
    pub stop_settle: Duration,
    /// Idle period after which the dispatcher logs that it is still waiting.
    pub idle_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            wake_delay: Duration::from_secs(1),
            mount_poll: PollPolicy::default(),
            unmount_retry: RetryPolicy::default(),
            stop_settle: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set. The port path and the artifact have no default and are
/// checked when the run starts.
///
/// **Example**
///
/// ```
/// use umsflash::SettingsBuilder;
///
/// let settings = SettingsBuilder::new()
///     .path("/dev/ttyUSB0")
///     .artifact("build/firmware-m4.bin")
///     .force_unmount(true)
///     .finalize();
/// assert_eq!(settings.baud_rate, 115_200);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                read_timeout: Duration::from_millis(500),
                artifact: None,
                force_unmount: false,
                echo_console: false,
                exit_after_boot: false,
                mount_table: PathBuf::from("/proc/self/mounts"),
                disk_marker: "-m4.dtb".into(),
                timings: Timings::default(),
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.settings.read_timeout = read_timeout;
        self
    }

    /// Set the path to the artifact to be flashed
    pub fn artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.settings.artifact = Some(artifact.into());
        self
    }

    pub fn force_unmount(mut self, force_unmount: bool) -> Self {
        self.settings.force_unmount = force_unmount;
        self
    }

    pub fn echo_console(mut self, echo_console: bool) -> Self {
        self.settings.echo_console = echo_console;
        self
    }

    pub fn exit_after_boot(mut self, exit_after_boot: bool) -> Self {
        self.settings.exit_after_boot = exit_after_boot;
        self
    }

    pub fn mount_table(mut self, mount_table: impl Into<PathBuf>) -> Self {
        self.settings.mount_table = mount_table.into();
        self
    }

    pub fn disk_marker<'a>(mut self, disk_marker: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.disk_marker = disk_marker.into().into_owned();
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.settings.timings = timings;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: Duration::from_millis(500),
            artifact: None,
            force_unmount: false,
            echo_console: false,
            exit_after_boot: false,
            mount_table: PathBuf::from("/proc/self/mounts"),
            disk_marker: "-m4.dtb".into(),
            timings: Timings::default(),
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 230_400;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn parity() {
    let parity = Parity::Even;
    let settings = SettingsBuilder::new().parity(parity).finalize();
    assert_eq!(settings.parity, parity);
}

#[test]
fn artifact() {
    let settings = SettingsBuilder::new().artifact("out/fw-m4.bin").finalize();
    assert_eq!(settings.artifact.unwrap(), PathBuf::from("out/fw-m4.bin"));
}

#[test]
fn force_unmount() {
    let settings = SettingsBuilder::new().force_unmount(true).finalize();
    assert!(settings.force_unmount);
}

#[test]
fn disk_marker() {
    let settings = SettingsBuilder::default().disk_marker("-a53.dtb").finalize();
    assert_eq!(settings.disk_marker, "-a53.dtb");
}

#[test]
fn default_timings() {
    let timings = SettingsBuilder::new().finalize().timings;
    assert_eq!(timings.wake_delay, Duration::from_secs(1));
    assert_eq!(timings.mount_poll.attempts, 10);
    assert_eq!(timings.unmount_retry.max_attempts, 10);
    assert_eq!(timings.stop_settle, Duration::from_millis(100));
    assert_eq!(timings.idle_timeout, Duration::from_secs(3600));
}
