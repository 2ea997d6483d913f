//! The board console: opening the port, writing to it from several threads
//! and turning what it prints into actions.

mod classifier;
mod port;

pub use classifier::{classify, defer, ConsoleReader, Trigger, NETWORK_MARKER, UMS_READY_MARKER};
pub use port::{open_and_setup_port, SerialConsole};
