//! Serial byte-stream transport for RapidHA modules.
//!
//! The lowest layer of the driver. It knows nothing about frames: it opens a
//! TTY (typically a USB-serial adapter), puts it in raw mode at the requested
//! baud rate, and hands out [`SerialStream`] halves that implement
//! `Read + Write`.
//!
//! Reads honour an optional timeout so a background reader can notice a stop
//! request instead of blocking forever; a timed-out read surfaces as
//! `std::io::ErrorKind::TimedOut` or `WouldBlock`.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod tty;

pub use error::{Result, TransportError};
pub use traits::SerialStream;

#[cfg(unix)]
pub use tty::{SerialConfig, DEFAULT_BAUD_RATE, SUPPORTED_BAUD_RATES};
