//! Host-side driver for RapidHA ZigBee modules.
//!
//! A [`Device`] owns a byte stream to the module. Its background reader
//! turns the stream into frames and routes each one two ways:
//!
//! - to every matching handler in the [`DispatchRegistry`], in registration order
//! - to the oldest pending [`send_and_wait`](Device::send_and_wait) call whose
//!   predicate matches, through the [`Correlator`]
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rapidha_device::{predicate, Device, DeviceConfig};
//! use rapidha_frame::command::{NETWORK_STATUS_REQUEST, NETWORK_STATUS_RESPONSE};
//! use rapidha_frame::Frame;
//!
//! let mut device = Device::open("/dev/ttyUSB0", DeviceConfig::default())?;
//! device.register("printall", predicate::any(), |name: &str, frame: &Frame| {
//!     println!("{name}: {frame:?}");
//! });
//! device.start()?;
//!
//! let status = device.send_and_wait(
//!     NETWORK_STATUS_REQUEST,
//!     &[],
//!     predicate::command(NETWORK_STATUS_RESPONSE),
//!     Duration::from_secs(5),
//! )?;
//! println!("network status: {:02x?}", status.payload);
//! device.stop()?;
//! # Ok::<(), rapidha_device::DeviceError>(())
//! ```

pub mod commands;
pub mod config;
pub mod correlator;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod predicate;
pub mod startup;

pub use config::{DeviceConfig, DEFAULT_RESPONSE_TIMEOUT};
pub use correlator::{Correlator, PendingRequest};
pub use device::{Device, FrameSender, READER_THREAD_NAME};
pub use dispatch::DispatchRegistry;
pub use error::{DeviceError, ErrorKind, Result};
pub use predicate::{FrameHandler, FramePredicate};
pub use startup::{StartupConfig, StartupSequence, StartupState};
