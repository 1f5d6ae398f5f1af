//! Host driver for RapidHA ZigBee modules.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial TTY byte stream with read timeouts
//! - [`frame`]: wire codec, stream reassembly and the command table
//! - [`device`]: background reader, handler dispatch and request/response
//!   correlation, plus the startup handshake and convenience commands
//!
//! With the `cli` feature this crate also builds the `rapidha` binary.

/// Re-export transport types.
pub mod transport {
    pub use rapidha_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rapidha_frame::*;
}

/// Re-export device types.
pub mod device {
    pub use rapidha_device::*;
}

pub use rapidha_device::{predicate, Device, DeviceConfig, DeviceError};
pub use rapidha_frame::Frame;
