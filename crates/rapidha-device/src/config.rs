use std::time::Duration;

use rapidha_frame::FrameConfig;
use rapidha_transport::SerialConfig;

/// Default wait for a synchronous response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`Device`](crate::Device).
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Serial port settings used by [`Device::open`](crate::Device::open).
    /// Its `read_timeout` is replaced by `poll_interval`.
    pub serial: SerialConfig,
    /// Wire format and read chunk size.
    pub frame: FrameConfig,
    /// Longest the reader thread blocks in one read before checking for
    /// shutdown and expired handlers. This is the stream's read timeout.
    pub poll_interval: Duration,
    /// Timeout used by the convenience commands.
    pub response_timeout: Duration,
    /// Handler callbacks taking longer than this are logged.
    pub slow_handler_threshold: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            frame: FrameConfig::default(),
            poll_interval: Duration::from_millis(100),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            slow_handler_threshold: Duration::from_millis(50),
        }
    }
}
