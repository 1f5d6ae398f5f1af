use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected serial byte stream implementing `Read + Write`.
///
/// On Unix this wraps either a raw-mode TTY file descriptor or a Unix
/// domain socket bridged to a module (e.g. a `socat` relay or a simulator).
pub struct SerialStream {
    inner: SerialStreamInner,
    read_timeout: Option<Duration>,
}

enum SerialStreamInner {
    #[cfg(unix)]
    Tty(std::fs::File),
    #[cfg(unix)]
    Socket(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => {
                if let Some(timeout) = self.read_timeout {
                    crate::tty::wait_readable(file, timeout)?;
                }
                file.read(buf)
            }
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => file.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => file.flush(),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    /// Create a SerialStream from an already configured TTY file.
    #[cfg(unix)]
    pub(crate) fn from_tty(file: std::fs::File) -> Self {
        Self {
            inner: SerialStreamInner::Tty(file),
            read_timeout: None,
        }
    }

    /// Create a SerialStream from a Unix domain socket bridged to a module.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Socket(stream),
            read_timeout: None,
        }
    }

    /// Connect to a Unix domain socket that relays a module's serial line.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            crate::error::TransportError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(?path, "connected to serial relay socket");
        Ok(Self::from_unix(stream))
    }

    /// Set read timeout. `None` blocks until data arrives.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => {}
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.set_read_timeout(timeout)?,
        }
        self.read_timeout = timeout;
        Ok(())
    }

    /// Current read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Try to clone this stream (duplicates the file descriptor).
    ///
    /// The clone starts with the same read timeout.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => SerialStreamInner::Tty(file.try_clone()?),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => SerialStreamInner::Socket(stream.try_clone()?),
        };
        Ok(Self {
            inner,
            read_timeout: self.read_timeout,
        })
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => "tty",
            #[cfg(unix)]
            SerialStreamInner::Socket(_) => "unix-socket",
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("type", &self.transport_name())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}
