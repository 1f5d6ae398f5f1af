use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::SerialStream;

/// Factory default line speed of RapidHA modules.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Baud rates accepted by [`SerialStream::open`].
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400];

/// Line settings for a serial device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line speed in bits per second. Default: 115200.
    pub baud_rate: u32,
    /// Read timeout applied to the opened stream. Default: 100ms.
    pub read_timeout: Option<Duration>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Some(Duration::from_millis(100)),
        }
    }
}

impl SerialStream {
    /// Open a TTY in raw 8N1 mode at the configured baud rate.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref();
        let speed = baud_to_speed(config.baud_rate)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        configure_raw(&file, speed).map_err(|source| TransportError::Configure {
            path: path.to_path_buf(),
            source,
        })?;

        let mut stream = SerialStream::from_tty(file);
        stream.set_read_timeout(config.read_timeout)?;

        info!(?path, baud = config.baud_rate, "opened serial device");
        Ok(stream)
    }
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        other => return Err(TransportError::UnsupportedBaudRate(other)),
    };
    Ok(speed)
}

fn configure_raw(file: &File, speed: libc::speed_t) -> std::io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: `termios` is plain data; tcgetattr fully initializes it on success.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open descriptor owned by `file`; `tio` is a valid writable pointer.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` was initialized by tcgetattr above.
    unsafe {
        libc::cfmakeraw(&mut tio);
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !libc::CSTOPB;
    tio.c_cflag &= !libc::CRTSCTS;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `fd` is open and `tio` is a fully initialized termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // Stale bytes from before we configured the line are not worth decoding.
    // SAFETY: `fd` is open.
    if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    debug!(fd, "serial line configured raw 8N1");
    Ok(())
}

/// Block until `file` is readable or `timeout` elapses.
///
/// Returns `ErrorKind::TimedOut` when nothing arrived in time.
pub(crate) fn wait_readable(file: &File, timeout: Duration) -> std::io::Result<()> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    loop {
        // SAFETY: `pfd` is a valid pollfd for one descriptor owned by `file`.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        match rc {
            0 => return Err(std::io::Error::from(std::io::ErrorKind::TimedOut)),
            n if n > 0 => return Ok(()),
            _ => {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
        }
    }
}
