use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

/// Baud rates accepted by [`TtyPort::open`] on this platform.
#[cfg(not(target_os = "macos"))]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
];

/// Baud rates accepted by [`TtyPort::open`] on this platform.
#[cfg(target_os = "macos")]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 28800, 38400, 57600, 115200,
];

/// Device-name prefixes considered by [`scan_ports`].
const PORT_PREFIXES: &[&str] = &[
    "ttyUSB", "ttyACM", "ttyAMA", "ttyS", "tty.usb", "cu.usb",
];

/// Unix tty serial transport.
///
/// Opens the device raw, 8 data bits, no parity, 1 stop bit, no flow
/// control. The device is locked exclusively (`flock` plus `TIOCEXCL`) for
/// as long as any handle to it is open, so no other process can use the
/// port while it is connected.
pub struct TtyPort;

impl TtyPort {
    /// Open and configure a tty device.
    pub fn open(port: &str, baud_rate: u32) -> Result<SerialStream> {
        let speed =
            baud_to_speed(baud_rate).ok_or(TransportError::UnsupportedBaudRate { baud: baud_rate })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(port)
            .map_err(|source| {
                if source.raw_os_error() == Some(libc::EBUSY) {
                    TransportError::PortBusy {
                        port: port.to_string(),
                    }
                } else {
                    TransportError::PortUnavailable {
                        port: port.to_string(),
                        source,
                    }
                }
            })?;
        let fd = file.as_raw_fd();

        if !try_lock_exclusive(fd).map_err(|source| TransportError::PortUnavailable {
            port: port.to_string(),
            source,
        })? {
            return Err(TransportError::PortBusy {
                port: port.to_string(),
            });
        }

        configure(fd, speed).map_err(|source| TransportError::Configure {
            port: port.to_string(),
            source,
        })?;

        info!(port, baud_rate, "opened serial port");
        Ok(SerialStream::from_tty(file, port, baud_rate))
    }
}

fn baud_to_speed(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        #[cfg(target_os = "macos")]
        14400 => libc::B14400,
        19200 => libc::B19200,
        #[cfg(target_os = "macos")]
        28800 => libc::B28800,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        _ => return None,
    };
    Some(speed)
}

/// Returns `Ok(false)` when another open file description holds the lock.
fn try_lock_exclusive(fd: RawFd) -> std::io::Result<bool> {
    // SAFETY: `fd` is an open descriptor owned by the caller.
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

fn configure(fd: RawFd, speed: libc::speed_t) -> std::io::Result<()> {
    // SAFETY: termios is plain data; every call below receives a valid
    // pointer to it and an open tty descriptor.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        libc::cfmakeraw(&mut tio);
        tio.c_cflag &= !(libc::CSIZE | libc::CSTOPB | libc::PARENB);
        tio.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 0;

        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);

        // Refuse further opens of the device, even by root-less peers that
        // ignore advisory locks. Not every driver supports it.
        if libc::ioctl(fd, libc::TIOCEXCL) != 0 {
            debug!("TIOCEXCL not supported by device");
        }

        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Wait until `fd` is readable. Returns `Ok(false)` on timeout.
pub(crate) fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> std::io::Result<bool> {
    let timeout_ms = match timeout {
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    // SAFETY: `pfd` is a valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(rc > 0)
}

pub(crate) fn bytes_available(fd: RawFd) -> std::io::Result<usize> {
    let mut count: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through the provided pointer.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(count.max(0) as usize)
}

/// Availability of a scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// The port can be opened and locked.
    Free,
    /// Another process holds the port.
    Busy,
    /// The port exists but cannot be opened (permissions, no device behind it).
    Inaccessible,
}

impl PortStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PortStatus::Free => "free",
            PortStatus::Busy => "busy",
            PortStatus::Inaccessible => "inaccessible",
        }
    }
}

/// A candidate serial device found by [`scan_ports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub path: String,
    pub status: PortStatus,
}

/// List serial device nodes under `/dev`, free and busy alike.
pub fn scan_ports() -> Result<Vec<PortInfo>> {
    scan_ports_in(Path::new("/dev"))
}

fn scan_ports_in(dir: &Path) -> Result<Vec<PortInfo>> {
    let mut ports = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !PORT_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }
        let path = entry.path().to_string_lossy().into_owned();
        let status = probe(&path);
        ports.push(PortInfo { path, status });
    }
    ports.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(ports)
}

fn probe(path: &str) -> PortStatus {
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
    {
        Ok(file) => file,
        Err(err) if err.raw_os_error() == Some(libc::EBUSY) => return PortStatus::Busy,
        Err(_) => return PortStatus::Inaccessible,
    };
    match try_lock_exclusive(file.as_raw_fd()) {
        Ok(true) => PortStatus::Free,
        Ok(false) => PortStatus::Busy,
        Err(_) => PortStatus::Inaccessible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_standard_baud_rates() {
        for baud in SUPPORTED_BAUD_RATES {
            assert!(baud_to_speed(*baud).is_some(), "baud {baud} should map");
        }
        assert!(baud_to_speed(12345).is_none());
    }

    #[test]
    fn open_rejects_unsupported_baud_rate_before_touching_device() {
        let err = TtyPort::open("/dev/does-not-matter", 12345).unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnsupportedBaudRate { baud: 12345 }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn open_missing_device_is_unavailable() {
        let err = TtyPort::open("/dev/serialrpc-missing-device", 9600).unwrap_err();
        assert!(matches!(err, TransportError::PortUnavailable { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn open_regular_file_fails_configuration() {
        let dir = std::env::temp_dir().join(format!("serialrpc-tty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not-a-tty");
        std::fs::write(&path, b"").unwrap();

        let err = TtyPort::open(path.to_str().unwrap(), 9600).unwrap_err();
        assert!(matches!(err, TransportError::Configure { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn exclusive_lock_is_detected() {
        let dir = std::env::temp_dir().join(format!("serialrpc-lock-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("lockfile");
        std::fs::write(&path, b"").unwrap();

        let first = std::fs::File::open(&path).unwrap();
        let second = std::fs::File::open(&path).unwrap();
        assert!(try_lock_exclusive(first.as_raw_fd()).unwrap());
        assert!(!try_lock_exclusive(second.as_raw_fd()).unwrap());

        drop(first);
        assert!(try_lock_exclusive(second.as_raw_fd()).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn scan_filters_by_device_prefix() {
        let dir = std::env::temp_dir().join(format!("serialrpc-scan-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ttyUSB0"), b"").unwrap();
        std::fs::write(dir.join("ttyACM1"), b"").unwrap();
        std::fs::write(dir.join("null"), b"").unwrap();

        let ports = scan_ports_in(&dir).unwrap();
        let names: Vec<_> = ports
            .iter()
            .map(|p| Path::new(&p.path).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ttyACM1", "ttyUSB0"]);
        assert!(ports.iter().all(|p| p.status == PortStatus::Free));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
