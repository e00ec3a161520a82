use std::io::{Cursor, Read, Write};
use std::time::Duration;

/// Smallest timeout handed to an OS stream. A zero timeout means "block
/// forever" or is rejected outright depending on the platform.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// A readable byte stream whose individual reads can be bounded in time.
///
/// A read that hits the timeout fails with `ErrorKind::TimedOut` or
/// `ErrorKind::WouldBlock`; callers treat both the same way.
pub trait TimedRead: Read {
    /// Bound every subsequent `read` call by `timeout`.
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

/// A writable byte stream whose individual writes can be bounded in time.
pub trait TimedWrite: Write {
    /// Bound every subsequent `write` call by `timeout`.
    fn set_write_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

#[cfg(unix)]
impl TimedRead for std::os::unix::net::UnixStream {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, Some(timeout.max(MIN_TIMEOUT)))
    }
}

#[cfg(unix)]
impl TimedWrite for std::os::unix::net::UnixStream {
    fn set_write_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, Some(timeout.max(MIN_TIMEOUT)))
    }
}

/// In-memory streams never block, so timeouts are accepted and ignored.
impl<T: AsRef<[u8]>> TimedRead for Cursor<T> {
    fn set_read_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
        Ok(())
    }
}

impl TimedWrite for Cursor<Vec<u8>> {
    fn set_write_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
        Ok(())
    }
}

impl TimedWrite for Vec<u8> {
    fn set_write_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
        Ok(())
    }
}
