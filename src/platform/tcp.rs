//! `Platform` adapter over a `std::net::TcpStream`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use super::{Platform, Transport};

/// Drives the engine over a plain TCP connection, one byte at a time,
/// using the stream's own read/write timeouts for the per-byte
/// deadline the engine asks for.
pub struct TcpPlatform {
    stream: TcpStream,
}

impl TcpPlatform {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    fn set_timeouts(&self, timeout_ms: i32) -> std::io::Result<()> {
        let duration = (timeout_ms >= 0).then(|| Duration::from_millis(timeout_ms as u64));
        self.stream.set_read_timeout(duration)?;
        self.stream.set_write_timeout(duration)
    }

    fn is_timeout(err: &std::io::Error) -> bool {
        matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        )
    }
}

impl Platform for TcpPlatform {
    type Error = std::io::Error;

    fn read_byte(&mut self, timeout_ms: i32) -> Result<Option<u8>, Self::Error> {
        self.set_timeouts(timeout_ms)?;
        let mut byte = [0u8; 1];
        match self.stream.read_exact(&mut byte) {
            Ok(()) => Ok(Some(byte[0])),
            Err(e) if Self::is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_byte(&mut self, byte: u8, timeout_ms: i32) -> Result<bool, Self::Error> {
        self.set_timeouts(timeout_ms)?;
        match self.stream.write_all(&[byte]) {
            Ok(()) => Ok(true),
            Err(e) if Self::is_timeout(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn sleep(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }
}
