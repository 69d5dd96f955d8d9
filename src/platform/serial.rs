//! `Platform` adapter over a real serial port, via the `serialport`
//! crate (grounded on `rtu_transport::RtuTransport`'s port setup).

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use super::{Platform, Transport};

/// Drives the engine over a serial port configured 8-N-1, the
/// standard Modbus RTU line setting.
pub struct SerialPlatform {
    port: Box<dyn SerialPort>,
}

impl SerialPlatform {
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(device, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(1))
            .open()?;
        Ok(Self { port })
    }

    fn set_timeout(&mut self, timeout_ms: i32) {
        let duration = if timeout_ms < 0 {
            Duration::from_secs(3600)
        } else {
            Duration::from_millis(timeout_ms as u64)
        };
        // serialport only fails `set_timeout` for invalid durations, never
        // for these caller-derived ones.
        let _ = self.port.set_timeout(duration);
    }
}

impl Platform for SerialPlatform {
    type Error = std::io::Error;

    fn read_byte(&mut self, timeout_ms: i32) -> Result<Option<u8>, Self::Error> {
        self.set_timeout(timeout_ms);
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Ok(Some(byte[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_byte(&mut self, byte: u8, timeout_ms: i32) -> Result<bool, Self::Error> {
        self.set_timeout(timeout_ms);
        match self.port.write_all(&[byte]) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn sleep(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn transport(&self) -> Transport {
        Transport::Rtu
    }
}
