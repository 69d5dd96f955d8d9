//! The platform abstraction (PA): the only thing a caller must supply
//! to drive the engine — read one byte with a timeout, write one byte
//! with a timeout, and sleep for N milliseconds.

#[cfg(feature = "std")]
pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

/// Which wire framing an engine uses. Chosen once at construction and
/// never changed for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Rtu,
    Tcp,
}

/// Caller-supplied blocking byte I/O, the sole collaborator the
/// protocol core depends on.
///
/// A timeout of `None` (the `-1` sentinel in the original C contract)
/// means "wait forever"; `Some(0)` means "don't wait at all" and is a
/// legal, if unusual, caller choice.
///
/// `read_byte`/`write_byte` collapse the original three-way `{1, 0,
/// <0}` return encoding into `Result<Option<..>, Self::Error>` /
/// `Result<bool, Self::Error>`: the timeout case is `Ok(None)` /
/// `Ok(false)`, any genuine transport failure is `Err`, success is
/// `Ok(Some(byte))` / `Ok(true)`.
pub trait Platform {
    /// Implementation-specific transport failure (e.g. a serial-port
    /// or socket error). The engine never inspects this beyond
    /// treating its presence as `TransportError::Io`.
    type Error;

    /// Reads one byte, waiting up to `timeout_ms` (negative = forever).
    fn read_byte(&mut self, timeout_ms: i32) -> Result<Option<u8>, Self::Error>;

    /// Writes one byte, waiting up to `timeout_ms` (negative = forever).
    fn write_byte(&mut self, byte: u8, timeout_ms: i32) -> Result<bool, Self::Error>;

    /// Coarse millisecond sleep, used only for the optional RTU
    /// inter-byte transmit delay.
    fn sleep(&mut self, ms: u32);

    /// The wire framing this platform instance is wired up for.
    fn transport(&self) -> Transport;
}
