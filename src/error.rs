//! The flat error taxonomy: transport failures, timeouts, protocol
//! violations, and Modbus exceptions, modeled as a `thiserror::Error`
//! enum so every variant gets a `Display` impl for free.

use core::fmt;

/// Which kind of byte operation a transport failure happened during.
///
/// Kept as a closed, allocation-free enum (rather than a formatted
/// string) so `ModbusError` stays usable on targets without `alloc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    Read,
    Write,
    Configure,
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Configure => write!(f, "configure"),
        }
    }
}

/// One of the four Modbus exception codes this engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 1,
    IllegalDataAddress = 2,
    IllegalDataValue = 3,
    ServerDeviceFailure = 4,
}

impl ExceptionCode {
    /// Decodes a wire exception byte; `None` outside 1..=4.
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::IllegalFunction),
            2 => Some(Self::IllegalDataAddress),
            3 => Some(Self::IllegalDataValue),
            4 => Some(Self::ServerDeviceFailure),
            _ => None,
        }
    }

    /// The wire byte for this exception.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "modbus exception 1: illegal function"),
            Self::IllegalDataAddress => write!(f, "modbus exception 2: illegal data address"),
            Self::IllegalDataValue => write!(f, "modbus exception 3: illegal data value"),
            Self::ServerDeviceFailure => write!(f, "modbus exception 4: server device failure"),
        }
    }
}

impl core::error::Error for ExceptionCode {}

/// Non-timeout I/O failures, CRC mismatches, and MBAP header violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{operation} failed on the underlying transport")]
    Io { operation: IoOperation },

    #[error("RTU CRC mismatch: calculated {calculated:#06x}, received {received:#06x}")]
    Crc { calculated: u16, received: u16 },

    #[error("MBAP header carried a non-zero protocol id")]
    InvalidProtocolId,

    #[error("MBAP length field exceeded 255")]
    InvalidLength,

    #[error("frame payload of {byte_count} bytes exceeds {remaining} bytes of remaining buffer capacity")]
    FrameTooLarge { byte_count: usize, remaining: usize },
}

/// The flat error code space of the protocol core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModbusError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("timeout waiting for a byte")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("{0}")]
    Exception(#[from] ExceptionCode),
}

impl ModbusError {
    /// Mirrors `mbsn_error_is_exception`: true for the four Modbus
    /// exception codes, false for every other member of the flat
    /// error space.
    pub const fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// The wire exception code this error maps to, if any.
    pub const fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            Self::Exception(code) => Some(*code),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ModbusError>;

impl From<u8> for ModbusError {
    /// Builds an `Exception` from a raw wire byte, folding anything
    /// outside 1..=4 into `ServerDeviceFailure` the way the server
    /// dispatch folds a non-exception callback error.
    fn from(code: u8) -> Self {
        match ExceptionCode::from_u8(code) {
            Some(code) => Self::Exception(code),
            None => Self::Exception(ExceptionCode::ServerDeviceFailure),
        }
    }
}
