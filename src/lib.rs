//! A portable, allocation-free Modbus protocol engine.
//!
//! One [`Engine`] drives either role — client ([`Engine::client_create`])
//! or server ([`Engine::server_create`]) — over either wire framing —
//! RTU or TCP/MBAP, picked up from the [`Platform`] passed at
//! construction. The core never allocates and never spawns a thread:
//! callers drive it with blocking, synchronous byte I/O through the
//! `Platform` trait, which is the crate's only collaborator.
//!
//! ```no_run
//! use modbus_engine::{Engine, Platform, Transport};
//!
//! # struct MyPlatform;
//! # impl Platform for MyPlatform {
//! #     type Error = core::convert::Infallible;
//! #     fn read_byte(&mut self, _: i32) -> Result<Option<u8>, Self::Error> { Ok(None) }
//! #     fn write_byte(&mut self, _: u8, _: i32) -> Result<bool, Self::Error> { Ok(true) }
//! #     fn sleep(&mut self, _: u32) {}
//! #     fn transport(&self) -> Transport { Transport::Tcp }
//! # }
//! let platform = MyPlatform;
//! let mut engine = Engine::client_create(platform);
//! engine.set_read_timeout_ms(1000).set_byte_timeout_ms(200);
//!
//! let mut registers = [0u16; modbus_engine::consts::MAX_REGISTERS];
//! engine.read_holding_registers(0, 10, &mut registers)?;
//! # Ok::<(), modbus_engine::ModbusError>(())
//! ```
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bitfield;
pub mod callbacks;
mod client;
pub mod codec;
pub mod consts;
pub mod engine;
pub mod error;
mod frame;
pub mod message;
pub mod platform;
mod server;

pub use bitfield::{packed_byte_count, Bitfield};
pub use callbacks::{CallbackResult, NoCallbacks, ServerCallbacks};
pub use engine::Engine;
pub use error::{ExceptionCode, IoOperation, ModbusError, Result, TransportError};
pub use message::Message;
pub use platform::{Platform, Transport};

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use platform::tcp::TcpPlatform;

#[cfg(feature = "serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
pub use platform::serial::SerialPlatform;
