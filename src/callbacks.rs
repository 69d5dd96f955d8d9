//! The server's capability bundle: eight optional hooks into the data
//! model (coils, discrete inputs, holding/input registers) that the
//! core knows nothing about.
//!
//! Modeled as a trait with default bodies rather than eight
//! `Option<fn(..)>` fields (see DESIGN.md O1): a type that doesn't
//! override a method gets the "not implemented" behavior for free,
//! which the dispatcher turns into exception 1 exactly as an absent
//! function pointer would in the original.

use crate::bitfield::Bitfield;
use crate::consts::MAX_REGISTERS;
use crate::error::ExceptionCode;

/// Result type for a callback: `Ok(())` on success, `Err(code)` to
/// force a specific exception (the dispatcher folds any `Err` it gets
/// here into exactly that response).
pub type CallbackResult = Result<(), ExceptionCode>;

/// The "not implemented" error every default body returns.
const NOT_IMPLEMENTED: ExceptionCode = ExceptionCode::IllegalFunction;

/// Server-side hooks into the data model behind coils, discrete
/// inputs, holding registers, and input registers.
///
/// Implementors only need to override the handful of methods their
/// device actually supports; every other function code then reads as
/// "illegal function" the way a `NULL` callback pointer does in the
/// original.
pub trait ServerCallbacks {
    /// Fills `out[..quantity]` (bit-indexed) with the current coil
    /// values starting at `address`.
    fn read_coils(&mut self, _address: u16, _quantity: u16, _out: &mut Bitfield) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Fills `out[..quantity]` (bit-indexed) with the current discrete
    /// input values starting at `address`.
    fn read_discrete_inputs(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut Bitfield,
    ) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Fills `out[..quantity]` with the current holding register
    /// values starting at `address`.
    fn read_holding_registers(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut [u16; MAX_REGISTERS],
    ) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Fills `out[..quantity]` with the current input register values
    /// starting at `address`.
    fn read_input_registers(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut [u16; MAX_REGISTERS],
    ) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Applies a single coil write at `address`.
    fn write_single_coil(&mut self, _address: u16, _value: bool) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Applies a single register write at `address`.
    fn write_single_register(&mut self, _address: u16, _value: u16) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Applies `quantity` coil writes starting at `address`, values
    /// bit-indexed in `values`.
    fn write_multiple_coils(
        &mut self,
        _address: u16,
        _quantity: u16,
        _values: &Bitfield,
    ) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }

    /// Applies `quantity` register writes starting at `address`.
    fn write_multiple_registers(
        &mut self,
        _address: u16,
        _quantity: u16,
        _values: &[u16; MAX_REGISTERS],
    ) -> CallbackResult {
        Err(NOT_IMPLEMENTED)
    }
}

/// A `ServerCallbacks` implementor that answers "illegal function" to
/// everything. Useful as a placeholder while wiring up a server that
/// only needs a subset of function codes, or in tests that only care
/// about framing.
pub struct NoCallbacks;

impl ServerCallbacks for NoCallbacks {}
