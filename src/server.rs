//! The server (RTU slave / TCP server) side: `poll` plus one handler
//! per function code, each driving a [`ServerCallbacks`] hook.

use crate::bitfield::{packed_byte_count, Bitfield};
use crate::callbacks::ServerCallbacks;
use crate::consts::{
    BITFIELD_LEN, BROADCAST_ADDRESS, COIL_OFF, COIL_ON, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_REGISTERS,
    MAX_READ_BITS_QUANTITY, MAX_READ_REGISTERS_QUANTITY, MAX_WRITE_BITS_QUANTITY,
    MAX_WRITE_REGISTERS_QUANTITY,
};
use crate::engine::{addresses_overflow, Engine};
use crate::error::{ExceptionCode, ModbusError};
use crate::frame::{self, checked_remaining_capacity};
use crate::platform::{Platform, Transport};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

impl<P: Platform> Engine<P> {
    /// Waits for one request and, if it's addressed to us, dispatches
    /// it to `callbacks` and replies. Returns `Ok(())` both for an
    /// idle poll (no byte arrived before `read_timeout_ms`) and for a
    /// request that was answered with a Modbus exception — only a
    /// transport-level failure surfaces as `Err`.
    pub fn poll<C: ServerCallbacks>(&mut self, callbacks: &mut C) -> Result<(), ModbusError> {
        let mut first_byte_received = false;
        match frame::recv_header(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_timeout_ms,
            &mut first_byte_received,
        ) {
            Ok(()) => {}
            Err(ModbusError::Timeout) if !first_byte_received => return Ok(()),
            Err(e) => return Err(e),
        }

        if self.transport == Transport::Rtu {
            if self.msg.unit_id == BROADCAST_ADDRESS {
                self.msg.broadcast = true;
            } else if self.msg.unit_id != self.address_rtu {
                self.msg.ignored = true;
            }
        }

        #[cfg(feature = "tracing")]
        if self.msg.ignored {
            warn!(unit_id = self.msg.unit_id, "ignoring request not addressed to us");
        }

        match self.dispatch(callbacks) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                debug!(fc = self.msg.fc, "request handled");
                Ok(())
            }
            Err(e) if e.is_exception() => {
                #[cfg(feature = "tracing")]
                warn!(fc = self.msg.fc, %e, "request answered with an exception");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn dispatch<C: ServerCallbacks>(&mut self, callbacks: &mut C) -> Result<(), ModbusError> {
        match self.msg.fc {
            FC_READ_COILS => self.handle_read_bits(callbacks, true),
            FC_READ_DISCRETE_INPUTS => self.handle_read_bits(callbacks, false),
            FC_READ_HOLDING_REGISTERS => self.handle_read_words(callbacks, true),
            FC_READ_INPUT_REGISTERS => self.handle_read_words(callbacks, false),
            FC_WRITE_SINGLE_COIL => self.handle_write_single_coil(callbacks),
            FC_WRITE_SINGLE_REGISTER => self.handle_write_single_register(callbacks),
            FC_WRITE_MULTIPLE_COILS => self.handle_write_multiple_coils(callbacks),
            FC_WRITE_MULTIPLE_REGISTERS => self.handle_write_multiple_registers(callbacks),
            // An unrecognized function code is reported up as an
            // exception but, unlike every handler above, no exception
            // frame is put on the wire for it — this matches
            // `handle_req_fc`'s default case in the reference
            // implementation, which only sets the error value without
            // calling its wire-sending exception helper.
            _ => Err(ModbusError::Exception(ExceptionCode::IllegalFunction)),
        }
    }

    /// Turns `msg.fc` into its exception form, sends a one-byte
    /// exception-code response, and returns the exception as `Err` so
    /// callers can propagate it unchanged.
    fn send_exception(&mut self, code: ExceptionCode) -> Result<(), ModbusError> {
        self.msg.fc |= crate::consts::EXCEPTION_FC_MASK;
        frame::send_header(&mut self.msg, self.transport, 1);
        self.msg.buf.put_u8(code.to_u8());
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )?;
        Err(ModbusError::Exception(code))
    }

    fn handle_read_bits<C: ServerCallbacks>(
        &mut self,
        callbacks: &mut C,
        is_coils: bool,
    ) -> Result<(), ModbusError> {
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let address = self.msg.buf.get_u16();
        let quantity = self.msg.buf.get_u16();
        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;

        if self.msg.ignored {
            return Ok(());
        }
        if quantity == 0 || quantity > MAX_READ_BITS_QUANTITY {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if addresses_overflow(address, quantity) {
            return self.send_exception(ExceptionCode::IllegalDataAddress);
        }

        let mut values = Bitfield::new();
        let result = if is_coils {
            callbacks.read_coils(address, quantity, &mut values)
        } else {
            callbacks.read_discrete_inputs(address, quantity, &mut values)
        };
        if let Err(code) = result {
            return self.send_exception(code);
        }
        if self.msg.broadcast {
            return Ok(());
        }

        let byte_count = packed_byte_count(quantity).min(BITFIELD_LEN);
        frame::send_header(&mut self.msg, self.transport, byte_count as u16 + 1);
        self.msg.buf.put_u8(byte_count as u8);
        self.msg.buf.put_bytes(&values.as_bytes()[..byte_count]);
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )
    }

    fn handle_read_words<C: ServerCallbacks>(
        &mut self,
        callbacks: &mut C,
        is_holding: bool,
    ) -> Result<(), ModbusError> {
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let address = self.msg.buf.get_u16();
        let quantity = self.msg.buf.get_u16();
        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;

        if self.msg.ignored {
            return Ok(());
        }
        if quantity == 0 || quantity > MAX_READ_REGISTERS_QUANTITY {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if addresses_overflow(address, quantity) {
            return self.send_exception(ExceptionCode::IllegalDataAddress);
        }

        let mut registers = [0u16; MAX_REGISTERS];
        let result = if is_holding {
            callbacks.read_holding_registers(address, quantity, &mut registers)
        } else {
            callbacks.read_input_registers(address, quantity, &mut registers)
        };
        if let Err(code) = result {
            return self.send_exception(code);
        }
        if self.msg.broadcast {
            return Ok(());
        }

        let byte_count = quantity as usize * 2;
        frame::send_header(&mut self.msg, self.transport, byte_count as u16 + 1);
        self.msg.buf.put_u8(byte_count as u8);
        for &value in &registers[..quantity as usize] {
            self.msg.buf.put_u16(value);
        }
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )
    }

    fn handle_write_single_coil<C: ServerCallbacks>(
        &mut self,
        callbacks: &mut C,
    ) -> Result<(), ModbusError> {
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let address = self.msg.buf.get_u16();
        let value = self.msg.buf.get_u16();
        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;

        if self.msg.ignored {
            return Ok(());
        }
        if value != COIL_OFF && value != COIL_ON {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if let Err(code) = callbacks.write_single_coil(address, value == COIL_ON) {
            return self.send_exception(code);
        }
        if self.msg.broadcast {
            return Ok(());
        }

        frame::send_header(&mut self.msg, self.transport, 4);
        self.msg.buf.put_u16(address);
        self.msg.buf.put_u16(value);
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )
    }

    fn handle_write_single_register<C: ServerCallbacks>(
        &mut self,
        callbacks: &mut C,
    ) -> Result<(), ModbusError> {
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let address = self.msg.buf.get_u16();
        let value = self.msg.buf.get_u16();
        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;

        if self.msg.ignored {
            return Ok(());
        }
        if let Err(code) = callbacks.write_single_register(address, value) {
            return self.send_exception(code);
        }
        if self.msg.broadcast {
            return Ok(());
        }

        frame::send_header(&mut self.msg, self.transport, 4);
        self.msg.buf.put_u16(address);
        self.msg.buf.put_u16(value);
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )
    }

    fn handle_write_multiple_coils<C: ServerCallbacks>(
        &mut self,
        callbacks: &mut C,
    ) -> Result<(), ModbusError> {
        frame::recv_bytes(&mut self.platform, &mut self.msg, 5, self.byte_timeout_ms)?;
        let address = self.msg.buf.get_u16();
        let quantity = self.msg.buf.get_u16();
        let byte_count = self.msg.buf.get_u8() as usize;

        checked_remaining_capacity(&self.msg, byte_count)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, byte_count, self.byte_timeout_ms)?;
        let mut values = Bitfield::new();
        let stored = byte_count.min(BITFIELD_LEN);
        self.msg
            .buf
            .get_bytes(&mut values.as_bytes_mut()[..stored], stored);
        let mut discard = [0u8; 1];
        for _ in stored..byte_count {
            self.msg.buf.get_bytes(&mut discard, 1);
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;

        if self.msg.ignored {
            return Ok(());
        }
        // Order matches the reference handler exactly: quantity range,
        // then address range, then the two byte-count checks.
        if quantity == 0 || quantity > MAX_WRITE_BITS_QUANTITY {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if addresses_overflow(address, quantity) {
            return self.send_exception(ExceptionCode::IllegalDataAddress);
        }
        if byte_count == 0 {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if (quantity as usize / 8) + 1 != byte_count {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }

        if let Err(code) = callbacks.write_multiple_coils(address, quantity, &values) {
            return self.send_exception(code);
        }
        if self.msg.broadcast {
            return Ok(());
        }

        frame::send_header(&mut self.msg, self.transport, 4);
        self.msg.buf.put_u16(address);
        self.msg.buf.put_u16(quantity);
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )
    }

    fn handle_write_multiple_registers<C: ServerCallbacks>(
        &mut self,
        callbacks: &mut C,
    ) -> Result<(), ModbusError> {
        frame::recv_bytes(&mut self.platform, &mut self.msg, 5, self.byte_timeout_ms)?;
        let address = self.msg.buf.get_u16();
        let quantity = self.msg.buf.get_u16();
        let byte_count = self.msg.buf.get_u8() as usize;

        checked_remaining_capacity(&self.msg, byte_count)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, byte_count, self.byte_timeout_ms)?;
        let mut registers = [0u16; MAX_REGISTERS];
        let count = (byte_count / 2).min(MAX_REGISTERS);
        for slot in registers.iter_mut().take(count) {
            *slot = self.msg.buf.get_u16();
        }
        if byte_count % 2 != 0 {
            let mut discard = [0u8; 1];
            self.msg.buf.get_bytes(&mut discard, 1);
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;

        if self.msg.ignored {
            return Ok(());
        }
        if quantity == 0 || quantity > MAX_WRITE_REGISTERS_QUANTITY {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if addresses_overflow(address, quantity) {
            return self.send_exception(ExceptionCode::IllegalDataAddress);
        }
        if byte_count == 0 {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }
        if byte_count != quantity as usize * 2 {
            return self.send_exception(ExceptionCode::IllegalDataValue);
        }

        if let Err(code) = callbacks.write_multiple_registers(address, quantity, &registers) {
            return self.send_exception(code);
        }
        if self.msg.broadcast {
            return Ok(());
        }

        frame::send_header(&mut self.msg, self.transport, 4);
        self.msg.buf.put_u16(address);
        self.msg.buf.put_u16(quantity);
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )
    }
}
