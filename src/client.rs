//! Client-side (PC) calls: one method per function code, plus a raw
//! PDU escape hatch for function codes this crate doesn't model.

use crate::bitfield::{packed_byte_count, Bitfield};
use crate::codec::Cursor;
use crate::consts::{
    BITFIELD_LEN, COIL_OFF, COIL_ON, EXCEPTION_FC_MASK, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_REGISTERS,
    MAX_READ_BITS_QUANTITY, MAX_READ_REGISTERS_QUANTITY, MAX_WRITE_BITS_QUANTITY,
    MAX_WRITE_REGISTERS_QUANTITY,
};
use crate::engine::{addresses_overflow, Engine};
use crate::error::ModbusError;
use crate::frame::{self, checked_remaining_capacity};
use crate::platform::{Platform, Transport};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

impl<P: Platform> Engine<P> {
    /// Sends a request: prepares the common header fields, lets
    /// `write_pdu` append the function-specific payload, then appends
    /// the footer and transmits. Returns `true` if the caller should
    /// skip reading a response (RTU broadcast).
    fn do_transaction(
        &mut self,
        fc: u8,
        data_len: u16,
        write_pdu: impl FnOnce(&mut Cursor),
    ) -> Result<bool, ModbusError> {
        self.prepare_request(fc);
        frame::send_header(&mut self.msg, self.transport, data_len);
        write_pdu(&mut self.msg.buf);
        frame::send_footer(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_spacing_ms,
        )?;

        #[cfg(feature = "tracing")]
        trace!(fc, unit_id = self.msg.unit_id, broadcast = self.msg.broadcast, "sent request");

        Ok(self.msg.broadcast)
    }

    /// Receives a response header and checks it against the request
    /// that's still sitting in `self.msg` (transaction id on TCP, unit
    /// id always). Resolves an exception response into `Err`.
    fn recv_response_header(&mut self, request_fc: u8) -> Result<(), ModbusError> {
        let expected_tid = self.msg.transaction_id;
        let expected_unit = self.msg.unit_id;
        let mut first_byte_received = false;

        frame::recv_header(
            &mut self.platform,
            &mut self.msg,
            self.read_timeout_ms,
            self.byte_timeout_ms,
            &mut first_byte_received,
        )?;

        if self.transport == Transport::Tcp && self.msg.transaction_id != expected_tid {
            return Err(ModbusError::InvalidResponse("transaction id mismatch"));
        }
        if self.msg.unit_id != expected_unit {
            return Err(ModbusError::InvalidResponse("unit id mismatch"));
        }

        if self.msg.fc == (request_fc | EXCEPTION_FC_MASK) {
            frame::recv_bytes(&mut self.platform, &mut self.msg, 1, self.byte_timeout_ms)?;
            let code = self.msg.buf.get_u8();
            frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;
            return Err(ModbusError::from(code));
        }

        if self.msg.fc != request_fc {
            return Err(ModbusError::InvalidResponse("function code mismatch"));
        }

        #[cfg(feature = "tracing")]
        debug!(fc = self.msg.fc, "received response");

        Ok(())
    }

    fn read_bits(
        &mut self,
        fc: u8,
        address: u16,
        quantity: u16,
        out: &mut Bitfield,
    ) -> Result<(), ModbusError> {
        if quantity == 0 || quantity > MAX_READ_BITS_QUANTITY {
            return Err(ModbusError::InvalidArgument("quantity out of range"));
        }
        if addresses_overflow(address, quantity) {
            return Err(ModbusError::InvalidArgument("address range out of bounds"));
        }

        let broadcast = self.do_transaction(fc, 4, |buf| {
            buf.put_u16(address);
            buf.put_u16(quantity);
        })?;
        if broadcast {
            return Ok(());
        }

        self.recv_response_header(fc)?;

        frame::recv_bytes(&mut self.platform, &mut self.msg, 1, self.byte_timeout_ms)?;
        let byte_count = self.msg.buf.get_u8() as usize;
        checked_remaining_capacity(&self.msg, byte_count)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, byte_count, self.byte_timeout_ms)?;

        // The 2000-bit legal maximum can carry a byte count one past
        // `Bitfield`'s capacity (see DESIGN.md O4); copy what fits and
        // drain the rest off the wire without storing it.
        let stored = byte_count.min(BITFIELD_LEN);
        self.msg
            .buf
            .get_bytes(&mut out.as_bytes_mut()[..stored], stored);
        let mut discard = [0u8; 1];
        for _ in stored..byte_count {
            self.msg.buf.get_bytes(&mut discard, 1);
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)
    }

    fn read_words(
        &mut self,
        fc: u8,
        address: u16,
        quantity: u16,
        out: &mut [u16; MAX_REGISTERS],
    ) -> Result<(), ModbusError> {
        if quantity == 0 || quantity > MAX_READ_REGISTERS_QUANTITY {
            return Err(ModbusError::InvalidArgument("quantity out of range"));
        }
        if addresses_overflow(address, quantity) {
            return Err(ModbusError::InvalidArgument("address range out of bounds"));
        }

        let broadcast = self.do_transaction(fc, 4, |buf| {
            buf.put_u16(address);
            buf.put_u16(quantity);
        })?;
        if broadcast {
            return Ok(());
        }

        self.recv_response_header(fc)?;

        frame::recv_bytes(&mut self.platform, &mut self.msg, 1, self.byte_timeout_ms)?;
        let byte_count = self.msg.buf.get_u8() as usize;
        checked_remaining_capacity(&self.msg, byte_count)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, byte_count, self.byte_timeout_ms)?;

        let count = (byte_count / 2).min(MAX_REGISTERS);
        for slot in out.iter_mut().take(count) {
            *slot = self.msg.buf.get_u16();
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)
    }

    pub fn read_coils(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut Bitfield,
    ) -> Result<(), ModbusError> {
        self.read_bits(FC_READ_COILS, address, quantity, out)
    }

    pub fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut Bitfield,
    ) -> Result<(), ModbusError> {
        self.read_bits(FC_READ_DISCRETE_INPUTS, address, quantity, out)
    }

    pub fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut [u16; MAX_REGISTERS],
    ) -> Result<(), ModbusError> {
        self.read_words(FC_READ_HOLDING_REGISTERS, address, quantity, out)
    }

    pub fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut [u16; MAX_REGISTERS],
    ) -> Result<(), ModbusError> {
        self.read_words(FC_READ_INPUT_REGISTERS, address, quantity, out)
    }

    pub fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), ModbusError> {
        let coil_value = if value { COIL_ON } else { COIL_OFF };
        let broadcast = self.do_transaction(FC_WRITE_SINGLE_COIL, 4, |buf| {
            buf.put_u16(address);
            buf.put_u16(coil_value);
        })?;
        if broadcast {
            return Ok(());
        }

        self.recv_response_header(FC_WRITE_SINGLE_COIL)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let echoed_address = self.msg.buf.get_u16();
        let echoed_value = self.msg.buf.get_u16();
        if echoed_address != address || echoed_value != coil_value {
            return Err(ModbusError::InvalidResponse("echoed coil write mismatch"));
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)
    }

    pub fn write_single_register(&mut self, address: u16, value: u16) -> Result<(), ModbusError> {
        let broadcast = self.do_transaction(FC_WRITE_SINGLE_REGISTER, 4, |buf| {
            buf.put_u16(address);
            buf.put_u16(value);
        })?;
        if broadcast {
            return Ok(());
        }

        self.recv_response_header(FC_WRITE_SINGLE_REGISTER)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let echoed_address = self.msg.buf.get_u16();
        let echoed_value = self.msg.buf.get_u16();
        if echoed_address != address || echoed_value != value {
            return Err(ModbusError::InvalidResponse(
                "echoed register write mismatch",
            ));
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)
    }

    pub fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        values: &Bitfield,
    ) -> Result<(), ModbusError> {
        if quantity == 0 || quantity > MAX_WRITE_BITS_QUANTITY {
            return Err(ModbusError::InvalidArgument("quantity out of range"));
        }
        if addresses_overflow(address, quantity) {
            return Err(ModbusError::InvalidArgument("address range out of bounds"));
        }
        let byte_count = packed_byte_count(quantity).min(BITFIELD_LEN);

        let broadcast = self.do_transaction(
            FC_WRITE_MULTIPLE_COILS,
            (5 + byte_count) as u16,
            |buf| {
                buf.put_u16(address);
                buf.put_u16(quantity);
                buf.put_u8(byte_count as u8);
                buf.put_bytes(&values.as_bytes()[..byte_count]);
            },
        )?;
        if broadcast {
            return Ok(());
        }

        self.recv_response_header(FC_WRITE_MULTIPLE_COILS)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let echoed_address = self.msg.buf.get_u16();
        let echoed_quantity = self.msg.buf.get_u16();
        if echoed_address != address || echoed_quantity != quantity {
            return Err(ModbusError::InvalidResponse(
                "echoed multiple-coil write mismatch",
            ));
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)
    }

    pub fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        values: &[u16; MAX_REGISTERS],
    ) -> Result<(), ModbusError> {
        if quantity == 0 || quantity > MAX_WRITE_REGISTERS_QUANTITY {
            return Err(ModbusError::InvalidArgument("quantity out of range"));
        }
        if addresses_overflow(address, quantity) {
            return Err(ModbusError::InvalidArgument("address range out of bounds"));
        }
        let count = quantity as usize;
        let byte_count = count * 2;

        let broadcast = self.do_transaction(
            FC_WRITE_MULTIPLE_REGISTERS,
            (5 + byte_count) as u16,
            |buf| {
                buf.put_u16(address);
                buf.put_u16(quantity);
                buf.put_u8(byte_count as u8);
                for &value in &values[..count] {
                    buf.put_u16(value);
                }
            },
        )?;
        if broadcast {
            return Ok(());
        }

        self.recv_response_header(FC_WRITE_MULTIPLE_REGISTERS)?;
        frame::recv_bytes(&mut self.platform, &mut self.msg, 4, self.byte_timeout_ms)?;
        let echoed_address = self.msg.buf.get_u16();
        let echoed_quantity = self.msg.buf.get_u16();
        if echoed_address != address || echoed_quantity != quantity {
            return Err(ModbusError::InvalidResponse(
                "echoed multiple-register write mismatch",
            ));
        }

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)
    }

    /// Sends an arbitrary PDU under `fc` without any of this crate's
    /// own validation or response parsing. Returns `true` if a
    /// response should be awaited with [`Engine::receive_raw_pdu_response`].
    pub fn send_raw_pdu(&mut self, fc: u8, pdu: &[u8]) -> Result<bool, ModbusError> {
        let broadcast = self.do_transaction(fc, pdu.len() as u16, |buf| buf.put_bytes(pdu))?;
        Ok(!broadcast)
    }

    /// Receives the response to a prior [`Engine::send_raw_pdu`] call,
    /// copying its payload (after the function code, before the
    /// footer) into `out`. Returns the number of bytes written.
    ///
    /// An exception response still surfaces as `Err(ModbusError::Exception)`.
    pub fn receive_raw_pdu_response(&mut self, out: &mut [u8]) -> Result<usize, ModbusError> {
        let request_fc = self.msg.fc;
        self.recv_response_header(request_fc)?;

        let n = out.len().min(self.msg.buf.capacity() - self.msg.buf.position());
        frame::recv_bytes(&mut self.platform, &mut self.msg, n, self.byte_timeout_ms)?;
        self.msg.buf.get_bytes(out, n);

        frame::recv_footer(&mut self.platform, &mut self.msg, self.byte_timeout_ms)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;

    fn rtu_client(inbound: &[u8]) -> Engine<MockPlatform> {
        let platform = MockPlatform::with_inbound(Transport::Rtu, inbound);
        let mut engine = Engine::client_create(platform);
        engine.set_destination_rtu_address(0x11);
        engine
    }

    #[test]
    fn read_holding_registers_parses_known_response() {
        // Response to "11 03 00 6B 00 03": 3 registers, AE41 5652 4340.
        let response = [
            0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x49, 0xAD,
        ];
        let mut engine = rtu_client(&response);
        let mut out = [0u16; MAX_REGISTERS];

        engine
            .read_holding_registers(0x006B, 3, &mut out)
            .unwrap();

        assert_eq!(&out[..3], &[0xAE41, 0x5652, 0x4340]);
    }

    #[test]
    fn read_holding_registers_rejects_zero_quantity() {
        let mut engine = rtu_client(&[]);
        let mut out = [0u16; MAX_REGISTERS];
        let err = engine.read_holding_registers(0, 0, &mut out).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument(_)));
    }

    #[test]
    fn exception_response_surfaces_as_exception_error() {
        // fc | 0x80, exception code 2 (illegal data address), plus CRC.
        let response = [0x11, 0x83, 0x02, 0xC1, 0x34];
        let mut engine = rtu_client(&response);
        let mut out = [0u16; MAX_REGISTERS];

        let err = engine
            .read_holding_registers(0x006B, 3, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Exception(crate::error::ExceptionCode::IllegalDataAddress)
        ));
    }

    #[test]
    fn write_single_coil_validates_echo() {
        let response = [0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00, 0x4E, 0x8B];
        let mut engine = rtu_client(&response);
        engine.write_single_coil(0x00AC, true).unwrap();
    }

    #[test]
    fn broadcast_write_skips_response_wait() {
        let mut engine = rtu_client(&[]);
        engine.set_destination_rtu_address(0);
        engine.write_single_coil(0x00AC, true).unwrap();
    }

    #[test]
    fn read_holding_registers_rejects_address_overflow() {
        let mut engine = rtu_client(&[]);
        let mut out = [0u16; MAX_REGISTERS];
        let err = engine
            .read_holding_registers(0xFFF0, 0x20, &mut out)
            .unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument(_)));
    }

    #[test]
    fn write_multiple_coils_rejects_address_overflow() {
        let mut engine = rtu_client(&[]);
        let values = Bitfield::new();
        let err = engine
            .write_multiple_coils(0xFFF0, 0x20, &values)
            .unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument(_)));
    }

    #[test]
    fn write_multiple_coils_uses_quantity_div_8_plus_1_byte_count() {
        // quantity = 8 is a multiple of 8: the ceiling-division convention
        // would send byte_count = 1, but this crate's own server (and
        // every other FC1/2/15 path here) expects quantity/8 + 1 = 2.
        let mut engine = rtu_client(&[]);
        engine.set_destination_rtu_address(0);
        let values = Bitfield::new();
        engine.write_multiple_coils(0x0000, 8, &values).unwrap();

        // unit_id, fc, addr_hi, addr_lo, qty_hi, qty_lo, byte_count, ...
        assert_eq!(engine.platform.outbound[6], 2);
    }

    #[test]
    fn read_holding_registers_rejects_byte_count_past_buffer_capacity() {
        // TCP header parsing leaves the cursor a handful of bytes into
        // the 260-byte buffer; a byte_count this large would otherwise
        // index `Cursor::fill_ahead` past the end of it.
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x11, 0x03, 0xFC];
        let platform = MockPlatform::with_inbound(Transport::Tcp, &response);
        let mut engine = Engine::client_create(platform);
        engine.set_destination_rtu_address(0x11);

        let mut out = [0u16; MAX_REGISTERS];
        let err = engine
            .read_holding_registers(0x006B, 3, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Transport(crate::error::TransportError::FrameTooLarge { .. })
        ));
    }
}
