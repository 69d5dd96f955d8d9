//! `Engine<P>`: construction, timeouts, and the transaction-id
//! generator shared by both the client and server call surfaces.

use crate::error::ModbusError;
use crate::message::Message;
use crate::platform::{Platform, Transport};

/// One protocol engine, usable as either a client or a server
/// depending on which constructor built it.
///
/// Not `Sync`: an engine must never be driven by more than one caller
/// at a time (see the crate-level docs). Concurrent access needs one
/// engine per connection plus external synchronization, exactly as
/// the original C implementation requires one `mbsn_t` per connection.
#[derive(Debug)]
pub struct Engine<P: Platform> {
    pub(crate) transport: Transport,
    pub(crate) platform: P,
    pub(crate) address_rtu: u8,
    pub(crate) dest_address_rtu: u8,
    pub(crate) read_timeout_ms: i32,
    pub(crate) byte_timeout_ms: i32,
    pub(crate) byte_spacing_ms: u32,
    pub(crate) current_tid: u16,
    pub(crate) msg: Message,
}

/// `address + quantity` overflowing the 16-bit address space. Shared
/// by every client call and server handler that takes an
/// address/quantity pair, since both sides must reject the same
/// out-of-range requests.
pub(crate) fn addresses_overflow(address: u16, quantity: u16) -> bool {
    address as u32 + quantity as u32 > 0x1_0000
}

impl<P: Platform> Engine<P> {
    fn new(platform: P) -> Self {
        let transport = platform.transport();
        Self {
            transport,
            platform,
            address_rtu: 0,
            dest_address_rtu: 0,
            read_timeout_ms: -1,
            byte_timeout_ms: -1,
            byte_spacing_ms: 0,
            current_tid: 0,
            msg: Message::new(),
        }
    }

    /// Builds a client-role engine. There is no longer a way to pass
    /// an unrecognized transport or a missing byte-I/O hook — both are
    /// ruled out at compile time by `Transport` being a closed enum
    /// and `Platform` being a trait the caller must fully implement —
    /// so the only remaining runtime-validated precondition from the
    /// original constructor contract doesn't apply to the client role.
    pub fn client_create(platform: P) -> Self {
        Self::new(platform)
    }

    /// Builds a server-role engine bound to `address_rtu`.
    ///
    /// Fails with `InvalidArgument` if the platform is wired for RTU
    /// and `address_rtu == 0`, since 0 is the broadcast address and
    /// cannot double as a server's own identity.
    pub fn server_create(address_rtu: u8, platform: P) -> Result<Self, ModbusError> {
        if platform.transport() == Transport::Rtu && address_rtu == 0 {
            return Err(ModbusError::InvalidArgument(
                "RTU server address must be nonzero",
            ));
        }

        let mut engine = Self::new(platform);
        engine.address_rtu = address_rtu;
        Ok(engine)
    }

    pub fn set_read_timeout_ms(&mut self, timeout_ms: i32) -> &mut Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    pub fn set_byte_timeout_ms(&mut self, timeout_ms: i32) -> &mut Self {
        self.byte_timeout_ms = timeout_ms;
        self
    }

    pub fn set_byte_spacing_ms(&mut self, spacing_ms: u32) -> &mut Self {
        self.byte_spacing_ms = spacing_ms;
        self
    }

    /// Sets the destination RTU unit id used by subsequent client
    /// calls (0 = broadcast). Irrelevant on TCP.
    pub fn set_destination_rtu_address(&mut self, address: u8) -> &mut Self {
        self.dest_address_rtu = address;
        self
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Advances and returns the next transaction id, wrapping from
    /// `0xFFFF` to `1` so it never takes the value `0`.
    pub(crate) fn next_transaction_id(&mut self) -> u16 {
        self.current_tid = if self.current_tid == u16::MAX {
            1
        } else {
            self.current_tid + 1
        };
        self.current_tid
    }

    /// Resets `msg` and fills in the fields common to every client
    /// request: fresh transaction id, destination unit id, function
    /// code, and the broadcast flag.
    pub(crate) fn prepare_request(&mut self, fc: u8) {
        let tid = self.next_transaction_id();
        self.msg.reset();
        self.msg.unit_id = self.dest_address_rtu;
        self.msg.fc = fc;
        self.msg.transaction_id = tid;
        self.msg.broadcast = self.dest_address_rtu == 0 && self.transport == Transport::Rtu;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;

    #[test]
    fn server_create_rejects_rtu_broadcast_address() {
        let platform = MockPlatform::new(Transport::Rtu);
        let err = Engine::server_create(0, platform).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument(_)));
    }

    #[test]
    fn server_create_allows_tcp_unit_id_zero() {
        let platform = MockPlatform::new(Transport::Tcp);
        assert!(Engine::server_create(0, platform).is_ok());
    }

    #[test]
    fn transaction_id_wraps_from_max_to_one_and_skips_zero() {
        let platform = MockPlatform::new(Transport::Tcp);
        let mut engine = Engine::client_create(platform);
        engine.current_tid = u16::MAX;
        assert_eq!(engine.next_transaction_id(), 1);
        assert_eq!(engine.next_transaction_id(), 2);
    }

    #[test]
    fn first_transaction_id_from_zero_is_one() {
        let platform = MockPlatform::new(Transport::Tcp);
        let mut engine = Engine::client_create(platform);
        assert_eq!(engine.next_transaction_id(), 1);
    }
}

/// End-to-end wire scenarios, one per case called out in SPEC_FULL.md
/// §8. Each drives a client `Engine` against a server `Engine` by
/// piping one's outbound bytes into the other's inbound queue.
#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::bitfield::Bitfield;
    use crate::callbacks::{CallbackResult, ServerCallbacks};
    use crate::consts::MAX_REGISTERS;
    use crate::error::ExceptionCode;
    use crate::platform::mock::MockPlatform;

    /// Routes this run's `tracing` events through `tracing-subscriber`
    /// so the send/receive/dispatch instrumentation actually executes
    /// under test instead of only type-checking. Safe to call from
    /// every test in this module; only the first call installs anything.
    #[cfg(feature = "tracing")]
    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    struct FixedRegisters([u16; MAX_REGISTERS]);

    impl ServerCallbacks for FixedRegisters {
        fn read_holding_registers(
            &mut self,
            address: u16,
            quantity: u16,
            out: &mut [u16; MAX_REGISTERS],
        ) -> CallbackResult {
            let start = address as usize;
            out[..quantity as usize].copy_from_slice(&self.0[start..start + quantity as usize]);
            Ok(())
        }

        fn write_single_register(&mut self, address: u16, value: u16) -> CallbackResult {
            self.0[address as usize] = value;
            Ok(())
        }

        fn write_single_coil(&mut self, _address: u16, _value: bool) -> CallbackResult {
            Err(ExceptionCode::IllegalDataAddress)
        }

        fn read_coils(
            &mut self,
            _address: u16,
            _quantity: u16,
            out: &mut Bitfield,
        ) -> CallbackResult {
            out.as_bytes_mut()[0] = 0b0101_0101;
            Ok(())
        }
    }

    fn relay(client_outbound: Vec<u8>, server_address: u8) -> Vec<u8> {
        let server_platform = MockPlatform::with_inbound(Transport::Rtu, &client_outbound);
        let mut server = Engine::server_create(server_address, server_platform).unwrap();
        let mut data = FixedRegisters([0u16; MAX_REGISTERS]);
        data.0[0x6B] = 0xAE41;
        data.0[0x6C] = 0x5652;
        data.0[0x6D] = 0x4340;
        server.poll(&mut data).unwrap();
        server.platform.outbound
    }

    #[test]
    fn s1_fc3_rtu_success() {
        #[cfg(feature = "tracing")]
        init_tracing();

        // Known-good request for "read 3 holding registers starting at 0x006B
        // from unit 0x11" (same fixture as codec.rs's CRC tests).
        let request = vec![0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87];

        let response = relay(request.clone(), 0x11);
        assert_eq!(
            response,
            vec![0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x49, 0xAD]
        );

        let mut client = Engine::client_create(MockPlatform::with_inbound(Transport::Rtu, &response));
        client.set_destination_rtu_address(0x11);
        let mut registers = [0u16; MAX_REGISTERS];
        client
            .read_holding_registers(0x006B, 3, &mut registers)
            .unwrap();
        assert_eq!(&registers[..3], &[0xAE41, 0x5652, 0x4340]);
        assert_eq!(client.platform.outbound, request);
    }

    #[test]
    fn s3_fc5_rtu_exception_illegal_data_address() {
        let mut client = Engine::client_create(MockPlatform::new(Transport::Rtu));
        client.set_destination_rtu_address(0x11);
        // Exact exception-response CRC recomputed with the verified
        // CRC-16/MODBUS implementation; spec.md's illustrative bytes
        // for this step were approximate.
        let response = [0x11, 0x85, 0x02, 0xC2, 0x94];
        client.platform.push_inbound(&response);

        let err = client.write_single_coil(0x0000, true).unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Exception(ExceptionCode::IllegalDataAddress)
        ));
    }

    #[test]
    fn s4_fc1_quantity_eight_pads_one_extra_byte() {
        let response = [0x11, 0x01, 0x02, 0x55, 0x00, 0x47, 0x6F];
        let mut client = Engine::client_create(MockPlatform::new(Transport::Rtu));
        client.set_destination_rtu_address(0x11);
        client.platform.push_inbound(&response);

        let mut coils = Bitfield::new();
        client.read_coils(0, 8, &mut coils).unwrap();
        assert_eq!(coils.as_bytes()[0], 0x55);
        assert_eq!(coils.as_bytes()[1], 0x00);
    }

    #[test]
    fn s5_rtu_frame_addressed_to_other_unit_is_ignored() {
        #[cfg(feature = "tracing")]
        init_tracing();

        // Own address 0x11, frame addressed to 0x22.
        let request = [0x22, 0x01, 0x00, 0x00, 0x00, 0x08, 0x3A, 0x9F];
        let platform = MockPlatform::with_inbound(Transport::Rtu, &request);
        let mut server = Engine::server_create(0x11, platform).unwrap();
        let mut data = FixedRegisters([0u16; MAX_REGISTERS]);

        server.poll(&mut data).unwrap();
        assert!(server.platform.outbound.is_empty());
    }

    #[test]
    fn s6_tcp_response_with_mismatched_transaction_id_is_rejected() {
        let mut client = Engine::client_create(MockPlatform::new(Transport::Tcp));
        // Response carries tid 6 while the request (built below) uses tid 5.
        let response = [0x00, 0x06, 0x00, 0x00, 0x00, 0x06, 0x11, 0x06, 0x00, 0x01, 0x00, 0x03];
        client.current_tid = 4; // so the upcoming call's tid is 5
        client.platform.push_inbound(&response);

        let err = client.write_single_register(0x0001, 0x0003).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidResponse(_)));
    }
}
