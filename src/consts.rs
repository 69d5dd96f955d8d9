//! Protocol constants: function codes, quantity limits, buffer sizes.

/// Read Coils.
pub const FC_READ_COILS: u8 = 1;
/// Read Discrete Inputs.
pub const FC_READ_DISCRETE_INPUTS: u8 = 2;
/// Read Holding Registers.
pub const FC_READ_HOLDING_REGISTERS: u8 = 3;
/// Read Input Registers.
pub const FC_READ_INPUT_REGISTERS: u8 = 4;
/// Write Single Coil.
pub const FC_WRITE_SINGLE_COIL: u8 = 5;
/// Write Single Register.
pub const FC_WRITE_SINGLE_REGISTER: u8 = 6;
/// Write Multiple Coils.
pub const FC_WRITE_MULTIPLE_COILS: u8 = 15;
/// Write Multiple Registers.
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 16;

/// Set on a function code to mark an exception response.
pub const EXCEPTION_FC_MASK: u8 = 0x80;

/// RTU broadcast unit id.
pub const BROADCAST_ADDRESS: u8 = 0;

/// Frame buffer size, large enough for the largest PDU plus RTU/MBAP framing.
pub const FRAME_BUFFER_LEN: usize = 260;

/// Packed-bit buffer size, large enough for 2000 coils.
pub const BITFIELD_LEN: usize = 250;

/// Max registers in a single read (FC 3/4) or write-multiple (FC 16) request.
pub const MAX_REGISTERS: usize = 125;

/// Single-coil "on" wire value.
pub const COIL_ON: u16 = 0xFF00;
/// Single-coil "off" wire value.
pub const COIL_OFF: u16 = 0x0000;

/// Read coils/discrete inputs quantity bounds.
pub const MAX_READ_BITS_QUANTITY: u16 = 2000;
/// Read registers quantity bounds.
pub const MAX_READ_REGISTERS_QUANTITY: u16 = 125;
/// Write multiple coils quantity bound.
pub const MAX_WRITE_BITS_QUANTITY: u16 = 0x07B0;
/// Write multiple registers quantity bound.
pub const MAX_WRITE_REGISTERS_QUANTITY: u16 = 0x007B;
