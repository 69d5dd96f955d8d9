//! The in-flight message state: frame buffer, cursor, and the
//! per-transaction bookkeeping fields reset at the start of every
//! client call and every server `poll`.

use crate::codec::Cursor;

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub buf: Cursor,
    pub unit_id: u8,
    pub fc: u8,
    pub transaction_id: u16,
    pub broadcast: bool,
    pub ignored: bool,
}

impl Message {
    pub const fn new() -> Self {
        Self {
            buf: Cursor::new(),
            unit_id: 0,
            fc: 0,
            transaction_id: 0,
            broadcast: false,
            ignored: false,
        }
    }

    /// Resets every field to a clean transaction state, matching
    /// `msg_state_reset` in the original.
    pub fn reset(&mut self) {
        self.buf.reset();
        self.unit_id = 0;
        self.fc = 0;
        self.transaction_id = 0;
        self.broadcast = false;
        self.ignored = false;
    }
}
