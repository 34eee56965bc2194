//! In-memory representation of a raw SAE J1939 CAN 2.0B frame.
use crate::protocol::transport::can_id::CanId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Raw CAN frame as read from, or about to be written to, the bus.
pub struct CanFrame {
    /// Full 29-bit extended CAN identifier.
    pub id: CanId,
    /// Payload buffer. TP.CM and TP.DT always occupy all eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code). Always 8 for TP frames.
    pub len: usize,
}

impl CanFrame {
    /// Construct a full 8-byte frame.
    pub const fn new(id: CanId, data: [u8; 8]) -> Self {
        Self { id, data, len: 8 }
    }
}
