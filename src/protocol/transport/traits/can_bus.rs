//! Abstraction over the CAN controller driver (out of scope per the engine's
//! purpose: the engine only ever enqueues/decodes already-framed 8-byte
//! payloads, never touches silicon).
use crate::protocol::transport::can_frame::CanFrame;

/// Outcome of a non-blocking transmit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// The frame was accepted by the driver's TX queue.
    Sent,
    /// The driver's TX queue is full; the caller should retry shortly.
    Busy,
}

/// Contract the engine uses to hand frames to the underlying CAN controller.
///
/// Implementations **must not block**: `try_send` is called from the
/// engine's single logical context (`on_frame`/`send`/`poll`) and a blocking
/// implementation would stall the whole cooperative loop.
pub trait CanDriver {
    type Error: core::fmt::Debug;

    /// Attempt to enqueue `frame` for transmission. Non-blocking.
    fn try_send(&mut self, frame: &CanFrame) -> Result<TxOutcome, Self::Error>;
}
