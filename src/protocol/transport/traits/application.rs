//! Abstraction over the application-level PGN handlers (out of scope: the
//! engine reassembles bytes, it never interprets them). A successful
//! reassembly is handed off exactly once, by move, never referenced again.

/// Sink for a fully reassembled multi-packet message.
pub trait Application {
    /// Called once per completed session (BAM or connection-mode), after
    /// the last Data Transfer packet has been placed into the session
    /// buffer and, for connection mode, the End-of-Message Acknowledgment
    /// has been queued.
    fn deliver(&mut self, pgn: u32, source_address: u8, bytes: &[u8]);
}
