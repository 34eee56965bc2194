//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN identifier
//! construction, frame decoding, session admission).
use thiserror_no_std::Error;

#[derive(Error, Debug)]
/// Errors that can occur while building a 29-bit CAN identifier.
pub enum CanIdBuildError {
    /// Provided parameters do not produce a valid identifier.
    #[error("Invalid data")]
    InvalidData,
    /// The destination address violates protocol constraints.
    #[error("Invalid destination")]
    InvalidDestination,
    /// Attempt to build a broadcast message (PDU2) with PF too low.
    #[error("Invalid for broadcast message: PF is too low")]
    InvalidForBroadcast,
    /// Attempt to send an addressed message (PDU1) with PF too high.
    #[error("Invalid for addressed message: PF is too high: {pgn}")]
    InvalidForFocusedMessage { pgn: u8 },
    /// In PDU1 the lower 8 bits of the PGN must remain zero.
    #[error("PDU1 PGNs require PS = 0")]
    PsFocusMessageMustBeNull,
    /// No payload available to build the frame.
    #[error("Payload is empty: unable to build")]
    EmptyPayload,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Failures encountered while decoding an inbound TP.CM payload. PDU-Format
/// routing (TP.CM vs. TP.DT vs. anything else) happens in `Engine::on_frame`
/// before a payload ever reaches the codec, and TP.CM/TP.DT frames are
/// always exactly 8 bytes by construction, so this enum only needs to
/// cover what the codec itself can reject.
pub enum FrameDecodeError {
    /// TP.CM control byte (offset 0) does not match BAM/RTS/CTS/EoMA/Abort.
    #[error("Unknown TP.CM control byte: {control_byte}")]
    UnknownControlByte { control_byte: u8 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of `Engine::send`.
pub enum SendError {
    /// A session with this peer (in this direction) already exists.
    #[error("A TP session with this peer is already active")]
    Busy,
    /// Requested payload exceeds `MAX_MESSAGE_LEN` (1785 bytes).
    #[error("Message too large for Transport Protocol ({len} > {max})")]
    TooLarge { len: usize, max: usize },
    /// Requested payload is below `MIN_MESSAGE_LEN` (9 bytes); use a single frame instead.
    #[error("Message too small for Transport Protocol ({len} < {min}); send a single frame")]
    TooSmall { len: usize, min: usize },
    /// Session Table (or its buffer pool) has no free slot.
    #[error("No session resources available")]
    NoResources,
    /// The CAN identifier for this transfer could not be constructed.
    #[error("Frame build failed: {0:?}")]
    Build(CanIdBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Internal admission result for the Session Table (spec.md §4.2).
pub enum TableError {
    /// A session already occupies the (peer, role) slot (I1).
    Busy,
    /// The table has reached `MAX_SESSIONS`.
    NoResources,
}
