//! Bit-exact encode/decode of TP.CM (PGN 0x00EC00) and TP.DT (PGN 0x00EB00)
//! 8-byte payloads. No session state lives here — this module only knows
//! how to turn typed records into wire bytes and back.
use crate::error::FrameDecodeError;

/// PGN of the Transport Protocol — Connection Management message.
pub const PGN_TP_CM: u32 = 0x00EC00;
/// PGN of the Transport Protocol — Data Transfer message.
pub const PGN_TP_DT: u32 = 0x00EB00;

const CB_RTS: u8 = 16;
const CB_CTS: u8 = 17;
const CB_EOMA: u8 = 19;
const CB_BAM: u8 = 32;
const CB_ABORT: u8 = 255;

const RESERVED: u8 = 0xFF;

/// Abort reason wire value (spec.md §6). Stored as a raw byte so that
/// reserved/SAE-assigned values (5-8) and vendor-specific values round-trip
/// even though this engine only ever emits a handful of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortReason(pub u8);

impl AbortReason {
    /// Already in a TP session; cannot support another.
    pub const ALREADY_IN_SESSION: AbortReason = AbortReason(1);
    /// System resources were needed for another task.
    pub const RESOURCES_NEEDED: AbortReason = AbortReason(2);
    /// Timeout.
    pub const TIMEOUT: AbortReason = AbortReason(3);
    /// CTS received while a DT burst was still in progress.
    pub const CTS_WHILE_DT_IN_PROGRESS: AbortReason = AbortReason(4);
    /// Total message size exceeds 1785 bytes.
    pub const TOO_LARGE: AbortReason = AbortReason(9);
    /// Implementation-specific: memory allocation failure.
    pub const MEMORY_FAILURE: AbortReason = AbortReason(250);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpCmBam {
    pub pgn: u32,
    pub size: u16,
    pub total_packets: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpCmRts {
    pub pgn: u32,
    pub size: u16,
    pub total_packets: u8,
    /// `0xFF` means "no limit" per spec.md §4.1.
    pub max_per_cts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpCmCts {
    pub pgn: u32,
    pub num_packets_next: u8,
    pub next_packet: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpCmEoma {
    pub pgn: u32,
    pub size: u16,
    pub total_packets: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpCmAbort {
    pub pgn: u32,
    pub reason: AbortReason,
}

/// A decoded TP.CM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpCm {
    Bam(TpCmBam),
    Rts(TpCmRts),
    Cts(TpCmCts),
    Eoma(TpCmEoma),
    Abort(TpCmAbort),
}

/// A decoded TP.DT payload: a sequence number and seven data bytes
/// (0xFF-padded by the sender on the final packet of a message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpDt {
    pub sequence: u8,
    pub data: [u8; 7],
}

fn pgn_to_le_bytes(pgn: u32) -> [u8; 3] {
    [(pgn & 0xFF) as u8, ((pgn >> 8) & 0xFF) as u8, ((pgn >> 16) & 0xFF) as u8]
}

fn pgn_from_le_bytes(lsb: u8, mid: u8, msb: u8) -> u32 {
    ((msb as u32) << 16) | ((mid as u32) << 8) | lsb as u32
}

#[cfg(feature = "defmt")]
fn warn_reserved(field: &str, byte: u8) {
    if byte != RESERVED {
        defmt::warn!("TP.CM reserved {} expected 0xFF, got {=u8}", field, byte);
    }
}

#[cfg(not(feature = "defmt"))]
#[inline]
fn warn_reserved(_field: &str, _byte: u8) {}

/// Decode a TP.CM payload. Rejects unknown control bytes; reserved bytes
/// that should be `0xFF` but are not are accepted with a warning log
/// (spec.md §4.1).
pub fn decode_cm(payload: &[u8; 8]) -> Result<TpCm, FrameDecodeError> {
    let control_byte = payload[0];
    let pgn = pgn_from_le_bytes(payload[5], payload[6], payload[7]);

    match control_byte {
        CB_BAM => {
            warn_reserved("byte 4", payload[4]);
            Ok(TpCm::Bam(TpCmBam {
                pgn,
                size: u16::from_le_bytes([payload[1], payload[2]]),
                total_packets: payload[3],
            }))
        }
        CB_RTS => Ok(TpCm::Rts(TpCmRts {
            pgn,
            size: u16::from_le_bytes([payload[1], payload[2]]),
            total_packets: payload[3],
            max_per_cts: payload[4],
        })),
        CB_CTS => {
            warn_reserved("byte 3", payload[3]);
            warn_reserved("byte 4", payload[4]);
            Ok(TpCm::Cts(TpCmCts {
                pgn,
                num_packets_next: payload[1],
                next_packet: payload[2],
            }))
        }
        CB_EOMA => {
            warn_reserved("byte 4", payload[4]);
            Ok(TpCm::Eoma(TpCmEoma {
                pgn,
                size: u16::from_le_bytes([payload[1], payload[2]]),
                total_packets: payload[3],
            }))
        }
        CB_ABORT => {
            warn_reserved("byte 2", payload[2]);
            warn_reserved("byte 3", payload[3]);
            warn_reserved("byte 4", payload[4]);
            Ok(TpCm::Abort(TpCmAbort {
                pgn,
                reason: AbortReason(payload[1]),
            }))
        }
        other => Err(FrameDecodeError::UnknownControlByte { control_byte: other }),
    }
}

/// Decode a TP.DT payload. Every byte combination is structurally valid;
/// whether `sequence` is the one actually expected is a session-level
/// concern (spec.md §4.4), not a codec concern.
pub fn decode_dt(payload: &[u8; 8]) -> TpDt {
    let mut data = [0u8; 7];
    data.copy_from_slice(&payload[1..8]);
    TpDt { sequence: payload[0], data }
}

pub fn encode_bam(pgn: u32, size: u16, total_packets: u8) -> [u8; 8] {
    let [lsb, msb] = size.to_le_bytes();
    let [p0, p1, p2] = pgn_to_le_bytes(pgn);
    [CB_BAM, lsb, msb, total_packets, RESERVED, p0, p1, p2]
}

pub fn encode_rts(pgn: u32, size: u16, total_packets: u8, max_per_cts: u8) -> [u8; 8] {
    let [lsb, msb] = size.to_le_bytes();
    let [p0, p1, p2] = pgn_to_le_bytes(pgn);
    [CB_RTS, lsb, msb, total_packets, max_per_cts, p0, p1, p2]
}

pub fn encode_cts(pgn: u32, num_packets_next: u8, next_packet: u8) -> [u8; 8] {
    let [p0, p1, p2] = pgn_to_le_bytes(pgn);
    [CB_CTS, num_packets_next, next_packet, RESERVED, RESERVED, p0, p1, p2]
}

pub fn encode_eoma(pgn: u32, size: u16, total_packets: u8) -> [u8; 8] {
    let [lsb, msb] = size.to_le_bytes();
    let [p0, p1, p2] = pgn_to_le_bytes(pgn);
    [CB_EOMA, lsb, msb, total_packets, RESERVED, p0, p1, p2]
}

pub fn encode_abort(pgn: u32, reason: AbortReason) -> [u8; 8] {
    let [p0, p1, p2] = pgn_to_le_bytes(pgn);
    [CB_ABORT, reason.0, RESERVED, RESERVED, RESERVED, p0, p1, p2]
}

/// Encode a TP.DT frame. `live` must contain at most 7 bytes; the
/// remainder of the frame is 0xFF-padded (spec.md §3, message model).
pub fn encode_dt(sequence: u8, live: &[u8]) -> [u8; 8] {
    debug_assert!(live.len() <= 7, "a DT packet carries at most 7 payload bytes");
    let mut out = [RESERVED; 8];
    out[0] = sequence;
    let n = live.len().min(7);
    out[1..1 + n].copy_from_slice(&live[..n]);
    out
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
