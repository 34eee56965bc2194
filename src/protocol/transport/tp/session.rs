//! Per-session state machine: one instance per live Transport Protocol
//! session, driving BAM-TX, BAM-RX, CM-TX, CM-RX from initiation through
//! termination. All four role sub-machines share the same buffer,
//! deadline, and `next_expected` bookkeeping (spec.md §3/§4.4); only the
//! state transitions differ.
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::tp::codec::{
    encode_bam, encode_cts, encode_dt, encode_eoma, encode_rts, AbortReason, TpCmCts, TpDt,
    PGN_TP_CM, PGN_TP_DT,
};
use crate::protocol::transport::tp::timer::{
    arm, BAM_INTERPACKET_DEFAULT_MS, CAN_BUSY_RETRY_MS, CM_INTERPACKET_DEFAULT_MS, T1_MS, T2_MS, T3_MS, T4_MS,
};

/// The broadcast address; never a valid CM session peer.
pub const BROADCAST_ADDRESS: u8 = 255;

/// Smallest payload the Transport Protocol will carry; shorter messages
/// belong on a single CAN frame.
pub const MIN_MESSAGE_LEN: usize = 9;
/// Largest payload this engine supports (no J1939-21 §5.10.3 extended
/// transport).
pub const MAX_MESSAGE_LEN: usize = 1785;
/// Live payload bytes per Data Transfer packet.
pub const BYTES_PER_PACKET: usize = 7;
/// Default window size a CM-receiver offers per CTS (spec.md §9 Open
/// Question 1; configurable per session via [`Session::set_local_max_per_cts`]).
pub const DEFAULT_MAX_PER_CTS: u8 = 4;

/// `ceil(size / BYTES_PER_PACKET)`, clamped to what fits in a `u8` (never
/// exceeds 255 for any `size <= MAX_MESSAGE_LEN`, since 1785 = 255 * 7).
pub fn total_packets_for(size: usize) -> u8 {
    (size.div_ceil(BYTES_PER_PACKET)) as u8
}

/// Number of live (non-padding) bytes in `packet_number` of a message of
/// `size` bytes split into `total_packets` packets (spec.md I4).
pub fn live_bytes_in_packet(size: usize, total_packets: u8, packet_number: u8) -> usize {
    if packet_number as usize == total_packets as usize {
        size - (total_packets as usize - 1) * BYTES_PER_PACKET
    } else {
        BYTES_PER_PACKET
    }
}

/// Which of the four Transport Protocol roles a session is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    BamSender,
    BamReceiver,
    CmSender,
    CmReceiver,
}

/// Identifies a session inside the Session Table: the key is (peer,
/// role-family), matching I1's "at most one CM session per ordered pair
/// per direction" / "at most one BAM-receive session per source address".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub peer: u8,
    pub role: Role,
}

/// Per-role state (spec.md §4.4). States named `*Need*`/`*Announce`/
/// `*Sending*` own a frame still to be transmitted; all others are
/// awaiting an inbound event or a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// BAM-sender: the initial BAM frame has not been transmitted yet.
    BamAnnounce,
    /// BAM-sender: transmitting DT packets in sequence.
    BamSending,
    /// BAM-receiver: waiting for the next DT packet.
    BamReceiving,
    /// CM-sender: the initial RTS has not been transmitted yet.
    CmAnnounceRts,
    /// CM-sender: waiting for the first CTS.
    CmAwaitCts,
    /// CM-sender: transmitting DT packets within the open CTS window.
    CmSendingWindow,
    /// CM-sender: window exhausted, waiting for the next CTS.
    CmAwaitNextCts,
    /// CM-sender: last DT sent, waiting for EoMA.
    CmAwaitEoma,
    /// CM-receiver: a CTS still has to be (re)transmitted.
    CmNeedSendCts,
    /// CM-receiver: waiting for the next DT packet within the offered window.
    CmAwaitDt,
    /// CM-receiver: the final packet arrived; EoMA still has to be transmitted.
    CmNeedSendEoma,
}

impl SessionState {
    /// States that own a frame still to be (re)transmitted, as opposed to
    /// states waiting on an inbound event or timeout.
    pub fn is_pending_send(self) -> bool {
        matches!(
            self,
            SessionState::BamAnnounce
                | SessionState::BamSending
                | SessionState::CmAnnounceRts
                | SessionState::CmSendingWindow
                | SessionState::CmNeedSendCts
                | SessionState::CmNeedSendEoma
        )
    }
}

/// Outcome of feeding a DT packet into a receiving session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtOutcome {
    /// Packet accepted; more packets (or the same window) remain.
    Continue,
    /// Packet accepted; the CTS window is exhausted (CM only) and a new
    /// CTS must be sent.
    WindowComplete,
    /// The final packet of the message was accepted.
    Complete,
    /// Sequence number or byte offset violated the session's expectations.
    /// CM sessions must abort with the given reason; BAM sessions drop
    /// silently (see `Session::role`).
    Reject(AbortReason),
}

/// Outcome of feeding a CTS into a CM-sender session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtsOutcome {
    /// A new window was granted; `Session` has been updated in place.
    Accepted,
    /// `num_packets_next == 0`: the receiver asked to pause.
    Hold,
    /// The CTS was invalid for the session's current progress.
    Reject(AbortReason),
}

/// What the Engine Façade must do after a transmit attempt succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSendAction {
    /// Nothing further; the session remains active.
    Continue,
    /// Remove the session. No delivery (sender-side success, or any
    /// role's silent/aborted termination).
    Terminate,
    /// Hand the reassembled buffer to the application, then remove the
    /// session (CM-receiver only: the EoMA was just sent).
    DeliverThenTerminate,
}

/// A live Transport Protocol session. Owns its reassembly/segmentation
/// buffer as a fixed-size array: there is no heap allocation, so there is
/// nothing to leak on any exit path (spec.md I2).
pub struct Session {
    pub role: Role,
    pub peer: u8,
    pub pgn: u32,
    pub size: u16,
    pub total_packets: u8,
    pub buffer: [u8; MAX_MESSAGE_LEN],
    /// Sender: next packet number to transmit. Receiver: next packet
    /// number expected. Range `1..=total_packets + 1` (spec.md I3); wide
    /// enough to represent "one past the last packet" for `total_packets
    /// == 255`.
    pub next_expected: u16,
    pub cts_window_start: u8,
    pub cts_window_len: u8,
    /// CM-sender: `max_per_cts` advertised in our own RTS.
    /// CM-receiver: `max_per_cts` the peer advertised in its RTS.
    pub peer_max_per_cts: u8,
    /// CM-receiver only: the window size we are willing to offer per CTS.
    pub local_max_per_cts: u8,
    pub deadline: u32,
    pub state: SessionState,
    /// Set the first time a transmit attempt returns `Busy`; cleared on
    /// success. Used to escalate a CAN driver that stays saturated past
    /// the budget spec.md §7 allows ("Local CAN failure").
    pub busy_since: Option<u32>,
}

impl Session {
    fn blank(role: Role, peer: u8, pgn: u32, size: u16, state: SessionState, deadline: u32) -> Self {
        Self {
            role,
            peer,
            pgn,
            size,
            total_packets: total_packets_for(size as usize),
            buffer: [0; MAX_MESSAGE_LEN],
            next_expected: 1,
            cts_window_start: 1,
            cts_window_len: 0,
            peer_max_per_cts: DEFAULT_MAX_PER_CTS,
            local_max_per_cts: DEFAULT_MAX_PER_CTS,
            deadline,
            state,
            busy_since: None,
        }
    }

    /// Construct a BAM-sender session. `bytes.len()` must already be
    /// validated to lie in `[MIN_MESSAGE_LEN, MAX_MESSAGE_LEN]`.
    pub fn new_bam_sender(pgn: u32, bytes: &[u8], now_ms: u32) -> Self {
        let mut session = Self::blank(Role::BamSender, BROADCAST_ADDRESS, pgn, bytes.len() as u16, SessionState::BamAnnounce, now_ms);
        session.buffer[..bytes.len()].copy_from_slice(bytes);
        session
    }

    /// Construct a CM-sender session.
    pub fn new_cm_sender(peer: u8, pgn: u32, bytes: &[u8], now_ms: u32) -> Self {
        let mut session = Self::blank(Role::CmSender, peer, pgn, bytes.len() as u16, SessionState::CmAnnounceRts, now_ms);
        session.buffer[..bytes.len()].copy_from_slice(bytes);
        session.peer_max_per_cts = DEFAULT_MAX_PER_CTS.min(session.total_packets);
        session
    }

    /// Construct a BAM-receiver session from a validated BAM announce.
    pub fn new_bam_receiver(source: u8, pgn: u32, size: u16, now_ms: u32) -> Self {
        Self::blank(Role::BamReceiver, source, pgn, size, SessionState::BamReceiving, arm(now_ms, T1_MS))
    }

    /// Construct a CM-receiver session from a validated RTS, immediately
    /// computing the first CTS window (spec.md §4.4.4 entry action).
    pub fn new_cm_receiver(source: u8, pgn: u32, size: u16, peer_max_per_cts: u8, now_ms: u32) -> Self {
        let mut session = Self::blank(Role::CmReceiver, source, pgn, size, SessionState::CmNeedSendCts, now_ms);
        session.peer_max_per_cts = peer_max_per_cts;
        session.begin_new_cts_window();
        session
    }

    /// Override the window size a CM-receiver is willing to offer per CTS
    /// (defaults to [`DEFAULT_MAX_PER_CTS`]).
    pub fn set_local_max_per_cts(&mut self, max: u8) {
        self.local_max_per_cts = max;
    }

    /// (Re)compute the CTS window starting at `next_expected` and move
    /// into `CmNeedSendCts`. Called at CM-receiver construction and again
    /// every time a window is exhausted but the message is not yet
    /// complete.
    fn begin_new_cts_window(&mut self) {
        let remaining = self.total_packets as u32 - (self.next_expected as u32 - 1);
        let peer_cap = if self.peer_max_per_cts == 0xFF { u32::MAX } else { self.peer_max_per_cts as u32 };
        let local_cap = if self.local_max_per_cts == 0xFF { u32::MAX } else { self.local_max_per_cts as u32 };
        let window = remaining.min(peer_cap).min(local_cap).max(1);
        self.cts_window_start = self.next_expected as u8;
        self.cts_window_len = window as u8;
        self.state = SessionState::CmNeedSendCts;
    }

    /// The frame this session wants to (re)transmit right now, if any.
    /// Pure: does not mutate state. `my_address` is read fresh from the
    /// network-management collaborator by the caller.
    pub fn pending_frame(&self, my_address: u8) -> Option<CanFrame> {
        if !self.state.is_pending_send() {
            return None;
        }
        let data = match self.state {
            SessionState::BamAnnounce => encode_bam(self.pgn, self.size, self.total_packets),
            SessionState::BamSending => self.dt_frame_data(self.next_expected as u8),
            SessionState::CmAnnounceRts => encode_rts(self.pgn, self.size, self.total_packets, self.peer_max_per_cts),
            SessionState::CmSendingWindow => self.dt_frame_data(self.next_expected as u8),
            SessionState::CmNeedSendCts => encode_cts(self.pgn, self.cts_window_len, self.cts_window_start),
            SessionState::CmNeedSendEoma => encode_eoma(self.pgn, self.size, self.total_packets),
            _ => unreachable!("is_pending_send() guards every other variant"),
        };
        let destination = if self.role == Role::BamSender { BROADCAST_ADDRESS } else { self.peer };
        let pgn = match self.state {
            SessionState::BamSending | SessionState::CmSendingWindow => PGN_TP_DT,
            _ => PGN_TP_CM,
        };
        let id = CanId::builder(pgn, my_address).to_destination(destination).build().ok()?;
        Some(CanFrame::new(id, data))
    }

    fn dt_frame_data(&self, packet_number: u8) -> [u8; 8] {
        let live = live_bytes_in_packet(self.size as usize, self.total_packets, packet_number);
        let offset = (packet_number as usize - 1) * BYTES_PER_PACKET;
        encode_dt(packet_number, &self.buffer[offset..offset + live])
    }

    /// Record that a transmit attempt for `pending_frame` just failed with
    /// `Busy`. Does not change `state`; only starts the retry-escalation
    /// clock if one is not already running.
    pub fn note_busy(&mut self, now_ms: u32) {
        if self.busy_since.is_none() {
            self.busy_since = Some(now_ms);
        }
        self.deadline = arm(now_ms, CAN_BUSY_RETRY_MS);
    }

    /// Mutate state after `pending_frame`'s frame was accepted by the CAN
    /// driver.
    pub fn on_frame_sent(&mut self, now_ms: u32) -> PostSendAction {
        self.busy_since = None;
        match self.state {
            SessionState::BamAnnounce => {
                self.state = SessionState::BamSending;
                self.deadline = arm(now_ms, BAM_INTERPACKET_DEFAULT_MS);
                PostSendAction::Continue
            }
            SessionState::BamSending => {
                let sent = self.next_expected as u8;
                if sent == self.total_packets {
                    PostSendAction::Terminate
                } else {
                    self.next_expected += 1;
                    self.deadline = arm(now_ms, BAM_INTERPACKET_DEFAULT_MS);
                    PostSendAction::Continue
                }
            }
            SessionState::CmAnnounceRts => {
                self.state = SessionState::CmAwaitCts;
                self.deadline = arm(now_ms, T2_MS);
                PostSendAction::Continue
            }
            SessionState::CmSendingWindow => {
                let sent = self.next_expected as u8;
                let window_end = self.cts_window_start + self.cts_window_len - 1;
                if sent == self.total_packets {
                    self.state = SessionState::CmAwaitEoma;
                    self.deadline = arm(now_ms, T3_MS);
                } else if sent == window_end {
                    self.next_expected += 1;
                    self.state = SessionState::CmAwaitNextCts;
                    self.deadline = arm(now_ms, T2_MS);
                } else {
                    self.next_expected += 1;
                    self.deadline = arm(now_ms, CM_INTERPACKET_DEFAULT_MS);
                }
                PostSendAction::Continue
            }
            SessionState::CmNeedSendCts => {
                self.state = SessionState::CmAwaitDt;
                self.deadline = arm(now_ms, T1_MS);
                PostSendAction::Continue
            }
            SessionState::CmNeedSendEoma => PostSendAction::DeliverThenTerminate,
            _ => unreachable!("is_pending_send() guards every other variant"),
        }
    }

    /// Feed an inbound CTS to a CM-sender session awaiting one
    /// (`CmAwaitCts` or `CmAwaitNextCts`). Returns `None` if this session
    /// is not currently awaiting a CTS (stale/unexpected frame, ignored
    /// by the caller).
    pub fn on_cts(&mut self, cts: &TpCmCts, now_ms: u32) -> Option<CtsOutcome> {
        if self.state == SessionState::CmSendingWindow {
            // A CTS while a DT burst is still in flight: the sender
            // refuses rather than interrupting its own window (spec.md
            // §6 abort reason 4).
            return Some(CtsOutcome::Reject(AbortReason::CTS_WHILE_DT_IN_PROGRESS));
        }
        if !matches!(self.state, SessionState::CmAwaitCts | SessionState::CmAwaitNextCts) {
            return None;
        }
        let n = self.total_packets;
        if cts.next_packet < 1 || cts.next_packet > n {
            return Some(CtsOutcome::Reject(AbortReason::TIMEOUT));
        }
        if cts.num_packets_next == 0 {
            self.deadline = arm(now_ms, T4_MS);
            return Some(CtsOutcome::Hold);
        }
        let window_end = cts.next_packet as u32 + cts.num_packets_next as u32 - 1;
        if window_end > n as u32 {
            return Some(CtsOutcome::Reject(AbortReason::TIMEOUT));
        }
        if cts.next_packet as u16 != self.next_expected {
            // Either a retransmit of an already-sent packet, or a request
            // ahead of what has been sent: neither is supported (spec.md
            // §9 Open Question 3).
            return Some(CtsOutcome::Reject(AbortReason::TIMEOUT));
        }
        self.cts_window_start = cts.next_packet;
        self.cts_window_len = cts.num_packets_next;
        self.state = SessionState::CmSendingWindow;
        self.deadline = arm(now_ms, CM_INTERPACKET_DEFAULT_MS);
        Some(CtsOutcome::Accepted)
    }

    /// Feed an inbound EoMA to a CM-sender session. Returns `true` if it
    /// completed the session (caller should `Terminate`), `false` if this
    /// session was not awaiting an EoMA (stale frame, ignored).
    pub fn on_eoma(&mut self) -> bool {
        matches!(self.state, SessionState::CmAwaitEoma)
    }

    /// Feed an inbound DT packet to a receiving session (BAM or CM).
    pub fn on_dt(&mut self, dt: &TpDt, now_ms: u32) -> DtOutcome {
        let expect_cm = matches!(self.state, SessionState::CmAwaitDt);
        let expect_bam = matches!(self.state, SessionState::BamReceiving);
        if !expect_cm && !expect_bam {
            return DtOutcome::Reject(AbortReason::TIMEOUT);
        }
        if dt.sequence as u16 != self.next_expected {
            return DtOutcome::Reject(AbortReason::TIMEOUT);
        }
        let packet_number = dt.sequence;
        let live = live_bytes_in_packet(self.size as usize, self.total_packets, packet_number);
        let offset = (packet_number as usize - 1) * BYTES_PER_PACKET;
        if offset + live > self.size as usize {
            return DtOutcome::Reject(AbortReason::TIMEOUT);
        }
        self.buffer[offset..offset + live].copy_from_slice(&dt.data[..live]);

        let is_last = packet_number == self.total_packets;
        if expect_bam {
            if is_last {
                self.next_expected += 1;
                return DtOutcome::Complete;
            }
            self.next_expected += 1;
            self.deadline = arm(now_ms, T1_MS);
            return DtOutcome::Continue;
        }

        // CM-receiver.
        if is_last {
            self.next_expected += 1;
            self.state = SessionState::CmNeedSendEoma;
            return DtOutcome::Complete;
        }
        let window_end = self.cts_window_start as u16 + self.cts_window_len as u16 - 1;
        if packet_number as u16 == window_end {
            self.next_expected += 1;
            self.begin_new_cts_window();
            return DtOutcome::WindowComplete;
        }
        self.next_expected += 1;
        self.deadline = arm(now_ms, T1_MS);
        DtOutcome::Continue
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
