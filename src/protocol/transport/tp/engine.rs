//! Engine Façade (spec.md §4.5): the single entry point applications and
//! CAN drivers talk to. Three calls drive it — `on_frame` for inbound CAN
//! traffic, `send`/`cancel` for application-initiated transfers, and
//! `poll(now_ms)` for everything time-based. Nothing here blocks: a
//! saturated CAN driver just means the next `poll` tries again.
use crate::error::{SendError, TableError};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::tp::codec::{decode_cm, decode_dt, encode_abort, AbortReason, TpCm, PGN_TP_CM, PGN_TP_DT};
use crate::protocol::transport::tp::session::{
    total_packets_for, BROADCAST_ADDRESS, DtOutcome, MAX_MESSAGE_LEN, MIN_MESSAGE_LEN, PostSendAction,
    Role, Session, SessionHandle, SessionState,
};
use crate::protocol::transport::tp::table::{SessionTable, MAX_SESSIONS};
use crate::protocol::transport::tp::timer::{arm, is_due, TH_MS, TR_MS, T2_MS};
use crate::protocol::transport::traits::application::Application;
use crate::protocol::transport::traits::can_bus::{CanDriver, TxOutcome};
use crate::protocol::transport::traits::clock::Clock;
use crate::protocol::transport::traits::network_management::NetworkManagement;

/// A read-only snapshot of a session's progress, for diagnostics and
/// logging (not part of the wire protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStateView {
    pub role: Role,
    pub peer: u8,
    pub pgn: u32,
    pub size: u16,
    pub total_packets: u8,
    pub packets_done: u8,
    pub state: SessionState,
}

/// The Transport Protocol engine: one instance per CAN interface /
/// network-management identity. Generic over its four collaborators so
/// it never allocates and never depends on a particular CAN HAL, clock
/// source, or address-claiming scheme.
pub struct Engine<D: CanDriver, C: Clock, N: NetworkManagement, A: Application> {
    driver: D,
    clock: C,
    nm: N,
    app: A,
    table: SessionTable,
}

impl<D: CanDriver, C: Clock, N: NetworkManagement, A: Application> Engine<D, C, N, A> {
    pub fn new(driver: D, clock: C, nm: N, app: A) -> Self {
        Self { driver, clock, nm, app, table: SessionTable::new() }
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn application_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Read-only view of a session, for diagnostics (grounded in the
    /// original implementation's state-inspection entry points).
    pub fn session_state(&self, peer: u8, role: Role) -> Option<SessionStateView> {
        self.table.lookup(peer, role).map(|s| SessionStateView {
            role: s.role,
            peer: s.peer,
            pgn: s.pgn,
            size: s.size,
            total_packets: s.total_packets,
            packets_done: (s.next_expected.saturating_sub(1)) as u8,
            state: s.state,
        })
    }

    /// Begin sending `bytes` on `pgn`. `destination` is `None` for a
    /// broadcast (BAM) transfer, `Some(address)` for a connection-mode
    /// transfer to a single peer.
    pub fn send(&mut self, destination: Option<u8>, pgn: u32, bytes: &[u8]) -> Result<SessionHandle, SendError> {
        if bytes.len() > MAX_MESSAGE_LEN {
            return Err(SendError::TooLarge { len: bytes.len(), max: MAX_MESSAGE_LEN });
        }
        if bytes.len() < MIN_MESSAGE_LEN {
            return Err(SendError::TooSmall { len: bytes.len(), min: MIN_MESSAGE_LEN });
        }
        let now = self.clock.now_ms();
        let (session, handle) = match destination {
            None => {
                let session = Session::new_bam_sender(pgn, bytes, now);
                (session, SessionHandle { peer: BROADCAST_ADDRESS, role: Role::BamSender })
            }
            Some(peer) => {
                let session = Session::new_cm_sender(peer, pgn, bytes, now);
                (session, SessionHandle { peer, role: Role::CmSender })
            }
        };
        self.table.insert(session).map_err(|e| match e {
            TableError::Busy => SendError::Busy,
            TableError::NoResources => SendError::NoResources,
        })?;
        self.drive_session(handle.peer, handle.role);
        Ok(handle)
    }

    /// Abort any CM session with `peer` (in either direction) and drop
    /// any BAM session associated with `peer`. Best-effort: the abort
    /// frame is attempted once and its result ignored, matching
    /// application-initiated cancellation rather than protocol error
    /// recovery.
    pub fn cancel(&mut self, peer: u8) {
        for role in [Role::CmSender, Role::CmReceiver] {
            if self.table.lookup(peer, role).is_some() {
                self.abort_and_remove(peer, role, AbortReason::RESOURCES_NEEDED);
            }
        }
        self.table.remove(peer, Role::BamSender);
        self.table.remove(peer, Role::BamReceiver);
    }

    /// Feed one inbound CAN frame to the engine. Frames that are not
    /// TP.CM/TP.DT, or not addressed to us (when addressing applies), are
    /// ignored.
    pub fn on_frame(&mut self, id: CanId, payload: &[u8; 8]) {
        let pgn = id.pgn();
        if pgn == PGN_TP_CM {
            self.on_cm_frame(id, payload);
        } else if pgn == PGN_TP_DT {
            self.on_dt_frame(id, payload);
        }
    }

    fn on_cm_frame(&mut self, id: CanId, payload: &[u8; 8]) {
        let Ok(cm) = decode_cm(payload) else { return };
        let source = id.source_address();
        let destination = id.destination();
        let my_address = self.nm.my_address();
        let now = self.clock.now_ms();

        match cm {
            TpCm::Bam(bam) => {
                if destination != Some(BROADCAST_ADDRESS) {
                    return;
                }
                if (bam.size as usize) < MIN_MESSAGE_LEN || (bam.size as usize) > MAX_MESSAGE_LEN {
                    return;
                }
                if self.table.lookup(source, Role::BamReceiver).is_some() {
                    return;
                }
                let session = Session::new_bam_receiver(source, bam.pgn, bam.size, now);
                let _ = self.table.insert(session);
            }
            TpCm::Rts(rts) => {
                if destination != Some(my_address) {
                    return;
                }
                if (rts.size as usize) > MAX_MESSAGE_LEN {
                    self.reject_rts(source, rts.pgn, AbortReason::TOO_LARGE);
                    return;
                }
                if (rts.size as usize) < MIN_MESSAGE_LEN {
                    self.reject_rts(source, rts.pgn, AbortReason::TIMEOUT);
                    return;
                }
                if rts.total_packets != total_packets_for(rts.size as usize) {
                    self.reject_rts(source, rts.pgn, AbortReason::TIMEOUT);
                    return;
                }
                if self.table.lookup(source, Role::CmReceiver).is_some() {
                    self.reject_rts(source, rts.pgn, AbortReason::ALREADY_IN_SESSION);
                    return;
                }
                let session = Session::new_cm_receiver(source, rts.pgn, rts.size, rts.max_per_cts, now);
                match self.table.insert(session) {
                    Ok(()) => self.drive_session(source, Role::CmReceiver),
                    Err(_) => self.reject_rts(source, rts.pgn, AbortReason::MEMORY_FAILURE),
                }
            }
            TpCm::Cts(cts) => {
                if destination != Some(my_address) {
                    return;
                }
                let outcome = self.table.lookup_mut(source, Role::CmSender).and_then(|s| s.on_cts(&cts, now));
                match outcome {
                    Some(crate::protocol::transport::tp::session::CtsOutcome::Accepted) => {
                        self.drive_session(source, Role::CmSender)
                    }
                    Some(crate::protocol::transport::tp::session::CtsOutcome::Reject(reason)) => {
                        self.abort_and_remove(source, Role::CmSender, reason)
                    }
                    Some(crate::protocol::transport::tp::session::CtsOutcome::Hold) | None => {}
                }
            }
            TpCm::Eoma(_eoma) => {
                if destination != Some(my_address) {
                    return;
                }
                let completed = self.table.lookup_mut(source, Role::CmSender).map(|s| s.on_eoma()).unwrap_or(false);
                if completed {
                    self.table.remove(source, Role::CmSender);
                }
            }
            TpCm::Abort(_abort) => {
                if destination != Some(my_address) && destination != Some(BROADCAST_ADDRESS) {
                    return;
                }
                self.table.remove(source, Role::CmSender);
                self.table.remove(source, Role::CmReceiver);
            }
        }
    }

    fn on_dt_frame(&mut self, id: CanId, payload: &[u8; 8]) {
        let dt = decode_dt(payload);
        let source = id.source_address();
        let destination = id.destination();
        let my_address = self.nm.my_address();
        let now = self.clock.now_ms();

        if destination == Some(BROADCAST_ADDRESS) {
            let outcome = self.table.lookup_mut(source, Role::BamReceiver).map(|s| s.on_dt(&dt, now));
            match outcome {
                Some(DtOutcome::Complete) => self.deliver_and_remove(source, Role::BamReceiver),
                Some(DtOutcome::Reject(_)) => self.table.remove(source, Role::BamReceiver),
                _ => {}
            }
        } else if destination == Some(my_address) {
            let outcome = self.table.lookup_mut(source, Role::CmReceiver).map(|s| s.on_dt(&dt, now));
            match outcome {
                Some(DtOutcome::Complete) | Some(DtOutcome::WindowComplete) => {
                    self.drive_session(source, Role::CmReceiver)
                }
                Some(DtOutcome::Reject(reason)) => self.abort_and_remove(source, Role::CmReceiver, reason),
                _ => {}
            }
        }
    }

    /// Time-driven work: retransmissions, CTS-window advancement, and
    /// timeout enforcement. Call at a steady cadence no coarser than the
    /// shortest timer in `tp::timer` (`T1_MS`) for timely abort detection.
    pub fn poll(&mut self, now_ms: u32) {
        let mut due: [Option<(u8, Role)>; MAX_SESSIONS] = [None; MAX_SESSIONS];
        for (slot, session) in due.iter_mut().zip(self.table.iter()) {
            if is_due(session.deadline, now_ms) {
                *slot = Some((session.peer, session.role));
            }
        }
        for (peer, role) in due.into_iter().flatten() {
            self.poll_one(peer, role, now_ms);
        }
    }

    fn poll_one(&mut self, peer: u8, role: Role, now_ms: u32) {
        let Some(session) = self.table.lookup_mut(peer, role) else { return };
        if session.state.is_pending_send() {
            if let Some(since) = session.busy_since {
                let budget = busy_escalation_budget(session.state);
                if is_due(arm(since, budget), now_ms) {
                    self.escalate(peer, role);
                    return;
                }
            }
            self.drive_session(peer, role);
        } else {
            match role {
                Role::BamReceiver => self.table.remove(peer, role),
                Role::CmSender | Role::CmReceiver => self.abort_and_remove(peer, role, AbortReason::TIMEOUT),
                Role::BamSender => {}
            }
        }
    }

    fn escalate(&mut self, peer: u8, role: Role) {
        match role {
            Role::BamSender | Role::BamReceiver => self.table.remove(peer, role),
            Role::CmSender | Role::CmReceiver => self.abort_and_remove(peer, role, AbortReason::RESOURCES_NEEDED),
        }
    }

    fn drive_session(&mut self, peer: u8, role: Role) {
        let my_address = self.nm.my_address();
        let now = self.clock.now_ms();
        let Some(session) = self.table.lookup_mut(peer, role) else { return };
        let Some(frame) = session.pending_frame(my_address) else { return };
        match self.driver.try_send(&frame) {
            Ok(TxOutcome::Sent) => {
                let action = session.on_frame_sent(now);
                match action {
                    PostSendAction::Continue => {}
                    PostSendAction::Terminate => self.table.remove(peer, role),
                    PostSendAction::DeliverThenTerminate => self.deliver_and_remove(peer, role),
                }
            }
            Ok(TxOutcome::Busy) => session.note_busy(now),
            Err(_) => session.note_busy(now),
        }
    }

    fn deliver_and_remove(&mut self, peer: u8, role: Role) {
        let Some(session) = self.table.lookup(peer, role) else { return };
        let size = session.size as usize;
        let pgn = session.pgn;
        let mut bytes = [0u8; MAX_MESSAGE_LEN];
        bytes[..size].copy_from_slice(&session.buffer[..size]);
        self.table.remove(peer, role);
        self.app.deliver(pgn, peer, &bytes[..size]);
    }

    fn abort_and_remove(&mut self, peer: u8, role: Role, reason: AbortReason) {
        if let Some(session) = self.table.lookup(peer, role) {
            let pgn = session.pgn;
            self.send_abort(peer, pgn, reason);
        }
        self.table.remove(peer, role);
    }

    fn reject_rts(&mut self, source: u8, pgn: u32, reason: AbortReason) {
        self.send_abort(source, pgn, reason);
    }

    fn send_abort(&mut self, peer: u8, pgn: u32, reason: AbortReason) {
        let my_address = self.nm.my_address();
        if let Ok(id) = CanId::builder(PGN_TP_CM, my_address).to_destination(peer).build() {
            let _ = self.driver.try_send(&CanFrame::new(id, encode_abort(pgn, reason)));
        }
    }
}

/// How long a pending-send session may stay CAN-`Busy` before the engine
/// gives up and aborts locally (spec.md §7, "Local CAN failure"): `Th +
/// T2` for sender-side sends, `Tr` for receiver-side sends (CTS, EoMA).
fn busy_escalation_budget(state: SessionState) -> u32 {
    match state {
        SessionState::BamAnnounce
        | SessionState::BamSending
        | SessionState::CmAnnounceRts
        | SessionState::CmSendingWindow => TH_MS + T2_MS,
        _ => TR_MS,
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
