//! End-to-end engine tests: two engines exchanging real encoded frames
//! through a tiny in-memory "bus", covering BAM (S1) and connection-mode
//! (S2) transfers plus CM receiver timeout (S5).
use super::*;
use crate::protocol::transport::tp::codec::encode_rts;
use std::vec::Vec;

struct MockCanDriver {
    sent: Vec<CanFrame>,
}

impl CanDriver for MockCanDriver {
    type Error = core::convert::Infallible;
    fn try_send(&mut self, frame: &CanFrame) -> Result<TxOutcome, Self::Error> {
        self.sent.push(*frame);
        Ok(TxOutcome::Sent)
    }
}

struct MockClock(u32);
impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.0
    }
}
impl MockClock {
    fn set(&mut self, t: u32) {
        self.0 = t;
    }
}

struct MockNetworkManagement(u8);
impl NetworkManagement for MockNetworkManagement {
    fn my_address(&self) -> u8 {
        self.0
    }
}

struct MockApplication {
    deliveries: Vec<(u32, u8, Vec<u8>)>,
}
impl Application for MockApplication {
    fn deliver(&mut self, pgn: u32, source_address: u8, bytes: &[u8]) {
        self.deliveries.push((pgn, source_address, bytes.to_vec()));
    }
}

type TestEngine = Engine<MockCanDriver, MockClock, MockNetworkManagement, MockApplication>;

fn engine(address: u8) -> TestEngine {
    Engine::new(
        MockCanDriver { sent: Vec::new() },
        MockClock(0),
        MockNetworkManagement(address),
        MockApplication { deliveries: Vec::new() },
    )
}

/// Relay frames between two engines and advance their shared clock in
/// small steps until neither produces new traffic (or the step budget
/// runs out), mirroring how a real CAN bus plus periodic `poll` would
/// carry a transfer to completion.
fn run_to_quiescence(a: &mut TestEngine, b: &mut TestEngine, start_ms: u32) {
    let mut t = start_ms;
    for _ in 0..500 {
        t += 10;
        a.clock_mut().set(t);
        b.clock_mut().set(t);
        a.poll(t);
        b.poll(t);
        loop {
            let from_a: Vec<CanFrame> = core::mem::take(&mut a.driver_mut().sent);
            let from_b: Vec<CanFrame> = core::mem::take(&mut b.driver_mut().sent);
            if from_a.is_empty() && from_b.is_empty() {
                break;
            }
            for f in &from_a {
                b.on_frame(f.id, &f.data);
            }
            for f in &from_b {
                a.on_frame(f.id, &f.data);
            }
        }
    }
}

#[test]
fn bam_transfer_completes_end_to_end() {
    let mut sender = engine(0x10);
    let mut receiver = engine(0x20);

    let bytes: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    sender.send(None, 0x00FEDA, &bytes).unwrap();
    run_to_quiescence(&mut sender, &mut receiver, 0);

    assert_eq!(receiver.application_mut().deliveries, vec![(0x00FEDA, 0x10, bytes.to_vec())]);
    assert!(sender.session_state(BROADCAST_ADDRESS, Role::BamSender).is_none());
}

#[test]
fn connection_mode_transfer_completes_end_to_end() {
    let mut sender = engine(0x10);
    let mut receiver = engine(0x20);

    let bytes: [u8; 20] = core::array::from_fn(|i| i as u8);
    sender.send(Some(0x20), 0x00FE00, &bytes).unwrap();
    run_to_quiescence(&mut sender, &mut receiver, 0);

    assert_eq!(receiver.application_mut().deliveries, vec![(0x00FE00, 0x10, bytes.to_vec())]);
    assert!(sender.session_state(0x20, Role::CmSender).is_none());
    assert!(receiver.session_state(0x10, Role::CmReceiver).is_none());
}

#[test]
fn large_connection_mode_transfer_spans_many_windows() {
    let mut sender = engine(0x10);
    let mut receiver = engine(0x20);

    let bytes: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
    sender.send(Some(0x20), 0x00FE00, &bytes).unwrap();
    run_to_quiescence(&mut sender, &mut receiver, 0);

    assert_eq!(receiver.application_mut().deliveries.len(), 1);
    assert_eq!(receiver.application_mut().deliveries[0].2, bytes);
}

#[test]
fn cm_receiver_aborts_after_dt_timeout() {
    let mut receiver = engine(0x20);

    let id = CanId::builder(PGN_TP_CM, 0x10).to_destination(0x20).build().unwrap();
    let rts = encode_rts(0x00FE00, 20, 3, 2);
    receiver.on_frame(id, &rts);

    assert!(receiver.session_state(0x10, Role::CmReceiver).is_some());
    // Nothing is sent for T1_MS (receiver's DT timeout): the session must abort.
    receiver.poll(10_000);

    assert!(receiver.session_state(0x10, Role::CmReceiver).is_none());
    let sent = core::mem::take(&mut receiver.driver_mut().sent);
    assert!(sent.iter().any(|f| matches!(decode_cm(&f.data), Ok(TpCm::Abort(_)))));
}

#[test]
fn rts_for_oversized_message_is_rejected_with_abort() {
    let mut receiver = engine(0x20);
    let id = CanId::builder(PGN_TP_CM, 0x10).to_destination(0x20).build().unwrap();
    let rts = encode_rts(0x00FE00, 1786, 0, 2);
    receiver.on_frame(id, &rts);

    assert!(receiver.session_state(0x10, Role::CmReceiver).is_none());
    let sent = &receiver.driver_mut().sent;
    assert_eq!(sent.len(), 1);
    let decoded = decode_cm(&sent[0].data).unwrap();
    assert_eq!(decoded, TpCm::Abort(crate::protocol::transport::tp::codec::TpCmAbort { pgn: 0x00FE00, reason: AbortReason::TOO_LARGE }));
}

#[test]
fn second_rts_from_same_peer_is_busy() {
    let mut receiver = engine(0x20);
    let id = CanId::builder(PGN_TP_CM, 0x10).to_destination(0x20).build().unwrap();
    receiver.on_frame(id, &encode_rts(0x00FE00, 20, 3, 2));
    receiver.driver_mut().sent.clear();

    receiver.on_frame(id, &encode_rts(0x00FE00, 20, 3, 2));
    let sent = &receiver.driver_mut().sent;
    assert_eq!(sent.len(), 1);
    let decoded = decode_cm(&sent[0].data).unwrap();
    assert_eq!(
        decoded,
        TpCm::Abort(crate::protocol::transport::tp::codec::TpCmAbort { pgn: 0x00FE00, reason: AbortReason::ALREADY_IN_SESSION })
    );
}

#[test]
fn cancel_aborts_active_cm_sender_session() {
    let mut sender = engine(0x10);
    let bytes: [u8; 20] = [0; 20];
    sender.send(Some(0x20), 0x00FE00, &bytes).unwrap();
    sender.driver_mut().sent.clear();

    sender.cancel(0x20);
    assert!(sender.session_state(0x20, Role::CmSender).is_none());
    assert_eq!(sender.driver_mut().sent.len(), 1);
}
