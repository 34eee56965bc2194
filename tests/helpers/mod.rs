//! Test doubles standing in for the CAN driver, clock, network-management
//! identity, and application sink during integration tests.
use j1939_tp::protocol::transport::can_frame::CanFrame;
use j1939_tp::protocol::transport::traits::application::Application;
use j1939_tp::protocol::transport::traits::can_bus::{CanDriver, TxOutcome};
use j1939_tp::protocol::transport::traits::clock::Clock;
use j1939_tp::protocol::transport::traits::network_management::NetworkManagement;

#[allow(dead_code)]
/// Records every frame handed to it and always reports success; tests
/// drain `sent` to relay frames to the peer side of a simulated bus.
#[derive(Default)]
pub struct MockCanDriver {
    pub sent: Vec<CanFrame>,
}

impl CanDriver for MockCanDriver {
    type Error = core::convert::Infallible;

    fn try_send(&mut self, frame: &CanFrame) -> Result<TxOutcome, Self::Error> {
        self.sent.push(*frame);
        Ok(TxOutcome::Sent)
    }
}

#[allow(dead_code)]
/// A clock whose value the test advances explicitly, instead of reading
/// the wall clock.
pub struct MockClock(pub u32);

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.0
    }
}

#[allow(dead_code)]
pub struct MockNetworkManagement(pub u8);

impl NetworkManagement for MockNetworkManagement {
    fn my_address(&self) -> u8 {
        self.0
    }
}

#[allow(dead_code)]
/// Records every delivered message for later assertion.
#[derive(Default)]
pub struct MockApplication {
    pub deliveries: Vec<(u32, u8, Vec<u8>)>,
}

impl Application for MockApplication {
    fn deliver(&mut self, pgn: u32, source_address: u8, bytes: &[u8]) {
        self.deliveries.push((pgn, source_address, bytes.to_vec()));
    }
}

#[allow(dead_code)]
/// Relay frames between two engines and advance their clocks in lockstep
/// until neither produces new traffic, the way a shared CAN bus plus
/// periodic `poll` would carry a transfer to completion.
pub fn run_to_quiescence(
    a: &mut j1939_tp::Engine<MockCanDriver, MockClock, MockNetworkManagement, MockApplication>,
    b: &mut j1939_tp::Engine<MockCanDriver, MockClock, MockNetworkManagement, MockApplication>,
    start_ms: u32,
    steps: u32,
) {
    let mut t = start_ms;
    for _ in 0..steps {
        t += 10;
        *a.clock_mut() = MockClock(t);
        *b.clock_mut() = MockClock(t);
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
