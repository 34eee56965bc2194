//! J1939 protocol implementation: the Transport Protocol engine and the
//! CAN frame/identifier plumbing it sits on.
pub mod transport;
