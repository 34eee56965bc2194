//! J1939 transport layer: raw CAN frame/identifier representation, the
//! Transport Protocol (BAM / RTS-CTS-EoMA) engine, and the collaborator
//! traits it is built against.

pub mod can_frame;
pub mod can_id;
pub mod tp;
pub mod traits;
