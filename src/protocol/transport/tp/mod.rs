//! SAE J1939-21 Transport Protocol: segmentation/reassembly of messages
//! too large for a single CAN frame, via the Broadcast Announce Message
//! (BAM) and RTS/CTS/EoMA connection-mode sub-protocols.
pub mod codec;
pub mod engine;
pub mod session;
pub mod table;
pub mod timer;
