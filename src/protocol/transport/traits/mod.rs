//! Abstraction traits for the engine's external collaborators: the CAN
//! controller driver, the scheduler's clock, the network-management
//! layer's address, and the application's reassembled-message sink.
pub mod application;
pub mod can_bus;
pub mod clock;
pub mod network_management;
