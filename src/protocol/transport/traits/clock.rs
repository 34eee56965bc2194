//! Abstraction over the scheduler/task runtime's monotonic tick (out of
//! scope: the engine never sleeps or schedules, it only compares its own
//! armed deadlines against whatever `now_ms` the caller supplies).

/// A monotonic, wrapping, millisecond-resolution clock.
///
/// The engine arms `Session::deadline` using `now_ms()` at the moment a
/// session is created or an event is handled, and later compares those
/// deadlines against the `now_ms` argument passed into
/// [`Engine::poll`](crate::protocol::transport::tp::engine::Engine::poll).
pub trait Clock {
    /// Current time since an arbitrary epoch, in milliseconds. Wraps at
    /// `u32::MAX` like a free-running hardware timer; see
    /// [`tp::timer::is_due`](crate::protocol::transport::tp::timer::is_due)
    /// for the wraparound-safe comparison this implies downstream.
    fn now_ms(&self) -> u32;
}
