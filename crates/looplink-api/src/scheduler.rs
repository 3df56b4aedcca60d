//! Query contract of the hosted cooperative scheduler
//!
//! The bridge never subclasses or reimplements the scheduler; it consumes this
//! minimal seam and drives it with a pluggable wait strategy.

use crate::events::IoEvents;
use crate::RawFd;

/// The cooperative task/timer scheduler being adapted to run atop a foreign
/// loop.
///
/// Deadlines use the same monotonic microsecond timebase as
/// [`ForeignContext::now_micros`](crate::ForeignContext::now_micros).
pub trait SchedulerCore: Send {
    /// Earliest pending timer deadline, if any timer is queued.
    fn next_deadline_micros(&self) -> Option<i64>;

    /// True if a callback is ready to run right now (no wait needed).
    fn has_immediate_work(&self) -> bool;

    /// Run ready callbacks and expired timers for one cycle.
    ///
    /// `ready` is the readiness set gathered during this cycle: each watched
    /// fd whose observed conditions intersect its requested interest, with
    /// that intersection. Timers must expire in non-decreasing deadline
    /// order, ties broken by enqueue order.
    fn dispatch_ready(&mut self, ready: &[(RawFd, IoEvents)]);
}
