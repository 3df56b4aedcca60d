//! Cross-thread wake signal
//!
//! Generalized self-pipe: any thread may signal it, it wakes the owner's
//! blocked drive call through the foreign loop's wakeup primitive, and
//! concurrent signals coalesce into at most one extra wakeup. It never runs
//! callbacks on the signalling thread.

use crate::source::SourceShared;
use looplink_api::ForeignContext;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Cloneable handle used to honor the wakeup-on-schedule contract.
///
/// Call [`signal`](WakeHandle::signal) whenever new immediate work is
/// enqueued, or a timer earlier than the projected wake time is scheduled,
/// and the driving thread may be blocked inside the foreign loop.
#[derive(Clone)]
pub struct WakeHandle {
    shared: Arc<SourceShared>,
    ctx: Arc<dyn ForeignContext>,
}

impl WakeHandle {
    pub(crate) fn new(shared: Arc<SourceShared>, ctx: Arc<dyn ForeignContext>) -> Self {
        WakeHandle { shared, ctx }
    }

    /// Request a wakeup of the blocked drive call.
    ///
    /// Safe from any thread. Signals arriving while one is already pending
    /// coalesce; the pending flag is consumed by the next dispatch cycle.
    pub fn signal(&self) {
        if !self.shared.wake_pending.swap(true, Ordering::AcqRel) {
            self.ctx.wakeup();
        }
    }

    /// True if a wake request is pending and not yet consumed.
    pub fn is_pending(&self) -> bool {
        self.shared.wake_pending.load(Ordering::Acquire)
    }
}
