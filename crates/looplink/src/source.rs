//! Readiness Source: the dispatchable unit installed in the foreign loop
//!
//! Each cycle the foreign loop judges the source ready (fd conditions, elapsed
//! ready-time, or a pending wake), `dispatch` derives per-fd I/O conditions
//! from the native watch tags into the cycle's readiness set. In installed
//! mode the source also runs the hosted scheduler's dispatch step; in bridged
//! mode it only gathers and lets the blocked `wait` call return.

use looplink_api::{
    Dispatch, DispatchSource, ForeignContext, IoEvents, RawFd, SchedulerCore, WatchTag,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-fd registration owned by the Selector Bridge.
pub(crate) struct FdWatch {
    /// Requested interest (non-empty subset of readable/writable).
    pub interest: IoEvents,
    /// Opaque handle from the foreign loop's native watch registration.
    pub tag: WatchTag,
}

/// Who is the top-level driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DriveMode {
    /// The scheduler drives: `SelectorBridge::wait` runs the foreign loop.
    Bridged,
    /// The foreign loop drives: the source runs the scheduler's step itself.
    Installed,
}

/// Watch table and per-cycle readiness, mutated only by the owner thread
/// during its drive cycle.
pub(crate) struct SourceState {
    pub watches: FxHashMap<RawFd, FdWatch>,
    pub readiness: FxHashMap<RawFd, IoEvents>,
    pub mode: DriveMode,
}

/// State shared between the bridge, the host, the wake handle, and the
/// attached source.
pub(crate) struct SourceShared {
    pub state: Mutex<SourceState>,
    /// Hosted scheduler, present once a host owns this source. Kept outside
    /// `state` so scheduler callbacks may re-enter the bridge.
    pub core: Mutex<Option<Box<dyn SchedulerCore>>>,
    /// Coalesced cross-thread wake request.
    pub wake_pending: AtomicBool,
    /// Set by `dispatch`; consumed by the blocked `wait` loop.
    pub cycle_done: AtomicBool,
    /// Re-entrancy guard: true while the source is mid-dispatch.
    pub in_dispatch: AtomicBool,
    /// Set when the owning bridge closes; a core out for dispatch is not
    /// restored afterwards.
    pub closed: AtomicBool,
}

impl SourceShared {
    pub fn new() -> Arc<Self> {
        Arc::new(SourceShared {
            state: Mutex::new(SourceState {
                watches: FxHashMap::default(),
                readiness: FxHashMap::default(),
                mode: DriveMode::Bridged,
            }),
            core: Mutex::new(None),
            wake_pending: AtomicBool::new(false),
            cycle_done: AtomicBool::new(false),
            in_dispatch: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Snapshot the readiness known so far, masked by each fd's interest.
    pub fn known_ready(&self) -> Vec<(RawFd, IoEvents)> {
        let state = self.state.lock();
        let mut ready = Vec::new();
        for (fd, events) in &state.readiness {
            if let Some(watch) = state.watches.get(fd) {
                let masked = *events & watch.interest;
                if !masked.is_empty() {
                    ready.push((*fd, masked));
                }
            }
        }
        ready
    }
}

/// Bounded wait the foreign loop may sleep before the scheduler needs to run,
/// in milliseconds rounded up to the loop's native precision. `0` means run
/// now, `-1` means unbounded.
pub(crate) fn next_wait_ms(immediate: bool, deadline_micros: Option<i64>, now_micros: i64) -> i64 {
    if immediate {
        return 0;
    }
    match deadline_micros {
        Some(deadline) => {
            let delta = deadline.saturating_sub(now_micros);
            if delta <= 0 {
                0
            } else {
                (delta + 999) / 1000
            }
        }
        None => -1,
    }
}

/// The dispatchable unit attached to the foreign context.
pub(crate) struct ReadinessSource {
    shared: Arc<SourceShared>,
}

impl ReadinessSource {
    pub fn new(shared: Arc<SourceShared>) -> Self {
        ReadinessSource { shared }
    }

    fn deadline_due(&self, ctx: &dyn ForeignContext) -> bool {
        let core = self.shared.core.lock();
        match core.as_ref() {
            Some(core) => {
                core.has_immediate_work()
                    || core
                        .next_deadline_micros()
                        .is_some_and(|d| d <= ctx.now_micros())
            }
            None => false,
        }
    }
}

impl DispatchSource for ReadinessSource {
    fn prepare(&mut self, ctx: &dyn ForeignContext) -> (bool, i64) {
        if self.shared.wake_pending.load(Ordering::Acquire) {
            return (true, 0);
        }
        let mode = self.shared.state.lock().mode;
        if mode == DriveMode::Installed {
            let core = self.shared.core.lock();
            if let Some(core) = core.as_ref() {
                let wait = next_wait_ms(
                    core.has_immediate_work(),
                    core.next_deadline_micros(),
                    ctx.now_micros(),
                );
                return (wait == 0, wait);
            }
        }
        // Bridged mode: the wait deadline travels via the source ready-time.
        (false, -1)
    }

    fn check(&mut self, ctx: &dyn ForeignContext) -> bool {
        if self.shared.wake_pending.load(Ordering::Acquire) {
            return true;
        }
        let mode = {
            let state = self.shared.state.lock();
            for watch in state.watches.values() {
                if !(ctx.query_fd_watch(watch.tag) & watch.interest).is_empty() {
                    return true;
                }
            }
            state.mode
        };
        mode == DriveMode::Installed && self.deadline_due(ctx)
    }

    fn dispatch(&mut self, ctx: &dyn ForeignContext) -> Dispatch {
        self.shared.in_dispatch.store(true, Ordering::Release);
        self.shared.wake_pending.store(false, Ordering::Release);

        // Derive per-fd conditions from the native tags into this cycle's set.
        let mode = {
            let mut state = self.shared.state.lock();
            let SourceState {
                watches, readiness, ..
            } = &mut *state;
            for (fd, watch) in watches.iter() {
                let condition = ctx.query_fd_watch(watch.tag);
                if !condition.is_empty() {
                    let entry = readiness.entry(*fd).or_insert(IoEvents::NONE);
                    *entry |= condition;
                }
            }
            state.mode
        };

        self.shared.cycle_done.store(true, Ordering::Release);

        if mode == DriveMode::Installed {
            let ready = self.shared.known_ready();
            // The core leaves the lock for the step so its callbacks may
            // re-enter the host, close included.
            let core = self.shared.core.lock().take();
            if let Some(mut core) = core {
                core.dispatch_ready(&ready);
                let mut slot = self.shared.core.lock();
                if slot.is_none() && !self.shared.closed.load(Ordering::Acquire) {
                    *slot = Some(core);
                }
            }
            // The readiness set never outlives one dispatch cycle.
            self.shared.state.lock().readiness.clear();
        }

        self.shared.in_dispatch.store(false, Ordering::Release);
        Dispatch::Continue
    }
}
