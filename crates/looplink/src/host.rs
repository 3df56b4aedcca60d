//! Scheduler Host: the hosted cooperative scheduler and its drive modes
//!
//! The host composes a [`SchedulerCore`] with a [`SelectorBridge`] instead of
//! subclassing anything: the core answers deadline/work queries, the bridge is
//! the pluggable wait strategy.
//!
//! Two drive modes:
//! - `run()` (scheduler-drives-loop): the host is the top-level driver and
//!   blocks in the bridge's `wait` with a timeout derived from the core.
//! - `install()` (loop-drives-scheduler): the foreign loop is the top-level
//!   driver; the readiness source runs the core's dispatch step whenever a
//!   watched fd is ready, the core's deadline elapses, or a wake is pending.

use crate::error::BridgeError;
use crate::selector::SelectorBridge;
use crate::source::{DriveMode, SourceShared};
use crate::wake::WakeHandle;
use looplink_api::{ContextId, ForeignContext, IoEvents, RawFd, SchedulerCore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a scheduler host.
///
/// `Created → Running ⇄ Idle → Stopped → Closed`; `Closed` is terminal and
/// `Stopped → Running` is permitted by re-entering the drive call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HostState {
    /// Constructed, never driven.
    Created,
    /// Driving, or installed in the foreign loop.
    Running,
    /// Blocked in the bridge's `wait`.
    Idle,
    /// Drive call returned (or the source was uninstalled).
    Stopped,
    /// Closed; every further operation fails with `ClosedLoop`.
    Closed,
}

/// A cooperative scheduler adapted to run atop one foreign loop context.
pub struct SchedulerHost {
    ctx: Arc<dyn ForeignContext>,
    bridge: Mutex<SelectorBridge>,
    shared: Arc<SourceShared>,
    state: Mutex<HostState>,
    stop_requested: AtomicBool,
    wake: WakeHandle,
}

impl SchedulerHost {
    /// Create a host for `ctx` driving `core`.
    ///
    /// Fails with `WrongThread` unless called from the context's designated
    /// owner thread.
    pub fn new(
        ctx: Arc<dyn ForeignContext>,
        core: Box<dyn SchedulerCore>,
    ) -> Result<Arc<Self>, BridgeError> {
        if !ctx.is_owner() {
            return Err(BridgeError::WrongThread);
        }
        let bridge = SelectorBridge::new(ctx.clone())?;
        let shared = bridge.shared();
        *shared.core.lock() = Some(core);
        let wake = WakeHandle::new(shared.clone(), ctx.clone());
        Ok(Arc::new(SchedulerHost {
            ctx,
            bridge: Mutex::new(bridge),
            shared,
            state: Mutex::new(HostState::Created),
            stop_requested: AtomicBool::new(false),
            wake,
        }))
    }

    /// Identity of the foreign context this host is bound to.
    pub fn context_id(&self) -> ContextId {
        self.ctx.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HostState {
        *self.state.lock()
    }

    /// True once [`close`](SchedulerHost::close) has run.
    pub fn is_closed(&self) -> bool {
        self.state() == HostState::Closed
    }

    /// Handle for the wakeup-on-schedule contract; cloneable, any thread.
    pub fn wake_handle(&self) -> WakeHandle {
        self.wake.clone()
    }

    fn ensure_owner(&self) -> Result<(), BridgeError> {
        if !self.ctx.is_owner() {
            return Err(BridgeError::WrongThread);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::ClosedLoop);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Readiness-multiplexer surface (drop-in I/O backend, owner thread)
    // ------------------------------------------------------------------

    /// Register `fd` with the underlying bridge.
    pub fn register(&self, fd: RawFd, interest: IoEvents) -> Result<(), BridgeError> {
        self.ensure_open()?;
        self.bridge.lock().register(fd, interest)
    }

    /// Unregister `fd` from the underlying bridge.
    pub fn unregister(&self, fd: RawFd) -> Result<(), BridgeError> {
        self.ensure_open()?;
        self.bridge.lock().unregister(fd)
    }

    /// One bridge wait outside the drive loop (owner thread only).
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<(RawFd, IoEvents)>, BridgeError> {
        self.ensure_open()?;
        self.ensure_owner()?;
        self.bridge.lock().wait(timeout)
    }

    /// Number of fds currently watched.
    pub fn watch_count(&self) -> usize {
        self.bridge.lock().watch_count()
    }

    // ------------------------------------------------------------------
    // Mode A: scheduler-drives-loop
    // ------------------------------------------------------------------

    /// Drive the scheduler until [`stop`](SchedulerHost::stop).
    ///
    /// Each cycle: derive the bounded wait from the core (zero if immediate
    /// work is ready, earliest-deadline delta clamped to zero, unbounded if
    /// neither), block in the bridge, then run the core's dispatch step with
    /// the readiness gathered during that wait.
    pub fn run(&self) -> Result<(), BridgeError> {
        self.ensure_owner()?;
        {
            let mut state = self.state.lock();
            match *state {
                HostState::Closed => return Err(BridgeError::ClosedLoop),
                HostState::Running | HostState::Idle => return Err(BridgeError::AlreadyRunning),
                HostState::Created | HostState::Stopped => *state = HostState::Running,
            }
        }
        self.stop_requested.store(false, Ordering::Release);

        let result = self.drive();

        let mut state = self.state.lock();
        if *state != HostState::Closed {
            *state = HostState::Stopped;
        }
        result
    }

    fn drive(&self) -> Result<(), BridgeError> {
        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                return Ok(());
            }
            let timeout = self.projected_wait();

            *self.state.lock() = HostState::Idle;
            let ready = self.bridge.lock().wait(timeout);
            *self.state.lock() = HostState::Running;
            let ready = ready?;

            if self.stop_requested.load(Ordering::Acquire) {
                return Ok(());
            }
            // The core steps outside its lock so the callback may re-enter
            // the host, close included; a core removed by close stays gone.
            let core = self.shared.core.lock().take();
            if let Some(mut core) = core {
                core.dispatch_ready(&ready);
                let mut slot = self.shared.core.lock();
                if slot.is_none() && !self.shared.closed.load(Ordering::Acquire) {
                    *slot = Some(core);
                }
            }
        }
    }

    /// Bounded wait for the next cycle, from the core's queries. A deadline
    /// already in the past clamps to zero rather than erroring.
    fn projected_wait(&self) -> Option<Duration> {
        let core = self.shared.core.lock();
        let core = match core.as_ref() {
            Some(core) => core,
            None => return Some(Duration::ZERO),
        };
        if core.has_immediate_work() {
            return Some(Duration::ZERO);
        }
        core.next_deadline_micros().map(|deadline| {
            let delta = deadline.saturating_sub(self.ctx.now_micros());
            Duration::from_micros(delta.max(0) as u64)
        })
    }

    /// Request the drive call to return. Idempotent, callable from any
    /// thread; it only flags and wakes, it never runs callbacks here.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.signal();
    }

    // ------------------------------------------------------------------
    // Mode B: loop-drives-scheduler
    // ------------------------------------------------------------------

    /// Hand the drive role to the foreign loop.
    ///
    /// The readiness source starts running the core's dispatch step from
    /// inside the loop's cycles; the host reports `Running` until
    /// [`uninstall`](SchedulerHost::uninstall) or close.
    pub fn install(&self) -> Result<(), BridgeError> {
        self.ensure_owner()?;
        let mut state = self.state.lock();
        match *state {
            HostState::Closed => Err(BridgeError::ClosedLoop),
            HostState::Running | HostState::Idle => Err(BridgeError::AlreadyRunning),
            HostState::Created | HostState::Stopped => {
                self.shared.state.lock().mode = DriveMode::Installed;
                *state = HostState::Running;
                Ok(())
            }
        }
    }

    /// Take the drive role back from the foreign loop.
    pub fn uninstall(&self) -> Result<(), BridgeError> {
        self.ensure_owner()?;
        let mut state = self.state.lock();
        if *state == HostState::Closed {
            return Err(BridgeError::ClosedLoop);
        }
        self.shared.state.lock().mode = DriveMode::Bridged;
        if *state == HostState::Running || *state == HostState::Idle {
            *state = HostState::Stopped;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Close the host: stop driving, drop the core, remove every native
    /// watch, detach the source. Idempotent; never fails.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == HostState::Closed {
                return;
            }
            *state = HostState::Closed;
        }
        self.stop_requested.store(true, Ordering::Release);
        self.shared.state.lock().mode = DriveMode::Bridged;
        self.shared.core.lock().take();
        self.bridge.lock().close();
    }
}

impl Drop for SchedulerHost {
    fn drop(&mut self) {
        self.close();
    }
}
