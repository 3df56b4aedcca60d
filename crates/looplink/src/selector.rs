//! Selector Bridge: the readiness-polling backend expected by the scheduler
//!
//! Implements the register/unregister/wait contract by translating into
//! foreign-loop primitives: fd interest becomes a native watch, the wait
//! deadline becomes the attached source's ready-time, and blocking happens
//! only inside the foreign loop's own iteration.

use crate::error::BridgeError;
use crate::source::{DriveMode, FdWatch, ReadinessSource, SourceShared};
use looplink_api::{ForeignContext, IoEvents, RawFd, SourceId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Readiness multiplexer backed by a foreign loop context.
///
/// Owns the watch table; created with an attached [`ReadinessSource`] whose
/// dispatch gathers per-fd conditions. All methods except construction must be
/// called from the context's owner thread.
pub struct SelectorBridge {
    ctx: Arc<dyn ForeignContext>,
    shared: Arc<SourceShared>,
    source_id: SourceId,
    closed: bool,
}

impl SelectorBridge {
    /// Attach a readiness source to `ctx` and return the bridge around it.
    pub fn new(ctx: Arc<dyn ForeignContext>) -> Result<Self, BridgeError> {
        let shared = SourceShared::new();
        let source = ReadinessSource::new(shared.clone());
        let source_id = ctx.attach(Box::new(source))?;
        Ok(SelectorBridge {
            ctx,
            shared,
            source_id,
            closed: false,
        })
    }

    /// Shared source state, for the host that embeds this bridge.
    pub(crate) fn shared(&self) -> Arc<SourceShared> {
        self.shared.clone()
    }

    /// Number of registered fds.
    pub fn watch_count(&self) -> usize {
        self.shared.state.lock().watches.len()
    }

    /// True if `fd` currently has a watch.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.shared.state.lock().watches.contains_key(&fd)
    }

    /// Start watching `fd` for `interest`.
    ///
    /// `interest` must be a non-empty subset of readable/writable. The native
    /// watch is created before the local record, so a foreign failure leaves
    /// the table untouched.
    pub fn register(&mut self, fd: RawFd, interest: IoEvents) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::ClosedLoop);
        }
        if interest.is_empty() {
            return Err(BridgeError::InvalidInterest(fd));
        }
        if self.shared.state.lock().watches.contains_key(&fd) {
            return Err(BridgeError::DuplicateRegistration(fd));
        }
        let tag = self.ctx.add_fd_watch(self.source_id, fd, interest)?;
        self.shared
            .state
            .lock()
            .watches
            .insert(fd, FdWatch { interest, tag });
        Ok(())
    }

    /// Stop watching `fd`.
    ///
    /// Removes the native watch first, then the local record. Safe to call
    /// while the foreign loop is mid-dispatch.
    pub fn unregister(&mut self, fd: RawFd) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::ClosedLoop);
        }
        let tag = match self.shared.state.lock().watches.get(&fd) {
            Some(watch) => watch.tag,
            None => return Err(BridgeError::NotRegistered(fd)),
        };
        self.ctx.remove_fd_watch(tag)?;
        let mut state = self.shared.state.lock();
        state.watches.remove(&fd);
        state.readiness.remove(&fd);
        Ok(())
    }

    /// Block until a watched fd is ready or new work arrives, bounded by
    /// `timeout`.
    ///
    /// - `Some(0)`: one non-blocking pass over the foreign loop's pending
    ///   work, returning whatever readiness that pass discovered.
    /// - `None`: block until readiness or a wake signal.
    /// - `Some(t)`: block at most `t` on the foreign loop's monotonic clock;
    ///   returns an empty set at the deadline.
    ///
    /// The readiness set is cleared on entry and repopulated only from this
    /// call's foreign-loop activity. If called from inside a dispatch
    /// callback, returns the readiness already known for the current cycle
    /// without blocking the same context recursively. The drive mode in force
    /// on entry is restored on return, so an installed source resumes running
    /// the scheduler step afterwards.
    pub fn wait(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<(RawFd, IoEvents)>, BridgeError> {
        if self.closed {
            return Err(BridgeError::ClosedLoop);
        }
        if self.shared.in_dispatch.load(Ordering::Acquire) {
            return Ok(self.shared.known_ready());
        }

        // Gather in bridged mode for the duration of this call only.
        let prev_mode = {
            let mut state = self.shared.state.lock();
            state.readiness.clear();
            std::mem::replace(&mut state.mode, DriveMode::Bridged)
        };
        self.shared.cycle_done.store(false, Ordering::Release);

        let result = self.drive_cycles(timeout);
        self.shared.state.lock().mode = prev_mode;
        result?;

        let ready = self.shared.known_ready();
        self.shared.state.lock().readiness.clear();
        Ok(ready)
    }

    fn drive_cycles(&mut self, timeout: Option<Duration>) -> Result<(), BridgeError> {
        match timeout {
            Some(t) if t.is_zero() => {
                self.ctx.set_ready_time(self.source_id, -1)?;
                self.ctx.iterate(false);
            }
            Some(t) => {
                let micros = i64::try_from(t.as_micros()).unwrap_or(i64::MAX);
                let deadline = self.ctx.now_micros().saturating_add(micros);
                self.ctx.set_ready_time(self.source_id, deadline)?;
                while !self.shared.cycle_done.load(Ordering::Acquire) {
                    self.ctx.iterate(true);
                    if self.ctx.now_micros() >= deadline {
                        break;
                    }
                }
                self.ctx.set_ready_time(self.source_id, -1)?;
            }
            None => {
                self.ctx.set_ready_time(self.source_id, -1)?;
                while !self.shared.cycle_done.load(Ordering::Acquire) {
                    self.ctx.iterate(true);
                }
            }
        }
        Ok(())
    }

    /// True once [`close`](SelectorBridge::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Remove every native watch and detach the source. Idempotent; never
    /// fails, foreign removal errors during teardown are dropped.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.closed.store(true, Ordering::Release);

        let watches: Vec<_> = {
            let mut state = self.shared.state.lock();
            state.readiness.clear();
            state.watches.drain().map(|(_, w)| w.tag).collect()
        };
        for tag in watches {
            let _ = self.ctx.remove_fd_watch(tag);
        }
        let _ = self.ctx.detach(self.source_id);
    }
}

impl Drop for SelectorBridge {
    fn drop(&mut self) {
        self.close();
    }
}
