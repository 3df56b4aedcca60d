//! Foreign main loop contract
//!
//! The traits here describe what the bridge needs from an already-existing
//! event-dispatch runtime: a stable identity, monotonic time, per-fd watches
//! handed back as opaque tags, attachable dispatch sources with a ready-time,
//! a single iteration primitive, and a thread-safe wakeup.

use crate::events::IoEvents;
use crate::RawFd;
use thiserror::Error;

/// Stable identity of a foreign loop context.
///
/// Minted by the foreign layer itself (a registration id or handle equality
/// token), never derived from wrapper addresses: two wrappers for the same
/// underlying context must report the same id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Wrap a foreign-provided stable identity value.
    pub fn from_u64(id: u64) -> Self {
        ContextId(id)
    }

    /// Get the numeric identity value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Handle for a dispatch source attached to a foreign context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Wrap a foreign-provided source handle value.
    pub fn from_u64(id: u64) -> Self {
        SourceId(id)
    }

    /// Get the numeric handle value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Opaque per-fd watch handle returned by [`ForeignContext::add_fd_watch`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct WatchTag(u64);

impl WatchTag {
    /// Wrap a foreign-provided watch tag value.
    pub fn from_u64(tag: u64) -> Self {
        WatchTag(tag)
    }

    /// Get the numeric tag value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Errors surfaced by the foreign loop's own API.
///
/// These are never silently retried; the bridge propagates them to the caller
/// of the failing operation.
#[derive(Debug, Error)]
pub enum ForeignError {
    /// Attaching a dispatch source to the context failed.
    #[error("failed to attach dispatch source: {0}")]
    AttachFailed(String),

    /// Detaching a dispatch source failed.
    #[error("failed to detach dispatch source: {0}")]
    DetachFailed(String),

    /// The native watch registration rejected the fd.
    #[error("failed to watch fd {fd}: {reason}")]
    WatchFailed {
        /// The fd passed to the native registration.
        fd: RawFd,
        /// Foreign-reported reason.
        reason: String,
    },

    /// A watch tag was not recognized by the context.
    #[error("unknown watch tag")]
    UnknownTag,

    /// An unknown source handle was passed to the context.
    #[error("unknown source handle")]
    UnknownSource,
}

/// Whether a dispatched source stays attached.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Keep the source attached for further cycles.
    Continue,
    /// Remove the source after this dispatch.
    Remove,
}

/// A dispatchable unit the foreign loop invokes once per cycle it judges ready.
///
/// The cycle mirrors the classic prepare/check/dispatch protocol: `prepare`
/// runs before the loop blocks and contributes an upper bound on how long it
/// may sleep, `check` runs after the loop's poll to decide readiness from
/// observed conditions, and `dispatch` runs the source's work.
pub trait DispatchSource: Send {
    /// Called before the loop blocks.
    ///
    /// Returns `(ready, max_wait_ms)`: `ready` short-circuits the block
    /// entirely, `max_wait_ms` bounds the sleep (`-1` for unbounded, `0` for
    /// a non-blocking pass).
    fn prepare(&mut self, ctx: &dyn ForeignContext) -> (bool, i64);

    /// Called after the loop's poll; returns whether `dispatch` should run.
    fn check(&mut self, ctx: &dyn ForeignContext) -> bool;

    /// Run the source's work for this cycle.
    fn dispatch(&mut self, ctx: &dyn ForeignContext) -> Dispatch;
}

/// The consumed contract of a foreign event loop context.
///
/// All methods take `&self`; implementations wrap their engine's handles with
/// whatever interior mutability that engine requires. Only [`wakeup`] and
/// time/identity queries may be called from threads other than the context's
/// designated owner.
///
/// [`wakeup`]: ForeignContext::wakeup
pub trait ForeignContext: Send + Sync {
    /// Stable identity of this context.
    fn id(&self) -> ContextId;

    /// True if the calling thread is the context's designated owner thread.
    fn is_owner(&self) -> bool;

    /// Monotonic time in microseconds, on the foreign loop's own clock.
    fn now_micros(&self) -> i64;

    /// Attach a dispatch source; it participates in every subsequent cycle.
    fn attach(&self, source: Box<dyn DispatchSource>) -> Result<SourceId, ForeignError>;

    /// Detach a previously attached source. Idempotent detach is not
    /// required of the foreign layer; callers must detach at most once.
    fn detach(&self, source: SourceId) -> Result<(), ForeignError>;

    /// Start watching `fd` for `interest` on behalf of `source`.
    fn add_fd_watch(
        &self,
        source: SourceId,
        fd: RawFd,
        interest: IoEvents,
    ) -> Result<WatchTag, ForeignError>;

    /// Conditions observed for a watch during the current cycle's poll.
    ///
    /// Valid only between the loop's poll and the end of dispatch; outside a
    /// cycle the result is empty.
    fn query_fd_watch(&self, tag: WatchTag) -> IoEvents;

    /// Remove a watch. Safe to call while the loop is mid-dispatch.
    fn remove_fd_watch(&self, tag: WatchTag) -> Result<(), ForeignError>;

    /// Set the absolute monotonic time (microseconds) at which `source`
    /// becomes ready regardless of fd conditions; `-1` clears the deadline.
    fn set_ready_time(&self, source: SourceId, ready_at_micros: i64) -> Result<(), ForeignError>;

    /// Run one loop cycle: prepare, poll (blocking only if `may_block`),
    /// check, dispatch. Returns true if any source was dispatched.
    fn iterate(&self, may_block: bool) -> bool;

    /// Interrupt a blocking [`iterate`] from any thread.
    ///
    /// Must be safe to call concurrently and repeatedly; it only wakes the
    /// owner, it never runs callbacks on the calling thread.
    ///
    /// [`iterate`]: ForeignContext::iterate
    fn wakeup(&self);
}
