//! Looplink API - contracts between a cooperative scheduler and a foreign main loop
//!
//! This crate provides the minimal types and traits needed to adapt a foreign
//! event-dispatch runtime (one that owns the process's I/O multiplexing and
//! timer dispatch) without depending on the full `looplink` bridge:
//!
//! - [`ForeignContext`]: the consumed contract of the foreign loop (monotonic
//!   time, fd watches, dispatchable sources, iteration, cross-thread wakeup).
//! - [`DispatchSource`]: a unit the foreign loop invokes once per cycle it
//!   judges ready (prepare / check / dispatch).
//! - [`SchedulerCore`]: the query contract of the cooperative scheduler being
//!   hosted (earliest deadline, immediate-work flag, the dispatch step).
//! - [`IoEvents`]: the read/write interest and condition mask shared by both
//!   sides.
//!
//! The foreign runtime itself is never reimplemented here; implementations of
//! [`ForeignContext`] wrap a real dispatch engine and hand it to the bridge.

#![warn(missing_docs)]

mod events;
mod foreign;
mod scheduler;

pub use events::IoEvents;
pub use foreign::{
    ContextId, Dispatch, DispatchSource, ForeignContext, ForeignError, SourceId, WatchTag,
};
pub use scheduler::SchedulerCore;

/// Raw file descriptor type used throughout the watch contracts.
pub type RawFd = std::os::fd::RawFd;
