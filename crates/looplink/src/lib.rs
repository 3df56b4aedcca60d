//! Looplink - run a cooperative task scheduler on top of a foreign event loop
//!
//! A foreign event-dispatch runtime (one that owns the process's I/O
//! multiplexing and timer dispatch) and a generic cooperative scheduler each
//! assume they decide who blocks and who wakes whom. This crate reconciles
//! the two without busy-looping, double-dispatching, or deadlocking:
//!
//! - [`SelectorBridge`]: the readiness-polling backend the scheduler expects
//!   (register/unregister fd interest, block with a bounded timeout),
//!   translated into foreign-loop watches and iterations.
//! - [`SchedulerHost`]: the hosted scheduler plus its drive glue. Either the
//!   scheduler drives the loop (`run`) or the loop drives the scheduler
//!   (`install`, the canonical mode).
//! - [`WakeHandle`]: the cross-thread wake signal honoring the
//!   wakeup-on-schedule contract when work is enqueued while the driver is
//!   blocked.
//! - [`LoopPolicy`]: one host per foreign context identity, with owner-thread
//!   enforcement.
//!
//! The foreign runtime is consumed through the contracts in [`looplink_api`];
//! it is never reimplemented here.
//!
//! # Example
//!
//! ```rust,ignore
//! use looplink::{create, HostState};
//!
//! let host = create(None, Box::new(my_scheduler))?;
//! host.register(listener_fd, looplink::IoEvents::READABLE)?;
//! host.install()?;            // the foreign loop now drives the scheduler
//! foreign_loop.run();         // dispatches callbacks and timers as they fall due
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod error;
mod host;
mod policy;
mod selector;
mod source;
mod wake;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::BridgeError;
pub use host::{HostState, SchedulerHost};
pub use policy::{create, default_policy, LoopPolicy};
pub use selector::SelectorBridge;
pub use wake::WakeHandle;

pub use looplink_api::{
    ContextId, Dispatch, DispatchSource, ForeignContext, ForeignError, IoEvents, RawFd,
    SchedulerCore, SourceId, WatchTag,
};
