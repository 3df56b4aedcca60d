//! Loop Policy: one scheduler host per foreign context identity
//!
//! The cache is keyed by the identity token the foreign layer itself
//! guarantees stable ([`ContextId`]), never by wrapper addresses: two wrappers
//! obtained for the same underlying context map to the same host.

use crate::error::BridgeError;
use crate::host::SchedulerHost;
use looplink_api::{ContextId, ForeignContext, SchedulerCore};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Factory and cache of scheduler hosts, at most one live host per context.
pub struct LoopPolicy {
    default_ctx: Mutex<Option<Arc<dyn ForeignContext>>>,
    hosts: Mutex<FxHashMap<ContextId, Arc<SchedulerHost>>>,
}

impl LoopPolicy {
    /// Empty policy with no ambient default context.
    pub fn new() -> Self {
        LoopPolicy {
            default_ctx: Mutex::new(None),
            hosts: Mutex::new(FxHashMap::default()),
        }
    }

    /// Configure the ambient default context used when `get_or_create` is
    /// called without an explicit one.
    pub fn set_default_context(&self, ctx: Arc<dyn ForeignContext>) {
        *self.default_ctx.lock() = Some(ctx);
    }

    /// Look up or create the host for a context.
    ///
    /// A live cached host for the same identity is reused; a closed one is
    /// evicted and replaced transparently. Creation from a thread that does
    /// not own the context fails with `WrongThread`. `make_core` runs only
    /// when a new host is actually created.
    pub fn get_or_create<F>(
        &self,
        ctx: Option<Arc<dyn ForeignContext>>,
        make_core: F,
    ) -> Result<Arc<SchedulerHost>, BridgeError>
    where
        F: FnOnce() -> Box<dyn SchedulerCore>,
    {
        let ctx = match ctx {
            Some(ctx) => ctx,
            None => self
                .default_ctx
                .lock()
                .clone()
                .ok_or(BridgeError::Unsupported("no ambient default context"))?,
        };
        let id = ctx.id();

        let mut hosts = self.hosts.lock();
        if let Some(host) = hosts.get(&id) {
            if !host.is_closed() {
                return Ok(host.clone());
            }
            hosts.remove(&id);
        }

        if !ctx.is_owner() {
            return Err(BridgeError::WrongThread);
        }
        let host = SchedulerHost::new(ctx, make_core())?;
        hosts.insert(id, host.clone());
        Ok(host)
    }

    /// Assigning a host to an identified context is unsupported: identity is
    /// derived from the foreign context, never assigned to it.
    pub fn set_host(&self, _host: Arc<SchedulerHost>) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(
            "context identity is derived, not assigned",
        ))
    }

    /// Drop a host from the cache (after close); missing entries are fine.
    pub fn evict(&self, id: ContextId) {
        self.hosts.lock().remove(&id);
    }
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_POLICY: Lazy<LoopPolicy> = Lazy::new(LoopPolicy::new);

/// Process-wide policy instance.
pub fn default_policy() -> &'static LoopPolicy {
    &DEFAULT_POLICY
}

/// Create (or reuse) the host for `ctx` through the process-wide policy.
///
/// With `None`, the policy's ambient default context is used. Fails with
/// `WrongThread` when called off the context's designated thread.
pub fn create(
    ctx: Option<Arc<dyn ForeignContext>>,
    core: Box<dyn SchedulerCore>,
) -> Result<Arc<SchedulerHost>, BridgeError> {
    default_policy().get_or_create(ctx, || core)
}
