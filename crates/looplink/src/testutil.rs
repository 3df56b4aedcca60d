//! In-process stand-ins for unit tests: a scriptable foreign context with a
//! manually advanced clock, and a recording scheduler core.

use looplink_api::{
    ContextId, Dispatch, DispatchSource, ForeignContext, ForeignError, IoEvents, RawFd,
    SchedulerCore, SourceId, WatchTag,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

struct StubWatch {
    fd: RawFd,
    condition: IoEvents,
}

struct StubInner {
    source: Option<Box<dyn DispatchSource>>,
    attached: bool,
    detached: bool,
    next_tag: u64,
    watches: FxHashMap<u64, StubWatch>,
    ready_time: i64,
}

/// Single-source foreign context whose "poll" advances a virtual clock.
pub(crate) struct StubContext {
    id: ContextId,
    owner: ThreadId,
    now: AtomicI64,
    wakeups: AtomicUsize,
    inner: Mutex<StubInner>,
}

impl StubContext {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(StubContext {
            id: ContextId::from_u64(id),
            owner: thread::current().id(),
            now: AtomicI64::new(0),
            wakeups: AtomicUsize::new(0),
            inner: Mutex::new(StubInner {
                source: None,
                attached: false,
                detached: false,
                next_tag: 1,
                watches: FxHashMap::default(),
                ready_time: -1,
            }),
        })
    }

    /// Mark a native condition on every watch for `fd`, as the foreign
    /// loop's poll would.
    pub fn set_condition(&self, fd: RawFd, condition: IoEvents) {
        let mut inner = self.inner.lock();
        for watch in inner.watches.values_mut() {
            if watch.fd == fd {
                watch.condition |= condition;
            }
        }
    }

    pub fn advance_micros(&self, by: i64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }

    pub fn native_watch_count(&self) -> usize {
        self.inner.lock().watches.len()
    }

    pub fn detached(&self) -> bool {
        self.inner.lock().detached
    }

    pub fn wakeup_count(&self) -> usize {
        self.wakeups.load(Ordering::SeqCst)
    }

    fn ready_time_due(&self) -> bool {
        let ready_time = self.inner.lock().ready_time;
        ready_time >= 0 && self.now_micros() >= ready_time
    }
}

impl ForeignContext for StubContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn now_micros(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn attach(&self, source: Box<dyn DispatchSource>) -> Result<SourceId, ForeignError> {
        let mut inner = self.inner.lock();
        if inner.attached {
            return Err(ForeignError::AttachFailed(
                "stub context supports a single source".into(),
            ));
        }
        inner.source = Some(source);
        inner.attached = true;
        inner.detached = false;
        Ok(SourceId::from_u64(1))
    }

    fn detach(&self, source: SourceId) -> Result<(), ForeignError> {
        if source.as_u64() != 1 {
            return Err(ForeignError::UnknownSource);
        }
        let mut inner = self.inner.lock();
        if !inner.attached {
            return Err(ForeignError::UnknownSource);
        }
        inner.source.take();
        inner.attached = false;
        inner.detached = true;
        Ok(())
    }

    fn add_fd_watch(
        &self,
        _source: SourceId,
        fd: RawFd,
        _interest: IoEvents,
    ) -> Result<WatchTag, ForeignError> {
        if fd < 0 {
            return Err(ForeignError::WatchFailed {
                fd,
                reason: "negative fd".into(),
            });
        }
        let mut inner = self.inner.lock();
        let tag = inner.next_tag;
        inner.next_tag += 1;
        inner.watches.insert(
            tag,
            StubWatch {
                fd,
                condition: IoEvents::NONE,
            },
        );
        Ok(WatchTag::from_u64(tag))
    }

    fn query_fd_watch(&self, tag: WatchTag) -> IoEvents {
        self.inner
            .lock()
            .watches
            .get(&tag.as_u64())
            .map(|w| w.condition)
            .unwrap_or(IoEvents::NONE)
    }

    fn remove_fd_watch(&self, tag: WatchTag) -> Result<(), ForeignError> {
        match self.inner.lock().watches.remove(&tag.as_u64()) {
            Some(_) => Ok(()),
            None => Err(ForeignError::UnknownTag),
        }
    }

    fn set_ready_time(&self, source: SourceId, ready_at_micros: i64) -> Result<(), ForeignError> {
        if source.as_u64() != 1 {
            return Err(ForeignError::UnknownSource);
        }
        self.inner.lock().ready_time = ready_at_micros;
        Ok(())
    }

    fn iterate(&self, may_block: bool) -> bool {
        // Take the source out so its callbacks may re-enter the context.
        let mut source = match self.inner.lock().source.take() {
            Some(source) => source,
            None => return false,
        };

        let (ready, wait_ms) = source.prepare(self);
        let mut dispatched = ready || self.ready_time_due() || source.check(self);

        if !dispatched && may_block {
            // Simulate the blocking poll by advancing the virtual clock to
            // the earliest of the ready-time and the prepare bound.
            let now = self.now_micros();
            let ready_time = self.inner.lock().ready_time;
            let mut target = if ready_time >= 0 {
                Some(ready_time)
            } else {
                None
            };
            if wait_ms >= 0 {
                let bound = now.saturating_add(wait_ms.saturating_mul(1000));
                target = Some(target.map_or(bound, |t| t.min(bound)));
            }
            let target = target.unwrap_or_else(|| now.saturating_add(1_000));
            if target > now {
                self.now.store(target, Ordering::SeqCst);
            }
            dispatched = self.ready_time_due() || source.check(self);
        }

        if dispatched {
            let keep = source.dispatch(self);
            // Conditions are valid for one cycle only.
            for watch in self.inner.lock().watches.values_mut() {
                watch.condition = IoEvents::NONE;
            }
            if keep == Dispatch::Remove {
                let mut inner = self.inner.lock();
                inner.attached = false;
                inner.detached = true;
                return true;
            }
        }

        let mut inner = self.inner.lock();
        // The source may have detached itself mid-dispatch.
        if inner.attached && inner.source.is_none() {
            inner.source = Some(source);
        }
        dispatched
    }

    fn wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
    }
}

type DispatchHook = Box<dyn FnMut() + Send>;

/// Scriptable scheduler core that records every dispatch step.
pub(crate) struct TestCore {
    immediate: Arc<AtomicBool>,
    deadline: Arc<Mutex<Option<i64>>>,
    dispatch_count: Arc<AtomicUsize>,
    ready_log: Arc<Mutex<Vec<Vec<(RawFd, IoEvents)>>>>,
    on_dispatch: Arc<Mutex<Option<DispatchHook>>>,
}

/// Shared control surface for a [`TestCore`] that has been moved into a host.
#[derive(Clone)]
pub(crate) struct TestCoreHandle {
    immediate: Arc<AtomicBool>,
    deadline: Arc<Mutex<Option<i64>>>,
    dispatch_count: Arc<AtomicUsize>,
    ready_log: Arc<Mutex<Vec<Vec<(RawFd, IoEvents)>>>>,
    on_dispatch: Arc<Mutex<Option<DispatchHook>>>,
}

impl TestCore {
    pub fn new() -> (TestCore, TestCoreHandle) {
        let immediate = Arc::new(AtomicBool::new(false));
        let deadline = Arc::new(Mutex::new(None));
        let dispatch_count = Arc::new(AtomicUsize::new(0));
        let ready_log = Arc::new(Mutex::new(Vec::new()));
        let on_dispatch: Arc<Mutex<Option<DispatchHook>>> = Arc::new(Mutex::new(None));
        let handle = TestCoreHandle {
            immediate: immediate.clone(),
            deadline: deadline.clone(),
            dispatch_count: dispatch_count.clone(),
            ready_log: ready_log.clone(),
            on_dispatch: on_dispatch.clone(),
        };
        (
            TestCore {
                immediate,
                deadline,
                dispatch_count,
                ready_log,
                on_dispatch,
            },
            handle,
        )
    }
}

impl SchedulerCore for TestCore {
    fn next_deadline_micros(&self) -> Option<i64> {
        *self.deadline.lock()
    }

    fn has_immediate_work(&self) -> bool {
        self.immediate.load(Ordering::SeqCst)
    }

    fn dispatch_ready(&mut self, ready: &[(RawFd, IoEvents)]) {
        self.dispatch_count.fetch_add(1, Ordering::SeqCst);
        self.ready_log.lock().push(ready.to_vec());
        if let Some(hook) = self.on_dispatch.lock().as_mut() {
            hook();
        }
    }
}

impl TestCoreHandle {
    pub fn set_immediate(&self, immediate: bool) {
        self.immediate.store(immediate, Ordering::SeqCst);
    }

    pub fn set_deadline(&self, deadline_micros: Option<i64>) {
        *self.deadline.lock() = deadline_micros;
    }

    pub fn dispatch_count(&self) -> Arc<AtomicUsize> {
        self.dispatch_count.clone()
    }

    pub fn ready_log(&self) -> Vec<Vec<(RawFd, IoEvents)>> {
        self.ready_log.lock().clone()
    }

    pub fn set_on_dispatch(&self, hook: impl FnMut() + Send + 'static) {
        *self.on_dispatch.lock() = Some(Box::new(hook));
    }
}
