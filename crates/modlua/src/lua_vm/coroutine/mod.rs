//! Coroutine scheduler.
//!
//! Every coroutine runs its body on a native worker borrowed from a
//! [`ThreadPool`]. Control moves between the resumer and the coroutine by a
//! synchronous rendezvous on the coroutine's state mutex:
//!
//! * `resume` moves the thread from `Suspended` to `Running`, posts the
//!   arguments and blocks until the coroutine posts a reply;
//! * `yield` posts the reply, marks the thread `Suspended` and blocks until
//!   the next arguments arrive (or the thread is aborted).
//!
//! A resume that does not observe `Suspended` is rejected, so at most one
//! resumer (and one worker) drives a coroutine at any instant.

mod thread_pool;
mod worker;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, trace, warn};

pub use thread_pool::ThreadPool;

use crate::lua_value::{CoroutineStatus, LuaFunction, LuaThread, LuaValue, MultiValue, ThreadHandle};
use crate::lua_vm::{LuaError, LuaResult, LuaSettings, LuaState, LuaVM};

enum ThreadKind {
    Main,
    Coroutine(LuaFunction),
}

struct CoroutineState {
    status: CoroutineStatus,
    started: bool,
    abort: bool,
    /// Arguments posted by the resumer, consumed by the coroutine.
    to_thread: Option<MultiValue>,
    /// Yielded values or the final outcome, consumed by the resumer.
    to_resumer: Option<LuaResult<MultiValue>>,
}

/// Shared state of one logical thread.
pub struct ThreadCore {
    id: u64,
    kind: ThreadKind,
    state: Mutex<CoroutineState>,
    signal: Condvar,
    executing: AtomicBool,
}

impl ThreadCore {
    fn new(id: u64, kind: ThreadKind) -> Self {
        let status = match kind {
            ThreadKind::Main => CoroutineStatus::Running,
            ThreadKind::Coroutine(_) => CoroutineStatus::Suspended,
        };
        ThreadCore {
            id,
            kind,
            state: Mutex::new(CoroutineState {
                status,
                started: false,
                abort: false,
                to_thread: None,
                to_resumer: None,
            }),
            signal: Condvar::new(),
            executing: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_main(&self) -> bool {
        matches!(self.kind, ThreadKind::Main)
    }

    pub(crate) fn status(&self) -> CoroutineStatus {
        self.state.lock().status
    }

    pub(crate) fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    fn set_status(&self, status: CoroutineStatus) {
        self.state.lock().status = status;
    }

    /// Ask the coroutine to stop at its pending (or next) yield. A thread
    /// that never started is simply marked dead.
    pub(crate) fn abort(&self) {
        if self.is_main() {
            return;
        }
        let mut state = self.state.lock();
        if state.abort || state.status == CoroutineStatus::Dead {
            return;
        }
        state.abort = true;
        if !state.started {
            state.status = CoroutineStatus::Dead;
        } else if state.status == CoroutineStatus::Suspended {
            warn!(thread = self.id, "aborting suspended coroutine");
        }
        self.signal.notify_all();
    }
}

/// Runtime-owned registry of threads, the RNG and the worker pool.
pub struct Scheduler {
    pool: Arc<ThreadPool>,
    threads: Mutex<Registry>,
    next_id: AtomicU64,
    rng: Mutex<StdRng>,
    main: Arc<ThreadCore>,
}

struct Registry {
    live: AHashMap<u64, Weak<ThreadCore>>,
    prune_at: usize,
}

const REGISTRY_PRUNE_MIN: usize = 64;

impl Scheduler {
    pub fn new(settings: &LuaSettings) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Scheduler {
            pool: ThreadPool::new(settings.pool.clone()),
            threads: Mutex::new(Registry {
                live: AHashMap::new(),
                prune_at: REGISTRY_PRUNE_MIN,
            }),
            next_id: AtomicU64::new(1),
            rng: Mutex::new(rng),
            main: Arc::new(ThreadCore::new(0, ThreadKind::Main)),
        }
    }

    pub(crate) fn main_core(&self) -> &Arc<ThreadCore> {
        &self.main
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Number of coroutines that have not finished yet.
    pub fn live_threads(&self) -> usize {
        self.threads
            .lock()
            .live
            .values()
            .filter(|w| w.upgrade().is_some_and(|c| c.status() != CoroutineStatus::Dead))
            .count()
    }

    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.rng.lock())
    }

    pub fn reseed(&self, seed: u64) {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
    }

    /// Allocate a suspended coroutine for `function`. Nothing runs yet.
    pub fn create(&self, function: LuaFunction) -> LuaThread {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let core = Arc::new(ThreadCore::new(id, ThreadKind::Coroutine(function)));
        let mut registry = self.threads.lock();
        registry.live.insert(id, Arc::downgrade(&core));
        if registry.live.len() >= registry.prune_at {
            registry.live.retain(|_, w| w.strong_count() > 0);
            registry.prune_at = (registry.live.len() * 2).max(REGISTRY_PRUNE_MIN);
        }
        drop(registry);
        trace!(thread = id, "coroutine created");
        LuaThread::from_core(core)
    }

    fn forget(&self, id: u64) {
        self.threads.lock().live.remove(&id);
    }

    /// Transfer control to `thread` and wait until it yields or finishes.
    pub(crate) fn resume(
        &self,
        vm: &LuaVM,
        caller: &LuaState,
        thread: &LuaThread,
        args: MultiValue,
    ) -> LuaResult<MultiValue> {
        let core = thread.core();
        if core.is_main() {
            return Err(LuaError::unsupported("cannot resume the main thread"));
        }

        let first = {
            let mut state = core.state.lock();
            match state.status {
                CoroutineStatus::Suspended if !state.abort => {}
                CoroutineStatus::Dead | CoroutineStatus::Suspended => {
                    return Err(LuaError::runtime("cannot resume dead coroutine"));
                }
                _ => return Err(LuaError::runtime("cannot resume non-suspended coroutine")),
            }
            state.status = CoroutineStatus::Running;
            state.to_thread = Some(args);
            state.to_resumer = None;
            let first = !state.started;
            state.started = true;
            first
        };
        trace!(thread = core.id, first, "resume");

        let caller_core = caller.core();
        let nested = !caller_core.is_main();
        if nested {
            caller_core.set_status(CoroutineStatus::Normal);
        }

        if first {
            let job_vm = vm.clone();
            let job_core = core.clone();
            let job_handle = Arc::downgrade(thread.handle());
            let started = self
                .pool
                .execute(Box::new(move || run_coroutine(job_vm, job_core, job_handle)));
            if let Err(err) = started {
                let mut state = core.state.lock();
                state.status = CoroutineStatus::Dead;
                let stale = state.to_thread.take();
                drop(state);
                drop(stale);
                if nested {
                    caller_core.set_status(CoroutineStatus::Running);
                }
                return Err(err);
            }
        } else {
            core.signal.notify_all();
        }

        let reply = {
            let mut state = core.state.lock();
            loop {
                if let Some(reply) = state.to_resumer.take() {
                    break reply;
                }
                core.signal.wait(&mut state);
            }
        };

        if nested {
            caller_core.set_status(CoroutineStatus::Running);
        }
        reply
    }

    /// Suspend the coroutine `state` runs on, handing `values` to its resumer.
    pub(crate) fn yield_values(&self, state: &LuaState, values: MultiValue) -> LuaResult<MultiValue> {
        let core = state.core();
        if core.is_main() {
            return Err(LuaError::unsupported("cannot yield the main thread"));
        }

        let mut guard = core.state.lock();
        if guard.abort {
            return Err(LuaError::Aborted);
        }
        core.executing.store(false, Ordering::Release);
        guard.status = CoroutineStatus::Suspended;
        guard.to_resumer = Some(Ok(values));
        core.signal.notify_all();
        trace!(thread = core.id, "yield");

        loop {
            if guard.abort {
                return Err(LuaError::Aborted);
            }
            if let Some(args) = guard.to_thread.take() {
                core.executing.store(true, Ordering::Release);
                return Ok(args);
            }
            core.signal.wait(&mut guard);
        }
    }

    /// Abort every live coroutine and stop the pool.
    pub fn shutdown(&self) {
        let cores: Vec<Arc<ThreadCore>> = {
            let mut registry = self.threads.lock();
            let cores = registry.live.values().filter_map(Weak::upgrade).collect();
            registry.live.clear();
            cores
        };
        debug!(threads = cores.len(), "scheduler shutting down");
        for core in cores {
            core.abort();
        }
        self.pool.shutdown();
    }
}

/// Body of a pool job: run the coroutine function to completion and post
/// the outcome to whoever resumes it last.
fn run_coroutine(vm: LuaVM, core: Arc<ThreadCore>, handle: Weak<ThreadHandle>) {
    let ThreadKind::Coroutine(function) = &core.kind else {
        return;
    };
    let args = core.state.lock().to_thread.take().unwrap_or_default();
    core.executing.store(true, Ordering::Release);

    let state = LuaState::for_coroutine(vm.clone(), core.clone(), handle);
    let callee = LuaValue::Function(function.clone());
    let result = catch_unwind(AssertUnwindSafe(|| state.call(&callee, args)))
        .unwrap_or_else(|payload| Err(LuaError::runtime(panic_message(payload.as_ref()))));
    drop(state);

    core.executing.store(false, Ordering::Release);
    match &result {
        Err(LuaError::Aborted) => warn!(thread = core.id, "coroutine aborted"),
        Err(err) => debug!(thread = core.id, error = %err, "coroutine failed"),
        Ok(_) => trace!(thread = core.id, "coroutine finished"),
    }

    // values still queued may hold the last handle of this very thread;
    // drop them outside the lock
    let stale = {
        let mut state = core.state.lock();
        state.status = CoroutineStatus::Dead;
        state.to_resumer = Some(result);
        core.signal.notify_all();
        state.to_thread.take()
    };
    drop(stale);
    vm.scheduler().forget(core.id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("native panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("native panic: {s}")
    } else {
        "native panic".to_owned()
    }
}
