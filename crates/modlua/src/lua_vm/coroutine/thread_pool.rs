// Bounded pool of reusable native workers hosting coroutine bodies.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::worker::{Job, Worker};
use crate::lua_vm::lua_settings::PoolOptions;
use crate::lua_vm::{LuaError, LuaResult};

struct PoolState {
    workers: AHashMap<usize, Arc<Worker>>,
    idle: VecDeque<Arc<Worker>>,
    shutdown: bool,
}

/// Keeps the idle share of workers near `idle_target * total + min_idle`,
/// adding one worker whenever none is idle. Idle workers retire on their
/// own after `idle_timeout`.
pub struct ThreadPool {
    options: PoolOptions,
    state: Mutex<PoolState>,
    next_worker: AtomicUsize,
    me: Weak<ThreadPool>,
}

impl ThreadPool {
    pub fn new(options: PoolOptions) -> Arc<Self> {
        Arc::new_cyclic(|me| ThreadPool {
            options,
            state: Mutex::new(PoolState {
                workers: AHashMap::new(),
                idle: VecDeque::new(),
                shutdown: false,
            }),
            next_worker: AtomicUsize::new(1),
            me: me.clone(),
        })
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Run `job` on an idle worker, spawning one if none is idle.
    pub fn execute(&self, job: Job) -> LuaResult<()> {
        let mut job = job;
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Err(LuaError::runtime("worker pool is shut down"));
            }
            self.resize(&mut state)?;
            let Some(worker) = state.idle.pop_front() else {
                continue;
            };
            match worker.try_assign(job) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    // the worker timed out before it could be handed work
                    state.workers.remove(&worker.id());
                    job = rejected;
                }
            }
        }
    }

    fn resize(&self, state: &mut PoolState) -> LuaResult<()> {
        if state.idle.is_empty() {
            let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
            let worker = Worker::spawn(id, self.me.clone(), &self.options)?;
            debug!(worker = id, total = state.workers.len() + 1, "worker spawned");
            state.workers.insert(id, worker.clone());
            state.idle.push_back(worker);
        }

        let limit = |total: usize| total as f64 * self.options.idle_target + self.options.min_idle as f64;
        // one idle worker always survives for the job being placed
        while state.idle.len() > 1 && state.idle.len() as f64 > limit(state.workers.len()) {
            let Some(worker) = state.idle.pop_front() else {
                break;
            };
            state.workers.remove(&worker.id());
            worker.retire();
            debug!(worker = worker.id(), "worker trimmed");
        }
        Ok(())
    }

    /// Called by a worker whose job finished.
    pub(super) fn done_working(&self, worker: &Arc<Worker>) {
        let mut state = self.state.lock();
        if state.shutdown {
            state.workers.remove(&worker.id());
            drop(state);
            worker.retire();
            return;
        }
        state.idle.push_back(worker.clone());
    }

    /// Called by a worker that is exiting.
    pub(super) fn forget(&self, id: usize) {
        let mut state = self.state.lock();
        state.workers.remove(&id);
        state.idle.retain(|w| w.id() != id);
    }

    /// Retire idle workers and refuse new work. Busy workers exit once their
    /// current job returns.
    pub fn shutdown(&self) {
        let idle: Vec<Arc<Worker>> = {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            for worker in &idle {
                state.workers.remove(&worker.id());
            }
            idle
        };
        debug!(retired = idle.len(), "worker pool shut down");
        for worker in idle {
            worker.retire();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }
}
