// A single native worker thread owned by the pool.
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::thread_pool::ThreadPool;
use crate::lua_vm::lua_limits::WORKER_NAME_PREFIX;
use crate::lua_vm::lua_settings::PoolOptions;
use crate::lua_vm::{LuaError, LuaResult};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerStatus {
    Waiting,
    Working,
    Shutdown,
}

struct Slot {
    status: WorkerStatus,
    job: Option<Job>,
}

pub struct Worker {
    id: usize,
    slot: Mutex<Slot>,
    signal: Condvar,
}

impl Worker {
    pub fn spawn(id: usize, pool: Weak<ThreadPool>, options: &PoolOptions) -> LuaResult<Arc<Worker>> {
        let worker = Arc::new(Worker {
            id,
            slot: Mutex::new(Slot {
                status: WorkerStatus::Waiting,
                job: None,
            }),
            signal: Condvar::new(),
        });

        let mut builder = std::thread::Builder::new().name(format!("{WORKER_NAME_PREFIX}-{id}"));
        if let Some(size) = options.stack_size {
            builder = builder.stack_size(size);
        }
        let runner = worker.clone();
        let timeout = options.idle_timeout;
        builder
            .spawn(move || runner.run(pool, timeout))
            .map_err(|e| LuaError::runtime(format!("cannot spawn worker thread: {e}")))?;
        Ok(worker)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Hand `job` to this worker if it is still waiting for work.
    pub fn try_assign(&self, job: Job) -> Result<(), Job> {
        let mut slot = self.slot.lock();
        if slot.status != WorkerStatus::Waiting {
            return Err(job);
        }
        slot.job = Some(job);
        slot.status = WorkerStatus::Working;
        self.signal.notify_one();
        Ok(())
    }

    /// Stop the worker once it is idle.
    pub fn retire(&self) {
        let mut slot = self.slot.lock();
        if slot.status == WorkerStatus::Waiting {
            slot.status = WorkerStatus::Shutdown;
            self.signal.notify_one();
        }
    }

    fn next_job(&self, timeout: Duration) -> Option<Job> {
        let mut slot = self.slot.lock();
        loop {
            match slot.status {
                WorkerStatus::Working => match slot.job.take() {
                    Some(job) => return Some(job),
                    None => slot.status = WorkerStatus::Waiting,
                },
                WorkerStatus::Shutdown => return None,
                WorkerStatus::Waiting => {
                    let timed_out = self.signal.wait_for(&mut slot, timeout).timed_out();
                    if timed_out && slot.status == WorkerStatus::Waiting {
                        debug!(worker = self.id, "worker idle timeout");
                        slot.status = WorkerStatus::Shutdown;
                    }
                }
            }
        }
    }

    fn run(self: Arc<Self>, pool: Weak<ThreadPool>, timeout: Duration) {
        while let Some(job) = self.next_job(timeout) {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                warn!(worker = self.id, "job panicked");
            }
            self.slot.lock().status = WorkerStatus::Waiting;
            match pool.upgrade() {
                Some(pool) => pool.done_working(&self),
                None => break,
            }
        }
        if let Some(pool) = pool.upgrade() {
            pool.forget(self.id);
        }
        debug!(worker = self.id, "worker exited");
    }
}
