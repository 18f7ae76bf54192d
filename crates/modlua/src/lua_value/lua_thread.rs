// Script-visible coroutine handles
use std::fmt;
use std::sync::Arc;

use crate::lua_vm::coroutine::ThreadCore;

/// Lifecycle of a coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoroutineStatus {
    Suspended,
    Running,
    /// Active but not running: it resumed another coroutine.
    Normal,
    Dead,
}

impl CoroutineStatus {
    pub fn name(self) -> &'static str {
        match self {
            CoroutineStatus::Suspended => "suspended",
            CoroutineStatus::Running => "running",
            CoroutineStatus::Normal => "normal",
            CoroutineStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for CoroutineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owner token shared by every script-visible copy of a thread value.
/// When the last copy goes away a suspended coroutine can never be resumed
/// again, so it is told to abort.
pub(crate) struct ThreadHandle {
    core: Arc<ThreadCore>,
    owner: bool,
}

impl ThreadHandle {
    pub(crate) fn core(&self) -> &Arc<ThreadCore> {
        &self.core
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        if self.owner {
            self.core.abort();
        }
    }
}

/// A coroutine (or the host's main thread) as a script value.
/// Equality is identity of the underlying thread.
#[derive(Clone)]
pub struct LuaThread {
    handle: Arc<ThreadHandle>,
}

impl LuaThread {
    pub(crate) fn from_core(core: Arc<ThreadCore>) -> Self {
        LuaThread {
            handle: Arc::new(ThreadHandle { core, owner: true }),
        }
    }

    /// A handle that does not own the thread: dropping it never aborts.
    pub(crate) fn borrowed(core: Arc<ThreadCore>) -> Self {
        LuaThread {
            handle: Arc::new(ThreadHandle { core, owner: false }),
        }
    }

    pub(crate) fn from_handle(handle: Arc<ThreadHandle>) -> Self {
        LuaThread { handle }
    }

    pub(crate) fn handle(&self) -> &Arc<ThreadHandle> {
        &self.handle
    }

    pub(crate) fn core(&self) -> &Arc<ThreadCore> {
        self.handle.core()
    }

    pub fn id(&self) -> u64 {
        self.core().id()
    }

    /// The synthetic thread standing for the host's own thread of control.
    pub fn is_main(&self) -> bool {
        self.core().is_main()
    }

    /// Raw status as stored. The main thread always reports `Running`;
    /// [`crate::LuaState::status`] adjusts it for the observer.
    pub fn status(&self) -> CoroutineStatus {
        self.core().status()
    }

    /// Some worker is executing this coroutine's code right now.
    pub fn is_executing(&self) -> bool {
        self.core().is_executing()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaThread) -> bool {
        Arc::ptr_eq(self.core(), other.core())
    }

    pub fn as_ptr(&self) -> usize {
        Arc::as_ptr(self.core()) as *const () as usize
    }
}

impl fmt::Debug for LuaThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread: 0x{:012x} ({})", self.as_ptr(), self.status())
    }
}
