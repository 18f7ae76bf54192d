// Execution context of one logical thread of control
// Every native function receives the LuaState it runs on; through it native
// code reaches the environment, the current thread and the value operations

use std::cell::Cell;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use crate::lua_value::{
    CoroutineStatus, LuaFunction, LuaTable, LuaThread, LuaValue, MultiValue, Overload, Signature,
    ThreadHandle,
};
use crate::lua_vm::coroutine::ThreadCore;
use crate::lua_vm::execute::{ArithOp, call, index, metamethod};
use crate::lua_vm::{LuaError, LuaResult, LuaSettings, LuaVM};

/// Per-thread execution state.
///
/// The main state stands for whichever host thread calls into the VM; each
/// coroutine gets its own state on the worker running it. A `LuaState` is
/// never shared between native threads.
pub struct LuaState {
    vm: LuaVM,
    core: Arc<ThreadCore>,
    handle: Weak<ThreadHandle>,
    /// Nesting of invocations on this state
    depth: Cell<usize>,
}

/// Decrements the call depth when dropped.
pub(crate) struct CallDepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for CallDepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl LuaState {
    pub(crate) fn for_main(vm: LuaVM) -> Self {
        let core = vm.scheduler().main_core().clone();
        LuaState {
            vm,
            core,
            handle: Weak::new(),
            depth: Cell::new(0),
        }
    }

    pub(crate) fn for_coroutine(vm: LuaVM, core: Arc<ThreadCore>, handle: Weak<ThreadHandle>) -> Self {
        LuaState {
            vm,
            core,
            handle,
            depth: Cell::new(0),
        }
    }

    /// The environment this state belongs to.
    #[inline]
    pub fn vm(&self) -> &LuaVM {
        &self.vm
    }

    #[inline]
    pub fn globals(&self) -> &LuaTable {
        self.vm.globals()
    }

    #[inline]
    pub fn settings(&self) -> &LuaSettings {
        self.vm.settings()
    }

    pub(crate) fn core(&self) -> &Arc<ThreadCore> {
        &self.core
    }

    /// The thread this code is logically running on. Host threads share the
    /// synthetic main thread.
    pub fn current_thread(&self) -> LuaThread {
        if self.core.is_main() {
            return self.vm.main_thread().clone();
        }
        match self.handle.upgrade() {
            Some(handle) => LuaThread::from_handle(handle),
            None => LuaThread::borrowed(self.core.clone()),
        }
    }

    pub fn is_main_thread(&self) -> bool {
        self.core.is_main()
    }

    pub fn is_yieldable(&self) -> bool {
        !self.core.is_main()
    }

    pub fn call_depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn enter_call(&self) -> LuaResult<CallDepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.settings().max_call_depth {
            return Err(LuaError::runtime("stack overflow"));
        }
        self.depth.set(depth + 1);
        Ok(CallDepthGuard { depth: &self.depth })
    }

    // ===== Invocation =====

    /// Full invocation contract: optional receiver and explicit overload.
    pub fn invoke(
        &self,
        callee: &LuaValue,
        this: Option<LuaValue>,
        args: MultiValue,
        overload_index: Option<usize>,
    ) -> LuaResult<MultiValue> {
        call::invoke(self, callee, this, args, overload_index)
    }

    pub fn call(&self, callee: &LuaValue, args: MultiValue) -> LuaResult<MultiValue> {
        call::invoke(self, callee, None, args, None)
    }

    /// `obj:name(args...)`
    pub fn call_method(&self, obj: &LuaValue, name: &str, args: MultiValue) -> LuaResult<MultiValue> {
        let method = self.index(obj, &LuaValue::string(name))?;
        call::invoke(self, &method, Some(obj.clone()), args, None)
    }

    // ===== Indexing =====

    pub fn index(&self, obj: &LuaValue, key: &LuaValue) -> LuaResult<LuaValue> {
        index::index(self, obj, key)
    }

    pub fn new_index(&self, obj: &LuaValue, key: &LuaValue, value: LuaValue) -> LuaResult<()> {
        index::new_index(self, obj, key, value)
    }

    pub fn get_global(&self, name: &str) -> LuaResult<LuaValue> {
        let globals = LuaValue::Table(self.globals().clone());
        self.index(&globals, &LuaValue::string(name))
    }

    pub fn set_global(&self, name: &str, value: LuaValue) -> LuaResult<()> {
        let globals = LuaValue::Table(self.globals().clone());
        self.new_index(&globals, &LuaValue::string(name), value)
    }

    // ===== Operators =====

    pub fn arith(&self, op: ArithOp, a: &LuaValue, b: &LuaValue) -> LuaResult<LuaValue> {
        metamethod::arith(self, op, a, b)
    }

    pub fn unary_minus(&self, a: &LuaValue) -> LuaResult<LuaValue> {
        metamethod::unary_minus(self, a)
    }

    pub fn concat(&self, a: &LuaValue, b: &LuaValue) -> LuaResult<LuaValue> {
        metamethod::concat(self, a, b)
    }

    pub fn equals(&self, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
        metamethod::equals(self, a, b)
    }

    pub fn less_than(&self, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
        metamethod::less_than(self, a, b)
    }

    pub fn less_equal(&self, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
        metamethod::less_equal(self, a, b)
    }

    /// Three-way comparison built on `<`.
    pub fn compare(&self, a: &LuaValue, b: &LuaValue) -> LuaResult<Ordering> {
        if self.less_than(a, b)? {
            Ok(Ordering::Less)
        } else if self.less_than(b, a)? {
            Ok(Ordering::Greater)
        } else {
            Ok(Ordering::Equal)
        }
    }

    pub fn len(&self, value: &LuaValue) -> LuaResult<LuaValue> {
        metamethod::len(self, value)
    }

    pub fn to_display_string(&self, value: &LuaValue) -> LuaResult<String> {
        metamethod::to_display_string(self, value)
    }

    // ===== Metatables =====

    pub fn get_metatable(&self, value: &LuaValue) -> Option<LuaTable> {
        metamethod::get_metatable(self, value)
    }

    /// Tables carry their own metatable; strings share the VM-wide one. The
    /// metatable of user data is fixed by its type.
    pub fn set_metatable(&self, value: &LuaValue, metatable: Option<LuaTable>) -> LuaResult<()> {
        match value {
            LuaValue::Table(t) => {
                t.set_metatable(metatable);
                Ok(())
            }
            LuaValue::String(_) => {
                self.vm.set_string_metatable(metatable);
                Ok(())
            }
            other => Err(LuaError::type_error(format!(
                "cannot set the metatable of a {} value",
                other.type_name()
            ))),
        }
    }

    // ===== Coroutines =====

    pub fn create_thread(&self, function: &LuaValue) -> LuaResult<LuaThread> {
        match function {
            LuaValue::Function(f) => Ok(self.vm.create_thread(f.clone())),
            other => Err(LuaError::type_error(format!(
                "cannot create a coroutine from a {} value",
                other.type_name()
            ))),
        }
    }

    /// Run `thread` until it yields or finishes. Errors raised inside the
    /// coroutine come back as `Err` here, never as a crash of this thread.
    pub fn resume(&self, thread: &LuaThread, args: MultiValue) -> LuaResult<MultiValue> {
        self.vm.scheduler().resume(&self.vm, self, thread, args)
    }

    /// Suspend the running coroutine. Fails with `UnsupportedOperation` on
    /// the main thread.
    pub fn yield_values(&self, values: MultiValue) -> LuaResult<MultiValue> {
        self.vm.scheduler().yield_values(self, values)
    }

    /// Status of `thread` as seen from this state: the main thread is
    /// running when observed from itself and normal from a coroutine.
    pub fn status(&self, thread: &LuaThread) -> CoroutineStatus {
        if thread.is_main() {
            if self.is_main_thread() {
                CoroutineStatus::Running
            } else {
                CoroutineStatus::Normal
            }
        } else {
            thread.status()
        }
    }

    /// A function that resumes a fresh coroutine running `function` on each
    /// call and re-raises its errors.
    pub fn wrap(&self, function: LuaFunction) -> LuaFunction {
        let thread = self.vm.create_thread(function);
        let overload = Overload::new(Signature::any_args(), move |state, args| {
            state.resume(&thread, MultiValue::multiple(args))
        });
        LuaFunction::native("wrap", vec![overload])
    }
}
