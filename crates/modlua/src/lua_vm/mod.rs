// Runtime environment
// Owns the globals, the settings, the scheduler and the registration surface
mod adapter;
pub mod coroutine;
pub(crate) mod execute;
mod lua_error;
pub mod lua_limits;
pub mod lua_settings;
mod lua_state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{info, warn};

pub use adapter::Callback;
pub use coroutine::{Scheduler, ThreadPool};
pub use execute::{ArithOp, TmKind};
pub use lua_error::{LuaError, LuaErrorKind, LuaResult};
pub use lua_settings::{Encoding, LuaSettings, PoolOptions, Stdlib, exit_code};
pub use lua_state::LuaState;

use crate::compiler::Compiler;
use crate::lua_value::{
    IntoOverload, LuaFunction, LuaTable, LuaThread, LuaUserdata, LuaValue, MultiValue,
    TypeDescriptor,
};

struct VmInner {
    settings: Arc<LuaSettings>,
    globals: LuaTable,
    string_metatable: RwLock<Option<LuaTable>>,
    scheduler: Scheduler,
    main_thread: LuaThread,
    compiler: RwLock<Option<Arc<dyn Compiler>>>,
    closed: AtomicBool,
}

impl Drop for VmInner {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

/// Shared handle to one runtime environment. Cloning is cheap; every clone
/// refers to the same globals and scheduler.
///
/// Suspended coroutines keep their environment alive. Call [`LuaVM::close`]
/// to abort them when the environment is no longer needed.
#[derive(Clone)]
pub struct LuaVM {
    inner: Arc<VmInner>,
}

impl LuaVM {
    /// Create an environment and open the libraries selected in `settings`.
    pub fn new(settings: LuaSettings) -> Self {
        let settings = Arc::new(settings);
        let scheduler = Scheduler::new(&settings);
        let main_thread = LuaThread::borrowed(scheduler.main_core().clone());
        let vm = LuaVM {
            inner: Arc::new(VmInner {
                settings: settings.clone(),
                globals: LuaTable::new(),
                string_metatable: RwLock::new(None),
                scheduler,
                main_thread,
                compiler: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
        };
        info!(name = %settings.name, "vm created");

        if !settings.libraries.is_empty()
            && let Err(err) = vm.open_stdlib(settings.libraries)
        {
            warn!(error = %err, "failed to open standard libraries");
        }
        vm
    }

    #[inline]
    pub fn settings(&self) -> &LuaSettings {
        &self.inner.settings
    }

    #[inline]
    pub fn globals(&self) -> &LuaTable {
        &self.inner.globals
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// The synthetic thread standing for host code.
    pub fn main_thread(&self) -> &LuaThread {
        &self.inner.main_thread
    }

    /// A fresh state for host code calling into the runtime.
    pub fn main_state(&self) -> LuaState {
        LuaState::for_main(self.clone())
    }

    pub fn string_metatable(&self) -> Option<LuaTable> {
        self.inner.string_metatable.read().clone()
    }

    pub fn set_string_metatable(&self, metatable: Option<LuaTable>) {
        *self.inner.string_metatable.write() = metatable;
    }

    pub fn open_stdlib(&self, libraries: Stdlib) -> LuaResult<()> {
        crate::lib_registry::create_standard_registry(libraries).load_all(self)
    }

    // ===== Registration =====

    /// Register a global native function. Registering an existing native
    /// function name adds an overload to it.
    pub fn register_function<M>(&self, name: &str, func: impl IntoOverload<M>) -> LuaResult<()> {
        self.register_function_in(self.globals(), name, func)
    }

    /// Like [`LuaVM::register_function`] but into any table.
    pub fn register_function_in<M>(
        &self,
        table: &LuaTable,
        name: &str,
        func: impl IntoOverload<M>,
    ) -> LuaResult<()> {
        let overload = func.into_overload();
        table.update(&LuaValue::string(name), |current| match current {
            LuaValue::Nil => {
                info!(name, "function registered");
                let function = LuaFunction::native(name, vec![overload]);
                Ok(Some(LuaValue::Function(function)))
            }
            LuaValue::Function(existing) if existing.is_native() => {
                info!(name, overloads = existing.overload_count() + 1, "overload added");
                existing.add_overload(overload)?;
                Ok(None)
            }
            _ => Err(LuaError::AlreadyRegistered(name.to_owned())),
        })
    }

    /// Publish a native type under `name`. The returned type object is what
    /// scripts see: calling it constructs instances, indexing it reaches the
    /// static members.
    pub fn register_type(&self, name: &str, descriptor: Arc<TypeDescriptor>) -> LuaResult<LuaUserdata> {
        let type_object = LuaUserdata::type_object(descriptor);
        self.define_global(name, LuaValue::UserData(type_object.clone()))?;
        info!(name, "type registered");
        Ok(type_object)
    }

    pub fn register_value(&self, name: &str, value: impl Into<LuaValue>) -> LuaResult<()> {
        self.define_global(name, value.into())
    }

    /// Bind a global name that must not exist yet.
    fn define_global(&self, name: &str, value: LuaValue) -> LuaResult<()> {
        self.globals()
            .update(&LuaValue::string(name), |current| match current {
                LuaValue::Nil => Ok(Some(value)),
                _ => Err(LuaError::AlreadyRegistered(name.to_owned())),
            })
    }

    // ===== Loading =====

    pub fn set_compiler(&self, compiler: impl Compiler + 'static) {
        *self.inner.compiler.write() = Some(Arc::new(compiler));
    }

    /// Compile `source` into a function without running it.
    pub fn load(&self, source: &str, chunk_name: &str) -> LuaResult<LuaFunction> {
        let compiler = self.inner.compiler.read().clone();
        match compiler {
            Some(compiler) => compiler.compile(self, source, chunk_name),
            None => Err(LuaError::unsupported("no compiler is installed")),
        }
    }

    /// Compile and run `source` on a fresh main state.
    pub fn execute(&self, source: &str, chunk_name: &str) -> LuaResult<MultiValue> {
        let function = self.load(source, chunk_name)?;
        self.main_state()
            .call(&LuaValue::Function(function), MultiValue::empty())
    }

    /// Suspended coroutine running `function`.
    pub fn create_thread(&self, function: LuaFunction) -> LuaThread {
        self.inner.scheduler.create(function)
    }

    // ===== Lifecycle =====

    /// Map `value` to an exit code and hand it to the quit handler.
    pub fn quit(&self, value: &LuaValue) -> i32 {
        let code = exit_code(value);
        info!(code, "quit requested");
        if let Some(handler) = &self.settings().on_quit {
            handler(code);
        }
        code
    }

    /// Abort every suspended coroutine and stop the worker pool.
    /// Further resumes of unstarted coroutines fail.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.scheduler.shutdown();
        info!(name = %self.settings().name, "vm closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &LuaVM) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for LuaVM {
    fn default() -> Self {
        LuaVM::new(LuaSettings::default())
    }
}

impl std::fmt::Debug for LuaVM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaVM")
            .field("name", &self.settings().name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
