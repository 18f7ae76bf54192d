// Library registration system for the standard surfaces
// Modules are declared as lists of native functions and values, then loaded
// into an environment's globals

use crate::lua_value::{LuaFunction, LuaTable, LuaValue, MultiValue, NativeFn};
use crate::lua_vm::{LuaError, LuaResult, LuaVM, Stdlib};
use crate::stdlib;
use tracing::debug;

/// Builds a module value against the environment it is loaded into
pub type ValueInit = fn(&LuaVM) -> LuaValue;

/// One named member of a module
pub enum ModuleMember {
    Native(NativeFn),
    Value(ValueInit),
}

/// Named group of members. The module named `_G` installs its members
/// straight into the globals; any other name gets (or reuses) a global table.
pub struct LibraryModule {
    pub name: &'static str,
    members: Vec<(&'static str, ModuleMember)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        LibraryModule {
            name,
            members: Vec::new(),
        }
    }

    pub fn with_function(mut self, name: &'static str, func: NativeFn) -> Self {
        self.members.push((name, ModuleMember::Native(func)));
        self
    }

    pub fn with_value(mut self, name: &'static str, init: ValueInit) -> Self {
        self.members.push((name, ModuleMember::Value(init)));
        self
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn target_table(&self, vm: &LuaVM) -> LuaResult<LuaTable> {
        let globals = vm.globals();
        if self.name == "_G" {
            return Ok(globals.clone());
        }
        if let LuaValue::Table(existing) = globals.get_str(self.name) {
            return Ok(existing);
        }
        let table = LuaTable::new();
        globals.set_str(self.name, LuaValue::Table(table.clone()))?;
        Ok(table)
    }

    /// Install every member into the module's table in `vm`.
    pub fn install(&self, vm: &LuaVM) -> LuaResult<()> {
        let target = self.target_table(vm)?;
        for (name, member) in &self.members {
            let value = match member {
                ModuleMember::Native(func) => LuaValue::Function(LuaFunction::from_fn(name, *func)),
                ModuleMember::Value(init) => init(vm),
            };
            target.set_str(name, value)?;
        }
        debug!(module = self.name, members = self.members.len(), "library installed");
        Ok(())
    }
}

/// `lib_module!("name", { "f" => native_fn, ... })`
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($member:expr => $func:expr),* $(,)?
    }) => {
        $crate::lib_registry::LibraryModule::new($name)
            $(.with_function($member, $func))*
    };
}

/// Modules installed in registration order.
#[derive(Default)]
pub struct LibraryRegistry {
    modules: Vec<LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        LibraryRegistry::default()
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    pub fn load_all(&self, vm: &LuaVM) -> LuaResult<()> {
        self.modules.iter().try_for_each(|module| module.install(vm))
    }

    pub fn module(&self, name: &str) -> Option<&LibraryModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}

/// The standard modules selected by `libraries`.
pub fn create_standard_registry(libraries: Stdlib) -> LibraryRegistry {
    let selected: [(Stdlib, fn() -> LibraryModule); 4] = [
        (Stdlib::BASIC, stdlib::basic::create_basic_lib),
        (Stdlib::COROUTINE, stdlib::coroutine::create_coroutine_lib),
        (Stdlib::MATH, stdlib::math::create_math_lib),
        (Stdlib::TABLE, stdlib::table::create_table_lib),
    ];
    let mut registry = LibraryRegistry::new();
    for (flag, create) in selected {
        if libraries.contains(flag) {
            registry.register(create());
        }
    }
    registry
}

/// Argument `index` (1-based), `None` past the end
#[inline(always)]
pub fn get_arg(args: &MultiValue, index: usize) -> Option<LuaValue> {
    index.checked_sub(1).and_then(|i| args.get(i)).cloned()
}

/// Argument `index` (1-based); missing is a `bad argument` error
#[inline]
pub fn require_arg(args: &MultiValue, index: usize, func_name: &str) -> LuaResult<LuaValue> {
    get_arg(args, index).ok_or_else(|| arg_error(index, func_name, "value expected"))
}

/// `bad argument #i to 'f' (msg)`
pub fn arg_error(index: usize, func_name: &str, message: &str) -> LuaError {
    LuaError::runtime(format!("bad argument #{index} to '{func_name}' ({message})"))
}

/// Argument type error in the usual wording.
pub fn arg_type_error(index: usize, func_name: &str, expected: &str, got: &LuaValue) -> LuaError {
    arg_error(
        index,
        func_name,
        &format!("{expected} expected, got {}", got.type_name()),
    )
}

#[inline]
pub fn arg_count(args: &MultiValue) -> usize {
    args.len()
}
