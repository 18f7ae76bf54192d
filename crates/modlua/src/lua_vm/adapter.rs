// Native-callable adapters over script callables
use crate::lua_value::{FromLua, IntoLuaMulti, LuaValue, MultiValue, NativeType, Param};
use crate::lua_vm::{LuaResult, LuaState, LuaVM};

/// A script callable captured by native code.
///
/// As a parameter type it accepts functions directly and, in the
/// conversion pass, tables or user data with `__call`. Native code can keep
/// it and call it later from any thread.
///
/// ```ignore
/// vm.register_function("each", |state: &LuaState, t: LuaTable, f: Callback| {
///     for (k, v) in t.pairs() {
///         f.call(state, (k, v))?;
///     }
///     Ok::<_, LuaError>(())
/// })?;
/// ```
#[derive(Clone)]
pub struct Callback {
    target: LuaValue,
    vm: LuaVM,
}

impl Callback {
    pub fn new(vm: &LuaVM, target: LuaValue) -> Self {
        Callback {
            target,
            vm: vm.clone(),
        }
    }

    pub fn target(&self) -> &LuaValue {
        &self.target
    }

    /// Call on the state of the calling native code.
    pub fn call(&self, state: &LuaState, args: impl IntoLuaMulti) -> LuaResult<MultiValue> {
        state.call(&self.target, args.into_lua_multi()?)
    }

    /// Call from host code outside any script call, on a fresh main state.
    pub fn call_from_host(&self, args: impl IntoLuaMulti) -> LuaResult<MultiValue> {
        let state = self.vm.main_state();
        state.call(&self.target, args.into_lua_multi()?)
    }

    /// Turn the callback into a plain closure.
    pub fn into_fn(self) -> impl Fn(MultiValue) -> LuaResult<MultiValue> + Send + Sync + 'static {
        move |args| self.call_from_host(args)
    }
}

impl FromLua for Callback {
    fn from_lua(value: LuaValue, state: &LuaState) -> LuaResult<Self> {
        Ok(Callback::new(state.vm(), value))
    }

    fn param() -> Param {
        Param::new(NativeType::Callback)
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callback({:?})", self.target)
    }
}
