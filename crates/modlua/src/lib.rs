// Lua Runtime Core
// Values, tables with metatables, overloaded native calls and coroutines
// scheduled on a bounded worker pool. Source compilation is plugged in
// through the `Compiler` trait.

#[cfg(test)]
mod test;

pub mod compiler;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

#[cfg(feature = "serde")]
pub mod serde;

pub use compiler::Compiler;
pub use lib_registry::{LibraryModule, LibraryRegistry};
pub use lua_value::{
    CoroutineStatus, FromLua, IntoLua, IntoLuaMulti, LuaFunction, LuaString, LuaTable, LuaThread,
    LuaUserdata, LuaValue, LuaValueKind, MultiValue, NativeType, Overload, Param, ScriptBody,
    Signature, TypeBuilder, TypeDescriptor, TypeKey, Ud, Variadic,
};
pub use lua_vm::{
    ArithOp, Callback, Encoding, LuaError, LuaErrorKind, LuaResult, LuaSettings, LuaState, LuaVM,
    PoolOptions, Stdlib, TmKind,
};
