// Seam to the external compiler
// Parsing and code generation live outside this crate; a compiler turns
// source text into a function value the runtime can invoke.

use crate::lua_value::LuaFunction;
use crate::lua_vm::{LuaResult, LuaVM};

/// Produces runnable functions from source text.
///
/// Implementations usually return script functions whose body closes over
/// the VM's globals. Failures are reported as [`crate::LuaError::CompileError`].
pub trait Compiler: Send + Sync {
    fn compile(&self, vm: &LuaVM, source: &str, chunk_name: &str) -> LuaResult<LuaFunction>;
}

impl<F> Compiler for F
where
    F: Fn(&LuaVM, &str, &str) -> LuaResult<LuaFunction> + Send + Sync,
{
    fn compile(&self, vm: &LuaVM, source: &str, chunk_name: &str) -> LuaResult<LuaFunction> {
        self(vm, source, chunk_name)
    }
}
