// Coroutine library
// Implements: create, resume, yield, status, running, wrap, isyieldable

use crate::lib_registry::{LibraryModule, arg_type_error, get_arg};
use crate::lua_value::{LuaFunction, LuaThread, LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaState};

pub fn create_coroutine_lib() -> LibraryModule {
    crate::lib_module!("coroutine", {
        "create" => coroutine_create,
        "resume" => coroutine_resume,
        "yield" => coroutine_yield,
        "status" => coroutine_status,
        "running" => coroutine_running,
        "wrap" => coroutine_wrap,
        "isyieldable" => coroutine_isyieldable,
    })
}

fn require_function(args: &MultiValue, func_name: &str) -> LuaResult<LuaFunction> {
    match get_arg(args, 1).unwrap_or_default() {
        LuaValue::Function(f) => Ok(f),
        other => Err(arg_type_error(1, func_name, "function", &other)),
    }
}

fn require_thread(args: &MultiValue, func_name: &str) -> LuaResult<LuaThread> {
    match get_arg(args, 1).unwrap_or_default() {
        LuaValue::Thread(t) => Ok(t),
        other => Err(arg_type_error(1, func_name, "coroutine", &other)),
    }
}

/// coroutine.create(f) - Create a suspended coroutine
fn coroutine_create(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let function = require_function(&args, "create")?;
    let thread = state.vm().create_thread(function);
    Ok(MultiValue::single(LuaValue::Thread(thread)))
}

/// coroutine.resume(co, ...) - (true, values...) or (false, error)
fn coroutine_resume(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let thread = require_thread(&args, "resume")?;
    let mut values = args.all_values();
    values.remove(0);

    match state.resume(&thread, MultiValue::multiple(values)) {
        Ok(results) => Ok(results.with_first(LuaValue::Boolean(true))),
        Err(err) if err.is_catchable() => {
            Ok(MultiValue::two(LuaValue::Boolean(false), err.to_value()))
        }
        Err(err) => Err(err),
    }
}

/// coroutine.yield(...) - Suspend the running coroutine
fn coroutine_yield(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    state.yield_values(args)
}

/// coroutine.status(co) - "suspended", "running", "normal" or "dead"
fn coroutine_status(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let thread = require_thread(&args, "status")?;
    let status = state.status(&thread);
    Ok(MultiValue::single(LuaValue::string(status.name())))
}

/// coroutine.running() - The running thread and whether it is the main one
fn coroutine_running(state: &LuaState, _args: MultiValue) -> LuaResult<MultiValue> {
    let thread = state.current_thread();
    let is_main = thread.is_main();
    Ok(MultiValue::two(
        LuaValue::Thread(thread),
        LuaValue::Boolean(is_main),
    ))
}

/// coroutine.wrap(f) - A function resuming a new coroutine on each call
fn coroutine_wrap(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let function = require_function(&args, "wrap")?;
    Ok(MultiValue::single(LuaValue::Function(state.wrap(function))))
}

/// coroutine.isyieldable() - Whether the running code may yield
fn coroutine_isyieldable(state: &LuaState, _args: MultiValue) -> LuaResult<MultiValue> {
    Ok(MultiValue::single(LuaValue::Boolean(state.is_yieldable())))
}
