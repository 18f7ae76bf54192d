// Tagged call dispatch over every callable value shape
use crate::lua_value::{FunctionKind, LuaValue, MultiValue, OverloadSet};
use crate::lua_vm::execute::metamethod::{TmKind, get_metamethod};
use crate::lua_vm::execute::overload::resolve;
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// Invoke `callee`. `this`, when given, is prepended to the arguments.
///
/// * script function: called directly; an explicit overload index is an
///   `UnsupportedOperation`;
/// * native function: resolved over its overloads, or only over
///   `overload_index` when given (`IndexError` when out of range);
/// * table or user data instance with `__call`: the handler is invoked with
///   the callee prepended;
/// * type object: resolved over the type's constructors;
/// * anything else is a `TypeError`.
pub fn invoke(
    lua_state: &LuaState,
    callee: &LuaValue,
    this: Option<LuaValue>,
    args: MultiValue,
    overload_index: Option<usize>,
) -> LuaResult<MultiValue> {
    let _depth = lua_state.enter_call()?;
    let args = match this {
        Some(receiver) => args.with_first(receiver),
        None => args,
    };
    dispatch(lua_state, callee, args, overload_index)
}

fn dispatch(
    lua_state: &LuaState,
    callee: &LuaValue,
    args: MultiValue,
    overload_index: Option<usize>,
) -> LuaResult<MultiValue> {
    match callee {
        LuaValue::Function(function) => match function.kind() {
            FunctionKind::Script(script) => {
                if let Some(index) = overload_index {
                    return Err(LuaError::unsupported(format!(
                        "script function '{}' has no overloads (index {index} requested)",
                        script.name()
                    )));
                }
                script.call(lua_state, args)
            }
            FunctionKind::Native(set) => call_native(lua_state, set, args, overload_index),
        },
        LuaValue::UserData(ud) if ud.is_type() => match ud.descriptor().constructors() {
            Some(constructors) => dispatch(
                lua_state,
                &LuaValue::Function(constructors.clone()),
                args,
                overload_index,
            ),
            None => Err(LuaError::type_error(format!(
                "type '{}' has no constructors",
                ud.type_name()
            ))),
        },
        LuaValue::Table(_) | LuaValue::UserData(_) => {
            match get_metamethod(lua_state, callee, TmKind::Call) {
                Some(handler) => {
                    // the handler may itself be callable through __call
                    invoke(lua_state, &handler, Some(callee.clone()), args, overload_index)
                }
                None => Err(not_callable(callee)),
            }
        }
        other => Err(not_callable(other)),
    }
}

fn not_callable(value: &LuaValue) -> LuaError {
    LuaError::type_error(format!("attempt to call a {} value", value.type_name()))
}

fn call_native(
    lua_state: &LuaState,
    set: &OverloadSet,
    args: MultiValue,
    overload_index: Option<usize>,
) -> LuaResult<MultiValue> {
    let args = args.all_values();
    let (overload, adapted) = match overload_index {
        Some(index) => {
            let only = set.get(index).ok_or_else(|| {
                LuaError::IndexError(format!(
                    "overload index {index} is out of range for '{}' ({} overloads)",
                    set.name(),
                    set.len()
                ))
            })?;
            resolve(lua_state, set.name(), &[only], args)?
        }
        None => resolve(lua_state, set.name(), &set.snapshot(), args)?,
    };
    overload.call(lua_state, adapted)
}
