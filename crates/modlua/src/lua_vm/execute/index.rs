// Indexing with `__index` / `__newindex` chains and native members
use crate::lua_value::{LuaUserdata, LuaValue, MultiValue};
use crate::lua_vm::execute::metamethod::{TmKind, call_tm_res, get_metamethod};
use crate::lua_vm::lua_limits::MAXTAGLOOP;
use crate::lua_vm::{LuaError, LuaResult, LuaState};

fn index_error(value: &LuaValue) -> LuaError {
    LuaError::type_error(format!("attempt to index a {} value", value.type_name()))
}

fn missing_member(ud: &LuaUserdata, key: &LuaValue) -> LuaError {
    LuaError::MissingMember {
        type_name: ud.type_name().to_owned(),
        member: key.to_canonical_string(),
    }
}

/// Members a native value exposes directly. Type objects expose their
/// statics; instances expose fields, then methods.
fn userdata_member(ud: &LuaUserdata, key: &LuaValue) -> LuaResult<Option<LuaValue>> {
    let Some(name) = key.as_str() else {
        return Ok(None);
    };
    let descriptor = ud.descriptor();
    if ud.is_type() {
        return Ok(descriptor.static_member(name).cloned());
    }
    if let Some(getter) = descriptor.field(name).and_then(|f| f.getter.as_ref()) {
        return getter(ud).map(Some);
    }
    Ok(descriptor
        .method(name)
        .map(|method| LuaValue::Function(method.clone())))
}

/// Assign a native member. `Ok(false)` when no such member exists.
fn set_userdata_member(
    lua_state: &LuaState,
    ud: &LuaUserdata,
    key: &LuaValue,
    value: LuaValue,
) -> LuaResult<bool> {
    let Some(name) = key.as_str() else {
        return Ok(false);
    };
    let descriptor = ud.descriptor();
    if ud.is_type() {
        if descriptor.static_member(name).is_some() {
            return Err(LuaError::runtime(format!(
                "static member '{name}' of '{}' is read-only",
                ud.type_name()
            )));
        }
        return Ok(false);
    }
    if let Some(field) = descriptor.field(name) {
        return match &field.setter {
            Some(setter) => setter(lua_state, ud, value).map(|_| true),
            None => Err(LuaError::runtime(format!(
                "field '{name}' of '{}' is read-only",
                ud.type_name()
            ))),
        };
    }
    if descriptor.method(name).is_some() {
        return Err(LuaError::runtime(format!(
            "cannot assign to method '{name}' of '{}'",
            ud.type_name()
        )));
    }
    Ok(false)
}

/// `obj[key]` with metamethods. Follows `__index` tables iteratively and
/// calls `__index` functions with `(obj, key)`.
pub fn index(lua_state: &LuaState, obj: &LuaValue, key: &LuaValue) -> LuaResult<LuaValue> {
    let mut current = obj.clone();
    for _ in 0..MAXTAGLOOP {
        let handler = match &current {
            LuaValue::Table(table) => {
                let value = table.get_raw(key);
                if !value.is_nil() {
                    return Ok(value);
                }
                match get_metamethod(lua_state, &current, TmKind::Index) {
                    Some(handler) => handler,
                    None => return Ok(LuaValue::Nil),
                }
            }
            LuaValue::UserData(ud) => {
                if let Some(value) = userdata_member(ud, key)? {
                    return Ok(value);
                }
                match get_metamethod(lua_state, &current, TmKind::Index) {
                    Some(handler) => handler,
                    None => return Err(missing_member(ud, key)),
                }
            }
            other => match get_metamethod(lua_state, other, TmKind::Index) {
                Some(handler) => handler,
                None => return Err(index_error(other)),
            },
        };

        if handler.is_function() {
            return call_tm_res(lua_state, &handler, vec![current, key.clone()]);
        }
        current = handler;
    }
    Err(LuaError::runtime("'__index' chain too long; possible loop"))
}

/// `obj[key] = value` with metamethods. An existing raw key is always
/// assigned in place (including deletion with nil) without consulting
/// `__newindex`.
pub fn new_index(lua_state: &LuaState, obj: &LuaValue, key: &LuaValue, value: LuaValue) -> LuaResult<()> {
    let mut current = obj.clone();
    for _ in 0..MAXTAGLOOP {
        let handler = match &current {
            LuaValue::Table(table) => {
                if table.set_if_present(key, value.clone()) {
                    return Ok(());
                }
                match get_metamethod(lua_state, &current, TmKind::NewIndex) {
                    Some(handler) => handler,
                    None => return table.set_raw(key.clone(), value),
                }
            }
            LuaValue::UserData(ud) => {
                if set_userdata_member(lua_state, ud, key, value.clone())? {
                    return Ok(());
                }
                match get_metamethod(lua_state, &current, TmKind::NewIndex) {
                    Some(handler) => handler,
                    None => return Err(missing_member(ud, key)),
                }
            }
            other => match get_metamethod(lua_state, other, TmKind::NewIndex) {
                Some(handler) => handler,
                None => return Err(index_error(other)),
            },
        };

        if handler.is_function() {
            let args = MultiValue::multiple(vec![current, key.clone(), value]);
            lua_state.call(&handler, args)?;
            return Ok(());
        }
        current = handler;
    }
    Err(LuaError::runtime("'__newindex' chain too long; possible loop"))
}
