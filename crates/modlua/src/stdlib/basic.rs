// Basic library (_G global functions)
// Implements: print, type, assert, error, tonumber, tostring, select, ipairs,
// pairs, next, pcall, getmetatable, setmetatable, rawget, rawset, rawlen,
// rawequal, unpack

use crate::lib_registry::{LibraryModule, arg_error, arg_type_error, get_arg, require_arg};
use crate::lua_value::number::{parse_lua_number, parse_with_base};
use crate::lua_value::{LuaFunction, LuaTable, LuaValue, MultiValue};
use crate::lua_vm::lua_limits::MAX_RESULTS;
use crate::lua_vm::{LuaError, LuaResult, LuaState, TmKind};

pub fn create_basic_lib() -> LibraryModule {
    LibraryModule::new("_G")
        .with_function("print", lua_print)
        .with_function("type", lua_type)
        .with_function("assert", lua_assert)
        .with_function("error", lua_error)
        .with_function("tonumber", lua_tonumber)
        .with_function("tostring", lua_tostring)
        .with_function("select", lua_select)
        .with_function("ipairs", lua_ipairs)
        .with_function("pairs", lua_pairs)
        .with_function("next", lua_next)
        .with_function("pcall", lua_pcall)
        .with_function("getmetatable", lua_getmetatable)
        .with_function("setmetatable", lua_setmetatable)
        .with_function("rawget", lua_rawget)
        .with_function("rawset", lua_rawset)
        .with_function("rawlen", lua_rawlen)
        .with_function("rawequal", lua_rawequal)
        .with_function("unpack", lua_unpack)
        .with_value("_G", |vm| LuaValue::Table(vm.globals().clone()))
        .with_value("_VERSION", |_| LuaValue::string("Lua 5.1"))
}

fn require_table(args: &MultiValue, index: usize, func_name: &str) -> LuaResult<LuaTable> {
    match get_arg(args, index).unwrap_or_default() {
        LuaValue::Table(t) => Ok(t),
        other => Err(arg_type_error(index, func_name, "table", &other)),
    }
}

/// print(...) - Write the values, tab separated, to the configured stdout
fn lua_print(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let mut line = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        line.push_str(&state.to_display_string(value)?);
    }
    line.push('\n');
    state
        .settings()
        .write_out(&line)
        .map_err(|e| LuaError::runtime(format!("print: {e}")))?;
    Ok(MultiValue::empty())
}

/// type(v) - Return the type of a value as a string
fn lua_type(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let value = require_arg(&args, 1, "type")?;
    Ok(MultiValue::single(LuaValue::string(value.type_name())))
}

/// assert(v [, message]) - Raise error if v is false or nil
fn lua_assert(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let condition = require_arg(&args, 1, "assert")?;
    if condition.is_truthy() {
        return Ok(args);
    }
    match get_arg(&args, 2) {
        Some(message) if !message.is_nil() => Err(LuaError::from_value(message)),
        _ => Err(LuaError::runtime("assertion failed!")),
    }
}

/// error(value) - Raise an error carrying any value
fn lua_error(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    Err(LuaError::from_value(args.into_first()))
}

/// tonumber(e [, base]) - Convert to number, nil when not convertible
fn lua_tonumber(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let value = require_arg(&args, 1, "tonumber")?;
    let result = match get_arg(&args, 2) {
        None | Some(LuaValue::Nil) => match &value {
            LuaValue::Number(n) => Some(*n),
            LuaValue::String(s) => parse_lua_number(s.as_str()),
            _ => None,
        },
        Some(base) => {
            let base = base
                .as_integer()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| arg_error(2, "tonumber", "base out of range"))?;
            let text = match &value {
                LuaValue::String(s) => s.as_str().to_owned(),
                LuaValue::Number(n) => crate::lua_value::number::format_number(*n),
                other => return Err(arg_type_error(1, "tonumber", "string", other)),
            };
            parse_with_base(&text, base as u32)
        }
    };
    Ok(MultiValue::single(result.map_or(LuaValue::Nil, LuaValue::Number)))
}

/// tostring(v) - Convert to string, honouring __tostring
fn lua_tostring(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let value = require_arg(&args, 1, "tostring")?;
    let text = state.to_display_string(&value)?;
    Ok(MultiValue::single(LuaValue::string(text)))
}

/// select(n, ...) - Values after position n, or the count with '#'
fn lua_select(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let selector = require_arg(&args, 1, "select")?;
    let mut rest = args.all_values();
    rest.remove(0);

    if selector.as_str() == Some("#") {
        return Ok(MultiValue::single(LuaValue::Number(rest.len() as f64)));
    }
    let n = selector
        .to_number()
        .and_then(crate::lua_value::number::number_to_integer)
        .ok_or_else(|| arg_type_error(1, "select", "number", &selector))?;
    let count = rest.len() as i64;
    let start = if n < 0 {
        if -n > count {
            return Err(arg_error(1, "select", "index out of range"));
        }
        count + n
    } else if n == 0 {
        return Err(arg_error(1, "select", "index out of range"));
    } else {
        (n - 1).min(count)
    };
    Ok(MultiValue::multiple(rest.split_off(start as usize)))
}

/// next(t [, k]) - Next key/value pair, nil at the end
fn lua_next(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = require_table(&args, 1, "next")?;
    let key = get_arg(&args, 2).unwrap_or_default();
    match table.next(&key)? {
        Some((k, v)) => Ok(MultiValue::two(k, v)),
        None => Ok(MultiValue::single(LuaValue::Nil)),
    }
}

/// pairs(t) - Iterator triple, or whatever __pairs returns
fn lua_pairs(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let value = require_arg(&args, 1, "pairs")?;
    if let Some(handler) = state.get_metatable(&value).map(|mt| mt.get_str(TmKind::Pairs.name()))
        && !handler.is_nil()
    {
        let results = state.call(&handler, MultiValue::single(value))?;
        return Ok(results.adjust(3));
    }
    if !value.is_table() {
        return Err(arg_type_error(1, "pairs", "table", &value));
    }
    let next = LuaValue::Function(LuaFunction::from_fn("next", lua_next));
    Ok(MultiValue::multiple(vec![next, value, LuaValue::Nil]))
}

fn ipairs_aux(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let target = require_arg(&args, 1, "ipairs")?;
    let i = get_arg(&args, 2).and_then(|v| v.as_number()).unwrap_or(0.0) + 1.0;
    let value = state.index(&target, &LuaValue::Number(i))?;
    if value.is_nil() {
        Ok(MultiValue::single(LuaValue::Nil))
    } else {
        Ok(MultiValue::two(LuaValue::Number(i), value))
    }
}

/// ipairs(t) - Iterate t[1], t[2], ... up to the first nil
fn lua_ipairs(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let value = require_arg(&args, 1, "ipairs")?;
    let aux = LuaValue::Function(LuaFunction::from_fn("ipairs_aux", ipairs_aux));
    Ok(MultiValue::multiple(vec![aux, value, LuaValue::Number(0.0)]))
}

/// pcall(f, ...) - Protected call: (true, results...) or (false, err)
fn lua_pcall(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let mut values = args.all_values();
    if values.is_empty() {
        return Err(arg_error(1, "pcall", "value expected"));
    }
    let callee = values.remove(0);
    match state.call(&callee, MultiValue::multiple(values)) {
        Ok(results) => Ok(results.with_first(LuaValue::Boolean(true))),
        Err(err) if err.is_catchable() => Ok(MultiValue::two(LuaValue::Boolean(false), err.to_value())),
        Err(err) => Err(err),
    }
}

/// getmetatable(v) - The metatable, or its __metatable field when set
fn lua_getmetatable(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let value = require_arg(&args, 1, "getmetatable")?;
    let result = match state.get_metatable(&value) {
        Some(mt) => {
            let protected = mt.get_str(TmKind::Metatable.name());
            if protected.is_nil() {
                LuaValue::Table(mt)
            } else {
                protected
            }
        }
        None => LuaValue::Nil,
    };
    Ok(MultiValue::single(result))
}

/// setmetatable(t, mt) - Set or clear the metatable of a table
fn lua_setmetatable(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = require_table(&args, 1, "setmetatable")?;
    let metatable = match get_arg(&args, 2) {
        Some(LuaValue::Table(mt)) => Some(mt),
        Some(LuaValue::Nil) => None,
        Some(other) => return Err(arg_type_error(2, "setmetatable", "nil or table", &other)),
        None => return Err(arg_error(2, "setmetatable", "nil or table expected")),
    };
    if let Some(current) = table.get_metatable()
        && !current.get_str(TmKind::Metatable.name()).is_nil()
    {
        return Err(LuaError::runtime("cannot change a protected metatable"));
    }
    table.set_metatable(metatable);
    Ok(MultiValue::single(LuaValue::Table(table)))
}

/// rawget(t, k) - Get without metamethods
fn lua_rawget(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = require_table(&args, 1, "rawget")?;
    let key = require_arg(&args, 2, "rawget")?;
    Ok(MultiValue::single(table.get_raw(&key)))
}

/// rawset(t, k, v) - Set without metamethods, returns t
fn lua_rawset(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = require_table(&args, 1, "rawset")?;
    let key = require_arg(&args, 2, "rawset")?;
    let value = require_arg(&args, 3, "rawset")?;
    table.set_raw(key, value)?;
    Ok(MultiValue::single(LuaValue::Table(table)))
}

/// rawlen(v) - Length without metamethods
fn lua_rawlen(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let len = match require_arg(&args, 1, "rawlen")? {
        LuaValue::Table(t) => t.raw_len(),
        LuaValue::String(s) => s.len(),
        other => return Err(arg_type_error(1, "rawlen", "table or string", &other)),
    };
    Ok(MultiValue::single(LuaValue::Number(len as f64)))
}

/// rawequal(a, b) - Equality without metamethods
fn lua_rawequal(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let a = require_arg(&args, 1, "rawequal")?;
    let b = require_arg(&args, 2, "rawequal")?;
    Ok(MultiValue::single(LuaValue::Boolean(a.raw_equal(&b))))
}

/// unpack(t [, i [, j]]) - t[i], ..., t[j]
pub(crate) fn lua_unpack(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let target = require_arg(&args, 1, "unpack")?;
    let bound = |index: usize, default: i64| -> LuaResult<i64> {
        match get_arg(&args, index) {
            None | Some(LuaValue::Nil) => Ok(default),
            Some(v) => v
                .to_number()
                .and_then(crate::lua_value::number::number_to_integer)
                .ok_or_else(|| arg_type_error(index, "unpack", "number", &v)),
        }
    };
    let first = bound(2, 1)?;
    let last = match get_arg(&args, 3) {
        None | Some(LuaValue::Nil) => state
            .len(&target)?
            .to_number()
            .and_then(crate::lua_value::number::number_to_integer)
            .unwrap_or(0),
        Some(_) => bound(3, 0)?,
    };
    if first > last {
        return Ok(MultiValue::empty());
    }
    let count = last
        .checked_sub(first)
        .and_then(|span| span.checked_add(1))
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n <= MAX_RESULTS)
        .ok_or_else(|| LuaError::runtime("too many results to unpack"))?;
    let mut values = Vec::with_capacity(count);
    for i in first..=last {
        values.push(state.index(&target, &LuaValue::Number(i as f64))?);
    }
    Ok(MultiValue::multiple(values))
}
