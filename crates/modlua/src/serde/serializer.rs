/// Value to JSON conversion:
/// - nil -> null
/// - boolean -> boolean
/// - integral number -> integer, other finite number -> float
/// - string -> string
/// - table whose border covers every entry -> array
/// - any other table -> object (string and number keys only)
/// - function, thread, userdata -> error
use ahash::AHashSet;
use serde_json::{Map, Number, Value as JsonValue};

use crate::lua_value::number::{format_number, number_to_integer};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaResult};

pub fn to_value(lua_value: &LuaValue) -> LuaResult<JsonValue> {
    let mut visited = AHashSet::new();
    to_value_internal(lua_value, &mut visited)
}

pub fn to_string(lua_value: &LuaValue, pretty: bool) -> LuaResult<String> {
    let json_value = to_value(lua_value)?;
    let text = if pretty {
        serde_json::to_string_pretty(&json_value)
    } else {
        serde_json::to_string(&json_value)
    };
    text.map_err(|e| LuaError::runtime(format!("failed to serialize to JSON: {e}")))
}

fn to_value_internal(lua_value: &LuaValue, visited: &mut AHashSet<usize>) -> LuaResult<JsonValue> {
    match lua_value {
        LuaValue::Nil => Ok(JsonValue::Null),
        LuaValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        LuaValue::Number(n) => number_to_json(*n),
        LuaValue::String(s) => Ok(JsonValue::String(s.as_str().to_owned())),
        LuaValue::Table(table) => {
            let ptr = table.as_ptr();
            if !visited.insert(ptr) {
                return Err(LuaError::runtime("circular reference detected in table"));
            }
            let result = match array_length(table) {
                Some(len) => table_to_json_array(table, len, visited),
                None => table_to_json_object(table, visited),
            };
            visited.remove(&ptr);
            result
        }
        other => Err(LuaError::type_error(format!(
            "cannot serialize a {} value to JSON",
            other.type_name()
        ))),
    }
}

fn number_to_json(n: f64) -> LuaResult<JsonValue> {
    if let Some(i) = number_to_integer(n) {
        return Ok(JsonValue::Number(Number::from(i)));
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or_else(|| LuaError::runtime(format!("cannot serialize {} to JSON", format_number(n))))
}

/// Length of the sequence 1..n when it holds every entry of the table.
/// The empty table counts as an array.
fn array_length(table: &LuaTable) -> Option<usize> {
    let len = table.raw_len();
    if table.count() != len {
        return None;
    }
    (1..=len as i64)
        .all(|i| !table.get_int(i).is_nil())
        .then_some(len)
}

fn table_to_json_array(
    table: &LuaTable,
    len: usize,
    visited: &mut AHashSet<usize>,
) -> LuaResult<JsonValue> {
    let mut array = Vec::with_capacity(len);
    for i in 1..=len as i64 {
        array.push(to_value_internal(&table.get_int(i), visited)?);
    }
    Ok(JsonValue::Array(array))
}

fn table_to_json_object(table: &LuaTable, visited: &mut AHashSet<usize>) -> LuaResult<JsonValue> {
    let mut object = Map::new();
    for (key, value) in table.pairs() {
        let key = match &key {
            LuaValue::String(s) => s.as_str().to_owned(),
            LuaValue::Number(n) => format_number(*n),
            other => {
                return Err(LuaError::type_error(format!(
                    "cannot use a {} key in a JSON object",
                    other.type_name()
                )));
            }
        };
        object.insert(key, to_value_internal(&value, visited)?);
    }
    Ok(JsonValue::Object(object))
}
