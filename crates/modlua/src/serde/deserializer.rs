/// JSON to value conversion:
/// - null -> nil (array holes stay holes)
/// - boolean -> boolean
/// - number -> number
/// - string -> string
/// - array -> table with keys 1..n
/// - object -> table with string keys
use serde_json::Value as JsonValue;

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaResult};

pub fn from_value(json_value: &JsonValue) -> LuaResult<LuaValue> {
    match json_value {
        JsonValue::Null => Ok(LuaValue::nil()),
        JsonValue::Bool(b) => Ok(LuaValue::boolean(*b)),
        JsonValue::Number(n) => n
            .as_f64()
            .map(LuaValue::number)
            .ok_or_else(|| LuaError::runtime(format!("invalid JSON number: {n}"))),
        JsonValue::String(s) => Ok(LuaValue::string(s)),
        JsonValue::Array(items) => {
            let table = LuaTable::with_capacity(items.len(), 0);
            for (i, item) in items.iter().enumerate() {
                let value = from_value(item)?;
                if !value.is_nil() {
                    table.set_int(i as i64 + 1, value)?;
                }
            }
            Ok(LuaValue::Table(table))
        }
        JsonValue::Object(map) => {
            let table = LuaTable::with_capacity(0, map.len());
            for (key, item) in map {
                table.set_str(key, from_value(item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

pub fn from_str(json_str: &str) -> LuaResult<LuaValue> {
    let json_value: JsonValue = serde_json::from_str(json_str)
        .map_err(|e| LuaError::runtime(format!("failed to parse JSON: {e}")))?;
    from_value(&json_value)
}
