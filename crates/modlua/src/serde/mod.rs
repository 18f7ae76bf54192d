/// JSON bridge for script values
///
/// Conversions go through `serde_json::Value`. `LuaValue` also implements
/// `Serialize` on top of the same conversion, so values can be written with
/// any serde format; functions, threads and user data fail to serialize.
mod deserializer;
mod serializer;

use ::serde::{Serialize, Serializer};

use crate::lua_value::LuaValue;
use crate::lua_vm::LuaResult;

pub use deserializer::{from_str, from_value};
pub use serializer::{to_string, to_value};

/// Convert a value to a `serde_json::Value`
pub fn lua_to_json(lua_value: &LuaValue) -> LuaResult<serde_json::Value> {
    to_value(lua_value)
}

/// Convert a value to JSON text
pub fn lua_to_json_string(lua_value: &LuaValue, pretty: bool) -> LuaResult<String> {
    to_string(lua_value, pretty)
}

/// Convert a `serde_json::Value` to a value
pub fn json_to_lua(json_value: &serde_json::Value) -> LuaResult<LuaValue> {
    from_value(json_value)
}

/// Parse JSON text into a value
pub fn json_string_to_lua(json_str: &str) -> LuaResult<LuaValue> {
    from_str(json_str)
}

impl Serialize for LuaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_value(self)
            .map_err(::serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
