// Script value representation
// Values are small enums; reference kinds are Arc handles shared across threads
mod lua_convert;
mod lua_function;
mod lua_table;
mod lua_thread;
mod lua_userdata;
mod lua_value;
pub mod number;
mod userdata_builder;

use smol_str::SmolStr;
use std::fmt;
use std::hash::{Hash, Hasher};

pub use lua_convert::{
    ArgCursor, FromLua, IntoLua, IntoLuaMulti, IntoOverload, NativeParam, ParamSpec, Plain, Ud,
    Variadic, WithState,
};
pub use lua_function::{
    FunctionKind, LuaFunction, NativeFn, NativeType, NumberKind, Overload, OverloadSet, Param,
    ScriptBody, ScriptFunction, Signature,
};
pub use lua_table::LuaTable;
pub use lua_thread::{CoroutineStatus, LuaThread};
pub(crate) use lua_thread::ThreadHandle;
pub use lua_userdata::{Conversion, LuaUserdata, TypeDescriptor, TypeKey};
pub use lua_value::{LuaOrdering, LuaValue, LuaValueKind};
pub use userdata_builder::TypeBuilder;

/// Argument list or result list of a call. Zero and one values stay off
/// the heap; `Many` always holds two or more.
///
/// Constructors normalise the representation, so derived equality compares
/// value lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MultiValue {
    #[default]
    Empty,
    Single(LuaValue),
    Many(Vec<LuaValue>),
}

impl MultiValue {
    #[inline(always)]
    pub fn empty() -> Self {
        MultiValue::Empty
    }

    #[inline(always)]
    pub fn single(value: LuaValue) -> Self {
        MultiValue::Single(value)
    }

    #[inline(always)]
    pub fn two(v1: LuaValue, v2: LuaValue) -> Self {
        MultiValue::Many(vec![v1, v2])
    }

    pub fn multiple(mut values: Vec<LuaValue>) -> Self {
        match values.len() {
            0 => MultiValue::Empty,
            1 => MultiValue::Single(values.pop().unwrap_or_default()),
            _ => MultiValue::Many(values),
        }
    }

    /// Build an argument list from per-expression results: every expression
    /// but the last contributes its first value (or nil), the last one is
    /// spliced in whole.
    pub fn from_call_args(parts: Vec<MultiValue>) -> Self {
        let count = parts.len();
        let mut values = Vec::with_capacity(count);
        for (i, part) in parts.into_iter().enumerate() {
            if i + 1 == count {
                values.extend(part.all_values());
            } else {
                values.push(part.into_first());
            }
        }
        MultiValue::multiple(values)
    }

    #[inline(always)]
    pub fn all_values(self) -> Vec<LuaValue> {
        match self {
            MultiValue::Empty => Vec::new(),
            MultiValue::Single(v) => vec![v],
            MultiValue::Many(v) => v,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        match self {
            MultiValue::Empty => 0,
            MultiValue::Single(_) => 1,
            MultiValue::Many(v) => v.len(),
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&LuaValue> {
        self.get(0)
    }

    /// First value, or nil when there is none.
    pub fn into_first(self) -> LuaValue {
        match self {
            MultiValue::Empty => LuaValue::Nil,
            MultiValue::Single(v) => v,
            MultiValue::Many(v) => v.into_iter().next().unwrap_or_default(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&LuaValue> {
        match self {
            MultiValue::Empty => None,
            MultiValue::Single(v) => (index == 0).then_some(v),
            MultiValue::Many(v) => v.get(index),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LuaValue> {
        match self {
            MultiValue::Empty => [].iter(),
            MultiValue::Single(v) => std::slice::from_ref(v).iter(),
            MultiValue::Many(v) => v.iter(),
        }
    }

    /// Prepend a value (receiver of a method call, table of `__call`).
    pub fn with_first(self, first: LuaValue) -> Self {
        let mut values = Vec::with_capacity(self.len() + 1);
        values.push(first);
        values.extend(self.all_values());
        MultiValue::multiple(values)
    }

    /// Truncate or pad with nil to exactly `n` values.
    pub fn adjust(self, n: usize) -> Self {
        if self.len() == n {
            return self;
        }
        let mut values = self.all_values();
        values.resize(n, LuaValue::Nil);
        MultiValue::multiple(values)
    }
}

/// Fix a result list to exactly `n` values. Idempotent for any `n`.
pub fn adjust_result_count(values: MultiValue, n: usize) -> MultiValue {
    values.adjust(n)
}

impl From<LuaValue> for MultiValue {
    fn from(v: LuaValue) -> Self {
        MultiValue::Single(v)
    }
}

impl From<Vec<LuaValue>> for MultiValue {
    fn from(v: Vec<LuaValue>) -> Self {
        MultiValue::multiple(v)
    }
}

impl FromIterator<LuaValue> for MultiValue {
    fn from_iter<I: IntoIterator<Item = LuaValue>>(iter: I) -> Self {
        MultiValue::multiple(iter.into_iter().collect())
    }
}

impl IntoIterator for MultiValue {
    type Item = LuaValue;
    type IntoIter = std::vec::IntoIter<LuaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.all_values().into_iter()
    }
}

/// Immutable script string with a cached hash.
#[derive(Clone)]
pub struct LuaString {
    hash: u64,
    data: SmolStr,
}

impl LuaString {
    pub fn new(s: &str) -> Self {
        // FNV-1a
        let mut hash = 0xcbf29ce484222325u64;
        for byte in s.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        LuaString {
            hash,
            data: SmolStr::new(s),
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        self.data.as_str()
    }

    #[inline(always)]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PartialEq for LuaString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}

impl Eq for LuaString {}

impl Hash for LuaString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        LuaString::new(s)
    }
}
