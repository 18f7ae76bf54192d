use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::number::{format_number, number_to_integer, parse_lua_number};
use super::{LuaFunction, LuaString, LuaTable, LuaThread, LuaUserdata};

/// Basic type tag of a value. The names are what `type()` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Thread,
    UserData,
}

impl LuaValueKind {
    pub fn name(self) -> &'static str {
        match self {
            LuaValueKind::Nil => "nil",
            LuaValueKind::Boolean => "boolean",
            LuaValueKind::Number => "number",
            LuaValueKind::String => "string",
            LuaValueKind::Table => "table",
            LuaValueKind::Function => "function",
            LuaValueKind::Thread => "thread",
            LuaValueKind::UserData => "userdata",
        }
    }
}

/// Result of the raw ordering between two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaOrdering {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl From<Ordering> for LuaOrdering {
    fn from(o: Ordering) -> Self {
        match o {
            Ordering::Less => LuaOrdering::Less,
            Ordering::Equal => LuaOrdering::Equal,
            Ordering::Greater => LuaOrdering::Greater,
        }
    }
}

/// A dynamically typed script value.
///
/// Reference kinds (tables, functions, threads, user data) are cheap shared
/// handles; cloning a value never copies the referenced object.
#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(LuaString),
    Table(LuaTable),
    Function(LuaFunction),
    Thread(LuaThread),
    UserData(LuaUserdata),
}

impl LuaValue {
    #[inline(always)]
    pub const fn nil() -> Self {
        LuaValue::Nil
    }

    #[inline(always)]
    pub const fn boolean(b: bool) -> Self {
        LuaValue::Boolean(b)
    }

    #[inline(always)]
    pub const fn number(n: f64) -> Self {
        LuaValue::Number(n)
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        LuaValue::String(LuaString::new(s.as_ref()))
    }

    #[inline]
    pub fn kind(&self) -> LuaValueKind {
        match self {
            LuaValue::Nil => LuaValueKind::Nil,
            LuaValue::Boolean(_) => LuaValueKind::Boolean,
            LuaValue::Number(_) => LuaValueKind::Number,
            LuaValue::String(_) => LuaValueKind::String,
            LuaValue::Table(_) => LuaValueKind::Table,
            LuaValue::Function(_) => LuaValueKind::Function,
            LuaValue::Thread(_) => LuaValueKind::Thread,
            LuaValue::UserData(_) => LuaValueKind::UserData,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// Everything except `nil` and `false` is true.
    #[inline(always)]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    #[inline(always)]
    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::String(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_))
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LuaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The number held by a `Number` value, without string coercion.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral numbers that fit in an i64.
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().and_then(number_to_integer)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_lua_string(&self) -> Option<&LuaString> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&LuaTable> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&LuaFunction> {
        match self {
            LuaValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&LuaThread> {
        match self {
            LuaValue::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&LuaUserdata> {
        match self {
            LuaValue::UserData(u) => Some(u),
            _ => None,
        }
    }

    /// Numeric value of a number or of a string that parses as a number.
    /// Malformed strings yield `None`.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            LuaValue::String(s) => parse_lua_number(s.as_str()),
            _ => None,
        }
    }

    /// Primitive equality: value equality for nil/boolean/number/string,
    /// identity for reference kinds. Never consults `__eq`.
    pub fn raw_equal(&self, other: &LuaValue) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => a.ptr_eq(b),
            (LuaValue::Function(a), LuaValue::Function(b)) => a.ptr_eq(b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => a.ptr_eq(b),
            (LuaValue::UserData(a), LuaValue::UserData(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Ordering without metamethods. Only number/number and string/string
    /// pairs are ordered; NaN and every other pairing is `Incomparable`.
    pub fn raw_compare(&self, other: &LuaValue) -> LuaOrdering {
        match (self, other) {
            (LuaValue::Number(a), LuaValue::Number(b)) => a
                .partial_cmp(b)
                .map(LuaOrdering::from)
                .unwrap_or(LuaOrdering::Incomparable),
            (LuaValue::String(a), LuaValue::String(b)) => {
                a.as_str().as_bytes().cmp(b.as_str().as_bytes()).into()
            }
            _ => LuaOrdering::Incomparable,
        }
    }

    /// Address used for identity display (`table: 0x...`).
    pub fn raw_ptr(&self) -> usize {
        match self {
            LuaValue::Table(t) => t.as_ptr(),
            LuaValue::Function(f) => f.as_ptr(),
            LuaValue::Thread(t) => t.as_ptr(),
            LuaValue::UserData(u) => u.as_ptr(),
            _ => 0,
        }
    }

    /// Rendering without metamethods.
    pub fn to_canonical_string(&self) -> String {
        match self {
            LuaValue::Nil => "nil".to_owned(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Number(n) => format_number(*n),
            LuaValue::String(s) => s.as_str().to_owned(),
            LuaValue::UserData(u) if u.is_type() => format!("type: {}", u.type_name()),
            other => format!("{}: 0x{:012x}", other.type_name(), other.raw_ptr()),
        }
    }

    /// A valid table key: not nil and not NaN.
    pub(crate) fn is_valid_key(&self) -> bool {
        match self {
            LuaValue::Nil => false,
            LuaValue::Number(n) => !n.is_nan(),
            _ => true,
        }
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

// Tables never store NaN keys, so raw equality is reflexive for every key.
impl Eq for LuaValue {}

impl Hash for LuaValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LuaValue::Nil => {}
            LuaValue::Boolean(b) => b.hash(state),
            LuaValue::Number(n) => {
                // 0.0 and -0.0 are the same key
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state)
            }
            LuaValue::String(s) => state.write_u64(s.hash_code()),
            other => other.raw_ptr().hash(state),
        }
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::String(s) => write!(f, "{:?}", s.as_str()),
            other => write!(f, "{}", other.to_canonical_string()),
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<i32> for LuaValue {
    fn from(n: i32) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<i64> for LuaValue {
    fn from(n: i64) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<usize> for LuaValue {
    fn from(n: usize) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::string(s)
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::string(s)
    }
}

impl From<LuaString> for LuaValue {
    fn from(s: LuaString) -> Self {
        LuaValue::String(s)
    }
}

impl From<LuaTable> for LuaValue {
    fn from(t: LuaTable) -> Self {
        LuaValue::Table(t)
    }
}

impl From<LuaFunction> for LuaValue {
    fn from(f: LuaFunction) -> Self {
        LuaValue::Function(f)
    }
}

impl From<LuaThread> for LuaValue {
    fn from(t: LuaThread) -> Self {
        LuaValue::Thread(t)
    }
}

impl From<LuaUserdata> for LuaValue {
    fn from(u: LuaUserdata) -> Self {
        LuaValue::UserData(u)
    }
}

impl<T: Into<LuaValue>> From<Option<T>> for LuaValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}
