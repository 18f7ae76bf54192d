// Error kinds surfaced by the runtime.
// Every fallible operation returns LuaResult and propagates with `?`.

use crate::lua_value::LuaValue;
use thiserror::Error;

/// Coarse classification of a [`LuaError`], used by scripts and hosts that
/// only care about the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaErrorKind {
    Type,
    NoMatchingOverload,
    AmbiguousCall,
    Index,
    Runtime,
    MissingMember,
    UnsupportedOperation,
    AlreadyRegistered,
    Compile,
    Aborted,
}

#[derive(Error, Debug, Clone)]
pub enum LuaError {
    /// Operation attempted on an incompatible value kind.
    #[error("{0}")]
    TypeError(String),

    /// No overload accepts the given arguments.
    #[error("no overload of '{name}' matches the arguments ({args})")]
    NoMatchingOverload { name: String, args: String },

    /// Two or more overloads are equally good for the given arguments.
    #[error("ambiguous call to '{name}': {candidates}")]
    AmbiguousCall { name: String, candidates: String },

    #[error("{0}")]
    IndexError(String),

    /// Script-raised or generic runtime failure. `value` is the error object
    /// as seen by scripts (usually the message string).
    #[error("{message}")]
    RuntimeError { message: String, value: LuaValue },

    #[error("'{member}' is not a member of type '{type_name}'")]
    MissingMember { type_name: String, member: String },

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("the name '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("{chunk}: {message}")]
    CompileError { chunk: String, message: String },

    /// The thread was cancelled while suspended (runtime shut down or the
    /// coroutine became unreachable).
    #[error("coroutine aborted")]
    Aborted,
}

pub type LuaResult<T> = Result<T, LuaError>;

impl LuaError {
    pub fn runtime(message: impl Into<String>) -> Self {
        let message = message.into();
        LuaError::RuntimeError {
            value: LuaValue::string(&message),
            message,
        }
    }

    /// Wrap an arbitrary script value raised with `error(v)`.
    pub fn from_value(value: LuaValue) -> Self {
        let message = match &value {
            LuaValue::String(s) => s.as_str().to_owned(),
            LuaValue::Nil => "nil".to_owned(),
            LuaValue::Number(_) | LuaValue::Boolean(_) => value.to_canonical_string(),
            other => format!("(error object is a {} value)", other.type_name()),
        };
        LuaError::RuntimeError { message, value }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        LuaError::TypeError(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        LuaError::UnsupportedOperation(message.into())
    }

    pub fn kind(&self) -> LuaErrorKind {
        match self {
            LuaError::TypeError(_) => LuaErrorKind::Type,
            LuaError::NoMatchingOverload { .. } => LuaErrorKind::NoMatchingOverload,
            LuaError::AmbiguousCall { .. } => LuaErrorKind::AmbiguousCall,
            LuaError::IndexError(_) => LuaErrorKind::Index,
            LuaError::RuntimeError { .. } => LuaErrorKind::Runtime,
            LuaError::MissingMember { .. } => LuaErrorKind::MissingMember,
            LuaError::UnsupportedOperation(_) => LuaErrorKind::UnsupportedOperation,
            LuaError::AlreadyRegistered(_) => LuaErrorKind::AlreadyRegistered,
            LuaError::CompileError { .. } => LuaErrorKind::Compile,
            LuaError::Aborted => LuaErrorKind::Aborted,
        }
    }

    /// The value a protected call hands back to the script.
    pub fn to_value(&self) -> LuaValue {
        match self {
            LuaError::RuntimeError { value, .. } => value.clone(),
            other => LuaValue::string(other.to_string()),
        }
    }

    /// Cancellation must unwind through protected calls.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, LuaError::Aborted)
    }
}
