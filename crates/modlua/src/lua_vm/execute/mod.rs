// Operations on values: calls, indexing, operators and overload resolution
pub(crate) mod call;
pub(crate) mod index;
pub(crate) mod metamethod;
pub(crate) mod overload;

pub use metamethod::{ArithOp, TmKind};
