/// Metamethod events and the operators that fall back to them.
///
/// Lookup always tries the left operand's metatable first, then the
/// right operand's; when neither provides a handler the operation fails with
/// a `TypeError`. Metatable fields are read raw, so `__index` on a metatable
/// never takes part in event lookup.
use crate::lua_value::number::{format_number, parse_lua_number};
use crate::lua_value::{LuaOrdering, LuaTable, LuaValue, MultiValue};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// Metamethod event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TmKind {
    Index,
    NewIndex,
    Len,
    Eq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Concat,
    Lt,
    Le,
    Call,
    ToString,
    Metatable,
    Pairs,
}

impl TmKind {
    pub fn name(self) -> &'static str {
        match self {
            TmKind::Index => "__index",
            TmKind::NewIndex => "__newindex",
            TmKind::Len => "__len",
            TmKind::Eq => "__eq",
            TmKind::Add => "__add",
            TmKind::Sub => "__sub",
            TmKind::Mul => "__mul",
            TmKind::Div => "__div",
            TmKind::Mod => "__mod",
            TmKind::Pow => "__pow",
            TmKind::Unm => "__unm",
            TmKind::Concat => "__concat",
            TmKind::Lt => "__lt",
            TmKind::Le => "__le",
            TmKind::Call => "__call",
            TmKind::ToString => "__tostring",
            TmKind::Metatable => "__metatable",
            TmKind::Pairs => "__pairs",
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    pub fn event(self) -> TmKind {
        match self {
            ArithOp::Add => TmKind::Add,
            ArithOp::Sub => TmKind::Sub,
            ArithOp::Mul => TmKind::Mul,
            ArithOp::Div => TmKind::Div,
            ArithOp::Mod => TmKind::Mod,
            ArithOp::Pow => TmKind::Pow,
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            // floored modulo: the result takes the sign of the divisor
            ArithOp::Mod => a - (a / b).floor() * b,
            ArithOp::Pow => a.powf(b),
        }
    }
}

/// Metatable of any value: per-table, per-type for user data, shared for
/// strings. Other kinds have none.
pub fn get_metatable(lua_state: &LuaState, value: &LuaValue) -> Option<LuaTable> {
    match value {
        LuaValue::Table(t) => t.get_metatable(),
        LuaValue::UserData(u) => u.get_metatable(),
        LuaValue::String(_) => lua_state.vm().string_metatable(),
        _ => None,
    }
}

/// Raw lookup of `event` in the metatable of `value`.
pub fn get_metamethod(lua_state: &LuaState, value: &LuaValue, event: TmKind) -> Option<LuaValue> {
    let metatable = get_metatable(lua_state, value)?;
    let handler = metatable.get_str(event.name());
    (!handler.is_nil()).then_some(handler)
}

/// Handler for a binary event: left operand first, then right.
fn get_binop_metamethod(
    lua_state: &LuaState,
    p1: &LuaValue,
    p2: &LuaValue,
    event: TmKind,
) -> Option<LuaValue> {
    get_metamethod(lua_state, p1, event).or_else(|| get_metamethod(lua_state, p2, event))
}

/// Call a handler and keep exactly one result.
pub fn call_tm_res(lua_state: &LuaState, handler: &LuaValue, args: Vec<LuaValue>) -> LuaResult<LuaValue> {
    let results = lua_state.call(handler, MultiValue::multiple(args))?;
    Ok(results.adjust(1).into_first())
}

fn try_bin_tm(
    lua_state: &LuaState,
    p1: &LuaValue,
    p2: &LuaValue,
    event: TmKind,
) -> LuaResult<Option<LuaValue>> {
    match get_binop_metamethod(lua_state, p1, p2, event) {
        Some(handler) => call_tm_res(lua_state, &handler, vec![p1.clone(), p2.clone()]).map(Some),
        None => Ok(None),
    }
}

/// Numeric value of an arithmetic operand; numeric strings coerce.
fn arith_operand(value: &LuaValue) -> Option<f64> {
    match value {
        LuaValue::Number(n) => Some(*n),
        LuaValue::String(s) => parse_lua_number(s.as_str()),
        _ => None,
    }
}

pub fn arith(lua_state: &LuaState, op: ArithOp, a: &LuaValue, b: &LuaValue) -> LuaResult<LuaValue> {
    if let (Some(x), Some(y)) = (arith_operand(a), arith_operand(b)) {
        return Ok(LuaValue::Number(op.apply(x, y)));
    }
    if let Some(result) = try_bin_tm(lua_state, a, b, op.event())? {
        return Ok(result);
    }
    let culprit = if arith_operand(a).is_none() { a } else { b };
    Err(LuaError::type_error(format!(
        "attempt to perform arithmetic on a {} value",
        culprit.type_name()
    )))
}

pub fn unary_minus(lua_state: &LuaState, a: &LuaValue) -> LuaResult<LuaValue> {
    if let Some(n) = arith_operand(a) {
        return Ok(LuaValue::Number(-n));
    }
    if let Some(handler) = get_metamethod(lua_state, a, TmKind::Unm) {
        return call_tm_res(lua_state, &handler, vec![a.clone(), a.clone()]);
    }
    Err(LuaError::type_error(format!(
        "attempt to perform arithmetic on a {} value",
        a.type_name()
    )))
}

fn concat_operand(value: &LuaValue) -> Option<String> {
    match value {
        LuaValue::String(s) => Some(s.as_str().to_owned()),
        LuaValue::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

pub fn concat(lua_state: &LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<LuaValue> {
    if let (Some(mut x), Some(y)) = (concat_operand(a), concat_operand(b)) {
        x.push_str(&y);
        return Ok(LuaValue::string(x));
    }
    if let Some(result) = try_bin_tm(lua_state, a, b, TmKind::Concat)? {
        return Ok(result);
    }
    let culprit = if concat_operand(a).is_none() { a } else { b };
    Err(LuaError::type_error(format!(
        "attempt to concatenate a {} value",
        culprit.type_name()
    )))
}

/// Length operator: byte length of strings, `__len` if present, otherwise a
/// border of a table.
pub fn len(lua_state: &LuaState, value: &LuaValue) -> LuaResult<LuaValue> {
    if let LuaValue::String(s) = value {
        return Ok(LuaValue::Number(s.len() as f64));
    }
    if let Some(handler) = get_metamethod(lua_state, value, TmKind::Len) {
        return call_tm_res(lua_state, &handler, vec![value.clone()]);
    }
    match value {
        LuaValue::Table(t) => Ok(LuaValue::Number(t.raw_len() as f64)),
        other => Err(LuaError::type_error(format!(
            "attempt to get length of a {} value",
            other.type_name()
        ))),
    }
}

/// Equality with `__eq`. The handler is only consulted when both operands
/// are tables (or both user data) and they are not raw-equal.
pub fn equals(lua_state: &LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if a.raw_equal(b) {
        return Ok(true);
    }
    let eligible = matches!(
        (a, b),
        (LuaValue::Table(_), LuaValue::Table(_)) | (LuaValue::UserData(_), LuaValue::UserData(_))
    );
    if !eligible {
        return Ok(false);
    }
    match try_bin_tm(lua_state, a, b, TmKind::Eq)? {
        Some(result) => Ok(result.is_truthy()),
        None => Ok(false),
    }
}

fn compare_error(a: &LuaValue, b: &LuaValue) -> LuaError {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        LuaError::type_error(format!("attempt to compare two {ta} values"))
    } else {
        LuaError::type_error(format!("attempt to compare {ta} with {tb}"))
    }
}

pub fn less_than(lua_state: &LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if let (LuaValue::Number(x), LuaValue::Number(y)) = (a, b) {
        return Ok(x < y);
    }
    match a.raw_compare(b) {
        LuaOrdering::Less => return Ok(true),
        LuaOrdering::Equal | LuaOrdering::Greater => return Ok(false),
        LuaOrdering::Incomparable => {}
    }
    match try_bin_tm(lua_state, a, b, TmKind::Lt)? {
        Some(result) => Ok(result.is_truthy()),
        None => Err(compare_error(a, b)),
    }
}

/// `a <= b`; without `__le` falls back to `not (b < a)` through `__lt`.
pub fn less_equal(lua_state: &LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if let (LuaValue::Number(x), LuaValue::Number(y)) = (a, b) {
        return Ok(x <= y);
    }
    match a.raw_compare(b) {
        LuaOrdering::Less | LuaOrdering::Equal => return Ok(true),
        LuaOrdering::Greater => return Ok(false),
        LuaOrdering::Incomparable => {}
    }
    if let Some(result) = try_bin_tm(lua_state, a, b, TmKind::Le)? {
        return Ok(result.is_truthy());
    }
    match try_bin_tm(lua_state, b, a, TmKind::Lt)? {
        Some(result) => Ok(!result.is_truthy()),
        None => Err(compare_error(a, b)),
    }
}

/// `tostring` semantics: `__tostring` when present, the canonical
/// rendering otherwise.
pub fn to_display_string(lua_state: &LuaState, value: &LuaValue) -> LuaResult<String> {
    if let Some(handler) = get_metamethod(lua_state, value, TmKind::ToString) {
        let result = call_tm_res(lua_state, &handler, vec![value.clone()])?;
        return match result {
            LuaValue::String(s) => Ok(s.as_str().to_owned()),
            LuaValue::Number(n) => Ok(format_number(n)),
            _ => Err(LuaError::runtime("'__tostring' must return a string")),
        };
    }
    Ok(value.to_canonical_string())
}
