//! Overload resolution for native functions.
//!
//! Resolution is deterministic: candidates are scored in registration order
//! and only a unique minimum distance is accepted.
//!
//! 1. Candidates whose arity range excludes the argument count are dropped.
//! 2. Exact pass: every argument must already be assignable to its
//!    parameter. A parameter of the argument's own type costs 0; `any`, a
//!    parent user data type, or nil for a nullable parameter cost 1.
//! 3. Conversion pass, only when the exact pass found nothing: numeric
//!    strings become numbers, numbers become strings, user data go through
//!    their declared conversions and callable tables become callbacks. Each
//!    conversion costs 2.
//!
//! A tie at the minimum is an `AmbiguousCall`; no survivors is a
//! `NoMatchingOverload`.

use std::sync::Arc;

use crate::lua_value::number::{format_number, parse_lua_number};
use crate::lua_value::{LuaValue, NativeType, Overload, Param, Signature};
use crate::lua_vm::execute::metamethod::{TmKind, get_metamethod};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

const SUBTYPE_DISTANCE: usize = 1;
const CONVERSION_DISTANCE: usize = 2;

/// Cost of passing `value` to a parameter of type `ty` without conversion.
fn exact_distance(ty: &NativeType, nullable: bool, value: &LuaValue) -> Option<usize> {
    match (ty, value) {
        (NativeType::Any, _) => Some(SUBTYPE_DISTANCE),
        (_, LuaValue::Nil) if nullable => Some(SUBTYPE_DISTANCE),
        (NativeType::Boolean, LuaValue::Boolean(_)) => Some(0),
        (NativeType::Number(kind), LuaValue::Number(n)) => kind.can_hold(*n).then_some(0),
        (NativeType::String, LuaValue::String(_)) => Some(0),
        (NativeType::Table, LuaValue::Table(_)) => Some(0),
        (NativeType::Function, LuaValue::Function(_)) => Some(0),
        (NativeType::Callback, LuaValue::Function(_)) => Some(0),
        (NativeType::Thread, LuaValue::Thread(_)) => Some(0),
        (NativeType::AnyUserData, LuaValue::UserData(_)) => Some(0),
        (NativeType::UserData(key), LuaValue::UserData(ud)) if !ud.is_type() => {
            let descriptor = ud.descriptor();
            if descriptor.key() == *key {
                Some(0)
            } else if descriptor.parents().contains(key) {
                Some(SUBTYPE_DISTANCE)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Cost and adapted value for the conversion pass.
fn convert_argument(
    lua_state: &LuaState,
    ty: &NativeType,
    nullable: bool,
    value: &LuaValue,
) -> Option<(usize, LuaValue)> {
    if let Some(d) = exact_distance(ty, nullable, value) {
        return Some((d, value.clone()));
    }
    let converted = match (ty, value) {
        (NativeType::Number(kind), LuaValue::String(s)) => parse_lua_number(s.as_str())
            .filter(|n| kind.can_hold(*n))
            .map(LuaValue::Number),
        (NativeType::String, LuaValue::Number(n)) => Some(LuaValue::string(format_number(*n))),
        (NativeType::Callback, LuaValue::Table(_) | LuaValue::UserData(_)) => {
            get_metamethod(lua_state, value, TmKind::Call).map(|_| value.clone())
        }
        (_, LuaValue::UserData(ud)) if !ud.is_type() => ud
            .descriptor()
            .conversion_to(ty)
            .and_then(|conversion| conversion.apply(ud).ok()),
        _ => None,
    }?;
    Some((CONVERSION_DISTANCE, converted))
}

/// Parameter type applying to argument `i`, or `None` for an extra argument
/// that is dropped.
fn slot(signature: &Signature, i: usize) -> Option<(&NativeType, bool)> {
    match signature.params.get(i) {
        Some(Param { ty, nullable, .. }) => Some((ty, *nullable)),
        None => signature.variadic.as_ref().map(|ty| (ty, false)),
    }
}

fn score_exact(signature: &Signature, args: &[LuaValue]) -> Option<usize> {
    let mut total = 0;
    for (i, arg) in args.iter().enumerate() {
        if let Some((ty, nullable)) = slot(signature, i) {
            total += exact_distance(ty, nullable, arg)?;
        }
    }
    Some(total)
}

fn score_converted(
    lua_state: &LuaState,
    signature: &Signature,
    args: &[LuaValue],
) -> Option<(usize, Vec<LuaValue>)> {
    let mut total = 0;
    let mut adapted = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        match slot(signature, i) {
            Some((ty, nullable)) => {
                let (d, value) = convert_argument(lua_state, ty, nullable, arg)?;
                total += d;
                adapted.push(value);
            }
            None => adapted.push(arg.clone()),
        }
    }
    Some((total, adapted))
}

/// Fill omitted optional parameters with their defaults and drop arguments
/// beyond the declared list when the signature ignores them.
fn finish_arguments(signature: &Signature, mut args: Vec<LuaValue>) -> Vec<LuaValue> {
    if args.len() < signature.params.len() {
        for param in &signature.params[args.len()..] {
            args.push(param.default.clone().unwrap_or_default());
        }
    } else if signature.variadic.is_none() && args.len() > signature.params.len() {
        args.truncate(signature.params.len());
    }
    args
}

/// Pick the unique minimum; `Ok(None)` when there are no scored candidates.
fn pick<T>(
    name: &str,
    scored: Vec<(usize, Arc<Overload>, T)>,
) -> LuaResult<Option<(Arc<Overload>, T)>> {
    let Some(best) = scored.iter().map(|(d, _, _)| *d).min() else {
        return Ok(None);
    };
    let mut winners: Vec<_> = scored.into_iter().filter(|(d, _, _)| *d == best).collect();
    if winners.len() > 1 {
        let candidates = winners
            .iter()
            .map(|(_, o, _)| o.signature().to_string())
            .collect::<Vec<_>>()
            .join(" and ");
        return Err(LuaError::AmbiguousCall {
            name: name.to_owned(),
            candidates,
        });
    }
    Ok(winners.pop().map(|(_, overload, extra)| (overload, extra)))
}

fn describe_args(args: &[LuaValue]) -> String {
    args.iter()
        .map(|a| match a {
            LuaValue::UserData(ud) => ud.type_name().to_owned(),
            other => other.type_name().to_owned(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Choose among `candidates` and adapt `args` to the chosen signature.
pub fn resolve(
    lua_state: &LuaState,
    name: &str,
    candidates: &[Arc<Overload>],
    args: Vec<LuaValue>,
) -> LuaResult<(Arc<Overload>, Vec<LuaValue>)> {
    let viable: Vec<&Arc<Overload>> = candidates
        .iter()
        .filter(|o| o.signature().accepts_count(args.len()))
        .collect();

    let exact: Vec<_> = viable
        .iter()
        .filter_map(|o| score_exact(o.signature(), &args).map(|d| (d, Arc::clone(o), ())))
        .collect();
    if let Some((overload, ())) = pick(name, exact)? {
        let adapted = finish_arguments(overload.signature(), args);
        return Ok((overload, adapted));
    }

    let converted: Vec<_> = viable
        .iter()
        .filter_map(|o| {
            score_converted(lua_state, o.signature(), &args).map(|(d, a)| (d, Arc::clone(o), a))
        })
        .collect();
    if let Some((overload, adapted)) = pick(name, converted)? {
        let adapted = finish_arguments(overload.signature(), adapted);
        return Ok((overload, adapted));
    }

    Err(LuaError::NoMatchingOverload {
        name: name.to_owned(),
        args: describe_args(&args),
    })
}
