// Math library
// Implements: abs, floor, max, min, random, randomseed, pi, huge
// The generator lives in the scheduler, so every environment has its own
// sequence.

use rand::Rng;

use crate::lib_registry::{LibraryModule, arg_error, arg_type_error, get_arg};
use crate::lua_value::number::number_to_integer;
use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaState};

pub fn create_math_lib() -> LibraryModule {
    let mut module = crate::lib_module!("math", {
        "abs" => math_abs,
        "floor" => math_floor,
        "max" => math_max,
        "min" => math_min,
        "random" => math_random,
        "randomseed" => math_randomseed,
    });

    module = module.with_value("pi", |_vm| LuaValue::number(std::f64::consts::PI));
    module = module.with_value("huge", |_vm| LuaValue::number(f64::INFINITY));

    module
}

fn check_number(args: &MultiValue, index: usize, func_name: &str) -> LuaResult<f64> {
    let value = get_arg(args, index).unwrap_or_default();
    value
        .to_number()
        .ok_or_else(|| arg_type_error(index, func_name, "number", &value))
}

fn check_integer(args: &MultiValue, index: usize, func_name: &str) -> LuaResult<i64> {
    let n = check_number(args, index, func_name)?;
    number_to_integer(n).ok_or_else(|| arg_error(index, func_name, "number has no integer representation"))
}

fn math_abs(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let n = check_number(&args, 1, "abs")?;
    Ok(MultiValue::single(LuaValue::number(n.abs())))
}

fn math_floor(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let n = check_number(&args, 1, "floor")?;
    Ok(MultiValue::single(LuaValue::number(n.floor())))
}

fn fold_numbers(
    args: &MultiValue,
    func_name: &str,
    pick: impl Fn(f64, f64) -> bool,
) -> LuaResult<MultiValue> {
    let mut best = check_number(args, 1, func_name)?;
    for i in 2..=args.len() {
        let n = check_number(args, i, func_name)?;
        if pick(n, best) {
            best = n;
        }
    }
    Ok(MultiValue::single(LuaValue::number(best)))
}

fn math_max(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    fold_numbers(&args, "max", |n, best| n > best)
}

fn math_min(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    fold_numbers(&args, "min", |n, best| n < best)
}

/// random() in [0, 1); random(m) in [1, m]; random(m, n) in [m, n]
fn math_random(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let scheduler = state.vm().scheduler();
    let value = match args.len() {
        0 => scheduler.with_rng(|rng| rng.r#gen::<f64>()),
        1 => {
            let m = check_integer(&args, 1, "random")?;
            if m < 1 {
                return Err(arg_error(1, "random", "interval is empty"));
            }
            scheduler.with_rng(|rng| rng.gen_range(1..=m)) as f64
        }
        2 => {
            let m = check_integer(&args, 1, "random")?;
            let n = check_integer(&args, 2, "random")?;
            if m > n {
                return Err(arg_error(2, "random", "interval is empty"));
            }
            scheduler.with_rng(|rng| rng.gen_range(m..=n)) as f64
        }
        _ => return Err(arg_error(3, "random", "wrong number of arguments")),
    };
    Ok(MultiValue::single(LuaValue::number(value)))
}

/// randomseed([x]) - Restart the sequence; no argument picks a fresh seed
fn math_randomseed(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let scheduler = state.vm().scheduler();
    let seed = match get_arg(&args, 1) {
        None | Some(LuaValue::Nil) => scheduler.with_rng(|rng| rng.r#gen::<u64>()),
        Some(_) => check_number(&args, 1, "randomseed")?.to_bits(),
    };
    scheduler.reseed(seed);
    Ok(MultiValue::empty())
}
