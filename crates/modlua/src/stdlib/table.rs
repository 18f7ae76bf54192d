// Table library
// Implements: concat, insert, move, pack, remove, sort, unpack
// Positions are measured against the raw border of the list and element
// access is raw. sort orders with `<` (so `__lt` applies) unless a comparison
// function is given.

use crate::lib_registry::{LibraryModule, arg_error, arg_type_error, get_arg, require_arg};
use crate::lua_value::number::{format_number, number_to_integer};
use crate::lua_value::{LuaTable, LuaValue, MultiValue};
use crate::lua_vm::lua_limits::MAX_RESULTS;
use crate::lua_vm::{LuaError, LuaResult, LuaState};

pub fn create_table_lib() -> LibraryModule {
    crate::lib_module!("table", {
        "concat" => table_concat,
        "insert" => table_insert,
        "move" => table_move,
        "pack" => table_pack,
        "remove" => table_remove,
        "sort" => table_sort,
        "unpack" => super::basic::lua_unpack,
    })
}

fn check_table(args: &MultiValue, index: usize, func_name: &str) -> LuaResult<LuaTable> {
    match get_arg(args, index).unwrap_or_default() {
        LuaValue::Table(t) => Ok(t),
        other => Err(arg_type_error(index, func_name, "table", &other)),
    }
}

fn check_integer(args: &MultiValue, index: usize, func_name: &str) -> LuaResult<i64> {
    let value = get_arg(args, index).unwrap_or_default();
    let n = value
        .to_number()
        .ok_or_else(|| arg_type_error(index, func_name, "number", &value))?;
    number_to_integer(n).ok_or_else(|| arg_error(index, func_name, "number has no integer representation"))
}

fn opt_integer(args: &MultiValue, index: usize, func_name: &str, default: i64) -> LuaResult<i64> {
    match get_arg(args, index) {
        None | Some(LuaValue::Nil) => Ok(default),
        Some(_) => check_integer(args, index, func_name),
    }
}

fn border(table: &LuaTable) -> i64 {
    i64::try_from(table.raw_len()).unwrap_or(i64::MAX)
}

/// table.concat(list [, sep [, i [, j]]]) - Join strings and numbers
fn table_concat(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = check_table(&args, 1, "concat")?;
    let sep = match get_arg(&args, 2) {
        None | Some(LuaValue::Nil) => String::new(),
        Some(LuaValue::String(s)) => s.as_str().to_owned(),
        Some(LuaValue::Number(n)) => format_number(n),
        Some(other) => return Err(arg_type_error(2, "concat", "string", &other)),
    };
    let first = opt_integer(&args, 3, "concat", 1)?;
    let last = opt_integer(&args, 4, "concat", border(&table))?;

    let mut out = String::new();
    let mut k = first;
    while k <= last {
        match table.get_int(k) {
            LuaValue::String(s) => out.push_str(s.as_str()),
            LuaValue::Number(n) => out.push_str(&format_number(n)),
            other => {
                return Err(LuaError::runtime(format!(
                    "invalid value (at index {k}) in table for 'concat' ({} found)",
                    other.type_name()
                )));
            }
        }
        if k == last {
            break;
        }
        out.push_str(&sep);
        k += 1;
    }
    Ok(MultiValue::single(LuaValue::string(&out)))
}

/// table.insert(list, [pos,] value) - Insert, shifting later elements up
fn table_insert(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = check_table(&args, 1, "insert")?;
    let len = border(&table);
    match args.len() {
        2 => {
            let value = require_arg(&args, 2, "insert")?;
            table.set_int(len + 1, value)?;
        }
        3 => {
            let pos = check_integer(&args, 2, "insert")?;
            if pos < 1 || pos > len + 1 {
                return Err(arg_error(2, "insert", "position out of bounds"));
            }
            for k in (pos..=len).rev() {
                table.set_int(k + 1, table.get_int(k))?;
            }
            table.set_int(pos, require_arg(&args, 3, "insert")?)?;
        }
        _ => return Err(LuaError::runtime("wrong number of arguments to 'insert'")),
    }
    Ok(MultiValue::empty())
}

/// table.remove(list [, pos]) - Remove and return, shifting later elements down
fn table_remove(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = check_table(&args, 1, "remove")?;
    let len = border(&table);
    let explicit = !matches!(get_arg(&args, 2), None | Some(LuaValue::Nil));
    if len == 0 && !explicit {
        return Ok(MultiValue::single(LuaValue::Nil));
    }
    let pos = opt_integer(&args, 2, "remove", len)?;
    if pos < 1 || pos > len + 1 {
        return Err(arg_error(2, "remove", "position out of bounds"));
    }

    let removed = table.get_int(pos);
    for k in pos..len {
        table.set_int(k, table.get_int(k + 1))?;
    }
    if pos <= len {
        table.set_int(len, LuaValue::Nil)?;
    }
    Ok(MultiValue::single(removed))
}

/// table.move(a1, f, e, t [, a2]) - Copy a1[f..e] into a2[t..]; returns a2
fn table_move(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let source = check_table(&args, 1, "move")?;
    let first = check_integer(&args, 2, "move")?;
    let last = check_integer(&args, 3, "move")?;
    let target = check_integer(&args, 4, "move")?;
    let dest = match get_arg(&args, 5) {
        None | Some(LuaValue::Nil) => source.clone(),
        Some(LuaValue::Table(t)) => t,
        Some(other) => return Err(arg_type_error(5, "move", "table", &other)),
    };

    if last >= first {
        let count = last
            .checked_sub(first)
            .and_then(|span| span.checked_add(1))
            .filter(|n| *n as u64 <= MAX_RESULTS as u64)
            .ok_or_else(|| arg_error(3, "move", "too many elements to move"))?;
        if target.checked_add(count - 1).is_none() {
            return Err(arg_error(4, "move", "destination wrap around"));
        }
        // read everything first so overlapping ranges copy correctly
        let values: Vec<LuaValue> = (first..=last).map(|k| source.get_int(k)).collect();
        for (offset, value) in (0_i64..).zip(values) {
            dest.set_int(target + offset, value)?;
        }
    }
    Ok(MultiValue::single(LuaValue::Table(dest)))
}

/// table.pack(...) - Arguments as a list with the count in `n`
fn table_pack(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let count = args.len();
    let table = LuaTable::from_values(args.all_values());
    table.set_str("n", LuaValue::Number(count as f64))?;
    Ok(MultiValue::single(LuaValue::Table(table)))
}

/// table.sort(list [, comp]) - Stable in-place sort
fn table_sort(state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let table = check_table(&args, 1, "sort")?;
    let comp = match get_arg(&args, 2) {
        None | Some(LuaValue::Nil) => None,
        Some(f @ LuaValue::Function(_)) => Some(f),
        Some(other) => return Err(arg_type_error(2, "sort", "function", &other)),
    };

    let len = border(&table);
    let mut values: Vec<LuaValue> = (1..=len).map(|k| table.get_int(k)).collect();
    let less = |a: &LuaValue, b: &LuaValue| -> LuaResult<bool> {
        match &comp {
            Some(f) => Ok(state
                .call(f, MultiValue::two(a.clone(), b.clone()))?
                .into_first()
                .is_truthy()),
            None => state.less_than(a, b),
        }
    };
    merge_sort(&mut values, &less)?;

    for (k, value) in (1_i64..).zip(values) {
        table.set_int(k, value)?;
    }
    Ok(MultiValue::empty())
}

/// Merge sort over a comparison that may fail; the first error aborts the
/// sort and leaves the table untouched.
fn merge_sort<F>(values: &mut Vec<LuaValue>, less: &F) -> LuaResult<()>
where
    F: Fn(&LuaValue, &LuaValue) -> LuaResult<bool>,
{
    if values.len() <= 1 {
        return Ok(());
    }
    let mut right = values.split_off(values.len() / 2);
    let mut left = std::mem::take(values);
    merge_sort(&mut left, less)?;
    merge_sort(&mut right, less)?;

    values.reserve(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => less(r, l)?,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        values.extend(next);
    }
    Ok(())
}
