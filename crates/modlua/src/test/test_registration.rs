// Tests for environment registration and loading
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use super::{call_global, num, s};
use crate::lib_registry::{LibraryRegistry, arg_error, arg_count, get_arg};
use crate::*;

#[test]
fn test_register_function_adds_overloads() {
    let (vm, _) = super::test_vm();
    vm.register_function("describe", |n: f64| format!("number {n}")).unwrap();
    vm.register_function("describe", |t: LuaTable| format!("table of {}", t.count()))
        .unwrap();
    let state = vm.main_state();

    let describe = state.get_global("describe").unwrap();
    assert_eq!(describe.as_function().unwrap().overload_count(), 2);
    assert_eq!(
        call_global(&state, "describe", vec![num(2.0)]).unwrap().into_first(),
        s("number 2")
    );
    let t = LuaTable::from_values(vec![num(1.0), num(2.0)]);
    assert_eq!(
        call_global(&state, "describe", vec![LuaValue::Table(t)]).unwrap().into_first(),
        s("table of 2")
    );
}

#[test]
fn test_concurrent_registration_keeps_every_overload() {
    const THREADS: usize = 8;
    let (vm, _) = super::test_vm();
    for round in 0..25 {
        let table = LuaTable::new();
        let barrier = Barrier::new(THREADS);
        thread::scope(|scope| {
            for i in 0..THREADS {
                let (vm, table, barrier) = (&vm, &table, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    vm.register_function_in(table, "f", move |x: f64| x + i as f64)
                        .unwrap();
                });
            }
        });
        let f = table.get_str("f");
        assert_eq!(f.as_function().unwrap().overload_count(), THREADS, "round {round}");
    }
}

#[test]
fn test_concurrent_value_registration_has_one_winner() {
    const THREADS: usize = 8;
    let (vm, _) = super::test_vm();
    let winners = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);
    thread::scope(|scope| {
        for i in 0..THREADS {
            let (vm, winners, barrier) = (&vm, &winners, &barrier);
            scope.spawn(move || {
                barrier.wait();
                match vm.register_value("slot", i as f64) {
                    Ok(()) => {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => assert_eq!(err.kind(), LuaErrorKind::AlreadyRegistered),
                }
            });
        }
    });
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(vm.globals().get_str("slot").is_number());
}

#[test]
fn test_names_cannot_be_reused() {
    let (vm, _) = super::test_vm();
    vm.register_value("answer", 42).unwrap();

    let err = vm.register_function("answer", |x: f64| x).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::AlreadyRegistered);
    let err = vm.register_value("answer", "again").unwrap_err();
    assert_eq!(err.to_string(), "the name 'answer' is already registered");

    let state = vm.main_state();
    state
        .set_global("scripted", LuaValue::Function(LuaFunction::script("scripted", |_, a| Ok(a))))
        .unwrap();
    let err = vm.register_function("scripted", |x: f64| x).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::AlreadyRegistered);
    assert_eq!(state.get_global("answer").unwrap(), num(42.0));
}

#[test]
fn test_register_into_table() {
    let (vm, _) = super::test_vm();
    let strings = LuaTable::new();
    vm.register_value("strings", strings.clone()).unwrap();
    vm.register_function_in(&strings, "upper", |text: String| text.to_uppercase())
        .unwrap();
    vm.register_function_in(&strings, "repeat", |text: String, n: usize| text.repeat(n))
        .unwrap();
    let state = vm.main_state();

    let upper = state.index(&LuaValue::Table(strings.clone()), &s("upper")).unwrap();
    assert_eq!(
        state.call(&upper, MultiValue::single(s("abc"))).unwrap().into_first(),
        s("ABC")
    );
    let err = state
        .call_method(&LuaValue::Table(strings), "repeat", MultiValue::single(num(2.0)))
        .unwrap_err();
    // the receiver (a table) is not a string
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
}

fn echo_compiler(_vm: &LuaVM, source: &str, chunk_name: &str) -> LuaResult<LuaFunction> {
    let Some(name) = source.strip_prefix("return ") else {
        return Err(LuaError::CompileError {
            chunk: chunk_name.to_owned(),
            message: format!("unexpected symbol near '{source}'"),
        });
    };
    let name = name.trim().to_owned();
    Ok(LuaFunction::script(chunk_name, move |state, _| {
        state.get_global(&name).map(MultiValue::single)
    }))
}

#[test]
fn test_load_and_execute() {
    let (vm, _) = super::test_vm();
    let err = vm.load("return x", "chunk").unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::UnsupportedOperation);
    assert_eq!(err.to_string(), "no compiler is installed");

    vm.set_compiler(echo_compiler);
    vm.register_value("greeting", "hello").unwrap();

    let function = vm.load("return greeting", "main.lua").unwrap();
    assert_eq!(function.name(), "main.lua");
    assert!(function.is_script());
    assert_eq!(vm.execute("return greeting", "main.lua").unwrap().into_first(), s("hello"));

    let err = vm.execute("x = = 1", "broken.lua").unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::Compile);
    assert_eq!(err.to_string(), "broken.lua: unexpected symbol near 'x = = 1'");
    assert!(err.is_catchable());
}

#[test]
fn test_quit_reports_exit_code() {
    let code = Arc::new(AtomicI32::new(-1));
    let seen = code.clone();
    let vm = LuaVM::new(LuaSettings::new().on_quit(move |c| seen.store(c, Ordering::SeqCst)));

    assert_eq!(vm.quit(&LuaValue::Nil), 0);
    assert_eq!(code.load(Ordering::SeqCst), 0);
    assert_eq!(vm.quit(&num(3.0)), 3);
    assert_eq!(code.load(Ordering::SeqCst), 3);
    assert_eq!(vm.quit(&LuaValue::Boolean(false)), 1);
    assert_eq!(code.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_outlives_the_call() {
    let (vm, _) = super::test_vm();
    let stored: Arc<parking_lot::Mutex<Option<Callback>>> = Arc::default();
    let slot = stored.clone();
    vm.register_function("on_event", move |f: Callback| {
        *slot.lock() = Some(f);
    })
    .unwrap();
    let state = vm.main_state();

    let handler = LuaValue::Function(LuaFunction::script("handler", |_, args| {
        let n = args.first().and_then(LuaValue::as_number).unwrap_or_default();
        Ok(MultiValue::single(num(n + 1.0)))
    }));
    call_global(&state, "on_event", vec![handler]).unwrap();

    let callback = stored.lock().take().unwrap();
    assert_eq!(callback.call_from_host(41).unwrap().into_first(), num(42.0));
    let plain = callback.into_fn();
    assert_eq!(plain(MultiValue::single(num(1.0))).unwrap().into_first(), num(2.0));
}

fn sum_fn(_state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
    let mut total = 0.0;
    for i in 1..=arg_count(&args) {
        let value = get_arg(&args, i).unwrap_or_default();
        total += value.to_number().ok_or_else(|| arg_error(i, "sum", "number expected"))?;
    }
    Ok(MultiValue::single(num(total)))
}

#[test]
fn test_custom_library_module() {
    let (vm, _) = super::test_vm();
    let module = crate::lib_module!("util", {
        "sum" => sum_fn,
    })
    .with_value("version", |_vm| LuaValue::string("1.0"));
    let mut registry = LibraryRegistry::new();
    registry.register(module);
    assert_eq!(registry.module("util").map(|m| m.member_count()), Some(2));
    assert!(registry.module("missing").is_none());
    registry.load_all(&vm).unwrap();

    let state = vm.main_state();
    let util = state.get_global("util").unwrap();
    assert_eq!(state.index(&util, &s("version")).unwrap(), s("1.0"));
    let sum = state.index(&util, &s("sum")).unwrap();
    let total = state
        .call(&sum, MultiValue::multiple(vec![num(1.0), s("2"), num(3.0)]))
        .unwrap();
    assert_eq!(total.into_first(), num(6.0));
    let err = state
        .call(&sum, MultiValue::two(num(1.0), LuaValue::Boolean(true)))
        .unwrap_err();
    assert_eq!(err.to_string(), "bad argument #2 to 'sum' (number expected)");
}

#[test]
fn test_selected_libraries_only() {
    let vm = LuaVM::new(LuaSettings::new().with_libraries(Stdlib::NONE));
    let state = vm.main_state();
    assert!(state.get_global("print").unwrap().is_nil());
    assert!(state.get_global("math").unwrap().is_nil());

    vm.open_stdlib(Stdlib::MATH | Stdlib::COROUTINE).unwrap();
    assert!(state.get_global("math").unwrap().is_table());
    assert!(state.get_global("coroutine").unwrap().is_table());
    assert!(state.get_global("print").unwrap().is_nil());
    assert!(state.get_global("table").unwrap().is_nil());
}
