// Tests for native overload resolution
use super::{call_global, num, s, script};
use crate::lua_value::NumberKind;
use crate::*;

fn register_add(vm: &LuaVM) {
    vm.register_function("add", |a: f64, b: f64| a + b).unwrap();
    vm.register_function("add", |a: String, b: String| a + &b).unwrap();
}

#[test]
fn test_exact_pass_picks_matching_types() {
    let (vm, _) = super::test_vm();
    register_add(&vm);
    let state = vm.main_state();

    let sum = call_global(&state, "add", vec![num(1.0), num(2.0)]).unwrap();
    assert_eq!(sum.into_first(), num(3.0));
    let joined = call_global(&state, "add", vec![s("1"), s("2")]).unwrap();
    assert_eq!(joined.into_first(), s("12"));
}

#[test]
fn test_conversion_tie_is_ambiguous() {
    let (vm, _) = super::test_vm();
    register_add(&vm);
    let state = vm.main_state();

    // number->string and string->number cost the same
    let err = call_global(&state, "add", vec![num(1.0), s("2")]).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::AmbiguousCall);
    let message = err.to_string();
    assert!(message.contains("(f64, f64)"), "{message}");
    assert!(message.contains(" and "), "{message}");
}

#[test]
fn test_float_kinds_tie() {
    let (vm, _) = super::test_vm();
    vm.register_function("f", |x: f64| x).unwrap();
    vm.register_function("f", |x: f32| x).unwrap();
    let state = vm.main_state();

    let first = call_global(&state, "f", vec![num(1.5)]).unwrap_err();
    let second = call_global(&state, "f", vec![num(1.5)]).unwrap_err();
    assert_eq!(first.kind(), LuaErrorKind::AmbiguousCall);
    assert_eq!(second.kind(), LuaErrorKind::AmbiguousCall);
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn test_integer_and_string_overloads() {
    let (vm, _) = super::test_vm();
    vm.register_function("f", |n: i32| format!("int {n}")).unwrap();
    vm.register_function("f", |t: String| format!("string {t}")).unwrap();
    let state = vm.main_state();

    for _ in 0..2 {
        assert_eq!(call_global(&state, "f", vec![num(3.0)]).unwrap().into_first(), s("int 3"));
        assert_eq!(call_global(&state, "f", vec![s("7")]).unwrap().into_first(), s("string 7"));
    }
    // 2.5 fits neither exactly; only the string conversion remains
    assert_eq!(call_global(&state, "f", vec![num(2.5)]).unwrap().into_first(), s("string 2.5"));
}

#[test]
fn test_integer_kind_rejects_fractions() {
    let (vm, _) = super::test_vm();
    vm.register_function("g", |_: i32| "int").unwrap();
    vm.register_function("g", |_: f64, _: f64| "pair").unwrap();
    vm.register_function("h", |_: i32| "int").unwrap();
    vm.register_function("h", |_: f64| "float").unwrap();
    let state = vm.main_state();

    assert_eq!(call_global(&state, "g", vec![num(4.0)]).unwrap().into_first(), s("int"));
    assert_eq!(call_global(&state, "h", vec![num(1.5)]).unwrap().into_first(), s("float"));
    let err = call_global(&state, "g", vec![num(4.5)]).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
    assert!(err.to_string().contains("(number)"), "{err}");
}

#[test]
fn test_resolution_is_independent_of_registration_order() {
    let pick = |first_any: bool| {
        let (vm, _) = super::test_vm();
        if first_any {
            vm.register_function("k", |_: LuaValue| "any").unwrap();
            vm.register_function("k", |_: String| "string").unwrap();
        } else {
            vm.register_function("k", |_: String| "string").unwrap();
            vm.register_function("k", |_: LuaValue| "any").unwrap();
        }
        let state = vm.main_state();
        let a = call_global(&state, "k", vec![s("x")]).unwrap().into_first();
        let b = call_global(&state, "k", vec![num(1.0)]).unwrap().into_first();
        (a, b)
    };
    for _ in 0..3 {
        assert_eq!(pick(true), (s("string"), s("any")));
        assert_eq!(pick(false), (s("string"), s("any")));
    }
}

#[test]
fn test_optional_and_default_parameters() {
    let (vm, _) = super::test_vm();
    vm.register_function("greet", |name: String, punct: Option<String>| {
        format!("hi {name}{}", punct.unwrap_or_else(|| ".".to_owned()))
    })
    .unwrap();

    let signature = Signature::new(vec![
        Param::new(NativeType::Number(NumberKind::F64)),
        Param::new(NativeType::Number(NumberKind::F64)).with_default(num(10.0)),
    ]);
    let scaled = Overload::new(signature, |_, args| {
        let a = args[0].as_number().unwrap_or_default();
        let b = args[1].as_number().unwrap_or_default();
        Ok(MultiValue::single(LuaValue::Number(a * b)))
    });
    vm.register_function("scale", scaled).unwrap();
    let state = vm.main_state();

    assert_eq!(
        call_global(&state, "greet", vec![s("bob")]).unwrap().into_first(),
        s("hi bob.")
    );
    assert_eq!(
        call_global(&state, "greet", vec![s("bob"), s("!")]).unwrap().into_first(),
        s("hi bob!")
    );
    assert_eq!(
        call_global(&state, "greet", vec![s("bob"), LuaValue::Nil]).unwrap().into_first(),
        s("hi bob.")
    );
    assert_eq!(call_global(&state, "scale", vec![num(2.0)]).unwrap().into_first(), num(20.0));
    assert_eq!(
        call_global(&state, "scale", vec![num(2.0), num(3.0)]).unwrap().into_first(),
        num(6.0)
    );
}

#[test]
fn test_variadic_parameters() {
    let (vm, _) = super::test_vm();
    vm.register_function("sum", |label: String, values: Variadic<f64>| {
        format!("{label}={}", values.iter().fold(0.0, |total, v| total + v))
    })
    .unwrap();
    let state = vm.main_state();

    assert_eq!(call_global(&state, "sum", vec![s("n")]).unwrap().into_first(), s("n=0"));
    assert_eq!(
        call_global(&state, "sum", vec![s("n"), num(1.0), num(2.0), s("3")]).unwrap().into_first(),
        s("n=6")
    );
    let err = call_global(&state, "sum", vec![s("n"), LuaValue::Boolean(true)]).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
}

#[test]
fn test_extra_arguments() {
    let (vm, _) = super::test_vm();
    vm.register_function("one", |x: f64| x).unwrap();
    let counting = Overload::new(
        Signature::new(vec![Param::new(NativeType::Any)]).ignore_extra_args(),
        |_, args| Ok(MultiValue::single(LuaValue::Number(args.len() as f64))),
    );
    vm.register_function("count", counting).unwrap();
    let state = vm.main_state();

    let err = call_global(&state, "one", vec![num(1.0), num(2.0)]).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
    let seen = call_global(&state, "count", vec![num(1.0), s("x"), LuaValue::Nil]).unwrap();
    assert_eq!(seen.into_first(), num(1.0));
}

#[test]
fn test_callback_parameter_accepts_callable_tables() {
    let (vm, _) = super::test_vm();
    vm.register_function("apply", |state: &LuaState, f: Callback, x: f64| {
        f.call(state, x)
    })
    .unwrap();
    let state = vm.main_state();

    let double = script("double", |_, args| {
        let x = args.first().and_then(LuaValue::as_number).unwrap_or_default();
        Ok(MultiValue::single(LuaValue::Number(x * 2.0)))
    });
    assert_eq!(
        call_global(&state, "apply", vec![double, num(4.0)]).unwrap().into_first(),
        num(8.0)
    );

    let mt = LuaTable::new();
    mt.set_str(
        "__call",
        script("call", |_, args| Ok(MultiValue::single(num(args.len() as f64)))),
    )
    .unwrap();
    let callable = LuaTable::new();
    callable.set_metatable(Some(mt));
    let results = call_global(&state, "apply", vec![LuaValue::Table(callable), num(4.0)]).unwrap();
    // __call receives the table and the argument
    assert_eq!(results.into_first(), num(2.0));

    let err = call_global(&state, "apply", vec![LuaValue::Table(LuaTable::new()), num(4.0)])
        .unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
}

#[test]
fn test_multiple_returns() {
    let (vm, _) = super::test_vm();
    vm.register_function("divmod", |a: i64, b: i64| -> LuaResult<(i64, i64)> {
        if b == 0 {
            return Err(LuaError::runtime("division by zero"));
        }
        Ok((a.div_euclid(b), a.rem_euclid(b)))
    })
    .unwrap();
    let state = vm.main_state();

    let results = call_global(&state, "divmod", vec![num(7.0), num(2.0)]).unwrap();
    assert_eq!(results.all_values(), vec![num(3.0), num(1.0)]);
    let err = call_global(&state, "divmod", vec![num(7.0), num(0.0)]).unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
}

#[test]
fn test_explicit_overload_index() {
    let (vm, _) = super::test_vm();
    vm.register_function("pick", |_: LuaValue| "first").unwrap();
    vm.register_function("pick", |_: LuaValue| "second").unwrap();
    let state = vm.main_state();
    let pick = state.get_global("pick").unwrap();

    let err = state.call(&pick, MultiValue::single(num(1.0))).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::AmbiguousCall);

    let second = state
        .invoke(&pick, None, MultiValue::single(num(1.0)), Some(1))
        .unwrap();
    assert_eq!(second.into_first(), s("second"));

    let err = state
        .invoke(&pick, None, MultiValue::single(num(1.0)), Some(5))
        .unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::Index);

    let plain = script("plain", |_, _| Ok(MultiValue::empty()));
    let err = state.invoke(&plain, None, MultiValue::empty(), Some(0)).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::UnsupportedOperation);
}

#[test]
fn test_receiver_is_prepended() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let echo = script("echo", |_, args| Ok(args));
    let results = state
        .invoke(&echo, Some(s("self")), MultiValue::single(num(1.0)), None)
        .unwrap();
    assert_eq!(results.all_values(), vec![s("self"), num(1.0)]);
}

#[test]
fn test_call_depth_guard() {
    let vm = LuaVM::new(LuaSettings::new().with_max_call_depth(32));
    let state = vm.main_state();

    let recurse = script("recurse", |state, args| {
        let me = state.get_global("recurse")?;
        state.call(&me, args)
    });
    state.set_global("recurse", recurse.clone()).unwrap();

    let err = state.call(&recurse, MultiValue::empty()).unwrap_err();
    assert_eq!(err.to_string(), "stack overflow");
    assert_eq!(state.call_depth(), 0);
}

#[test]
fn test_not_callable() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let err = state.call(&num(1.0), MultiValue::empty()).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::Type);
    assert_eq!(err.to_string(), "attempt to call a number value");
}
