// Tests for native types exposed through TypeBuilder
use super::{call_global, num, s};
use crate::lua_value::NumberKind;
use crate::*;

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

fn point_type() -> std::sync::Arc<TypeDescriptor> {
    TypeBuilder::<Point>::new("Point")
        .add_constructor(|| Point { x: 0.0, y: 0.0 })
        .add_constructor(|x: f64, y: f64| Point { x, y })
        .add_field_getter("x", |p| p.x)
        .add_field_setter("x", |p, x: f64| p.x = x)
        .add_field_getter("y", |p| p.y)
        .add_method("length", |p: &mut Point| p.length())
        .add_method("scale", |p: &mut Point, k: f64| {
            p.x *= k;
            p.y *= k;
        })
        .add_method("plus", |p: &mut Point, other: Ud<Point>| -> LuaResult<f64> {
            Ok(p.x + other.get()?.x)
        })
        .add_static("dot", |a: Ud<Point>, b: Ud<Point>| -> LuaResult<f64> {
            let (a, b) = (a.get()?, b.get()?);
            Ok(a.x * b.x + a.y * b.y)
        })
        .add_static_value("dimensions", 2.0)
        .add_conversion(NativeType::Number(NumberKind::F64), |p| p.length())
        .add_meta_method(TmKind::Add, |a: Ud<Point>, b: Ud<Point>| -> LuaResult<f64> {
            Ok(a.get()?.x + b.get()?.x)
        })
        .add_meta_method(TmKind::Eq, |a: Ud<Point>, b: Ud<Point>| -> LuaResult<bool> {
            Ok(a.get()? == b.get()?)
        })
        .set_tostring(|p| format!("Point({}, {})", p.x, p.y))
        .build()
}

fn setup() -> (LuaVM, LuaValue) {
    let (vm, _) = super::test_vm();
    let point = vm.register_type("Point", point_type()).unwrap();
    (vm, LuaValue::UserData(point))
}

fn new_point(state: &LuaState, ty: &LuaValue, x: f64, y: f64) -> LuaValue {
    state
        .call(ty, MultiValue::two(num(x), num(y)))
        .unwrap()
        .into_first()
}

#[test]
fn test_construct_and_read_fields() {
    let (vm, ty) = setup();
    let state = vm.main_state();

    let p = new_point(&state, &ty, 3.0, 4.0);
    assert_eq!(p.type_name(), "userdata");
    assert_eq!(p.as_userdata().unwrap().type_name(), "Point");
    assert_eq!(state.index(&p, &s("x")).unwrap(), num(3.0));
    assert_eq!(state.index(&p, &s("y")).unwrap(), num(4.0));

    let origin = state.call(&ty, MultiValue::empty()).unwrap().into_first();
    assert_eq!(state.index(&origin, &s("x")).unwrap(), num(0.0));

    let err = state.call(&ty, MultiValue::single(num(1.0))).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
}

#[test]
fn test_methods_and_setters() {
    let (vm, ty) = setup();
    let state = vm.main_state();
    let p = new_point(&state, &ty, 3.0, 4.0);

    let length = state.call_method(&p, "length", MultiValue::empty()).unwrap();
    assert_eq!(length.into_first(), num(5.0));

    let nothing = state.call_method(&p, "scale", MultiValue::single(num(2.0))).unwrap();
    assert!(nothing.is_empty());
    assert_eq!(state.index(&p, &s("y")).unwrap(), num(8.0));

    state.new_index(&p, &s("x"), num(1.0)).unwrap();
    let stored = p.as_userdata().unwrap().borrow(|pt: &Point| pt.clone()).unwrap();
    assert_eq!(stored, Point { x: 1.0, y: 8.0 });

    let err = state.new_index(&p, &s("x"), LuaValue::Boolean(true)).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::Type);
}

#[test]
fn test_method_with_receiver_as_argument() {
    let (vm, ty) = setup();
    let state = vm.main_state();
    let p = new_point(&state, &ty, 3.0, 4.0);
    let q = new_point(&state, &ty, 1.0, 0.0);

    let sum = state.call_method(&p, "plus", MultiValue::single(q.clone())).unwrap();
    assert_eq!(sum.into_first(), num(4.0));

    let err = state.call_method(&p, "plus", MultiValue::single(p.clone())).unwrap_err();
    eprintln!("{err}");
    assert_eq!(err.kind(), LuaErrorKind::Runtime);
    assert!(err.to_string().contains("userdata of type 'Point' is already borrowed"));

    // both borrows were released by the failed call
    let sum = state.call_method(&q, "plus", MultiValue::single(p.clone())).unwrap();
    assert_eq!(sum.into_first(), num(4.0));
    assert_eq!(state.index(&p, &s("x")).unwrap(), num(3.0));
}

#[test]
fn test_member_errors() {
    let (vm, ty) = setup();
    let state = vm.main_state();
    let p = new_point(&state, &ty, 1.0, 2.0);

    let err = state.index(&p, &s("z")).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::MissingMember);
    assert_eq!(err.to_string(), "'z' is not a member of type 'Point'");

    let err = state.new_index(&p, &s("z"), num(1.0)).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::MissingMember);

    let err = state.new_index(&p, &s("y"), num(1.0)).unwrap_err();
    assert_eq!(err.to_string(), "field 'y' of 'Point' is read-only");

    let err = state.new_index(&p, &s("length"), num(1.0)).unwrap_err();
    assert_eq!(err.to_string(), "cannot assign to method 'length' of 'Point'");
}

#[test]
fn test_static_members() {
    let (vm, ty) = setup();
    let state = vm.main_state();
    let a = new_point(&state, &ty, 1.0, 2.0);
    let b = new_point(&state, &ty, 3.0, 4.0);

    assert_eq!(state.index(&ty, &s("dimensions")).unwrap(), num(2.0));
    let dot = state.index(&ty, &s("dot")).unwrap();
    assert_eq!(
        state.call(&dot, MultiValue::two(a, b)).unwrap().into_first(),
        num(11.0)
    );

    let err = state.new_index(&ty, &s("dimensions"), num(3.0)).unwrap_err();
    assert_eq!(err.to_string(), "static member 'dimensions' of 'Point' is read-only");
    let err = state.index(&ty, &s("x")).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::MissingMember);
}

#[test]
fn test_metamethods_on_instances() {
    let (vm, ty) = setup();
    let state = vm.main_state();
    let a = new_point(&state, &ty, 1.0, 2.0);
    let b = new_point(&state, &ty, 10.0, 2.0);
    let c = new_point(&state, &ty, 1.0, 2.0);

    assert_eq!(state.arith(ArithOp::Add, &a, &b).unwrap(), num(11.0));
    assert_eq!(state.to_display_string(&a).unwrap(), "Point(1, 2)");
    assert!(state.equals(&a, &c).unwrap());
    assert!(!state.equals(&a, &b).unwrap());
    assert!(!a.raw_equal(&c));
    assert!(a.raw_equal(&a.clone()));
}

#[test]
fn test_conversion_to_number() {
    let (vm, ty) = setup();
    vm.register_function("half", |x: f64| x / 2.0).unwrap();
    vm.register_function("norm", |p: Ud<Point>| -> LuaResult<f64> { p.with(Point::length) })
        .unwrap();
    let state = vm.main_state();
    let p = new_point(&state, &ty, 3.0, 4.0);

    let half = call_global(&state, "half", vec![p.clone()]).unwrap();
    assert_eq!(half.into_first(), num(2.5));
    let norm = call_global(&state, "norm", vec![p]).unwrap();
    assert_eq!(norm.into_first(), num(5.0));

    // the type object is not an instance
    let err = call_global(&state, "norm", vec![ty]).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::NoMatchingOverload);
}

struct Shape;

struct Circle {
    radius: f64,
}

#[test]
fn test_inheritance_prefers_exact_type() {
    let (vm, _) = super::test_vm();
    let shape = TypeBuilder::<Shape>::new("Shape")
        .add_constructor(|| Shape)
        .build();
    let circle = TypeBuilder::<Circle>::new("Circle")
        .inherits::<Shape>()
        .add_constructor(|radius: f64| Circle { radius })
        .add_field_getter("radius", |c| c.radius)
        .build();
    let shape_ty = LuaValue::UserData(vm.register_type("Shape", shape).unwrap());
    let circle_ty = LuaValue::UserData(vm.register_type("Circle", circle).unwrap());

    let any_shape = Overload::new(
        Signature::new(vec![Param::new(NativeType::UserData(TypeKey::of::<Shape>()))]),
        |_, _| Ok(MultiValue::single(LuaValue::string("shape"))),
    );
    vm.register_function("describe", any_shape).unwrap();
    vm.register_function("describe", |c: Ud<Circle>| -> LuaResult<String> {
        c.with(|c| format!("circle {}", c.radius))
    })
    .unwrap();

    let state = vm.main_state();
    let plain = state.call(&shape_ty, MultiValue::empty()).unwrap().into_first();
    let round = state
        .call(&circle_ty, MultiValue::single(num(2.0)))
        .unwrap()
        .into_first();

    assert_eq!(call_global(&state, "describe", vec![plain]).unwrap().into_first(), s("shape"));
    assert_eq!(
        call_global(&state, "describe", vec![round]).unwrap().into_first(),
        s("circle 2")
    );
}

#[test]
fn test_type_without_constructors() {
    let (vm, _) = super::test_vm();
    let ty = vm
        .register_type("Shape", TypeBuilder::<Shape>::new("Shape").build())
        .unwrap();
    let state = vm.main_state();

    let err = state
        .call(&LuaValue::UserData(ty.clone()), MultiValue::empty())
        .unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::Type);
    assert_eq!(err.to_string(), "type 'Shape' has no constructors");
    assert!(ty.is_type());
    assert!(ty.get_metatable().is_none());
}

#[test]
fn test_register_type_twice() {
    let (vm, _) = setup();
    let err = vm.register_type("Point", point_type()).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::AlreadyRegistered);
    assert_eq!(err.to_string(), "the name 'Point' is already registered");
}

#[test]
fn test_bare_userdata() {
    let ud = LuaUserdata::new(41_i32);
    assert_eq!(ud.type_name(), "i32");
    assert!(ud.is::<i32>());
    assert!(!ud.is::<u8>());
    ud.borrow_mut(|n: &mut i32| *n += 1).unwrap();
    assert_eq!(ud.borrow(|n: &i32| *n).unwrap(), 42);
    assert!(ud.borrow(|_: &String| ()).is_err());
    assert!(ud.get_metatable().is_none());

    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let err = state.index(&LuaValue::UserData(ud), &s("anything")).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::MissingMember);
}
