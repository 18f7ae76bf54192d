//! `FromLua` / `IntoLua`: bidirectional conversion between Rust types and `LuaValue`,
//! plus the glue that turns typed Rust closures into native overloads.
//!
//! # Built-in impls
//! - `bool`, `i8`..`i64`, `u8`..`u64`, `isize`, `usize`, `f32`, `f64`
//! - `String`, `LuaString`, `&str` (into only)
//! - `Option<T>` (nil maps to `None`; as a parameter it is nullable and optional)
//! - `LuaValue` (identity, declared as an `any` parameter)
//! - `LuaTable`, `LuaFunction`, `LuaThread`, `LuaUserdata`, [`Ud<T>`]
//!
//! Multiple results come from `()`, tuples, `Vec<T>`, [`Variadic<T>`],
//! `MultiValue` and `LuaResult<T>`.
//!
//! # Typed overloads
//! Any `Fn(A1, .., An) -> R` (n <= 6) whose parameters implement
//! [`NativeParam`] and whose result implements [`IntoLuaMulti`] converts into
//! an [`Overload`]. Closures that need the calling context take `&LuaState`
//! as their first parameter:
//! ```ignore
//! vm.register_function("add", |a: f64, b: f64| a + b)?;
//! vm.register_function("add", |a: String, b: String| a + &b)?;
//! vm.register_function("count", |state: &LuaState, t: LuaTable| t.raw_len())?;
//! ```

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use super::number::format_number;
use super::{
    LuaFunction, LuaString, LuaTable, LuaThread, LuaUserdata, LuaValue, MultiValue, NativeType,
    NumberKind, Overload, Param, Signature, TypeKey,
};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// Convert a `LuaValue` into a Rust type.
pub trait FromLua: Sized {
    fn from_lua(value: LuaValue, state: &LuaState) -> LuaResult<Self>;

    /// Declared parameter type when `Self` is a native parameter.
    fn param() -> Param {
        Param::new(NativeType::Any)
    }
}

/// Convert a Rust value into a single `LuaValue`.
pub trait IntoLua {
    fn into_lua(self) -> LuaResult<LuaValue>;
}

/// Convert a Rust value into a result list.
pub trait IntoLuaMulti {
    fn into_lua_multi(self) -> LuaResult<MultiValue>;
}

fn expected(what: impl std::fmt::Display, value: &LuaValue) -> LuaError {
    LuaError::type_error(format!("expected {what}, got {}", value.type_name()))
}

// ==================== Identity: LuaValue ====================

impl FromLua for LuaValue {
    #[inline]
    fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
        Ok(value)
    }
}

impl IntoLua for LuaValue {
    #[inline]
    fn into_lua(self) -> LuaResult<LuaValue> {
        Ok(self)
    }
}

// ==================== Boolean ====================

impl FromLua for bool {
    fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
        value.as_boolean().ok_or_else(|| expected("boolean", &value))
    }

    fn param() -> Param {
        Param::new(NativeType::Boolean)
    }
}

impl IntoLua for bool {
    fn into_lua(self) -> LuaResult<LuaValue> {
        Ok(LuaValue::Boolean(self))
    }
}

// ==================== Numbers ====================

macro_rules! impl_lua_number {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FromLua for $ty {
                fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
                    let n = value.to_number().ok_or_else(|| expected(stringify!($ty), &value))?;
                    if NumberKind::$kind.can_hold(n) {
                        Ok(n as $ty)
                    } else {
                        Err(LuaError::type_error(format!(
                            "number {} has no {} representation",
                            format_number(n),
                            stringify!($ty)
                        )))
                    }
                }

                fn param() -> Param {
                    Param::new(NativeType::Number(NumberKind::$kind))
                }
            }

            impl IntoLua for $ty {
                #[inline]
                fn into_lua(self) -> LuaResult<LuaValue> {
                    Ok(LuaValue::Number(self as f64))
                }
            }
        )*
    };
}

impl_lua_number!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize,
    f32 => F32, f64 => F64,
);

// ==================== Strings ====================

impl FromLua for String {
    fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
        match &value {
            LuaValue::String(s) => Ok(s.as_str().to_owned()),
            LuaValue::Number(n) => Ok(format_number(*n)),
            _ => Err(expected("string", &value)),
        }
    }

    fn param() -> Param {
        Param::new(NativeType::String)
    }
}

impl FromLua for LuaString {
    fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
        match value {
            LuaValue::String(s) => Ok(s),
            LuaValue::Number(n) => Ok(LuaString::new(&format_number(n))),
            other => Err(expected("string", &other)),
        }
    }

    fn param() -> Param {
        Param::new(NativeType::String)
    }
}

impl IntoLua for String {
    fn into_lua(self) -> LuaResult<LuaValue> {
        Ok(LuaValue::string(self))
    }
}

impl IntoLua for &str {
    fn into_lua(self) -> LuaResult<LuaValue> {
        Ok(LuaValue::string(self))
    }
}

impl IntoLua for LuaString {
    fn into_lua(self) -> LuaResult<LuaValue> {
        Ok(LuaValue::String(self))
    }
}

// ==================== Reference kinds ====================

macro_rules! impl_lua_handle {
    ($($ty:ty => $variant:ident, $native:ident, $name:literal);* $(;)?) => {
        $(
            impl FromLua for $ty {
                fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
                    match value {
                        LuaValue::$variant(v) => Ok(v),
                        other => Err(expected($name, &other)),
                    }
                }

                fn param() -> Param {
                    Param::new(NativeType::$native)
                }
            }

            impl IntoLua for $ty {
                fn into_lua(self) -> LuaResult<LuaValue> {
                    Ok(LuaValue::$variant(self))
                }
            }
        )*
    };
}

impl_lua_handle!(
    LuaTable => Table, Table, "table";
    LuaFunction => Function, Function, "function";
    LuaThread => Thread, Thread, "thread";
    LuaUserdata => UserData, AnyUserData, "userdata";
);

// ==================== Option ====================

impl<T: FromLua> FromLua for Option<T> {
    fn from_lua(value: LuaValue, state: &LuaState) -> LuaResult<Self> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_lua(value, state).map(Some)
        }
    }

    fn param() -> Param {
        T::param().nullable().with_default(LuaValue::Nil)
    }
}

impl<T: IntoLua> IntoLua for Option<T> {
    fn into_lua(self) -> LuaResult<LuaValue> {
        match self {
            Some(v) => v.into_lua(),
            None => Ok(LuaValue::Nil),
        }
    }
}

// ==================== Typed user data ====================

/// A user data parameter holding a `T`.
pub struct Ud<T> {
    userdata: LuaUserdata,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Ud<T> {
    pub fn userdata(&self) -> &LuaUserdata {
        &self.userdata
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> LuaResult<R> {
        self.userdata.borrow(f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> LuaResult<R> {
        self.userdata.borrow_mut(f)
    }
}

impl<T: Clone + 'static> Ud<T> {
    pub fn get(&self) -> LuaResult<T> {
        self.userdata.borrow(T::clone)
    }
}

impl<T: 'static> FromLua for Ud<T> {
    fn from_lua(value: LuaValue, _state: &LuaState) -> LuaResult<Self> {
        match value {
            LuaValue::UserData(userdata) if userdata.is::<T>() => Ok(Ud {
                userdata,
                _marker: PhantomData,
            }),
            other => Err(expected(TypeKey::of::<T>().name(), &other)),
        }
    }

    fn param() -> Param {
        Param::new(NativeType::UserData(TypeKey::of::<T>()))
    }
}

impl<T> IntoLua for Ud<T> {
    fn into_lua(self) -> LuaResult<LuaValue> {
        Ok(LuaValue::UserData(self.userdata))
    }
}

// ==================== Parameters ====================

/// Shape of one declared parameter.
#[derive(Debug, Clone)]
pub enum ParamSpec {
    Single(Param),
    /// Consumes every remaining argument.
    Variadic(NativeType),
}

impl Signature {
    pub fn from_specs(specs: Vec<ParamSpec>) -> Signature {
        let mut signature = Signature::default();
        for spec in specs {
            match spec {
                ParamSpec::Single(param) => signature.params.push(param),
                ParamSpec::Variadic(ty) => signature.variadic = Some(ty),
            }
        }
        signature
    }
}

/// Sequential reader over an adapted argument list.
pub struct ArgCursor {
    values: std::vec::IntoIter<LuaValue>,
}

impl ArgCursor {
    pub fn new(values: Vec<LuaValue>) -> Self {
        ArgCursor {
            values: values.into_iter(),
        }
    }

    /// Next argument, nil once exhausted.
    pub fn next_value(&mut self) -> LuaValue {
        self.values.next().unwrap_or_default()
    }

    pub fn rest(&mut self) -> Vec<LuaValue> {
        self.values.by_ref().collect()
    }
}

/// A value that can appear in a typed native parameter list.
pub trait NativeParam: Sized {
    fn spec() -> ParamSpec;
    fn take(args: &mut ArgCursor, state: &LuaState) -> LuaResult<Self>;
}

impl<T: FromLua> NativeParam for T {
    fn spec() -> ParamSpec {
        ParamSpec::Single(T::param())
    }

    fn take(args: &mut ArgCursor, state: &LuaState) -> LuaResult<Self> {
        T::from_lua(args.next_value(), state)
    }
}

/// Trailing variadic parameter, or a multi-value result.
#[derive(Debug, Clone, Default)]
pub struct Variadic<T>(pub Vec<T>);

impl<T> Deref for Variadic<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

impl<T> DerefMut for Variadic<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.0
    }
}

impl<T: FromLua> NativeParam for Variadic<T> {
    fn spec() -> ParamSpec {
        ParamSpec::Variadic(T::param().ty)
    }

    fn take(args: &mut ArgCursor, state: &LuaState) -> LuaResult<Self> {
        args.rest()
            .into_iter()
            .map(|v| T::from_lua(v, state))
            .collect::<LuaResult<Vec<T>>>()
            .map(Variadic)
    }
}

// ==================== Results ====================

impl<T: IntoLua> IntoLuaMulti for T {
    fn into_lua_multi(self) -> LuaResult<MultiValue> {
        Ok(MultiValue::Single(self.into_lua()?))
    }
}

impl IntoLuaMulti for () {
    fn into_lua_multi(self) -> LuaResult<MultiValue> {
        Ok(MultiValue::Empty)
    }
}

impl IntoLuaMulti for MultiValue {
    fn into_lua_multi(self) -> LuaResult<MultiValue> {
        Ok(self)
    }
}

impl<T: IntoLua> IntoLuaMulti for Vec<T> {
    fn into_lua_multi(self) -> LuaResult<MultiValue> {
        self.into_iter()
            .map(IntoLua::into_lua)
            .collect::<LuaResult<Vec<_>>>()
            .map(MultiValue::multiple)
    }
}

impl<T: IntoLua> IntoLuaMulti for Variadic<T> {
    fn into_lua_multi(self) -> LuaResult<MultiValue> {
        self.0.into_lua_multi()
    }
}

impl<T: IntoLuaMulti> IntoLuaMulti for LuaResult<T> {
    fn into_lua_multi(self) -> LuaResult<MultiValue> {
        self?.into_lua_multi()
    }
}

macro_rules! impl_tuple_results {
    ($($name:ident),+) => {
        impl<$($name: IntoLua),+> IntoLuaMulti for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_lua_multi(self) -> LuaResult<MultiValue> {
                let ($($name,)+) = self;
                Ok(MultiValue::multiple(vec![$($name.into_lua()?),+]))
            }
        }
    };
}

impl_tuple_results!(A, B);
impl_tuple_results!(A, B, C);
impl_tuple_results!(A, B, C, D);

// ==================== Typed overloads ====================

/// Marker for closures without a context parameter.
pub struct Plain;
/// Marker for closures taking `&LuaState` first.
pub struct WithState;

/// Conversion into a native [`Overload`]. `Marker` only disambiguates the
/// blanket impls and is inferred.
pub trait IntoOverload<Marker>: Send + Sync + 'static {
    fn into_overload(self) -> Overload;
}

impl IntoOverload<()> for Overload {
    fn into_overload(self) -> Overload {
        self
    }
}

macro_rules! impl_into_overload {
    ($($A:ident),*) => {
        impl<Func, Ret, $($A,)*> IntoOverload<(Plain, Ret, $($A,)*)> for Func
        where
            Func: Fn($($A),*) -> Ret + Send + Sync + 'static,
            Ret: IntoLuaMulti,
            $($A: NativeParam,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_overload(self) -> Overload {
                let signature = Signature::from_specs(vec![$($A::spec()),*]);
                Overload::new(signature, move |state, args| {
                    let mut cursor = ArgCursor::new(args);
                    $(let $A = $A::take(&mut cursor, state)?;)*
                    (self)($($A),*).into_lua_multi()
                })
            }
        }

        impl<Func, Ret, $($A,)*> IntoOverload<(WithState, Ret, $($A,)*)> for Func
        where
            Func: Fn(&LuaState, $($A),*) -> Ret + Send + Sync + 'static,
            Ret: IntoLuaMulti,
            $($A: NativeParam,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_overload(self) -> Overload {
                let signature = Signature::from_specs(vec![$($A::spec()),*]);
                Overload::new(signature, move |state, args| {
                    let mut cursor = ArgCursor::new(args);
                    $(let $A = $A::take(&mut cursor, state)?;)*
                    (self)(state, $($A),*).into_lua_multi()
                })
            }
        }
    };
}

impl_into_overload!();
impl_into_overload!(A1);
impl_into_overload!(A1, A2);
impl_into_overload!(A1, A2, A3);
impl_into_overload!(A1, A2, A3, A4);
impl_into_overload!(A1, A2, A3, A4, A5);
impl_into_overload!(A1, A2, A3, A4, A5, A6);
