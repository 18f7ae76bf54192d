//! Builder for describing native Rust types to scripts.
//!
//! [`TypeBuilder`] collects constructors, methods, fields, static members,
//! conversions and metamethods for a type `T`, then produces the shared
//! [`TypeDescriptor`] that every instance points to.
//!
//! # Example
//!
//! ```ignore
//! use modlua::{LuaVM, TypeBuilder, TmKind, Ud};
//!
//! #[derive(Clone)]
//! struct Point { x: f64, y: f64 }
//!
//! let point = TypeBuilder::<Point>::new("Point")
//!     .add_constructor(|x: f64, y: f64| Point { x, y })
//!     .add_field_getter("x", |p| p.x)
//!     .add_field_setter("x", |p, x: f64| p.x = x)
//!     .add_method("length", |p| (p.x * p.x + p.y * p.y).sqrt())
//!     .add_meta_method(TmKind::Add, |a: Ud<Point>, b: Ud<Point>| { /* ... */ })
//!     .set_tostring(|p| format!("({}, {})", p.x, p.y))
//!     .build();
//! vm.register_type("Point", point)?;
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashMap;
use smol_str::SmolStr;

use super::lua_convert::{ArgCursor, FromLua, IntoLua, IntoLuaMulti, IntoOverload, NativeParam};
use super::lua_userdata::{Field, FieldGetter, FieldSetter};
use super::{
    Conversion, LuaFunction, LuaTable, LuaUserdata, LuaValue, MultiValue, NativeType, Overload,
    Param, Signature, TypeDescriptor, TypeKey,
};
use crate::lua_vm::{LuaError, LuaResult, LuaState, TmKind};

type Construct =
    Arc<dyn Fn(&LuaState, Vec<LuaValue>) -> LuaResult<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Builder collecting the script-visible surface of `T`.
pub struct TypeBuilder<T: Any + Send + Sync> {
    name: SmolStr,
    parents: Vec<TypeKey>,
    constructors: Vec<(Signature, Construct)>,
    methods: AHashMap<SmolStr, Vec<Overload>>,
    fields: AHashMap<SmolStr, Field>,
    statics: AHashMap<SmolStr, Vec<Overload>>,
    static_values: AHashMap<SmolStr, LuaValue>,
    conversions: Vec<Conversion>,
    metamethods: Vec<(TmKind, Overload)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeBuilder<T> {
    /// Start describing `T` under the script-visible `name`.
    pub fn new(name: &str) -> Self {
        TypeBuilder {
            name: SmolStr::new(name),
            parents: Vec::new(),
            constructors: Vec::new(),
            methods: AHashMap::new(),
            fields: AHashMap::new(),
            statics: AHashMap::new(),
            static_values: AHashMap::new(),
            conversions: Vec::new(),
            metamethods: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declare `P` as a parent type: instances are accepted by parameters
    /// declared as `P` (at subtype distance).
    pub fn inherits<P: Any>(self) -> Self {
        self.implements(TypeKey::of::<P>())
    }

    pub fn implements(mut self, key: TypeKey) -> Self {
        if !self.parents.contains(&key) {
            self.parents.push(key);
        }
        self
    }

    /// Add a constructor overload. Calling the type object resolves among
    /// all constructors.
    pub fn add_constructor<M, F: IntoConstructor<T, M>>(mut self, ctor: F) -> Self {
        self.constructors.push(ctor.into_constructor());
        self
    }

    /// Add an instance method overload. The receiver is borrowed mutably for
    /// the duration of the call.
    pub fn add_method<M, F: IntoMethod<T, M>>(mut self, name: &str, method: F) -> Self {
        self.methods
            .entry(SmolStr::new(name))
            .or_default()
            .push(method.into_method());
        self
    }

    /// Add an instance member backed by an arbitrary overload. The receiver
    /// arrives as the first argument (declare it as `Ud<T>`).
    pub fn add_function<M, F: IntoOverload<M>>(mut self, name: &str, func: F) -> Self {
        self.methods
            .entry(SmolStr::new(name))
            .or_default()
            .push(func.into_overload());
        self
    }

    /// Register a read-only field.
    pub fn add_field_getter<R, F>(mut self, name: &str, getter: F) -> Self
    where
        R: IntoLua,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let getter: FieldGetter =
            Arc::new(move |ud: &LuaUserdata| ud.borrow::<T, _>(&getter)?.into_lua());
        self.fields.entry(SmolStr::new(name)).or_default().getter = Some(getter);
        self
    }

    /// Register a field setter. The new value is converted with `FromLua`.
    pub fn add_field_setter<V, F>(mut self, name: &str, setter: F) -> Self
    where
        V: FromLua,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let setter: FieldSetter = Arc::new(
            move |state: &LuaState, ud: &LuaUserdata, value: LuaValue| {
                // convert before locking: the value may be this very userdata
                let value = V::from_lua(value, state)?;
                ud.borrow_mut::<T, _>(|target| setter(target, value))
            },
        );
        self.fields.entry(SmolStr::new(name)).or_default().setter = Some(setter);
        self
    }

    /// Add a static function overload, reachable as `Type.name(...)`.
    pub fn add_static<M, F: IntoOverload<M>>(mut self, name: &str, func: F) -> Self {
        self.statics
            .entry(SmolStr::new(name))
            .or_default()
            .push(func.into_overload());
        self
    }

    pub fn add_static_value(mut self, name: &str, value: impl Into<LuaValue>) -> Self {
        self.static_values.insert(SmolStr::new(name), value.into());
        self
    }

    /// Declare a conversion used by the conversion pass of overload
    /// resolution when an instance meets a parameter of type `target`.
    pub fn add_conversion<R, F>(mut self, target: NativeType, convert: F) -> Self
    where
        R: IntoLua,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        self.conversions.push(Conversion {
            target,
            convert: Arc::new(move |ud: &LuaUserdata| ud.borrow::<T, _>(&convert)?.into_lua()),
        });
        self
    }

    /// Add a metamethod overload (`__add`, `__eq`, `__call`, ...).
    pub fn add_meta_method<M, F: IntoOverload<M>>(mut self, event: TmKind, func: F) -> Self {
        self.metamethods.push((event, func.into_overload()));
        self
    }

    /// Set the `__tostring` metamethod.
    pub fn set_tostring<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let overload = Overload::new(
            Signature::new(vec![Param::new(NativeType::UserData(key))]),
            move |_state, args| {
                let mut cursor = ArgCursor::new(args);
                match cursor.next_value() {
                    LuaValue::UserData(ud) => {
                        let text = ud.borrow::<T, _>(&f)?;
                        Ok(MultiValue::single(LuaValue::string(text)))
                    }
                    other => Err(LuaError::type_error(format!(
                        "__tostring expects a {}, got {}",
                        key.name(),
                        other.type_name()
                    ))),
                }
            },
        );
        self.metamethods.push((TmKind::ToString, overload));
        self
    }

    /// Finish the description.
    pub fn build(self) -> Arc<TypeDescriptor> {
        let TypeBuilder {
            name,
            parents,
            constructors,
            methods,
            fields,
            statics,
            static_values,
            conversions,
            metamethods,
            ..
        } = self;

        let methods = methods
            .into_iter()
            .map(|(member, overloads)| {
                let func = LuaFunction::native(&format!("{name}.{member}"), overloads);
                (member, func)
            })
            .collect();

        let mut all_statics: AHashMap<SmolStr, LuaValue> = static_values;
        for (member, overloads) in statics {
            let func = LuaFunction::native(&format!("{name}.{member}"), overloads);
            all_statics.insert(member, LuaValue::Function(func));
        }

        let metatable = if metamethods.is_empty() {
            None
        } else {
            let mut grouped: Vec<(TmKind, Vec<Overload>)> = Vec::new();
            for (event, overload) in metamethods {
                match grouped.iter_mut().find(|(e, _)| *e == event) {
                    Some((_, list)) => list.push(overload),
                    None => grouped.push((event, vec![overload])),
                }
            }
            let table = LuaTable::new();
            for (event, overloads) in grouped {
                let func = LuaFunction::native(event.name(), overloads);
                // event names are valid keys
                let _ = table.set_str(event.name(), LuaValue::Function(func));
            }
            Some(table)
        };

        Arc::new_cyclic(|weak: &std::sync::Weak<TypeDescriptor>| {
            let constructors = (!constructors.is_empty()).then(|| {
                let overloads = constructors
                    .into_iter()
                    .map(|(signature, construct)| {
                        let weak = weak.clone();
                        Overload::new(signature, move |state, args| {
                            let payload = construct(state, args)?;
                            let descriptor = weak.upgrade().ok_or_else(|| {
                                LuaError::runtime("type descriptor no longer exists")
                            })?;
                            Ok(MultiValue::single(LuaValue::UserData(
                                LuaUserdata::from_boxed(payload, descriptor),
                            )))
                        })
                    })
                    .collect();
                LuaFunction::native(&name, overloads)
            });

            TypeDescriptor {
                name: name.clone(),
                key: TypeKey::of::<T>(),
                parents,
                constructors,
                methods,
                fields,
                statics: all_statics,
                conversions,
                metatable,
            }
        })
    }
}

/// Typed constructor closure `Fn(A1, .., An) -> T`.
pub trait IntoConstructor<T, Marker>: Send + Sync + 'static {
    fn into_constructor(self) -> (Signature, Construct);
}

/// Typed method closure `Fn(&mut T, A1, .., An) -> R`.
pub trait IntoMethod<T, Marker>: Send + Sync + 'static {
    fn into_method(self) -> Overload;
}

macro_rules! impl_typed_members {
    ($($A:ident),*) => {
        impl<T, Func, $($A,)*> IntoConstructor<T, ($($A,)*)> for Func
        where
            T: Any + Send + Sync,
            Func: Fn($($A),*) -> T + Send + Sync + 'static,
            $($A: NativeParam,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_constructor(self) -> (Signature, Construct) {
                let signature = Signature::from_specs(vec![$($A::spec()),*]);
                let construct: Construct = Arc::new(move |state: &LuaState, args: Vec<LuaValue>| {
                    let mut cursor = ArgCursor::new(args);
                    $(let $A = $A::take(&mut cursor, state)?;)*
                    let boxed: Box<dyn Any + Send + Sync> = Box::new((self)($($A),*));
                    Ok(boxed)
                });
                (signature, construct)
            }
        }

        impl<T, Func, Ret, $($A,)*> IntoMethod<T, (Ret, $($A,)*)> for Func
        where
            T: Any + Send + Sync,
            Func: Fn(&mut T, $($A),*) -> Ret + Send + Sync + 'static,
            Ret: IntoLuaMulti,
            $($A: NativeParam,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_method(self) -> Overload {
                let mut params = vec![Param::new(NativeType::UserData(TypeKey::of::<T>()))];
                let rest = Signature::from_specs(vec![$($A::spec()),*]);
                params.extend(rest.params);
                let signature = Signature {
                    params,
                    variadic: rest.variadic,
                    ignore_extra_args: false,
                };
                Overload::new(signature, move |state, args| {
                    let mut cursor = ArgCursor::new(args);
                    let receiver = cursor.next_value();
                    $(let $A = $A::take(&mut cursor, state)?;)*
                    let LuaValue::UserData(ud) = receiver else {
                        return Err(LuaError::type_error(format!(
                            "method receiver must be a {}, got {}",
                            TypeKey::of::<T>().name(),
                            receiver.type_name()
                        )));
                    };
                    ud.borrow_mut::<T, _>(|this| (self)(this, $($A),*))?
                        .into_lua_multi()
                })
            }
        }
    };
}

impl_typed_members!();
impl_typed_members!(A1);
impl_typed_members!(A1, A2);
impl_typed_members!(A1, A2, A3);
impl_typed_members!(A1, A2, A3, A4);
impl_typed_members!(A1, A2, A3, A4, A5);
