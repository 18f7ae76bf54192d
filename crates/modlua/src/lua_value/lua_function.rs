// Callable values: compiled script functions and native overload sets
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use smol_str::SmolStr;

use super::lua_convert::IntoOverload;
use super::{LuaValue, MultiValue, TypeKey};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// Plain native function taking the raw argument list, the shape used by
/// library functions.
pub type NativeFn = fn(&LuaState, MultiValue) -> LuaResult<MultiValue>;

type NativeTarget = Arc<dyn Fn(&LuaState, Vec<LuaValue>) -> LuaResult<MultiValue> + Send + Sync>;

/// Executable body of a script function.
///
/// The external compiler produces implementations of this trait; the
/// captured-variable environment lives inside the implementing value.
pub trait ScriptBody: Send + Sync {
    fn call(&self, state: &LuaState, args: MultiValue) -> LuaResult<MultiValue>;
}

impl<F> ScriptBody for F
where
    F: Fn(&LuaState, MultiValue) -> LuaResult<MultiValue> + Send + Sync,
{
    fn call(&self, state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
        self(state, args)
    }
}

/// Native numeric parameter types. Scripts only have f64; the kind decides
/// which numbers a parameter can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
}

impl NumberKind {
    pub fn name(self) -> &'static str {
        match self {
            NumberKind::I8 => "i8",
            NumberKind::I16 => "i16",
            NumberKind::I32 => "i32",
            NumberKind::I64 => "i64",
            NumberKind::Isize => "isize",
            NumberKind::U8 => "u8",
            NumberKind::U16 => "u16",
            NumberKind::U32 => "u32",
            NumberKind::U64 => "u64",
            NumberKind::Usize => "usize",
            NumberKind::F32 => "f32",
            NumberKind::F64 => "f64",
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, NumberKind::F32 | NumberKind::F64)
    }

    /// Whether `n` converts to this kind without losing information
    /// (integral and in range for the integer kinds).
    pub fn can_hold(self, n: f64) -> bool {
        if !self.is_integer() {
            return true;
        }
        if n.is_nan() || n.fract() != 0.0 {
            return false;
        }
        // exclusive upper bounds are powers of two, exact in f64
        let (min, end) = match self {
            NumberKind::I8 => (i8::MIN as f64, i8::MAX as f64 + 1.0),
            NumberKind::I16 => (i16::MIN as f64, i16::MAX as f64 + 1.0),
            NumberKind::I32 => (i32::MIN as f64, i32::MAX as f64 + 1.0),
            NumberKind::I64 => (i64::MIN as f64, -(i64::MIN as f64)),
            NumberKind::Isize => (isize::MIN as f64, -(isize::MIN as f64)),
            NumberKind::U8 => (0.0, u8::MAX as f64 + 1.0),
            NumberKind::U16 => (0.0, u16::MAX as f64 + 1.0),
            NumberKind::U32 => (0.0, u32::MAX as f64 + 1.0),
            NumberKind::U64 => (0.0, -(i64::MIN as f64) * 2.0),
            NumberKind::Usize => (0.0, -(isize::MIN as f64) * 2.0),
            NumberKind::F32 | NumberKind::F64 => return true,
        };
        n >= min && n < end
    }
}

/// Declared type of a native parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeType {
    /// Accepts any value (`object`).
    Any,
    Boolean,
    Number(NumberKind),
    String,
    Table,
    Function,
    Thread,
    /// Anything callable, adapted through [`crate::Callback`].
    Callback,
    /// Any user data instance.
    AnyUserData,
    /// Instances of a registered native type (or of its subtypes).
    UserData(TypeKey),
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Any => f.write_str("any"),
            NativeType::Boolean => f.write_str("boolean"),
            NativeType::Number(kind) => f.write_str(kind.name()),
            NativeType::String => f.write_str("string"),
            NativeType::Table => f.write_str("table"),
            NativeType::Function => f.write_str("function"),
            NativeType::Thread => f.write_str("thread"),
            NativeType::Callback => f.write_str("callback"),
            NativeType::AnyUserData => f.write_str("userdata"),
            NativeType::UserData(key) => f.write_str(key.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub ty: NativeType,
    /// Nil is accepted and passed through.
    pub nullable: bool,
    /// Value used when the argument is omitted. A parameter with a default
    /// is optional.
    pub default: Option<LuaValue>,
}

impl Param {
    pub fn new(ty: NativeType) -> Self {
        Param {
            ty,
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: LuaValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if self.nullable {
            f.write_str("?")?;
        }
        if let Some(default) = &self.default {
            write!(f, " = {default:?}")?;
        }
        Ok(())
    }
}

/// Parameter list of one overload.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    /// Element type of a trailing variadic parameter.
    pub variadic: Option<NativeType>,
    /// Accept and drop arguments beyond the declared parameters.
    pub ignore_extra_args: bool,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Signature {
            params,
            variadic: None,
            ignore_extra_args: false,
        }
    }

    /// `(...)` accepting anything.
    pub fn any_args() -> Self {
        Signature::new(Vec::new()).with_variadic(NativeType::Any)
    }

    pub fn with_variadic(mut self, ty: NativeType) -> Self {
        self.variadic = Some(ty);
        self
    }

    pub fn ignore_extra_args(mut self) -> Self {
        self.ignore_extra_args = true;
        self
    }

    /// Arguments required: everything up to the last non-optional parameter.
    pub fn min_args(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| !p.is_optional())
            .map_or(0, |i| i + 1)
    }

    pub fn accepts_count(&self, n: usize) -> bool {
        n >= self.min_args()
            && (n <= self.params.len() || self.variadic.is_some() || self.ignore_extra_args)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        if let Some(ty) = &self.variadic {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            write!(f, "{ty}...")?;
        }
        f.write_str(")")
    }
}

/// One native callable: a signature plus the bound target.
pub struct Overload {
    signature: Signature,
    target: NativeTarget,
}

impl Overload {
    /// The target receives arguments already adapted to `signature`:
    /// defaults filled in, conversions applied, extras dropped.
    pub fn new<F>(signature: Signature, target: F) -> Self
    where
        F: Fn(&LuaState, Vec<LuaValue>) -> LuaResult<MultiValue> + Send + Sync + 'static,
    {
        Overload {
            signature,
            target: Arc::new(target),
        }
    }

    pub fn from_fn(func: NativeFn) -> Self {
        Overload::new(Signature::any_args(), move |state, args| {
            func(state, MultiValue::multiple(args))
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn call(&self, state: &LuaState, args: Vec<LuaValue>) -> LuaResult<MultiValue> {
        (self.target)(state, args)
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Overload{}", self.signature)
    }
}

/// Ordered overloads sharing one visible name. New overloads can be added
/// at any time; resolution works on a snapshot.
pub struct OverloadSet {
    name: SmolStr,
    overloads: RwLock<Vec<Arc<Overload>>>,
}

impl OverloadSet {
    pub fn new(name: &str, overloads: Vec<Overload>) -> Self {
        OverloadSet {
            name: SmolStr::new(name),
            overloads: RwLock::new(overloads.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, overload: Overload) {
        self.overloads.write().push(Arc::new(overload));
    }

    pub fn len(&self) -> usize {
        self.overloads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.overloads.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<Overload>> {
        self.overloads.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<Overload>> {
        self.overloads.read().clone()
    }
}

pub struct ScriptFunction {
    name: SmolStr,
    body: Arc<dyn ScriptBody>,
}

impl ScriptFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, state: &LuaState, args: MultiValue) -> LuaResult<MultiValue> {
        self.body.call(state, args)
    }
}

pub enum FunctionKind {
    Script(ScriptFunction),
    Native(OverloadSet),
}

/// Handle to a function value; equality is identity.
#[derive(Clone)]
pub struct LuaFunction {
    inner: Arc<FunctionKind>,
}

impl LuaFunction {
    /// Script function backed by a closure.
    pub fn script<F>(name: &str, body: F) -> Self
    where
        F: Fn(&LuaState, MultiValue) -> LuaResult<MultiValue> + Send + Sync + 'static,
    {
        Self::from_body(name, Arc::new(body))
    }

    /// Script function backed by a compiled body.
    pub fn from_body(name: &str, body: Arc<dyn ScriptBody>) -> Self {
        LuaFunction {
            inner: Arc::new(FunctionKind::Script(ScriptFunction {
                name: SmolStr::new(name),
                body,
            })),
        }
    }

    pub fn native(name: &str, overloads: Vec<Overload>) -> Self {
        LuaFunction {
            inner: Arc::new(FunctionKind::Native(OverloadSet::new(name, overloads))),
        }
    }

    /// Single-overload function from a raw native function.
    pub fn from_fn(name: &str, func: NativeFn) -> Self {
        Self::native(name, vec![Overload::from_fn(func)])
    }

    /// Single-overload function from a typed closure.
    pub fn wrap<M, F: IntoOverload<M>>(name: &str, func: F) -> Self {
        Self::native(name, vec![func.into_overload()])
    }

    pub fn kind(&self) -> &FunctionKind {
        &self.inner
    }

    pub fn name(&self) -> &str {
        match &*self.inner {
            FunctionKind::Script(f) => f.name(),
            FunctionKind::Native(set) => set.name(),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(&*self.inner, FunctionKind::Native(_))
    }

    pub fn is_script(&self) -> bool {
        matches!(&*self.inner, FunctionKind::Script(_))
    }

    pub fn overload_count(&self) -> usize {
        match &*self.inner {
            FunctionKind::Script(_) => 0,
            FunctionKind::Native(set) => set.len(),
        }
    }

    /// Append an overload. Script functions have no overloads.
    pub fn add_overload(&self, overload: Overload) -> LuaResult<()> {
        match &*self.inner {
            FunctionKind::Native(set) => {
                set.add(overload);
                Ok(())
            }
            FunctionKind::Script(f) => Err(LuaError::unsupported(format!(
                "cannot add an overload to script function '{}'",
                f.name()
            ))),
        }
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaFunction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn as_ptr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {} 0x{:012x}", self.name(), self.as_ptr())
    }
}
