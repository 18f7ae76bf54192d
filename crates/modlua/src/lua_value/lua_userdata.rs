// Native values exposed to scripts
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;

use super::{LuaFunction, LuaTable, LuaValue, NativeType};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// Identity of a native Rust type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        let name = match base.rfind("::") {
            Some(pos) => &full[pos + 2..],
            None => full,
        };
        TypeKey {
            id: TypeId::of::<T>(),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) type FieldGetter = Arc<dyn Fn(&LuaUserdata) -> LuaResult<LuaValue> + Send + Sync>;
pub(crate) type FieldSetter =
    Arc<dyn Fn(&LuaState, &LuaUserdata, LuaValue) -> LuaResult<()> + Send + Sync>;

#[derive(Default, Clone)]
pub(crate) struct Field {
    pub(crate) getter: Option<FieldGetter>,
    pub(crate) setter: Option<FieldSetter>,
}

/// A user-declared conversion from instances of a type to another native
/// parameter type, tried by the conversion pass of overload resolution.
#[derive(Clone)]
pub struct Conversion {
    pub target: NativeType,
    pub(crate) convert: Arc<dyn Fn(&LuaUserdata) -> LuaResult<LuaValue> + Send + Sync>,
}

impl Conversion {
    pub fn apply(&self, value: &LuaUserdata) -> LuaResult<LuaValue> {
        (self.convert)(value)
    }
}

/// Everything the runtime knows about a registered native type.
/// Built with [`super::TypeBuilder`].
pub struct TypeDescriptor {
    pub(crate) name: SmolStr,
    pub(crate) key: TypeKey,
    pub(crate) parents: Vec<TypeKey>,
    pub(crate) constructors: Option<LuaFunction>,
    pub(crate) methods: AHashMap<SmolStr, LuaFunction>,
    pub(crate) fields: AHashMap<SmolStr, Field>,
    pub(crate) statics: AHashMap<SmolStr, LuaValue>,
    pub(crate) conversions: Vec<Conversion>,
    pub(crate) metatable: Option<LuaTable>,
}

impl TypeDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn parents(&self) -> &[TypeKey] {
        &self.parents
    }

    /// `key` is this type or one of its declared parents.
    pub fn is_a(&self, key: &TypeKey) -> bool {
        self.key == *key || self.parents.contains(key)
    }

    pub fn is_constructible(&self) -> bool {
        self.constructors.is_some()
    }

    pub fn constructors(&self) -> Option<&LuaFunction> {
        self.constructors.as_ref()
    }

    pub fn method(&self, name: &str) -> Option<&LuaFunction> {
        self.methods.get(name)
    }

    pub fn static_member(&self, name: &str) -> Option<&LuaValue> {
        self.statics.get(name)
    }

    pub(crate) fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn conversion_to(&self, target: &NativeType) -> Option<&Conversion> {
        self.conversions.iter().find(|c| &c.target == target)
    }

    pub fn metatable(&self) -> Option<&LuaTable> {
        self.metatable.as_ref()
    }
}

/// Payload of an instance. `holders` lists the native threads currently
/// inside a borrow, so a nested borrow from the same thread fails instead of
/// waiting on a lock it already holds.
struct Instance {
    type_id: TypeId,
    value: RwLock<Box<dyn Any + Send + Sync>>,
    holders: Mutex<Vec<ThreadId>>,
}

struct BorrowGuard<'a> {
    holders: &'a Mutex<Vec<ThreadId>>,
    me: ThreadId,
}

impl Drop for BorrowGuard<'_> {
    fn drop(&mut self) {
        let mut holders = self.holders.lock();
        if let Some(pos) = holders.iter().position(|id| *id == self.me) {
            holders.swap_remove(pos);
        }
    }
}

impl Instance {
    fn enter(&self, type_name: &str) -> LuaResult<BorrowGuard<'_>> {
        let me = thread::current().id();
        let mut holders = self.holders.lock();
        if holders.contains(&me) {
            return Err(LuaError::runtime(format!(
                "userdata of type '{type_name}' is already borrowed"
            )));
        }
        holders.push(me);
        Ok(BorrowGuard {
            holders: &self.holders,
            me,
        })
    }
}

enum Payload {
    Instance(Instance),
    Type,
}

struct UserdataInner {
    descriptor: Arc<TypeDescriptor>,
    payload: Payload,
}

/// A native value (or a native type object) visible to scripts.
/// Equality is identity.
#[derive(Clone)]
pub struct LuaUserdata {
    inner: Arc<UserdataInner>,
}

impl LuaUserdata {
    /// Wrap a value with a bare descriptor (no members).
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let descriptor = super::TypeBuilder::<T>::new(TypeKey::of::<T>().name()).build();
        Self::with_descriptor(value, descriptor)
    }

    pub fn with_descriptor<T: Any + Send + Sync>(value: T, descriptor: Arc<TypeDescriptor>) -> Self {
        Self::from_boxed(Box::new(value), descriptor)
    }

    pub(crate) fn from_boxed(
        value: Box<dyn Any + Send + Sync>,
        descriptor: Arc<TypeDescriptor>,
    ) -> Self {
        LuaUserdata {
            inner: Arc::new(UserdataInner {
                descriptor,
                payload: Payload::Instance(Instance {
                    type_id: (*value).type_id(),
                    value: RwLock::new(value),
                    holders: Mutex::new(Vec::new()),
                }),
            }),
        }
    }

    /// The script-visible object standing for a registered type: calling
    /// it constructs instances, indexing it reaches static members.
    pub fn type_object(descriptor: Arc<TypeDescriptor>) -> Self {
        LuaUserdata {
            inner: Arc::new(UserdataInner {
                descriptor,
                payload: Payload::Type,
            }),
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(self.inner.payload, Payload::Type)
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.inner.descriptor
    }

    pub fn type_name(&self) -> &str {
        self.inner.descriptor.name()
    }

    /// Instances share the metatable of their type; type objects have none.
    pub fn get_metatable(&self) -> Option<LuaTable> {
        match self.inner.payload {
            Payload::Instance(_) => self.inner.descriptor.metatable.clone(),
            Payload::Type => None,
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        match &self.inner.payload {
            Payload::Instance(cell) => cell.type_id == TypeId::of::<T>(),
            Payload::Type => false,
        }
    }

    pub fn borrow<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> LuaResult<R> {
        let Payload::Instance(cell) = &self.inner.payload else {
            return Err(self.not_an_instance());
        };
        let _entered = cell.enter(self.type_name())?;
        let guard = cell.value.read();
        match guard.downcast_ref::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(self.wrong_type(TypeKey::of::<T>().name())),
        }
    }

    pub fn borrow_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> LuaResult<R> {
        let Payload::Instance(cell) = &self.inner.payload else {
            return Err(self.not_an_instance());
        };
        let _entered = cell.enter(self.type_name())?;
        let mut guard = cell.value.write();
        match guard.downcast_mut::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(self.wrong_type(TypeKey::of::<T>().name())),
        }
    }

    fn not_an_instance(&self) -> LuaError {
        LuaError::type_error(format!("'{}' is a type, not an instance", self.type_name()))
    }

    fn wrong_type(&self, expected: &str) -> LuaError {
        LuaError::type_error(format!(
            "userdata of type '{}' is not a '{}'",
            self.type_name(),
            expected
        ))
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaUserdata) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn as_ptr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for LuaUserdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata<{}>: 0x{:012x}", self.type_name(), self.as_ptr())
    }
}
