// LuaTable - shared associative array with an optional metatable
mod hash_table;
mod value_array;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::lua_value::LuaValue;
use crate::lua_value::lua_table::{hash_table::LuaHashTable, value_array::LuaValueArray};
use crate::lua_value::number::number_to_integer;
use crate::lua_vm::{LuaError, LuaResult};

/// Handle to a table. Clones share the same storage; equality of handles
/// is identity.
///
/// Every operation here is raw: metatables are stored but never consulted.
/// Metatable-aware access goes through [`crate::LuaState`]. The internal
/// lock is only held for the duration of a single raw operation.
#[derive(Clone, Default)]
pub struct LuaTable {
    inner: Arc<Mutex<TableData>>,
}

#[derive(Default)]
struct TableData {
    array: LuaValueArray,
    hash: LuaHashTable,
    metatable: Option<LuaTable>,
}

/// Array-part slot for a key, if it is a positive integral number.
fn array_index(key: &LuaValue) -> Option<usize> {
    let n = number_to_integer(key.as_number()?)?;
    usize::try_from(n).ok().filter(|&i| i >= 1)
}

impl TableData {
    fn get(&self, key: &LuaValue) -> LuaValue {
        if let Some(i) = array_index(key)
            && let Some(v) = self.array.get_int(i)
        {
            return v.clone();
        }
        self.hash.get(key).cloned().unwrap_or_default()
    }

    fn get_int(&self, key: usize) -> LuaValue {
        match self.array.get_int(key) {
            Some(v) => v.clone(),
            None => self
                .hash
                .get(&LuaValue::Number(key as f64))
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn contains(&self, key: &LuaValue) -> bool {
        if let Some(i) = array_index(key)
            && let Some(v) = self.array.get_int(i)
        {
            return !v.is_nil();
        }
        self.hash.contains(key)
    }

    fn set(&mut self, key: LuaValue, value: LuaValue) {
        if let Some(i) = array_index(&key) {
            if self.array.set_int(i, value.clone()) {
                return;
            }
            if i == self.array.len() + 1 && !value.is_nil() {
                self.hash.take(&key);
                self.array.push(value);
                self.migrate_from_hash();
                return;
            }
        }
        self.hash.set(key, value);
    }

    /// After the array part grew, pull the following integer keys over
    /// from the hash part.
    fn migrate_from_hash(&mut self) {
        loop {
            let next = LuaValue::Number((self.array.len() + 1) as f64);
            match self.hash.take(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    fn border(&self) -> usize {
        let n = self.array.len();
        if n > 0 && self.array.get_int(n).is_some_and(LuaValue::is_nil) {
            return self.array.inner_border();
        }
        if self.hash.is_empty() {
            return n;
        }
        self.hash_border(n)
    }

    /// Unbound search past the array part: double `j` while `t[j]` is
    /// present, then binary search between the last hit and the miss.
    fn hash_border(&self, start: usize) -> usize {
        let present = |k: usize| !self.get_int(k).is_nil();
        let mut i = start;
        let mut j = start + 1;
        while present(j) {
            i = j;
            if j > usize::MAX / 2 {
                // pathological table: fall back to a linear scan
                let mut k = 1;
                while present(k) {
                    k += 1;
                }
                return k - 1;
            }
            j *= 2;
        }
        while j - i > 1 {
            let m = (i + j) / 2;
            if present(m) {
                i = m;
            } else {
                j = m;
            }
        }
        i
    }

    fn next(&self, key: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        let array_len = self.array.len();
        let (array_from, hash_from) = if key.is_nil() {
            (0, 0)
        } else if let Some(i) = array_index(key).filter(|&i| i <= array_len) {
            (i, 0)
        } else {
            match self.hash.position(key) {
                Some(pos) => (array_len, pos + 1),
                None => return Err(LuaError::runtime("invalid key to 'next'")),
            }
        };

        if let Some((i, v)) = self.array.next_from(array_from) {
            return Ok(Some((LuaValue::Number((i + 1) as f64), v.clone())));
        }
        Ok(self
            .hash
            .next_from(hash_from)
            .map(|(k, v)| (k.clone(), v.clone())))
    }
}

impl LuaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(narray: usize, nhash: usize) -> Self {
        LuaTable {
            inner: Arc::new(Mutex::new(TableData {
                array: LuaValueArray::new(narray),
                hash: LuaHashTable::new(nhash),
                metatable: None,
            })),
        }
    }

    /// Build a sequence `{v1, v2, ...}`.
    pub fn from_values(values: impl IntoIterator<Item = LuaValue>) -> Self {
        let table = LuaTable::new();
        {
            let mut data = table.inner.lock();
            for (i, v) in values.into_iter().enumerate() {
                data.set(LuaValue::Number((i + 1) as f64), v);
            }
        }
        table
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaTable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn as_ptr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Raw read. Nil and NaN keys simply yield nil.
    pub fn get_raw(&self, key: &LuaValue) -> LuaValue {
        if !key.is_valid_key() {
            return LuaValue::Nil;
        }
        self.inner.lock().get(key)
    }

    pub fn get_int(&self, key: i64) -> LuaValue {
        match usize::try_from(key) {
            Ok(k) if k >= 1 => self.inner.lock().get_int(k),
            _ => self.get_raw(&LuaValue::Number(key as f64)),
        }
    }

    pub fn get_str(&self, key: &str) -> LuaValue {
        self.get_raw(&LuaValue::string(key))
    }

    pub fn contains_key(&self, key: &LuaValue) -> bool {
        key.is_valid_key() && self.inner.lock().contains(key)
    }

    /// Raw write. Assigning nil removes the key.
    pub fn set_raw(&self, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        match &key {
            LuaValue::Nil => return Err(LuaError::runtime("table index is nil")),
            LuaValue::Number(n) if n.is_nan() => {
                return Err(LuaError::runtime("table index is NaN"));
            }
            _ => {}
        }
        self.inner.lock().set(key, value);
        Ok(())
    }

    pub fn set_int(&self, key: i64, value: LuaValue) -> LuaResult<()> {
        self.set_raw(LuaValue::Number(key as f64), value)
    }

    pub fn set_str(&self, key: &str, value: LuaValue) -> LuaResult<()> {
        self.set_raw(LuaValue::string(key), value)
    }

    /// Read-modify-write of one key under a single lock acquisition. `f`
    /// sees the current value and returns its replacement, or `None` to
    /// leave the entry untouched.
    pub fn update<F>(&self, key: &LuaValue, f: F) -> LuaResult<()>
    where
        F: FnOnce(&LuaValue) -> LuaResult<Option<LuaValue>>,
    {
        if !key.is_valid_key() {
            return Err(LuaError::runtime("table index is nil or NaN"));
        }
        let mut data = self.inner.lock();
        let current = data.get(key);
        if let Some(value) = f(&current)? {
            data.set(key.clone(), value);
        }
        Ok(())
    }

    /// Write only if `key` is already present. Check and write happen under
    /// one lock acquisition.
    pub fn set_if_present(&self, key: &LuaValue, value: LuaValue) -> bool {
        if !key.is_valid_key() {
            return false;
        }
        let mut data = self.inner.lock();
        if !data.contains(key) {
            return false;
        }
        data.set(key.clone(), value);
        true
    }

    /// Border of the table: some `n` with `t[n]` present (or `n == 0`) and
    /// `t[n+1]` absent. With holes any border may be returned.
    pub fn raw_len(&self) -> usize {
        self.inner.lock().border()
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        let data = self.inner.lock();
        data.array.live_count() + data.hash.len()
    }

    /// The entry following `key` in traversal order (`nil` starts).
    /// Deleting the current key between calls is allowed.
    pub fn next(&self, key: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        self.inner.lock().next(key)
    }

    /// Snapshot of every live pair in traversal order.
    pub fn pairs(&self) -> Vec<(LuaValue, LuaValue)> {
        let data = self.inner.lock();
        let mut out = Vec::with_capacity(data.array.len() + data.hash.len());
        for (i, v) in data.array.array.iter().enumerate() {
            if !v.is_nil() {
                out.push((LuaValue::Number((i + 1) as f64), v.clone()));
            }
        }
        out.extend(data.hash.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    pub fn get_metatable(&self) -> Option<LuaTable> {
        self.inner.lock().metatable.clone()
    }

    pub fn set_metatable(&self, metatable: Option<LuaTable>) {
        self.inner.lock().metatable = metatable;
    }

    pub fn has_metatable(&self) -> bool {
        self.inner.lock().metatable.is_some()
    }
}

impl std::fmt::Debug for LuaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table: 0x{:012x}", self.as_ptr())
    }
}
