use ahash::AHashMap;

use crate::lua_value::LuaValue;
use crate::lua_vm::lua_limits::MIN_TOMBSTONE_COMPACT;

/// Hash part of a table.
///
/// Entries live in insertion-ordered slots and the map only stores slot
/// positions. Removing a key leaves a tombstone (nil value) in its slot, so
/// `next` can still find the position of a key deleted mid-traversal.
/// Tombstones are dropped when a new key is inserted and they outnumber the
/// live entries.
#[derive(Default)]
pub struct LuaHashTable {
    slots: Vec<(LuaValue, LuaValue)>,
    index: AHashMap<LuaValue, usize>,
    live: usize,
}

impl LuaHashTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            index: AHashMap::with_capacity(capacity),
            live: 0,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, key: &LuaValue) -> Option<&LuaValue> {
        let slot = *self.index.get(key)?;
        let value = &self.slots[slot].1;
        (!value.is_nil()).then_some(value)
    }

    pub fn contains(&self, key: &LuaValue) -> bool {
        self.get(key).is_some()
    }

    /// Insert, overwrite or (with a nil value) remove.
    pub fn set(&mut self, key: LuaValue, value: LuaValue) {
        if let Some(&slot) = self.index.get(&key) {
            let entry = &mut self.slots[slot].1;
            match (entry.is_nil(), value.is_nil()) {
                (true, false) => self.live += 1,
                (false, true) => self.live -= 1,
                _ => {}
            }
            *entry = value;
            return;
        }
        if value.is_nil() {
            return;
        }
        if self.slots.len() - self.live > self.live.max(MIN_TOMBSTONE_COMPACT) {
            self.compact();
        }
        self.index.insert(key.clone(), self.slots.len());
        self.slots.push((key, value));
        self.live += 1;
    }

    /// Remove a live key and return its value.
    pub fn take(&mut self, key: &LuaValue) -> Option<LuaValue> {
        let slot = *self.index.get(key)?;
        let value = std::mem::take(&mut self.slots[slot].1);
        if value.is_nil() {
            return None;
        }
        self.live -= 1;
        Some(value)
    }

    /// Slot position of a key, live or tombstoned.
    pub fn position(&self, key: &LuaValue) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// First live entry at slot `from` or later.
    pub fn next_from(&self, from: usize) -> Option<(&LuaValue, &LuaValue)> {
        self.slots
            .iter()
            .skip(from)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k, v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LuaValue, &LuaValue)> {
        self.slots
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k, v))
    }

    fn compact(&mut self) {
        self.slots.retain(|(_, v)| !v.is_nil());
        self.index.clear();
        for (i, (key, _)) in self.slots.iter().enumerate() {
            self.index.insert(key.clone(), i);
        }
    }
}
