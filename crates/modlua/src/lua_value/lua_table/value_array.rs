use crate::lua_value::LuaValue;

/// Array part of a table: keys `1..=len` stored contiguously.
/// Holes are plain nil slots; the part never shrinks so that iteration can
/// keep going after the current key is deleted.
#[derive(Default)]
pub struct LuaValueArray {
    pub array: Vec<LuaValue>,
}

impl LuaValueArray {
    pub fn new(capacity: usize) -> Self {
        Self {
            array: Vec::with_capacity(capacity),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// 1-based lookup.
    #[inline]
    pub fn get_int(&self, key: usize) -> Option<&LuaValue> {
        key.checked_sub(1).and_then(|i| self.array.get(i))
    }

    /// Store into an existing slot. Returns false when `key` is outside
    /// the array part.
    pub fn set_int(&mut self, key: usize, value: LuaValue) -> bool {
        match key.checked_sub(1).and_then(|i| self.array.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&mut self, value: LuaValue) {
        self.array.push(value);
    }

    /// Border inside the array part, valid when the last slot is nil.
    pub fn inner_border(&self) -> usize {
        let (mut i, mut j) = (0usize, self.array.len());
        while j - i > 1 {
            let m = (i + j) / 2;
            if self.array[m - 1].is_nil() {
                j = m;
            } else {
                i = m;
            }
        }
        i
    }

    /// First non-nil slot at 0-based position `from` or later.
    pub fn next_from(&self, from: usize) -> Option<(usize, &LuaValue)> {
        self.array
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, v)| !v.is_nil())
    }

    pub fn live_count(&self) -> usize {
        self.array.iter().filter(|v| !v.is_nil()).count()
    }
}
