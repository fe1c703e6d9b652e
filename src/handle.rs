//! Typed handles
//!
//! Configs and contexts are handed to clients as pointer-sized opaque values.
//! Instead of leaking the address of a heap object, each value packs a kind
//! tag and an arena slot, so a context passed where a config is expected (or
//! a stray pointer) is rejected instead of dereferenced.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Result, ShimError};

/// Marker for one family of handles
pub trait HandleKind {
    const TAG: usize;
    const NAME: &'static str;
}

const TAG_SHIFT: u32 = 48;
const INDEX_MASK: usize = (1 << TAG_SHIFT) - 1;

/// Opaque reference into an `Arena<K, _>`
pub struct Handle<K> {
    index: usize,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> Handle<K> {
    fn new(index: usize) -> Self {
        Self { index, _kind: PhantomData }
    }

    /// Value handed across the C boundary; never zero
    pub fn to_raw(self) -> usize {
        (K::TAG << TAG_SHIFT) | (self.index + 1)
    }

    /// Decode a value from the C boundary; `Ok(None)` for null
    pub fn from_raw(raw: usize) -> Result<Option<Self>> {
        if raw == 0 {
            return Ok(None);
        }
        let slot = raw & INDEX_MASK;
        if raw >> TAG_SHIFT != K::TAG || slot == 0 {
            return Err(ShimError::InvalidHandle { kind: K::NAME, raw });
        }
        Ok(Some(Self::new(slot - 1)))
    }
}

// Manual impls: derives would require K: Clone etc.
impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<K> Eq for Handle<K> {}

impl<K> std::hash::Hash for Handle<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", K::NAME, self.index)
    }
}

/// Append-only storage; entries live until the process exits
pub struct Arena<K, T> {
    items: Vec<T>,
    _kind: PhantomData<K>,
}

impl<K: HandleKind, T> Arena<K, T> {
    pub fn new() -> Self {
        Self { items: Vec::new(), _kind: PhantomData }
    }

    pub fn insert(&mut self, item: T) -> Handle<K> {
        self.items.push(item);
        Handle::new(self.items.len() - 1)
    }

    pub fn get(&self, handle: Handle<K>) -> Result<&T> {
        self.items.get(handle.index).ok_or(ShimError::InvalidHandle {
            kind: K::NAME,
            raw: handle.to_raw(),
        })
    }
}

impl<K: HandleKind, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Apple;
    impl HandleKind for Apple {
        const TAG: usize = 0xA1;
        const NAME: &'static str = "apple";
    }

    struct Pear;
    impl HandleKind for Pear {
        const TAG: usize = 0xA2;
        const NAME: &'static str = "pear";
    }

    #[test]
    fn test_raw_values_round_trip_and_are_never_null() {
        let mut arena: Arena<Apple, &str> = Arena::new();
        let first = arena.insert("first");
        let second = arena.insert("second");

        assert_ne!(first.to_raw(), 0);
        let decoded = Handle::<Apple>::from_raw(second.to_raw()).unwrap().unwrap();
        assert_eq!(decoded, second);
        assert_eq!(*arena.get(decoded).unwrap(), "second");
        assert_eq!(*arena.get(first).unwrap(), "first");
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let mut apples: Arena<Apple, u8> = Arena::new();
        let apple = apples.insert(1);

        assert!(Handle::<Pear>::from_raw(apple.to_raw()).is_err());
        assert!(Handle::<Apple>::from_raw(0xdead_beef).is_err());
        assert!(Handle::<Apple>::from_raw(0).unwrap().is_none());
    }

    #[test]
    fn test_unissued_slot_does_not_resolve() {
        let mut arena: Arena<Apple, u8> = Arena::new();
        arena.insert(1);
        let forged = Handle::<Apple>::from_raw((0xA1 << 48) | 9).unwrap().unwrap();
        assert!(arena.get(forged).is_err());
    }
}
