//! Fixed-capacity slot pools with recycled integer handles.
//!
//! [`SlotPool<T>`] owns up to `capacity` values of `T`, addressed by
//! [`Handle<T>`]. Handles are small integer indices in `[0, capacity)`, so they
//! can be written straight into GPU-visible tables (the bindless texture array
//! is indexed by texture handle).
//!
//! Released ids go back on a LIFO free list: the most recently released id is
//! the next one issued. A fresh pool issues ids in ascending order.
//!
//! # Example
//!
//! ```
//! use lilium_frame::pool::SlotPool;
//!
//! let mut sounds: SlotPool<&str> = SlotPool::new("sound", 32);
//! let a = sounds.acquire("explosion").unwrap();
//! let b = sounds.acquire("footstep").unwrap();
//! assert_eq!((a.index(), b.index()), (0, 1));
//!
//! assert_eq!(sounds.release(a).unwrap(), "explosion");
//! let c = sounds.acquire("laser").unwrap();
//! assert_eq!(c.index(), 0);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::{RendererError, RendererResult};

/// Typed index into a [`SlotPool<T>`].
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Build a handle from a raw slot index.
    ///
    /// The pool validates the index on every access, so a forged handle can
    /// only ever miss, never alias another live slot.
    pub const fn from_raw(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Slot index of this handle.
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Fixed-capacity slot array with a free-id list and a used-id list.
pub struct SlotPool<T> {
    name: &'static str,
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    used: Vec<u32>,
}

impl<T> SlotPool<T> {
    /// Create an empty pool. `name` is only used in error messages.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            name,
            slots,
            // Reversed so that `pop` issues 0, 1, 2, ...
            free: (0..capacity as u32).rev().collect(),
            used: Vec::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Fail with [`RendererError::PoolExhausted`] if no slot is free.
    ///
    /// Lets callers reject a load before creating any GPU objects for it.
    pub fn ensure_available(&self) -> RendererResult<()> {
        if self.is_full() {
            return Err(RendererError::PoolExhausted {
                pool: self.name,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Store `value` in a free slot and return its handle.
    pub fn acquire(&mut self, value: T) -> RendererResult<Handle<T>> {
        let index = self.free.pop().ok_or(RendererError::PoolExhausted {
            pool: self.name,
            capacity: self.slots.len(),
        })?;
        self.slots[index as usize] = Some(value);
        self.used.push(index);
        Ok(Handle::from_raw(index))
    }

    /// Remove the value behind `handle`, returning its id to the free list.
    pub fn release(&mut self, handle: Handle<T>) -> RendererResult<T> {
        let value = self
            .slots
            .get_mut(handle.index as usize)
            .and_then(Option::take)
            .ok_or(RendererError::InvalidHandle {
                pool: self.name,
                index: handle.index,
            })?;

        if let Some(position) = self.used.iter().position(|&id| id == handle.index) {
            self.used.remove(position);
        }
        self.free.push(handle.index);
        Ok(value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots.get(handle.index as usize).and_then(Option::as_ref)
    }

    /// Like [`get`](Self::get) but reports a stale or forged handle as an error.
    pub fn try_get(&self, handle: Handle<T>) -> RendererResult<&T> {
        self.get(handle).ok_or(RendererError::InvalidHandle {
            pool: self.name,
            index: handle.index,
        })
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Live entries in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.used.iter().filter_map(|&index| {
            self.slots[index as usize]
                .as_ref()
                .map(|value| (Handle::from_raw(index), value))
        })
    }

    /// Every slot in index order, `None` for free ones.
    pub fn slots(&self) -> impl Iterator<Item = Option<&T>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Release every live entry, handing the values to the caller for cleanup.
    pub fn drain(&mut self) -> Vec<T> {
        let used = std::mem::take(&mut self.used);
        let mut values = Vec::with_capacity(used.len());
        for index in used.into_iter().rev() {
            if let Some(value) = self.slots[index as usize].take() {
                values.push(value);
            }
            self.free.push(index);
        }
        values
    }
}

impl<T> fmt::Debug for SlotPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fresh_pool_issues_ascending_ids() {
        let mut pool = SlotPool::new("texture", 4);
        let ids: Vec<u32> = (0..4).map(|i| pool.acquire(i).unwrap().index()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(pool.is_full());
    }

    #[test]
    fn test_acquire_past_capacity_fails() {
        let mut pool = SlotPool::new("geometry", 2);
        pool.acquire('a').unwrap();
        pool.acquire('b').unwrap();

        let err = pool.acquire('c').unwrap_err();
        assert!(matches!(
            err,
            RendererError::PoolExhausted {
                pool: "geometry",
                capacity: 2
            }
        ));
        // Existing slots are untouched
        assert_eq!(pool.get(Handle::from_raw(0)), Some(&'a'));
        assert_eq!(pool.get(Handle::from_raw(1)), Some(&'b'));
    }

    #[test]
    fn test_release_then_acquire_reuses_last_released_id() {
        let mut pool = SlotPool::new("texture", 32);
        let first = pool.acquire("brick").unwrap();
        let second = pool.acquire("grass").unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));

        pool.release(first).unwrap();
        let third = pool.acquire("sky").unwrap();
        assert_eq!(third.index(), 0);
        assert_eq!(pool.get(third), Some(&"sky"));
    }

    #[test]
    fn test_acquire_release_immediately_returns_slot() {
        let mut pool = SlotPool::new("texture", 32);
        pool.acquire(0u8).unwrap();
        let handle = pool.acquire(1u8).unwrap();
        pool.release(handle).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.acquire(2u8).unwrap(), handle);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let mut pool = SlotPool::new("geometry", 8);
        let handle = pool.acquire(()).unwrap();
        pool.release(handle).unwrap();
        assert!(matches!(
            pool.release(handle),
            Err(RendererError::InvalidHandle { index: 0, .. })
        ));
        // The id must not have been pushed twice
        let a = pool.acquire(()).unwrap();
        let b = pool.acquire(()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_out_of_range_handle_is_invalid() {
        let mut pool: SlotPool<u32> = SlotPool::new("geometry", 4);
        assert!(pool.try_get(Handle::from_raw(99)).is_err());
        assert!(pool.release(Handle::from_raw(99)).is_err());
    }

    #[test]
    fn test_random_sequences_never_alias_live_handles() {
        const CAPACITY: usize = 16;
        let mut pool = SlotPool::new("geometry", CAPACITY);
        let mut live: Vec<Handle<usize>> = Vec::new();
        // Small deterministic LCG so the sequence is reproducible
        let mut state: u32 = 0x2545_F491;
        for step in 0..2000 {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let release = !live.is_empty() && (state >> 16) % 3 == 0;
            if release {
                let victim = live.swap_remove((state as usize >> 8) % live.len());
                assert_eq!(pool.release(victim).unwrap(), victim.index() as usize);
            } else if let Ok(handle) = pool.acquire(0) {
                assert!((handle.index() as usize) < CAPACITY);
                live.push(handle);
                // Store the index so release can check it came back intact
                pool.release(handle).unwrap();
                let again = pool.acquire(handle.index() as usize).unwrap();
                assert_eq!(again, handle);
            } else {
                assert_eq!(live.len(), CAPACITY, "step {step}");
            }

            let unique: HashSet<_> = live.iter().copied().collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(pool.len(), live.len());
        }
    }

    #[test]
    fn test_iter_follows_acquisition_order() {
        let mut pool = SlotPool::new("texture", 4);
        let a = pool.acquire('a').unwrap();
        let b = pool.acquire('b').unwrap();
        pool.release(a).unwrap();
        let c = pool.acquire('c').unwrap();

        let order: Vec<_> = pool.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(order, vec![(b, 'b'), (c, 'c')]);
    }

    #[test]
    fn test_slots_reports_free_entries_as_none() {
        let mut pool = SlotPool::new("texture", 3);
        pool.acquire(7).unwrap();
        let slots: Vec<_> = pool.slots().map(|s| s.copied()).collect();
        assert_eq!(slots, vec![Some(7), None, None]);
    }

    #[test]
    fn test_drain_empties_pool() {
        let mut pool = SlotPool::new("geometry", 4);
        pool.acquire(1).unwrap();
        pool.acquire(2).unwrap();

        let mut drained = pool.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert!(pool.is_empty());
        assert_eq!(pool.acquire(3).unwrap().index(), 0);
    }
}
