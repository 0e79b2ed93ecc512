//! Fixed-size unit pools.
//!
//! A `Pool` hands out typed units by index. Freed units go back on a
//! free-index stack and are reused LIFO; when the stack runs dry the pool
//! grows by one slice's worth of units. Pools never shrink.

use alloc::vec::Vec;
use core::fmt;

/// Units that can be reset in place when they are handed out or returned.
pub trait Clear {
    fn clear(&mut self);
}

/// Index of a unit inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool could not grow: its unit limit was reached or the heap
    /// refused the reservation.
    Exhausted,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PoolError::Exhausted => write!(f, "pool exhausted"),
        }
    }
}

pub struct Pool<T> {
    units: Vec<T>,
    allocated: Vec<bool>,
    free: Vec<usize>,
    grow_by: usize,
    limit: Option<usize>,
}

impl<T: Clear + Default> Pool<T> {
    /// A pool that grows `grow_by` units at a time, without bound.
    pub const fn new(grow_by: usize) -> Self {
        Pool {
            units: Vec::new(),
            allocated: Vec::new(),
            free: Vec::new(),
            grow_by: if grow_by == 0 { 1 } else { grow_by },
            limit: None,
        }
    }

    /// A pool that never holds more than `limit` units.
    pub const fn with_limit(grow_by: usize, limit: usize) -> Self {
        let mut pool = Self::new(grow_by);
        pool.limit = Some(limit);
        pool
    }

    fn grow(&mut self) -> Result<(), PoolError> {
        let start = self.units.len();
        let mut count = self.grow_by;
        if let Some(limit) = self.limit {
            count = count.min(limit.saturating_sub(start));
        }
        if count == 0 {
            return Err(PoolError::Exhausted);
        }

        self.units.try_reserve(count).map_err(|_| PoolError::Exhausted)?;
        self.allocated.try_reserve(count).map_err(|_| PoolError::Exhausted)?;
        self.free.try_reserve(count).map_err(|_| PoolError::Exhausted)?;

        // Push in reverse so the lowest new index is handed out first.
        for index in (start..start + count).rev() {
            self.free.push(index);
        }
        for _ in 0..count {
            self.units.push(T::default());
            self.allocated.push(false);
        }
        Ok(())
    }

    /// Claim a cleared unit, growing the pool if no unit is free.
    pub fn alloc(&mut self) -> Result<Slot, PoolError> {
        if self.free.is_empty() {
            self.grow()?;
        }
        let index = self.free.pop().ok_or(PoolError::Exhausted)?;
        self.units[index].clear();
        self.allocated[index] = true;
        Ok(Slot(index))
    }

    /// Return a unit to the pool.
    ///
    /// Freeing a unit that is not currently allocated means the caller's
    /// bookkeeping is corrupt, which is not recoverable.
    pub fn free(&mut self, slot: Slot) {
        match self.allocated.get(slot.0) {
            Some(true) => {}
            _ => panic!("pool: free of unallocated slot {}", slot.0),
        }
        self.units[slot.0].clear();
        self.allocated[slot.0] = false;
        self.free.push(slot.0);
    }
}

impl<T> Pool<T> {
    /// Number of units that fit in one slice of `slice_bytes`.
    pub const fn units_per_slice(slice_bytes: usize) -> usize {
        let size = core::mem::size_of::<T>();
        if size == 0 || size >= slice_bytes {
            1
        } else {
            slice_bytes / size
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        if self.is_allocated(slot) {
            self.units.get(slot.0)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        if self.is_allocated(slot) {
            self.units.get_mut(slot.0)
        } else {
            None
        }
    }

    pub fn is_allocated(&self, slot: Slot) -> bool {
        self.allocated.get(slot.0).copied().unwrap_or(false)
    }

    /// Total units ever carved out of slices.
    pub fn capacity(&self) -> usize {
        self.units.len()
    }

    /// Units sitting on the free list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.units.len() - self.free.len()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Unit {
        value: u32,
    }

    impl Clear for Unit {
        fn clear(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn grows_by_one_slice_and_conserves_units() {
        let mut pool: Pool<Unit> = Pool::new(4);
        let a = pool.alloc().unwrap();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.in_use(), 1);

        let mut held = vec![a];
        for _ in 0..6 {
            held.push(pool.alloc().unwrap());
            assert_eq!(pool.available() + pool.in_use(), pool.capacity());
        }
        assert_eq!(pool.capacity(), 8);

        for slot in held.drain(..) {
            pool.free(slot);
            assert_eq!(pool.available() + pool.in_use(), pool.capacity());
        }
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.capacity(), 8);
    }

    #[test]
    fn reuse_is_lifo_and_units_come_back_clean() {
        let mut pool: Pool<Unit> = Pool::new(2);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        pool.get_mut(b).unwrap().value = 99;
        pool.free(a);
        pool.free(b);

        let again = pool.alloc().unwrap();
        assert_eq!(again, b);
        assert_eq!(pool.get(again).unwrap().value, 0);
        assert!(pool.get(a).is_none());
    }

    #[test]
    fn limit_reports_exhaustion() {
        let mut pool: Pool<Unit> = Pool::with_limit(2, 3);
        for _ in 0..3 {
            pool.alloc().unwrap();
        }
        assert_eq!(pool.alloc(), Err(PoolError::Exhausted));
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    #[should_panic(expected = "free of unallocated slot")]
    fn double_free_is_fatal() {
        let mut pool: Pool<Unit> = Pool::new(1);
        let a = pool.alloc().unwrap();
        pool.free(a);
        pool.free(a);
    }

    #[test]
    fn slice_arithmetic() {
        assert_eq!(Pool::<Unit>::units_per_slice(1024), 256);
        assert_eq!(Pool::<[u8; 2048]>::units_per_slice(1024), 1);
    }
}
