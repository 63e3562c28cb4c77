//! Growable, contiguous sequence used as the building block for every table in
//! the ECS (entity index, record table, signatures, archetype list).
//!
//! [`Seq`] is a thin policy layer over `Vec<T>`: capacity doubles starting at
//! [`MIN_CAPACITY`], every index is bounds-checked with a descriptive panic, and
//! `last` on an empty sequence is a programming error rather than `None`.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Smallest non-zero capacity a [`Seq`] allocates.
pub const MIN_CAPACITY: usize = 8;

/// A dynamically resizing, ordered, indexable sequence.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Seq<T> {
    items: Vec<T>,
}

impl<T> Seq<T> {
    /// Create an empty sequence. Does not allocate.
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create an empty sequence able to hold `capacity` items without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Number of stored items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items that fit before the next reallocation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Bounds-checked read that returns `None` instead of panicking.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Append `value` at the end, doubling capacity when full.
    pub fn push(&mut self, value: T) {
        self.grow_for_one();
        self.items.push(value);
    }

    /// Insert `value` at `index`, shifting everything after it one slot right.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        assert!(
            index <= self.len(),
            "insert index {index} out of range for sequence of length {}",
            self.len()
        );
        self.grow_for_one();
        self.items.insert(index, value);
    }

    /// Remove and return the item at `index`, shifting the tail one slot left.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        self.check_index(index);
        self.items.remove(index)
    }

    /// Swap the items at `a` and `b`.
    pub fn swap(&mut self, a: usize, b: usize) {
        self.check_index(a);
        self.check_index(b);
        self.items.swap(a, b);
    }

    /// Drop every item. Capacity is kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The final item.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is empty.
    pub fn last(&self) -> &T {
        self.items
            .last()
            .unwrap_or_else(|| panic!("last() called on an empty sequence"))
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    // -- internal helpers ---------------------------------------------------

    fn grow_for_one(&mut self) {
        let len = self.items.len();
        let cap = self.items.capacity();
        if len < cap {
            return;
        }
        let new_cap = (cap * 2).max(MIN_CAPACITY);
        // `reserve_exact` relocates the existing items into the new buffer.
        self.items.reserve_exact(new_cap - len);
    }

    #[inline]
    fn check_index(&self, index: usize) {
        assert!(
            index < self.len(),
            "index {index} out of range for sequence of length {}",
            self.len()
        );
    }
}

impl<T> Default for Seq<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Seq<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T> Index<usize> for Seq<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        self.check_index(index);
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for Seq<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.check_index(index);
        &mut self.items[index]
    }
}

impl<T> FromIterator<T> for Seq<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut seq = Self::new();
        for item in iter {
            seq.push(item);
        }
        seq
    }
}

impl<'a, T> IntoIterator for &'a Seq<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
