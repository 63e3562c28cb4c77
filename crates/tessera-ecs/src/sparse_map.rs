//! Bit-indexed sparse map for small integer keys.
//!
//! Presence of a key is a single bit in a 32-bit word. Each word also records
//! how many keys are present in all preceding words, so the dense position of
//! a key is `prefix[word] + popcount(bits below key)`. Values are stored
//! densely in ascending key order.
//!
//! ```text
//! words        prefix   values
//! 0x0000_0005  0        [0] [2]
//! 0x0001_8001  2        [32] [47] [48]
//! 0x8000_0000  5        [95]
//! ```

use crate::seq::Seq;

const WORD_BITS: u32 = 32;

/// A sparse map from `u32` keys to `T`, compact when keys are clustered.
#[derive(Debug, Clone)]
pub struct SparseBitMap<T> {
    words: Seq<u32>,
    prefix: Seq<u32>,
    values: Seq<T>,
}

impl<T> SparseBitMap<T> {
    /// Create an empty map.
    pub const fn new() -> Self {
        Self {
            words: Seq::new(),
            prefix: Seq::new(),
            values: Seq::new(),
        }
    }

    /// Number of keys present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: u32) -> bool {
        self.slot(key).is_some()
    }

    pub fn get(&self, key: u32) -> Option<&T> {
        let dense = self.slot(key)?;
        Some(&self.values[dense])
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut T> {
        let dense = self.slot(key)?;
        Some(&mut self.values[dense])
    }

    /// Insert `value` under `key`.
    ///
    /// Returns `false` and leaves the map untouched if `key` is already
    /// present; use [`get_mut`](Self::get_mut) to overwrite.
    pub fn insert(&mut self, key: u32, value: T) -> bool {
        let (word, mask) = split(key);
        while self.words.len() <= word {
            self.words.push(0);
            self.prefix.push(self.values.len() as u32);
        }
        if self.words[word] & mask != 0 {
            return false;
        }

        let dense = self.dense_position(word, mask);
        self.words[word] |= mask;
        for later in self.prefix.iter_mut().skip(word + 1) {
            *later += 1;
        }
        self.values.insert(dense, value);
        true
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&mut self, key: u32) -> Option<T> {
        let dense = self.slot(key)?;
        let (word, mask) = split(key);
        self.words[word] &= !mask;
        for later in self.prefix.iter_mut().skip(word + 1) {
            *later -= 1;
        }
        Some(self.values.remove(dense))
    }

    /// Iterate `(key, &value)` pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        let keys = self.words.iter().enumerate().flat_map(|(word, &bits)| {
            (0..WORD_BITS)
                .filter(move |&bit| bits & (1u32 << bit) != 0)
                .map(move |bit| word as u32 * WORD_BITS + bit)
        });
        keys.zip(self.values.iter())
    }

    /// Remove every key. Word storage is kept.
    pub fn clear(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
        for prefix in self.prefix.iter_mut() {
            *prefix = 0;
        }
        self.values.clear();
    }

    // -- internal helpers ---------------------------------------------------

    fn slot(&self, key: u32) -> Option<usize> {
        let (word, mask) = split(key);
        match self.words.get(word) {
            Some(&bits) if bits & mask != 0 => Some(self.dense_position(word, mask)),
            _ => None,
        }
    }

    #[inline]
    fn dense_position(&self, word: usize, mask: u32) -> usize {
        let below = self.words[word] & (mask - 1);
        self.prefix[word] as usize + below.count_ones() as usize
    }
}

impl<T> Default for SparseBitMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn split(key: u32) -> (usize, u32) {
    ((key / WORD_BITS) as usize, 1 << (key % WORD_BITS))
}
