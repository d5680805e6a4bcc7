//! # Occupancy Bitmap
//!
//! One bit per slot, 32 slots per word. Scans work a word at a time with
//! `trailing_zeros` / `trailing_ones`, and never report bits past `bits` even
//! when the slot count is not a multiple of 32.

/// Bits per occupancy word.
pub const WORD_BITS: usize = 32;

/// Number of words needed to hold `bits` bits.
#[inline]
#[must_use]
pub const fn words_for(bits: usize) -> usize {
    (bits + WORD_BITS - 1) / WORD_BITS
}

/// Mask with every bit below `offset` set.
#[inline]
const fn low_mask(offset: usize) -> u32 {
    if offset == 0 {
        0
    } else {
        u32::MAX >> (WORD_BITS - offset)
    }
}

/// Fixed-length occupancy bitmap.
#[derive(Debug, Default)]
pub struct OccupancyBitmap {
    /// Bitset: 1 = occupied, 0 = free.
    words: Box<[u32]>,
    /// Number of meaningful bits.
    bits: usize,
    /// Cached count of set bits.
    set_count: usize,
}

impl OccupancyBitmap {
    /// Wraps pre-allocated (zeroed) storage.
    ///
    /// # Panics
    ///
    /// Panics if `words` is too short for `bits`.
    #[must_use]
    pub fn from_words(words: Box<[u32]>, bits: usize) -> Self {
        assert!(words.len() >= words_for(bits), "bitmap storage too small");
        Self {
            words,
            bits,
            set_count: 0,
        }
    }

    /// Number of meaningful bits.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bits
    }

    /// True if the bitmap tracks no bits.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of set bits.
    #[inline]
    #[must_use]
    pub const fn count_ones(&self) -> usize {
        self.set_count
    }

    /// True if every bit is set.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.set_count == self.bits
    }

    /// Checks one bit. Out-of-range bits read as unset.
    #[inline]
    #[must_use]
    pub fn test(&self, bit: usize) -> bool {
        if bit >= self.bits {
            return false;
        }
        (self.words[bit / WORD_BITS] >> (bit % WORD_BITS)) & 1 == 1
    }

    /// Sets a bit, returning whether it was previously unset.
    #[inline]
    pub fn set(&mut self, bit: usize) -> bool {
        debug_assert!(bit < self.bits, "bit out of range");
        let mask = 1u32 << (bit % WORD_BITS);
        let word = &mut self.words[bit / WORD_BITS];
        let was_clear = *word & mask == 0;
        *word |= mask;
        if was_clear {
            self.set_count += 1;
        }
        was_clear
    }

    /// Clears a bit, returning whether it was previously set.
    #[inline]
    pub fn clear(&mut self, bit: usize) -> bool {
        debug_assert!(bit < self.bits, "bit out of range");
        let mask = 1u32 << (bit % WORD_BITS);
        let word = &mut self.words[bit / WORD_BITS];
        let was_set = *word & mask != 0;
        *word &= !mask;
        if was_set {
            self.set_count -= 1;
        }
        was_set
    }

    /// Clears every bit.
    pub fn clear_all(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
        self.set_count = 0;
    }

    /// Finds the first unset bit at or after `start`.
    #[must_use]
    pub fn first_unset_from(&self, start: usize) -> Option<usize> {
        if start >= self.bits {
            return None;
        }
        let mut word_idx = start / WORD_BITS;
        // Bits below the starting offset count as taken.
        let mut word = self.words[word_idx] | low_mask(start % WORD_BITS);
        loop {
            if word != u32::MAX {
                let bit = word_idx * WORD_BITS + word.trailing_ones() as usize;
                return (bit < self.bits).then_some(bit);
            }
            word_idx += 1;
            if word_idx >= words_for(self.bits) {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Finds the first set bit at or after `start`.
    #[must_use]
    pub fn next_set_from(&self, start: usize) -> Option<usize> {
        if start >= self.bits {
            return None;
        }
        let mut word_idx = start / WORD_BITS;
        let mut word = self.words[word_idx] & !low_mask(start % WORD_BITS);
        loop {
            if word != 0 {
                let bit = word_idx * WORD_BITS + word.trailing_zeros() as usize;
                return (bit < self.bits).then_some(bit);
            }
            word_idx += 1;
            if word_idx >= words_for(self.bits) {
                return None;
            }
            word = self.words[word_idx];
        }
    }
}
