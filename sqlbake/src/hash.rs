//! Query Hashing
//!
//! The 32-bit hash used to bucket queries in the dispatch table.
//!
//! The generated runtime code recomputes this hash over the query it is
//! handed, so the algorithm here and the one written out by
//! [`crate::dialect::Dialect`] must agree bit for bit.

use std::fmt;

/// Multiplier equivalent to `1 + (1<<1) + (1<<4) + (1<<7) + (1<<8) + (1<<24)`.
pub const HASH_MULTIPLIER: u32 = 0x0100_0193;

/// A query hash.
///
/// Not unique: distinct queries may share a hash and end up in the same
/// bucket, where they are told apart by exact comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueryHash(u32);

impl QueryHash {
    /// Computes the hash of the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = QueryHasher::new();
        hasher.update(bytes);
        hasher.finalize()
    }

    /// Computes the hash of a string.
    pub fn of_str(s: &str) -> Self {
        Self::of(s.as_bytes())
    }

    /// Returns the raw value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryHash({:08x})", self.0)
    }
}

/// Incremental form of [`QueryHash::of`].
///
/// Feeding the same bytes in several `update` calls gives the same result
/// as hashing them in one go.
#[derive(Debug, Clone, Default)]
pub struct QueryHasher {
    state: u32,
}

impl QueryHasher {
    /// Creates a hasher with the zero initial state.
    pub fn new() -> Self {
        Self { state: 0 }
    }

    /// Mixes one byte into the state.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        let mut h = self.state ^ u32::from(byte);
        h = h
            .wrapping_add(h << 1)
            .wrapping_add(h << 4)
            .wrapping_add(h << 7)
            .wrapping_add(h << 8)
            .wrapping_add(h << 24);
        self.state = h;
    }

    /// Updates the hasher with more data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        for &byte in data {
            self.write_byte(byte);
        }
        self
    }

    /// Updates the hasher with a string.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update(s.as_bytes())
    }

    /// Returns the hash of everything fed so far.
    pub fn finalize(&self) -> QueryHash {
        QueryHash(self.state)
    }
}
