//! Ring tokens.
//!
//! A token is a position on the ring. The ring space is the full `u64` range
//! and wraps around from `u64::MAX` back to zero.

use std::fmt;

/// A position on the consistent hash ring.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Token(pub u64);

impl Token {
    /// Minimum token value (start of ring).
    pub const fn zero() -> Self {
        Token(0)
    }

    /// Maximum token value (end of ring).
    pub const fn max() -> Self {
        Token(u64::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_max(&self) -> bool {
        self.0 == u64::MAX
    }

    /// Clockwise distance from `self` to `other` on the ring.
    pub fn distance_to(&self, other: &Self) -> Self {
        Token(other.0.wrapping_sub(self.0))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
