//! Priority levels for residency buckets
//!
//! Pages are kept in one bucket per priority level. Lower levels are more
//! protected from eviction; the eviction scan starts at [`Priority::PAGE_OUT`]
//! and works its way up towards [`Priority::HIGHEST`].

use std::fmt;

/// Number of priority buckets.
pub const TOTAL_PRIORITIES: usize = 50;

/// A priority level (bucket index).
///
/// Lower values are more protected. Arithmetic on priorities saturates at
/// both ends of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Most protected level; pages here are evicted last
    pub const HIGHEST: Priority = Priority(0);
    pub const HIGH: Priority = Priority(10);
    /// Level given to freshly created or freshly paged-in pages
    pub const NEW: Priority = Priority(20);
    pub const NORMAL: Priority = Priority(25);
    pub const INTERMEDIATE: Priority = Priority(30);
    pub const LOW: Priority = Priority(40);
    /// Least protected level; evicted pages are parked here
    pub const PAGE_OUT: Priority = Priority((TOTAL_PRIORITIES - 1) as u8);

    /// Create a priority from a bucket index, clamping to the valid range.
    pub fn new(level: usize) -> Self {
        Priority(level.min(TOTAL_PRIORITIES - 1) as u8)
    }

    /// Bucket index of this priority
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Apply a signed delta, saturating at `HIGHEST` and `PAGE_OUT`.
    ///
    /// Negative deltas move towards `HIGHEST` (promotion), positive deltas
    /// towards `PAGE_OUT` (demotion).
    pub fn offset(self, delta: i32) -> Self {
        let level = (self.0 as i32 + delta).clamp(0, (TOTAL_PRIORITIES - 1) as i32);
        Priority(level as u8)
    }

    /// One bucket more protected
    pub fn promoted(self) -> Self {
        self.offset(-1)
    }

    /// One bucket less protected
    pub fn demoted(self) -> Self {
        self.offset(1)
    }

    /// Iterate all priorities from least protected to most protected.
    pub fn eviction_order() -> impl Iterator<Item = Priority> {
        (0..TOTAL_PRIORITIES).rev().map(Priority::new)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NEW
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::HIGHEST => write!(f, "highest"),
            Priority::HIGH => write!(f, "high"),
            Priority::NEW => write!(f, "new"),
            Priority::NORMAL => write!(f, "normal"),
            Priority::INTERMEDIATE => write!(f, "intermediate"),
            Priority::LOW => write!(f, "low"),
            Priority::PAGE_OUT => write!(f, "page-out"),
            Priority(level) => write!(f, "level-{level}"),
        }
    }
}
