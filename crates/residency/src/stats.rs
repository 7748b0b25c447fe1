//! Residency statistics
//!
//! Counters reported by the manager, per-kind breakdowns and the memory
//! pressure classification shared with the frame driver.

use std::fmt;

use crate::kind::ResourceKind;

/// Exponential moving average step.
///
/// Moves `average` towards `value` by `weight` (0.0 keeps the old average,
/// 1.0 replaces it).
pub fn ema(value: f32, weight: f32, average: f32) -> f32 {
    (value - average) * weight + average
}

/// Free budget measured against the free-memory cushion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    /// More than twice the cushion is free
    Relaxed,
    /// Between one and two cushions free
    Tight,
    /// Less than the cushion free
    BelowCushion,
    /// Nothing free while a cushion is wanted
    Exhausted,
}

impl MemoryPressure {
    pub fn classify(available: u64, cushion: u64) -> Self {
        if available < cushion {
            if available == 0 {
                MemoryPressure::Exhausted
            } else {
                MemoryPressure::BelowCushion
            }
        } else if available <= cushion.saturating_mul(2) {
            MemoryPressure::Tight
        } else {
            MemoryPressure::Relaxed
        }
    }

    /// Whether a cushion pass has anything to reclaim
    pub fn wants_eviction(self) -> bool {
        self >= MemoryPressure::BelowCushion
    }
}

impl fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryPressure::Relaxed => "relaxed",
            MemoryPressure::Tight => "tight",
            MemoryPressure::BelowCushion => "below-cushion",
            MemoryPressure::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Snapshot of manager counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResidencyStats {
    /// Live pages (tracked or not)
    pub total_pages: usize,

    /// Pages whose bytes are charged against the budget
    pub resident_pages: usize,

    /// Bytes charged by resident pages
    pub memory_used: u64,

    /// Bytes still free in the budget
    pub available_memory: u64,

    /// Video memory budget
    pub maximum_memory: u64,

    /// Target free-memory cushion
    pub minimum_memory: u64,

    pub lifetime_page_ins: u64,
    pub lifetime_page_outs: u64,
    pub last_frame_page_ins: u64,
    pub last_frame_page_outs: u64,
    pub frame_page_ins: u64,
    pub frame_page_outs: u64,

    /// Page-out callbacks that reported failure
    pub page_out_failures: u64,

    /// Page-in callbacks that reported failure
    pub page_in_failures: u64,

    /// Priority changes applied since the last `begin_frame`
    pub frame_priority_changes: usize,

    /// Priority change requests refused because the frame cap was reached
    pub dropped_priority_changes: u64,

    /// Calls to `access_page` on live pages
    pub total_page_accesses: u64,

    pub current_frame: u64,
}

impl ResidencyStats {
    /// Fraction of the budget in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.maximum_memory == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.maximum_memory as f64
        }
    }

    pub fn pressure(&self) -> MemoryPressure {
        MemoryPressure::classify(self.available_memory, self.minimum_memory)
    }
}

/// Per-kind breakdown of tracked pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStatistics {
    pub kind: ResourceKind,
    pub total_pages: usize,
    pub pages_in: usize,
    pub pages_out: usize,
    pub memory_in: u64,
    pub memory_out: u64,
}
