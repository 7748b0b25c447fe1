//! Residency bookkeeping for a single device resource
//!
//! A [`Page`] records how many bytes a device resource charges against the
//! video memory budget, which priority bucket it lives in, and how often it
//! is used. Pages are owned by the manager's slot arena; callers hold
//! [`PageRef`] handles and go through the manager for every mutation.

use bitflags::bitflags;

use crate::kind::ResourceKind;
use crate::priority::Priority;

/// Opaque, kind-specific identifier of the device object behind a page.
///
/// The manager never interprets it; the resource context that owns the page
/// decides what the value means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadHandle(pub u64);

/// Handle to a page in the manager's arena.
///
/// Carries the page identifier next to the slot index, so a handle kept
/// after `free_page` (or after the slot was handed to a new page) is
/// recognized as stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub(crate) slot: u32,
    pub(crate) identifier: u64,
}

impl PageRef {
    /// Identifier of the page this handle was issued for
    pub fn identifier(self) -> u64 {
        self.identifier
    }

    pub(crate) fn slot(self) -> usize {
        self.slot as usize
    }
}

bitflags! {
    /// Independent state flags of a page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PageFlags: u16 {
        /// Pinned; never chosen by an eviction scan
        const LOCKED = 1 << 0;
        /// Payload is valid and directly reusable without a page-in
        const IN_CACHE = 1 << 1;
        /// Bytes are charged against the budget
        const IN_MEMORY = 1 << 2;
        /// Reserved for disk paging; never set by the current kinds
        const ON_DISK = 1 << 3;
        /// Slot belongs to the arena's preallocated pool
        const PREALLOCATED = 1 << 4;
        /// Slot holds a live page
        const ALLOCATED = 1 << 5;
        /// Member of a priority bucket
        const IN_LRU = 1 << 6;
        /// Payload was dropped by a device reset and awaits a page-in
        const INVALIDATED = 1 << 7;
    }
}

/// Intrusive bucket links, by slot index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
}

/// One cache entry.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub(crate) size: u64,
    pub(crate) priority: Priority,
    pub(crate) kind: ResourceKind,
    pub(crate) payload: Option<PayloadHandle>,
    pub(crate) flags: PageFlags,

    pub(crate) first_frame: u64,
    pub(crate) last_frame: u64,
    pub(crate) current_frame: u64,
    pub(crate) update_frame: u64,

    pub(crate) frame_usage: u32,
    pub(crate) last_frame_usage: u32,
    pub(crate) total_page_faults: u64,
    pub(crate) total_usage: u64,
    pub(crate) update_usage: u64,
    pub(crate) average_utilization: f32,

    pub(crate) identifier: u64,

    // Pending bucket move, applied by the maintenance pass
    pub(crate) priority_change: i32,
    pub(crate) change_queued: bool,
    pub(crate) in_update_ring: bool,
    pub(crate) links: Links,
}

impl Page {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    pub fn payload(&self) -> Option<PayloadHandle> {
        self.payload
    }

    /// Attach the device object created by a page-in.
    pub fn set_payload(&mut self, payload: PayloadHandle) {
        self.payload = Some(payload);
    }

    /// Detach the device object, typically inside a page-out.
    pub fn take_payload(&mut self) -> Option<PayloadHandle> {
        self.payload.take()
    }

    pub fn flags(&self) -> PageFlags {
        self.flags
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(PageFlags::LOCKED)
    }

    pub fn in_cache(&self) -> bool {
        self.flags.contains(PageFlags::IN_CACHE)
    }

    pub fn in_memory(&self) -> bool {
        self.flags.contains(PageFlags::IN_MEMORY)
    }

    pub fn on_disk(&self) -> bool {
        self.flags.contains(PageFlags::ON_DISK)
    }

    pub fn is_preallocated(&self) -> bool {
        self.flags.contains(PageFlags::PREALLOCATED)
    }

    pub fn is_allocated(&self) -> bool {
        self.flags.contains(PageFlags::ALLOCATED)
    }

    pub fn in_lru(&self) -> bool {
        self.flags.contains(PageFlags::IN_LRU)
    }

    pub fn is_invalidated(&self) -> bool {
        self.flags.contains(PageFlags::INVALIDATED)
    }

    /// Frame the page was allocated in
    pub fn first_frame(&self) -> u64 {
        self.first_frame
    }

    /// Frame of the access before the most recent one
    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    /// Frame of the most recent access
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Frame of the last maintenance evaluation (0 if never evaluated)
    pub fn update_frame(&self) -> u64 {
        self.update_frame
    }

    pub fn frame_usage(&self) -> u32 {
        self.frame_usage
    }

    pub fn last_frame_usage(&self) -> u32 {
        self.last_frame_usage
    }

    pub fn total_page_faults(&self) -> u64 {
        self.total_page_faults
    }

    pub fn total_usage(&self) -> u64 {
        self.total_usage
    }

    /// Exponential moving average of accesses per frame
    pub fn average_utilization(&self) -> f32 {
        self.average_utilization
    }

    /// Accumulate a bucket move to be applied by the next maintenance pass.
    ///
    /// Negative deltas promote, positive deltas demote.
    pub(crate) fn change_priority(&mut self, delta: i32) {
        self.priority_change += delta;
    }

    pub(crate) fn set_flag(&mut self, flag: PageFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub(crate) fn handle(&self, slot: usize) -> PageRef {
        PageRef {
            slot: slot as u32,
            identifier: self.identifier,
        }
    }

    /// Clear everything except the slot's pool membership.
    pub(crate) fn reset(&mut self) {
        let preallocated = self.is_preallocated();
        *self = Page::default();
        self.set_flag(PageFlags::PREALLOCATED, preallocated);
    }

    /// Forget per-page usage statistics, as for a brand-new page.
    pub(crate) fn reset_usage(&mut self, frame: u64) {
        self.first_frame = frame;
        self.last_frame = frame;
        self.current_frame = frame;
        self.update_frame = 0;
        self.frame_usage = 0;
        self.last_frame_usage = 0;
        self.total_page_faults = 0;
        self.total_usage = 0;
        self.update_usage = 0;
        self.average_utilization = 1.0;
    }
}
