//! Resource kinds and their page-in / page-out callbacks
//!
//! Every page belongs to a resource kind (texture, vertex buffer, index
//! buffer, ...). The manager keeps one callback pair per kind and invokes it
//! with the caller's context value whenever a page of that kind has to be
//! materialized on, or released from, the device.

use std::fmt;

use crate::error::ResidencyError;
use crate::page::Page;

/// Hard ceiling on the number of resource kinds a manager can hold.
pub const MAXIMUM_RESOURCE_KINDS: usize = 8;

/// Identifies which callback pair applies to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceKind(pub u8);

impl ResourceKind {
    pub const TEXTURE: ResourceKind = ResourceKind(0);
    pub const VERTEX_BUFFER: ResourceKind = ResourceKind(1);
    pub const INDEX_BUFFER: ResourceKind = ResourceKind(2);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-in or page-out callback.
///
/// Receives the explicit context value handed to the manager operation that
/// triggered it, and the page being paged. Returns `false` on failure.
pub type PageFn<C> = fn(&mut C, &mut Page) -> bool;

/// Callback pair registered for one kind.
pub struct KindCallbacks<C> {
    pub page_in: PageFn<C>,
    pub page_out: PageFn<C>,
    /// Payloads of this kind survive a device reset
    pub survives_reset: bool,
}

impl<C> Clone for KindCallbacks<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for KindCallbacks<C> {}

fn default_page_in<C>(_ctx: &mut C, _page: &mut Page) -> bool {
    true
}

fn default_page_out<C>(_ctx: &mut C, _page: &mut Page) -> bool {
    true
}

impl<C> Default for KindCallbacks<C> {
    /// Bookkeeping-only callbacks used for kinds nobody registered.
    fn default() -> Self {
        Self {
            page_in: default_page_in::<C>,
            page_out: default_page_out::<C>,
            survives_reset: false,
        }
    }
}

/// Callback table indexed by [`ResourceKind`].
pub struct KindTable<C> {
    entries: Vec<Option<KindCallbacks<C>>>,
}

impl<C> KindTable<C> {
    pub fn new(maximum_kinds: usize) -> Self {
        let maximum_kinds = maximum_kinds.min(MAXIMUM_RESOURCE_KINDS);
        Self {
            entries: (0..maximum_kinds).map(|_| None).collect(),
        }
    }

    /// Number of kind slots
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn register(
        &mut self,
        kind: ResourceKind,
        page_in: PageFn<C>,
        page_out: PageFn<C>,
    ) -> Result<(), ResidencyError> {
        let maximum = self.entries.len();
        let slot = self
            .entries
            .get_mut(kind.index())
            .ok_or(ResidencyError::KindOutOfRange { kind, maximum })?;

        if slot.is_some() {
            return Err(ResidencyError::KindAlreadyRegistered(kind));
        }

        *slot = Some(KindCallbacks {
            page_in,
            page_out,
            survives_reset: false,
        });
        Ok(())
    }

    pub fn is_registered(&self, kind: ResourceKind) -> bool {
        matches!(self.entries.get(kind.index()), Some(Some(_)))
    }

    /// Mark a registered kind as surviving device resets.
    ///
    /// Returns `false` if the kind is not registered.
    pub fn set_survives_reset(&mut self, kind: ResourceKind, survives: bool) -> bool {
        match self.entries.get_mut(kind.index()) {
            Some(Some(entry)) => {
                entry.survives_reset = survives;
                true
            }
            _ => false,
        }
    }

    /// Callbacks for `kind`, falling back to the bookkeeping-only defaults.
    pub fn callbacks(&self, kind: ResourceKind) -> KindCallbacks<C> {
        self.entries
            .get(kind.index())
            .copied()
            .flatten()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refuse(_ctx: &mut u32, _page: &mut Page) -> bool {
        false
    }

    fn count(ctx: &mut u32, _page: &mut Page) -> bool {
        *ctx += 1;
        true
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = KindTable::<u32>::new(4);
        assert!(table.register(ResourceKind::TEXTURE, count, refuse).is_ok());
        assert!(table.is_registered(ResourceKind::TEXTURE));
        assert!(!table.is_registered(ResourceKind::INDEX_BUFFER));

        let mut ctx = 0;
        let mut page = Page::default();
        let callbacks = table.callbacks(ResourceKind::TEXTURE);
        assert!((callbacks.page_in)(&mut ctx, &mut page));
        assert!(!(callbacks.page_out)(&mut ctx, &mut page));
        assert_eq!(ctx, 1);
    }

    #[test]
    fn test_register_twice_fails() {
        let mut table = KindTable::<u32>::new(4);
        table.register(ResourceKind(1), count, count).unwrap();
        assert_eq!(
            table.register(ResourceKind(1), refuse, refuse),
            Err(ResidencyError::KindAlreadyRegistered(ResourceKind(1)))
        );

        // The first registration is untouched
        let mut ctx = 0;
        let mut page = Page::default();
        assert!((table.callbacks(ResourceKind(1)).page_out)(&mut ctx, &mut page));
    }

    #[test]
    fn test_register_out_of_range() {
        let mut table = KindTable::<u32>::new(2);
        assert_eq!(
            table.register(ResourceKind(2), count, count),
            Err(ResidencyError::KindOutOfRange {
                kind: ResourceKind(2),
                maximum: 2
            })
        );
    }

    #[test]
    fn test_capacity_is_capped() {
        let table = KindTable::<u32>::new(64);
        assert_eq!(table.capacity(), MAXIMUM_RESOURCE_KINDS);
    }

    #[test]
    fn test_unregistered_kind_uses_defaults() {
        let table = KindTable::<u32>::new(4);
        let mut ctx = 7;
        let mut page = Page::default();
        let callbacks = table.callbacks(ResourceKind(3));
        assert!((callbacks.page_in)(&mut ctx, &mut page));
        assert!((callbacks.page_out)(&mut ctx, &mut page));
        assert!(!callbacks.survives_reset);
        assert_eq!(ctx, 7);
    }

    #[test]
    fn test_survives_reset_flag() {
        let mut table = KindTable::<u32>::new(4);
        assert!(!table.set_survives_reset(ResourceKind(0), true));
        table.register(ResourceKind(0), count, count).unwrap();
        assert!(table.set_survives_reset(ResourceKind(0), true));
        assert!(table.callbacks(ResourceKind(0)).survives_reset);
    }
}
