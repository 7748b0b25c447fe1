//! Priority buckets
//!
//! One doubly-linked list per priority level. Links are slot indices stored
//! in the pages themselves, so moving a page between buckets never
//! allocates.

use crate::page::{Links, Page, PageFlags};
use crate::priority::{Priority, TOTAL_PRIORITIES};

#[derive(Debug, Clone, Copy, Default)]
struct BucketList {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

/// The eviction-ordered set of bucket lists.
#[derive(Debug, Clone)]
pub(crate) struct Buckets {
    lists: [BucketList; TOTAL_PRIORITIES],
}

impl Buckets {
    pub(crate) fn new() -> Self {
        Self {
            lists: [BucketList::default(); TOTAL_PRIORITIES],
        }
    }

    /// Append `slot` to the tail of the `priority` bucket.
    ///
    /// The page must not currently be in any bucket.
    pub(crate) fn push_back(&mut self, pages: &mut [Page], slot: usize, priority: Priority) {
        let list = &mut self.lists[priority.index()];
        let index = slot as u32;

        pages[slot].links = Links {
            prev: list.tail,
            next: None,
        };
        match list.tail {
            Some(tail) => pages[tail as usize].links.next = Some(index),
            None => list.head = Some(index),
        }
        list.tail = Some(index);
        list.len += 1;

        let page = &mut pages[slot];
        page.priority = priority;
        page.set_flag(PageFlags::IN_LRU, true);
    }

    /// Detach `slot` from its bucket. No-op if the page is not in a bucket.
    pub(crate) fn unlink(&mut self, pages: &mut [Page], slot: usize) {
        if !pages[slot].in_lru() {
            return;
        }

        let Links { prev, next } = pages[slot].links;
        let list = &mut self.lists[pages[slot].priority.index()];

        match prev {
            Some(prev) => pages[prev as usize].links.next = next,
            None => list.head = next,
        }
        match next {
            Some(next) => pages[next as usize].links.prev = prev,
            None => list.tail = prev,
        }
        list.len -= 1;

        let page = &mut pages[slot];
        page.links = Links::default();
        page.set_flag(PageFlags::IN_LRU, false);
    }

    /// Move a tracked page to the tail of another bucket.
    pub(crate) fn move_to(&mut self, pages: &mut [Page], slot: usize, priority: Priority) {
        self.unlink(pages, slot);
        self.push_back(pages, slot, priority);
    }

    pub(crate) fn len(&self, priority: Priority) -> usize {
        self.lists[priority.index()].len
    }

    #[cfg(test)]
    pub(crate) fn total_len(&self) -> usize {
        self.lists.iter().map(|list| list.len).sum()
    }

    /// Slots of one bucket, head to tail.
    pub(crate) fn slots(&self, pages: &[Page], priority: Priority) -> Vec<usize> {
        let list = &self.lists[priority.index()];
        let mut slots = Vec::with_capacity(list.len);
        let mut cursor = list.head;
        while let Some(index) = cursor {
            slots.push(index as usize);
            cursor = pages[index as usize].links.next;
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(count: usize) -> Vec<Page> {
        (0..count).map(|_| Page::default()).collect()
    }

    #[test]
    fn test_push_back_keeps_insertion_order() {
        let mut pages = pages(3);
        let mut buckets = Buckets::new();

        buckets.push_back(&mut pages, 2, Priority::LOW);
        buckets.push_back(&mut pages, 0, Priority::LOW);
        buckets.push_back(&mut pages, 1, Priority::LOW);

        assert_eq!(buckets.slots(&pages, Priority::LOW), vec![2, 0, 1]);
        assert_eq!(buckets.len(Priority::LOW), 3);
        assert!(pages.iter().all(|page| page.in_lru()));
        assert!(pages.iter().all(|page| page.priority() == Priority::LOW));
    }

    #[test]
    fn test_unlink_head_middle_tail() {
        let mut pages = pages(4);
        let mut buckets = Buckets::new();
        for slot in 0..4 {
            buckets.push_back(&mut pages, slot, Priority::NEW);
        }

        buckets.unlink(&mut pages, 1);
        assert_eq!(buckets.slots(&pages, Priority::NEW), vec![0, 2, 3]);

        buckets.unlink(&mut pages, 0);
        assert_eq!(buckets.slots(&pages, Priority::NEW), vec![2, 3]);

        buckets.unlink(&mut pages, 3);
        assert_eq!(buckets.slots(&pages, Priority::NEW), vec![2]);

        buckets.unlink(&mut pages, 2);
        assert!(buckets.slots(&pages, Priority::NEW).is_empty());
        assert_eq!(buckets.total_len(), 0);
        assert!(!pages[2].in_lru());
    }

    #[test]
    fn test_unlink_untracked_is_noop() {
        let mut pages = pages(2);
        let mut buckets = Buckets::new();
        buckets.push_back(&mut pages, 0, Priority::HIGH);

        buckets.unlink(&mut pages, 1);
        buckets.unlink(&mut pages, 1);

        assert_eq!(buckets.len(Priority::HIGH), 1);
    }

    #[test]
    fn test_move_to_other_bucket() {
        let mut pages = pages(2);
        let mut buckets = Buckets::new();
        buckets.push_back(&mut pages, 0, Priority::NEW);
        buckets.push_back(&mut pages, 1, Priority::NEW);

        buckets.move_to(&mut pages, 0, Priority::PAGE_OUT);

        assert_eq!(buckets.slots(&pages, Priority::NEW), vec![1]);
        assert_eq!(buckets.slots(&pages, Priority::PAGE_OUT), vec![0]);
        assert_eq!(pages[0].priority(), Priority::PAGE_OUT);
        assert_eq!(buckets.total_len(), 2);
    }
}
