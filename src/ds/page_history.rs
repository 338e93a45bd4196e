//! Bounded log of page ids, newest kept.
//!
//! Once `capacity` ids are held, each new one displaces the oldest. The same
//! page may appear more than once; every record is an event.

use std::collections::VecDeque;

use crate::store::PageId;

/// Most recent page ids, bounded by a capacity fixed at construction.
///
/// ```
/// use furrballs::ds::PageHistory;
///
/// let mut history = PageHistory::new(2);
/// history.record(0x1000);
/// history.record(0x2000);
/// history.record(0x3000);
/// assert_eq!(history.newest_first(), vec![0x3000, 0x2000]);
/// ```
#[derive(Debug, Clone)]
pub struct PageHistory {
    // Oldest at the front.
    pages: VecDeque<PageId>,
    capacity: usize,
}

impl PageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            pages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn record(&mut self, page: PageId) {
        if self.capacity == 0 {
            return;
        }
        if self.pages.len() == self.capacity {
            self.pages.pop_front();
        }
        self.pages.push_back(page);
    }

    pub fn latest(&self) -> Option<PageId> {
        self.pages.back().copied()
    }

    pub fn newest_first(&self) -> Vec<PageId> {
        self.pages.iter().rev().copied().collect()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
