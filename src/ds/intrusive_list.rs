//! Recency queue whose nodes live in a [`SlotArena`].
//!
//! Policies keep the [`SlotId`] returned by [`push_front`](IntrusiveList::push_front)
//! next to each key, which makes promotion and removal O(1) without a scan:
//!
//! ```text
//!   front ─► [newest] ◄──► [ ... ] ◄──► [oldest] ◄── back
//! ```

use crate::ds::slot_arena::{SlotArena, SlotId};

const TOWARD_FRONT: usize = 0;
const TOWARD_BACK: usize = 1;

#[derive(Debug)]
struct Node<T> {
    value: T,
    // [neighbour toward the front, neighbour toward the back]
    links: [Option<SlotId>; 2],
}

/// Arena-backed doubly linked queue.
#[derive(Debug)]
pub struct IntrusiveList<T> {
    nodes: SlotArena<Node<T>>,
    // [front, back]
    ends: [Option<SlotId>; 2],
}

impl<T> IntrusiveList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: SlotArena::with_capacity(capacity),
            ends: [None, None],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.nodes.get(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|node| &mut node.value)
    }

    /// Oldest value.
    pub fn back(&self) -> Option<&T> {
        self.ends[TOWARD_BACK].and_then(|id| self.get(id))
    }

    pub fn push_front(&mut self, value: T) -> SlotId {
        let id = self.nodes.insert(Node {
            value,
            links: [None, None],
        });
        self.link_front(id);
        id
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let id = self.ends[TOWARD_BACK]?;
        self.remove(id)
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.unlink(id)?;
        self.nodes.remove(id).map(|node| node.value)
    }

    /// Makes `id` the newest entry. Returns `false` for a stale id.
    pub fn move_to_front(&mut self, id: SlotId) -> bool {
        if self.unlink(id).is_none() {
            return false;
        }
        self.link_front(id);
        true
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ends = [None, None];
    }

    /// Values from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        std::iter::successors(self.ends[TOWARD_FRONT], |&id| {
            self.nodes.get(id).and_then(|node| node.links[TOWARD_BACK])
        })
        .filter_map(|id| self.get(id))
    }

    fn unlink(&mut self, id: SlotId) -> Option<()> {
        let links = std::mem::take(&mut self.nodes.get_mut(id)?.links);
        // Each neighbour (or the list end on that side) now points past `id`.
        for side in [TOWARD_FRONT, TOWARD_BACK] {
            let other = 1 - side;
            match links[side] {
                Some(neighbour) => {
                    if let Some(node) = self.nodes.get_mut(neighbour) {
                        node.links[other] = links[other];
                    }
                }
                None => self.ends[side] = links[other],
            }
        }
        Some(())
    }

    fn link_front(&mut self, id: SlotId) {
        let old_front = self.ends[TOWARD_FRONT];
        if let Some(node) = self.nodes.get_mut(id) {
            node.links = [None, old_front];
        }
        match old_front.and_then(|front| self.nodes.get_mut(front)) {
            Some(front) => front.links[TOWARD_FRONT] = Some(id),
            None => self.ends[TOWARD_BACK] = Some(id),
        }
        self.ends[TOWARD_FRONT] = Some(id);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let [front, back] = self.ends;
        assert_eq!(front.is_none(), back.is_none(), "one end of the list is unset");

        let mut seen = 0usize;
        let mut expected_prev = None;
        let mut cursor = front;
        while let Some(id) = cursor {
            let node = self.nodes.get(id).expect("linked node missing from arena");
            assert_eq!(node.links[TOWARD_FRONT], expected_prev);
            seen += 1;
            assert!(seen <= self.len(), "cycle in list");
            expected_prev = Some(id);
            cursor = node.links[TOWARD_BACK];
        }
        assert_eq!(expected_prev, back);
        assert_eq!(seen, self.len());
    }
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(list: &IntrusiveList<u64>) -> Vec<u64> {
        list.iter().copied().collect()
    }

    #[test]
    fn pages_queue_newest_first() {
        let mut list = IntrusiveList::new();
        for page in [0x1000, 0x2000, 0x3000] {
            list.push_front(page);
        }
        assert_eq!(contents(&list), vec![0x3000, 0x2000, 0x1000]);
        assert_eq!(list.back(), Some(&0x1000));
        assert_eq!(list.pop_back(), Some(0x1000));
        assert_eq!(list.len(), 2);
        list.debug_validate_invariants();
    }

    #[test]
    fn promotion_moves_entry_to_front() {
        let mut list = IntrusiveList::new();
        let oldest = list.push_front(1);
        list.push_front(2);
        let newest = list.push_front(3);

        assert!(list.move_to_front(oldest));
        assert_eq!(contents(&list), vec![1, 3, 2]);
        assert!(list.move_to_front(oldest));
        assert_eq!(contents(&list), vec![1, 3, 2]);

        assert_eq!(list.remove(newest), Some(3));
        assert_eq!(contents(&list), vec![1, 2]);
        list.debug_validate_invariants();
    }

    #[test]
    fn removing_every_position_keeps_ends_consistent() {
        let mut list = IntrusiveList::new();
        let ids: Vec<_> = (0..4u64).map(|v| list.push_front(v)).collect();

        assert_eq!(list.remove(ids[3]), Some(3));
        list.debug_validate_invariants();
        assert_eq!(list.remove(ids[0]), Some(0));
        list.debug_validate_invariants();
        assert_eq!(list.remove(ids[1]), Some(1));
        assert_eq!(contents(&list), vec![2]);
        assert_eq!(list.back(), Some(&2));
        assert_eq!(list.remove(ids[2]), Some(2));
        assert!(list.is_empty());
        assert_eq!(list.back(), None);
        list.debug_validate_invariants();
    }

    #[test]
    fn stale_ids_are_rejected() {
        let mut list = IntrusiveList::new();
        let stale = list.push_front(7u64);
        list.remove(stale);
        let fresh = list.push_front(8);

        assert!(!list.move_to_front(stale));
        assert_eq!(list.remove(stale), None);
        assert_eq!(list.get(fresh), Some(&8));

        list.clear();
        assert_eq!(list.pop_back(), None);
        list.debug_validate_invariants();
    }
}
