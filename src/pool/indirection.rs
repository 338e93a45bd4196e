//! Stable handles over relocatable frames.
//!
//! A [`VirtualPointer`] names a slot in the [`IndirectionTable`]; the slot
//! records where the data currently lives. Relocation and eviction only
//! rewrite the slot, so a handle stays valid for as long as its slot is
//! registered.
//!
//! ```text
//!   63      62     61 ........ 32   31 ........ 0
//!  ┌─────┬──────┬───────────────┬───────────────┐
//!  │valid│ lock │  generation   │  slot index   │
//!  └─────┴──────┴───────────────┴───────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::ds::{GENERATION_MASK, SlotArena, SlotId};

const INDEX_MASK: u64 = 0xFFFF_FFFF;
const GENERATION_SHIFT: u32 = 32;
const LOCK_BIT: u64 = 1 << 62;
const VALID_BIT: u64 = 1 << 63;

/// Opaque, copyable handle to cached data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VirtualPointer(u64);

impl VirtualPointer {
    /// A handle that never resolves.
    pub const NULL: VirtualPointer = VirtualPointer(0);

    pub(crate) fn new(slot: SlotId, lock_hint: bool) -> Self {
        let mut raw = VALID_BIT
            | (u64::from(slot.generation() & GENERATION_MASK) << GENERATION_SHIFT)
            | (slot.index() as u64 & INDEX_MASK);
        if lock_hint {
            raw |= LOCK_BIT;
        }
        Self(raw)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 & VALID_BIT != 0
    }

    /// Whether the page was lockable when the handle was issued.
    pub fn is_lock_hinted(self) -> bool {
        self.0 & LOCK_BIT != 0
    }

    pub fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    pub fn generation(self) -> u32 {
        ((self.0 >> GENERATION_SHIFT) as u32) & GENERATION_MASK
    }

    fn slot(self) -> Option<SlotId> {
        self.is_valid()
            .then(|| SlotId::from_parts(self.index(), self.generation()))
    }
}

impl fmt::Debug for VirtualPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("VirtualPointer(null)");
        }
        f.debug_struct("VirtualPointer")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .field("lock", &self.is_lock_hinted())
            .finish()
    }
}

/// Where the data behind a handle currently lives.
#[derive(Debug, Clone)]
pub enum Location {
    /// Resident in the pool frame with this index.
    Frame(usize),
    /// Caller-supplied memory, shared rather than copied.
    External(Arc<[u8]>),
    /// Known but not resident; the facade reloads it on demand.
    Detached,
}

/// Slot table mapping [`VirtualPointer`]s to [`Location`]s.
#[derive(Debug, Default)]
pub struct IndirectionTable {
    slots: SlotArena<(Location, bool)>,
}

impl IndirectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, location: Location, lock_hint: bool) -> VirtualPointer {
        let slot = self.slots.insert((location, lock_hint));
        VirtualPointer::new(slot, lock_hint)
    }

    pub fn resolve(&self, vptr: VirtualPointer) -> Option<&Location> {
        self.slots.get(vptr.slot()?).map(|(location, _)| location)
    }

    /// Points the slot at a new location, returning the old one.
    pub fn redirect(&mut self, vptr: VirtualPointer, location: Location) -> Option<Location> {
        let (current, _) = self.slots.get_mut(vptr.slot()?)?;
        Some(std::mem::replace(current, location))
    }

    /// Unregisters the slot; the handle and any copies stop resolving.
    pub fn release(&mut self, vptr: VirtualPointer) -> Option<Location> {
        self.slots.remove(vptr.slot()?).map(|(location, _)| location)
    }

    pub fn contains(&self, vptr: VirtualPointer) -> bool {
        vptr.slot().is_some_and(|slot| self.slots.contains(slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VirtualPointer, &Location)> {
        self.slots
            .iter()
            .map(|(slot, (location, lock_hint))| (VirtualPointer::new(slot, *lock_hint), location))
    }
}
