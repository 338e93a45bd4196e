pub mod ghost_list;
pub mod intrusive_list;
pub mod page_history;
pub mod slot_arena;

pub use ghost_list::GhostList;
pub use intrusive_list::IntrusiveList;
pub use page_history::PageHistory;
pub use slot_arena::{GENERATION_MASK, SlotArena, SlotId};
