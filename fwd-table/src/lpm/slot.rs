//! Packed trie slot.
//!
//! A slot is one `u64` so that a reader always observes a whole value:
//!
//! ```text
//!  63    62    61..40   39..32   31..0
//! +-----+-----+--------+--------+----------------+
//! |ROUTE| EXT | unused | depth  | next hop/block |
//! +-----+-----+--------+--------+----------------+
//! ```
//!
//! All-zero is the empty slot; the table's default route (if any) applies.

pub(super) const BLOCK_BITS: u32 = 8;
pub(super) const BLOCK_SLOTS: usize = 1 << BLOCK_BITS;

const ROUTE: u64 = 1 << 63;
const EXT: u64 = 1 << 62;
const DEPTH_SHIFT: u32 = 32;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) struct Slot(u64);

impl Slot {
    pub const EMPTY: Slot = Slot(0);

    #[inline(always)]
    pub fn route(depth: u8, next_hop: u32) -> Self {
        Slot(ROUTE | ((depth as u64) << DEPTH_SHIFT) | next_hop as u64)
    }

    #[inline(always)]
    pub fn ext(block: u32) -> Self {
        Slot(EXT | block as u64)
    }

    #[inline(always)]
    pub fn from_raw(raw: u64) -> Self {
        Slot(raw)
    }

    #[inline(always)]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn is_route(self) -> bool {
        self.0 & ROUTE != 0
    }

    #[inline(always)]
    pub fn is_ext(self) -> bool {
        self.0 & EXT != 0
    }

    /// Depth of the rule that installed a route slot, 0 for empty.
    #[inline(always)]
    pub fn depth(self) -> u8 {
        (self.0 >> DEPTH_SHIFT) as u8
    }

    #[inline(always)]
    pub fn next_hop(self) -> u32 {
        self.0 as u32
    }

    #[inline(always)]
    pub fn block(self) -> u32 {
        self.0 as u32
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_ext() {
            write!(f, "Ext({})", self.block())
        } else if self.is_route() {
            write!(f, "Route(/{} -> {})", self.depth(), self.next_hop())
        } else {
            f.write_str("Empty")
        }
    }
}
