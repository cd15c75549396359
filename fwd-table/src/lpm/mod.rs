//! # Longest-Prefix-Match Trie
//!
//! ## Purpose
//!
//! Maps IPv4 or IPv6 destination addresses to a next-hop identifier using
//! longest-prefix-match semantics. One generic implementation serves both
//! widths: `Ipv4Lpm` (32 bits) and `Ipv6Lpm` (128 bits).
//!
//! ## How it works
//!
//! The first 24 bits of an address index a flat top-level array directly.
//! A top-level slot either holds a route (next hop plus the depth of the rule
//! that installed it) or refers to a 256-slot extension block covering the next
//! 8 bits, and so on until all address bits are consumed: one extension level
//! for IPv4, up to thirteen for IPv6. A rule of depth `d` is expanded into every
//! slot its prefix covers at the level where `d` falls, skipping slots that
//! already carry a deeper rule.
//!
//! The default route (depth 0) is not expanded. It lives in a dedicated slot
//! that a lookup falls back to when the walk ends on an empty slot.
//!
//! The installed rules are also kept in an ordered map. A delete finds the
//! longest remaining rule covering the deleted prefix and rewrites exactly
//! the slots whose recorded depth equals the deleted depth.
//!
//! ## Concurrency
//!
//! Lookups take `&self`, never lock and never allocate. Every slot is an
//! `AtomicU64`, so a reader sees either the old or the new value of each slot.
//! A new extension block is fully initialised before its reference is
//! published with release ordering. Mutations also take `&self` but are
//! serialised by an internal mutex. Blocks are never released while readers
//! may hold references into them: a delete leaves blocks attached and later
//! adds below the same slot reuse them, and only `compact(&mut self)` returns
//! collapsible blocks to the pool.
//!
//! ## Main components
//!
//! - `Lpm<A>`: the table; `Ipv4Lpm` and `Ipv6Lpm` aliases.
//! - `LpmAddr`: address family glue (`Ipv4Addr`, `Ipv6Addr`).
//! - `LpmConfig`: sizing knobs.
//! - `LpmStats`: counters snapshot.

mod pool;
mod slot;

use crate::error::TableError;
use crate::mmap::SlotRegion;
use parking_lot::Mutex;
use pool::{BlockArena, BlockPool};
use slot::{BLOCK_BITS, Slot};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lookup result meaning "no matching route, drop".
pub const NO_ROUTE: u32 = u32::MAX;

const TOP_BITS: u32 = 24;

/// Address family usable as an LPM key.
pub trait LpmAddr: Copy + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Key width W.
    const BITS: u8;
    /// Family name used in log lines.
    const NAME: &'static str;

    /// Address bits, right aligned.
    fn to_key(self) -> u128;
    fn from_key(key: u128) -> Self;
}

impl LpmAddr for Ipv4Addr {
    const BITS: u8 = 32;
    const NAME: &'static str = "IPv4";

    #[inline(always)]
    fn to_key(self) -> u128 {
        u32::from(self) as u128
    }

    fn from_key(key: u128) -> Self {
        Ipv4Addr::from(key as u32)
    }
}

impl LpmAddr for Ipv6Addr {
    const BITS: u8 = 128;
    const NAME: &'static str = "IPv6";

    #[inline(always)]
    fn to_key(self) -> u128 {
        u128::from(self)
    }

    fn from_key(key: u128) -> Self {
        Ipv6Addr::from(key)
    }
}

/// Table sizing.
#[derive(Debug, Clone)]
pub struct LpmConfig {
    /// Maximum number of distinct (prefix, depth) rules.
    pub max_rules: usize,
    /// Extension-block pool size. Defaults to `max_rules` times the number of
    /// extension levels, which always fits `max_rules` maximally deep rules.
    pub max_blocks: Option<usize>,
    /// Back the slot arrays with 2 MiB huge pages. `None` uses them only when
    /// enough free ones are available.
    pub huge_page: Option<bool>,
}

impl Default for LpmConfig {
    fn default() -> Self {
        LpmConfig {
            max_rules: 1024,
            max_blocks: None,
            huge_page: None,
        }
    }
}

/// Snapshot of the table counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LpmStats {
    pub rules: usize,
    pub max_rules: usize,
    pub blocks_used: usize,
    pub blocks_capacity: usize,
    pub lookups: u64,
    pub hits: u64,
}

impl fmt::Display for LpmStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rules {}/{}, ext blocks {}/{}, lookups {}, hits {}, misses {}",
            self.rules,
            self.max_rules,
            self.blocks_used,
            self.blocks_capacity,
            self.lookups,
            self.hits,
            self.lookups.saturating_sub(self.hits)
        )
    }
}

struct Inner {
    rules: BTreeMap<(u128, u8), u32>,
    pool: BlockPool,
}

/// Longest-prefix-match table over addresses of type `A`.
pub struct Lpm<A: LpmAddr> {
    top: SlotRegion,
    arena: BlockArena,
    default: AtomicU64,
    inner: Mutex<Inner>,
    max_rules: usize,
    lookups: AtomicU64,
    hits: AtomicU64,
    _addr: PhantomData<A>,
}

pub type Ipv4Lpm = Lpm<Ipv4Addr>;
pub type Ipv6Lpm = Lpm<Ipv6Addr>;

impl<A: LpmAddr> Lpm<A> {
    const WIDTH: u32 = A::BITS as u32;
    const TOP: u32 = if Self::WIDTH < TOP_BITS { Self::WIDTH } else { TOP_BITS };
    const EXT_LEVELS: usize = ((Self::WIDTH - Self::TOP) / BLOCK_BITS) as usize;

    /// Creates a table holding up to `max_rules` rules.
    pub fn create(max_rules: usize) -> Result<Self, TableError> {
        Self::with_config(&LpmConfig {
            max_rules,
            ..LpmConfig::default()
        })
    }

    pub fn with_config(config: &LpmConfig) -> Result<Self, TableError> {
        let blocks = config
            .max_blocks
            .unwrap_or_else(|| config.max_rules.saturating_mul(Self::EXT_LEVELS));
        let blocks = u32::try_from(blocks)
            .map_err(|_| TableError::alloc(format!("{blocks} extension blocks exceed the index range")))?;
        let top = SlotRegion::zeroed(1 << Self::TOP, config.huge_page)
            .map_err(TableError::AllocationFailure)?;
        let arena =
            BlockArena::new(blocks, config.huge_page).map_err(TableError::AllocationFailure)?;
        log::debug!(
            "{} LPM created: max_rules {}, {} ext blocks ({} KiB), huge pages {}",
            A::NAME,
            config.max_rules,
            blocks,
            arena.mapped_bytes() / 1024,
            top.is_huge()
        );
        Ok(Lpm {
            top,
            arena,
            default: AtomicU64::new(Slot::EMPTY.raw()),
            inner: Mutex::new(Inner {
                rules: BTreeMap::new(),
                pool: BlockPool::new(blocks),
            }),
            max_rules: config.max_rules,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            _addr: PhantomData,
        })
    }

    /// Installs `prefix/depth -> next_hop`, replacing the next hop of an
    /// identical rule. Bits of `prefix` past `depth` are ignored.
    pub fn add(&self, prefix: A, depth: u8, next_hop: u32) -> Result<(), TableError> {
        Self::check_depth(depth)?;
        if next_hop == NO_ROUTE {
            return Err(TableError::ReservedValue(next_hop));
        }
        let key = Self::mask(prefix.to_key(), depth);
        let mut inner = self.inner.lock();
        let exists = inner.rules.contains_key(&(key, depth));
        if !exists && inner.rules.len() >= self.max_rules {
            log::warn!("{} LPM full: {} rules", A::NAME, self.max_rules);
            return Err(TableError::TableFull);
        }
        if self.blocks_needed(key, depth) > inner.pool.available() {
            log::warn!(
                "{} LPM out of extension blocks adding {}/{}",
                A::NAME,
                A::from_key(key),
                depth
            );
            return Err(TableError::TableFull);
        }

        let value = Slot::route(depth, next_hop);
        if depth == 0 {
            self.default.store(value.raw(), Ordering::Release);
        } else {
            self.install(&mut inner.pool, key, depth, value)?;
        }
        inner.rules.insert((key, depth), next_hop);
        log::debug!("{} LPM add {}/{} -> {}", A::NAME, A::from_key(key), depth, next_hop);
        Ok(())
    }

    /// Removes `prefix/depth`. Addresses it covered fall back to the next
    /// longest covering rule.
    pub fn delete(&self, prefix: A, depth: u8) -> Result<(), TableError> {
        Self::check_depth(depth)?;
        let key = Self::mask(prefix.to_key(), depth);
        let mut inner = self.inner.lock();
        if inner.rules.remove(&(key, depth)).is_none() {
            return Err(TableError::NotFound);
        }
        if depth == 0 {
            self.default.store(Slot::EMPTY.raw(), Ordering::Release);
        } else {
            let fallback = Self::covering(&inner.rules, key, depth);
            self.uninstall(key, depth, fallback);
        }
        log::debug!("{} LPM delete {}/{}", A::NAME, A::from_key(key), depth);
        Ok(())
    }

    /// Next hop of the longest matching rule, or `NO_ROUTE`.
    #[inline]
    pub fn lookup(&self, addr: A) -> u32 {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let key = addr.to_key();
        let mut shift = Self::WIDTH - Self::TOP;
        let top = &self.top.slots()[(key >> shift) as usize];
        let mut slot = Slot::from_raw(top.load(Ordering::Acquire));
        while slot.is_ext() {
            shift -= BLOCK_BITS;
            let index = ((key >> shift) & 0xff) as usize;
            slot = Slot::from_raw(self.arena.slot(slot.block(), index).load(Ordering::Acquire));
        }
        if slot.is_empty() {
            slot = Slot::from_raw(self.default.load(Ordering::Acquire));
        }
        if slot.is_route() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            slot.next_hop()
        } else {
            NO_ROUTE
        }
    }

    /// `lookup` with the miss sentinel mapped to `None`.
    #[inline]
    pub fn route(&self, addr: A) -> Option<u32> {
        match self.lookup(addr) {
            NO_ROUTE => None,
            nh => Some(nh),
        }
    }

    /// Whether the exact rule `prefix/depth` is installed.
    pub fn contains(&self, prefix: A, depth: u8) -> bool {
        depth <= A::BITS
            && self
                .inner
                .lock()
                .rules
                .contains_key(&(Self::mask(prefix.to_key(), depth), depth))
    }

    /// Next hop of the exact rule `prefix/depth`.
    pub fn get(&self, prefix: A, depth: u8) -> Option<u32> {
        if depth > A::BITS {
            return None;
        }
        let key = Self::mask(prefix.to_key(), depth);
        self.inner.lock().rules.get(&(key, depth)).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the installed rules as `(prefix, depth, next_hop)`, ordered
    /// by prefix then depth.
    pub fn rules(&self) -> impl Iterator<Item = (A, u8, u32)> + use<A> {
        let snapshot: Vec<_> = self
            .inner
            .lock()
            .rules
            .iter()
            .map(|(&(key, depth), &nh)| (A::from_key(key), depth, nh))
            .collect();
        snapshot.into_iter()
    }

    /// Collapses extension blocks whose slots all hold the same route (or are
    /// all empty) into their parent slot and returns them to the pool.
    /// Returns the number of blocks released.
    pub fn compact(&mut self) -> usize {
        let pool = &mut self.inner.get_mut().pool;
        let mut released = 0;
        for slot in self.top.slots() {
            let cur = Slot::from_raw(slot.load(Ordering::Relaxed));
            if cur.is_ext() {
                if let Some(value) = Self::collapse(&self.arena, pool, cur.block(), &mut released) {
                    slot.store(value.raw(), Ordering::Relaxed);
                }
            }
        }
        if released > 0 {
            log::debug!("{} LPM compacted: {} blocks released", A::NAME, released);
        }
        released
    }

    pub fn stats(&self) -> LpmStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let inner = self.inner.lock();
        LpmStats {
            rules: inner.rules.len(),
            max_rules: self.max_rules,
            blocks_used: inner.pool.used(),
            blocks_capacity: inner.pool.capacity(),
            lookups: self.lookups.load(Ordering::Relaxed).max(hits),
            hits,
        }
    }

    fn check_depth(depth: u8) -> Result<(), TableError> {
        if depth > A::BITS {
            return Err(TableError::InvalidDepth {
                depth,
                max: A::BITS,
            });
        }
        Ok(())
    }

    #[inline(always)]
    fn mask(key: u128, depth: u8) -> u128 {
        if depth == 0 {
            0
        } else {
            key & !((1u128 << (Self::WIDTH - depth as u32)) - 1)
        }
    }

    /// Index into the level covering bits `[start, start + bits)`.
    #[inline(always)]
    fn index(key: u128, start: u32, bits: u32) -> usize {
        ((key >> (Self::WIDTH - start - bits)) & ((1u128 << bits) - 1)) as usize
    }

    /// Number of new blocks an add of `key/depth` would take from the pool.
    fn blocks_needed(&self, key: u128, depth: u8) -> usize {
        let depth = depth as u32;
        let mut slots = self.top.slots();
        let mut start = 0;
        let mut bits = Self::TOP;
        loop {
            let end = start + bits;
            if depth <= end {
                return 0;
            }
            let cur = Slot::from_raw(slots[Self::index(key, start, bits)].load(Ordering::Acquire));
            if !cur.is_ext() {
                return (depth - end).div_ceil(BLOCK_BITS) as usize;
            }
            slots = self.arena.block(cur.block());
            start = end;
            bits = BLOCK_BITS;
        }
    }

    fn install(
        &self,
        pool: &mut BlockPool,
        key: u128,
        depth: u8,
        value: Slot,
    ) -> Result<(), TableError> {
        let d = depth as u32;
        let mut slots = self.top.slots();
        let mut start = 0;
        let mut bits = Self::TOP;
        loop {
            let end = start + bits;
            let index = Self::index(key, start, bits);
            if d <= end {
                let span = 1usize << (end - d);
                for slot in &slots[index..index + span] {
                    self.fill(slot, depth, value);
                }
                return Ok(());
            }
            let cur = Slot::from_raw(slots[index].load(Ordering::Acquire));
            let block = if cur.is_ext() {
                cur.block()
            } else {
                let block = pool.alloc(&self.arena, cur).ok_or(TableError::TableFull)?;
                slots[index].store(Slot::ext(block).raw(), Ordering::Release);
                block
            };
            slots = self.arena.block(block);
            start = end;
            bits = BLOCK_BITS;
        }
    }

    /// Writes `value` into `slot` (or every slot below it) unless a deeper
    /// rule already owns it.
    fn fill(&self, slot: &AtomicU64, depth: u8, value: Slot) {
        let cur = Slot::from_raw(slot.load(Ordering::Acquire));
        if cur.is_ext() {
            for slot in self.arena.block(cur.block()) {
                self.fill(slot, depth, value);
            }
        } else if cur.depth() <= depth {
            slot.store(value.raw(), Ordering::Release);
        }
    }

    fn uninstall(&self, key: u128, depth: u8, fallback: Slot) {
        let d = depth as u32;
        let mut slots = self.top.slots();
        let mut start = 0;
        let mut bits = Self::TOP;
        loop {
            let end = start + bits;
            let index = Self::index(key, start, bits);
            if d <= end {
                let span = 1usize << (end - d);
                for slot in &slots[index..index + span] {
                    self.restore(slot, depth, fallback);
                }
                return;
            }
            let cur = Slot::from_raw(slots[index].load(Ordering::Acquire));
            if !cur.is_ext() {
                return;
            }
            slots = self.arena.block(cur.block());
            start = end;
            bits = BLOCK_BITS;
        }
    }

    /// Replaces every route of exactly `depth` at or below `slot` with
    /// `fallback`.
    fn restore(&self, slot: &AtomicU64, depth: u8, fallback: Slot) {
        let cur = Slot::from_raw(slot.load(Ordering::Acquire));
        if cur.is_ext() {
            for slot in self.arena.block(cur.block()) {
                self.restore(slot, depth, fallback);
            }
        } else if cur.is_route() && cur.depth() == depth {
            slot.store(fallback.raw(), Ordering::Release);
        }
    }

    /// Longest rule shallower than `depth` covering `key`, as a slot value.
    /// The default route is not expanded into slots, so it maps to empty.
    fn covering(rules: &BTreeMap<(u128, u8), u32>, key: u128, depth: u8) -> Slot {
        (1..depth)
            .rev()
            .find_map(|d| {
                rules
                    .get(&(Self::mask(key, d), d))
                    .map(|&nh| Slot::route(d, nh))
            })
            .unwrap_or(Slot::EMPTY)
    }

    fn collapse(
        arena: &BlockArena,
        pool: &mut BlockPool,
        block: u32,
        released: &mut usize,
    ) -> Option<Slot> {
        let mut first = None;
        let mut uniform = true;
        for slot in arena.block(block) {
            let mut cur = Slot::from_raw(slot.load(Ordering::Relaxed));
            if cur.is_ext() {
                if let Some(value) = Self::collapse(arena, pool, cur.block(), released) {
                    slot.store(value.raw(), Ordering::Relaxed);
                    cur = value;
                }
            }
            match first {
                None => first = Some(cur),
                Some(f) if f != cur => uniform = false,
                Some(_) => {}
            }
        }
        let value = first.filter(|v| uniform && !v.is_ext())?;
        pool.release(block);
        *released += 1;
        Some(value)
    }
}

impl<A: LpmAddr> fmt::Debug for Lpm<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lpm")
            .field("family", &A::NAME)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<A: LpmAddr> Drop for Lpm<A> {
    fn drop(&mut self) {
        log::debug!("{} LPM destroyed: {}", A::NAME, self.stats());
    }
}

// ================================================================================================
//   UNITTESTS
// ================================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn small_v4() -> Ipv4Lpm {
        Ipv4Lpm::with_config(&LpmConfig {
            max_rules: 64,
            max_blocks: None,
            huge_page: Some(false),
        })
        .unwrap()
    }

    #[test]
    fn test_levels() {
        assert_eq!(Ipv4Lpm::TOP, 24);
        assert_eq!(Ipv4Lpm::EXT_LEVELS, 1);
        assert_eq!(Ipv6Lpm::EXT_LEVELS, 13);
    }

    #[test]
    fn test_mask() {
        assert_eq!(Ipv4Lpm::mask(0x0b16_2150, 26), 0x0b16_2140);
        assert_eq!(Ipv4Lpm::mask(0xffff_ffff, 0), 0);
        assert_eq!(Ipv4Lpm::mask(0xffff_ffff, 32), 0xffff_ffff);
        assert_eq!(Ipv6Lpm::mask(u128::MAX, 128), u128::MAX);
        assert_eq!(Ipv6Lpm::mask(u128::MAX, 1), 1u128 << 127);
    }

    #[test]
    fn test_empty_table_misses() {
        let t = small_v4();
        assert_eq!(t.lookup(v4("1.2.3.4")), NO_ROUTE);
        assert_eq!(t.route(v4("1.2.3.4")), None);
        assert!(t.is_empty());
        let stats = t.stats();
        assert_eq!((stats.lookups, stats.hits), (2, 0));
    }

    #[test]
    fn test_deeper_rule_survives_shallower_add() {
        let t = small_v4();
        t.add(v4("10.1.1.0"), 24, 24).unwrap();
        t.add(v4("10.1.1.128"), 25, 25).unwrap();
        t.add(v4("10.1.1.7"), 32, 32).unwrap();
        // shallower rule added last must not clobber deeper ones
        t.add(v4("10.0.0.0"), 8, 8).unwrap();
        assert_eq!(t.lookup(v4("10.1.1.7")), 32);
        assert_eq!(t.lookup(v4("10.1.1.8")), 24);
        assert_eq!(t.lookup(v4("10.1.1.200")), 25);
        assert_eq!(t.lookup(v4("10.1.2.1")), 8);
    }

    #[test]
    fn test_overwrite_keeps_count_and_neighbours() {
        let t = small_v4();
        t.add(v4("10.0.0.0"), 8, 1).unwrap();
        t.add(v4("10.0.0.0"), 16, 2).unwrap();
        t.add(v4("10.0.0.0"), 16, 3).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.lookup(v4("10.0.5.5")), 3);
        assert_eq!(t.lookup(v4("10.1.0.0")), 1);
        assert_eq!(t.get(v4("10.0.9.9"), 16), Some(3));
    }

    #[test]
    fn test_unmasked_prefix_is_normalised() {
        let t = small_v4();
        t.add(v4("192.168.1.77"), 24, 5).unwrap();
        assert!(t.contains(v4("192.168.1.0"), 24));
        assert_eq!(t.lookup(v4("192.168.1.1")), 5);
        t.delete(v4("192.168.1.200"), 24).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn test_reserved_next_hop_rejected() {
        let t = small_v4();
        assert!(matches!(
            t.add(v4("10.0.0.0"), 8, NO_ROUTE),
            Err(TableError::ReservedValue(NO_ROUTE))
        ));
        assert!(t.is_empty());
    }

    #[test]
    fn test_delete_missing() {
        let t = small_v4();
        t.add(v4("10.0.0.0"), 8, 1).unwrap();
        assert!(matches!(t.delete(v4("10.0.0.0"), 9), Err(TableError::NotFound)));
        assert!(matches!(
            t.delete(v4("10.0.0.0"), 33),
            Err(TableError::InvalidDepth { depth: 33, max: 32 })
        ));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_rule_limit() {
        let t = Ipv4Lpm::with_config(&LpmConfig {
            max_rules: 2,
            max_blocks: None,
            huge_page: Some(false),
        })
        .unwrap();
        t.add(v4("10.0.0.0"), 8, 1).unwrap();
        t.add(v4("11.0.0.0"), 8, 2).unwrap();
        assert!(matches!(t.add(v4("12.0.0.0"), 8, 3), Err(TableError::TableFull)));
        // overwriting an existing rule at capacity is allowed
        t.add(v4("11.0.0.0"), 8, 4).unwrap();
        assert_eq!(t.lookup(v4("11.1.1.1")), 4);
        assert_eq!(t.lookup(v4("12.1.1.1")), NO_ROUTE);
    }

    #[test]
    fn test_block_exhaustion_leaves_table_unchanged() {
        let t = Ipv4Lpm::with_config(&LpmConfig {
            max_rules: 16,
            max_blocks: Some(1),
            huge_page: Some(false),
        })
        .unwrap();
        t.add(v4("10.0.0.1"), 32, 1).unwrap();
        // same /24, block already there
        t.add(v4("10.0.0.2"), 32, 2).unwrap();
        assert!(matches!(t.add(v4("10.0.1.1"), 32, 3), Err(TableError::TableFull)));
        assert_eq!(t.lookup(v4("10.0.1.1")), NO_ROUTE);
        assert_eq!(t.len(), 2);
        assert_eq!(t.stats().blocks_used, 1);
    }

    #[test]
    fn test_blocks_reused_after_delete() {
        let t = Ipv4Lpm::with_config(&LpmConfig {
            max_rules: 16,
            max_blocks: Some(1),
            huge_page: Some(false),
        })
        .unwrap();
        for round in 0..100 {
            t.add(v4("10.0.0.9"), 32, round).unwrap();
            assert_eq!(t.lookup(v4("10.0.0.9")), round);
            t.delete(v4("10.0.0.9"), 32).unwrap();
            assert_eq!(t.lookup(v4("10.0.0.9")), NO_ROUTE);
        }
        assert_eq!(t.stats().blocks_used, 1);
    }

    #[test]
    fn test_compact_releases_blocks() {
        let mut t = small_v4();
        t.add(v4("10.0.0.0"), 16, 1).unwrap();
        t.add(v4("10.0.0.1"), 32, 2).unwrap();
        t.add(v4("10.0.1.0"), 25, 3).unwrap();
        assert_eq!(t.stats().blocks_used, 2);
        assert_eq!(t.compact(), 0);

        t.delete(v4("10.0.0.1"), 32).unwrap();
        t.delete(v4("10.0.1.0"), 25).unwrap();
        assert_eq!(t.stats().blocks_used, 2);
        assert_eq!(t.compact(), 2);
        assert_eq!(t.stats().blocks_used, 0);
        assert_eq!(t.lookup(v4("10.0.0.1")), 1);
        assert_eq!(t.lookup(v4("10.0.1.1")), 1);

        // released blocks are handed out again
        t.add(v4("10.0.0.1"), 32, 4).unwrap();
        assert_eq!(t.lookup(v4("10.0.0.1")), 4);
        assert_eq!(t.lookup(v4("10.0.0.2")), 1);
    }

    #[test]
    fn test_ipv6_deep_chain_and_compact() {
        let mut t = Ipv6Lpm::with_config(&LpmConfig {
            max_rules: 8,
            max_blocks: None,
            huge_page: Some(false),
        })
        .unwrap();
        t.add(v6("2001:db8::"), 32, 1).unwrap();
        t.add(v6("2001:db8::1"), 128, 2).unwrap();
        assert_eq!(t.stats().blocks_used, 13);
        assert_eq!(t.lookup(v6("2001:db8::1")), 2);
        assert_eq!(t.lookup(v6("2001:db8::2")), 1);
        assert_eq!(t.lookup(v6("2001:db9::1")), NO_ROUTE);

        t.delete(v6("2001:db8::1"), 128).unwrap();
        assert_eq!(t.lookup(v6("2001:db8::1")), 1);
        // the /32 itself still needs the first extension level
        assert_eq!(t.compact(), 12);
        assert_eq!(t.stats().blocks_used, 1);
        assert_eq!(t.lookup(v6("2001:db8::1")), 1);
    }

    #[test]
    fn test_rules_snapshot_order() {
        let t = small_v4();
        t.add(v4("10.0.0.0"), 16, 2).unwrap();
        t.add(v4("0.0.0.0"), 0, 9).unwrap();
        t.add(v4("10.0.0.0"), 8, 1).unwrap();
        let rules: Vec<_> = t.rules().collect();
        assert_eq!(
            rules,
            vec![
                (v4("0.0.0.0"), 0, 9),
                (v4("10.0.0.0"), 8, 1),
                (v4("10.0.0.0"), 16, 2)
            ]
        );
    }

    #[test]
    fn test_stats_display() {
        let t = small_v4();
        t.add(v4("10.0.0.0"), 8, 1).unwrap();
        t.lookup(v4("10.0.0.1"));
        t.lookup(v4("11.0.0.1"));
        assert_eq!(
            t.stats().to_string(),
            "rules 1/64, ext blocks 0/64, lookups 2, hits 1, misses 1"
        );
    }

    #[test]
    fn test_stats_display_hits_ahead_of_lookups() {
        let stats = LpmStats {
            rules: 1,
            max_rules: 64,
            blocks_used: 0,
            blocks_capacity: 64,
            lookups: 5,
            hits: 7,
        };
        assert_eq!(
            stats.to_string(),
            "rules 1/64, ext blocks 0/64, lookups 5, hits 7, misses 0"
        );
    }
}
