//! # MAC Forwarding Table
//!
//! ## Purpose
//!
//! Exact-match table from a (MAC address, VLAN id) pair to a port, the
//! learning table of an L2 switch. The VLAN is part of the key, so the same
//! MAC on two VLANs is two unrelated entries.
//!
//! ## How it works
//!
//! The 48-bit MAC and the 12/16-bit VLAN are packed into one 64-bit key, run
//! through a 64-bit finaliser and reduced modulo a bucket count fixed at
//! creation. Each bucket holds a chain of entries behind an `ArcSwapOption`:
//! readers load the current chain without locking, writers build a new chain
//! and swap it in. Writers are serialised by a mutex, so an update is a single
//! pointer swap from the point of view of a reader.
//!
//! The table never grows or rehashes; `max_entries` bounds the number of
//! distinct keys. Re-adding an existing key replaces its port in place and
//! does not count against the limit.

use crate::addr::MacAddr;
use crate::error::TableError;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Lookup result meaning "unknown destination, flood".
pub const INVALID_PORT: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct CamConfig {
    /// Number of hash buckets, fixed for the lifetime of the table.
    pub num_buckets: usize,
    /// Maximum number of distinct (MAC, VLAN) keys.
    pub max_entries: usize,
}

impl Default for CamConfig {
    fn default() -> Self {
        CamConfig {
            num_buckets: 1024,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamStats {
    pub entries: usize,
    pub capacity: usize,
    pub buckets: usize,
    pub lookups: u64,
    pub hits: u64,
}

impl fmt::Display for CamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries {}/{}, buckets {}, lookups {}, hits {}, misses {}",
            self.entries,
            self.capacity,
            self.buckets,
            self.lookups,
            self.hits,
            self.lookups.saturating_sub(self.hits)
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: u64,
    port: u32,
}

type Chain = Vec<Entry>;

/// (MAC, VLAN) -> port exact-match table.
pub struct MacTable {
    buckets: Box<[ArcSwapOption<Chain>]>,
    writer: Mutex<()>,
    entries: AtomicUsize,
    max_entries: usize,
    lookups: AtomicU64,
    hits: AtomicU64,
}

#[inline(always)]
fn cam_key(mac: MacAddr, vlan: u16) -> u64 {
    (mac.to_u64() << 16) | vlan as u64
}

/// murmur3 64-bit finaliser: every key bit affects every hash bit.
#[inline(always)]
fn mix(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

impl MacTable {
    pub fn create(num_buckets: usize, max_entries: usize) -> Result<Self, TableError> {
        Self::with_config(&CamConfig {
            num_buckets,
            max_entries,
        })
    }

    pub fn with_config(config: &CamConfig) -> Result<Self, TableError> {
        if config.num_buckets == 0 {
            return Err(TableError::alloc("bucket count must be non-zero"));
        }
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(config.num_buckets)
            .map_err(|e| TableError::AllocationFailure(io::Error::other(e)))?;
        buckets.resize_with(config.num_buckets, ArcSwapOption::empty);
        log::debug!(
            "MAC table created: {} buckets, max {} entries",
            config.num_buckets,
            config.max_entries
        );
        Ok(MacTable {
            buckets: buckets.into_boxed_slice(),
            writer: Mutex::new(()),
            entries: AtomicUsize::new(0),
            max_entries: config.max_entries,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        })
    }

    #[inline(always)]
    fn bucket(&self, key: u64) -> &ArcSwapOption<Chain> {
        &self.buckets[(mix(key) % self.buckets.len() as u64) as usize]
    }

    /// Inserts or updates `(mac, vlan) -> port`.
    pub fn add(&self, mac: MacAddr, vlan: u16, port: u32) -> Result<(), TableError> {
        if port == INVALID_PORT {
            return Err(TableError::ReservedValue(port));
        }
        let key = cam_key(mac, vlan);
        let bucket = self.bucket(key);
        let _writer = self.writer.lock();
        let current = bucket.load_full();
        let chain = current.as_deref().map_or(&[][..], Vec::as_slice);

        if let Some(pos) = chain.iter().position(|e| e.key == key) {
            if chain[pos].port != port {
                let mut next = chain.to_vec();
                next[pos].port = port;
                bucket.store(Some(Arc::new(next)));
                log::debug!("MAC table update {mac}@{vlan} -> {port}");
            }
            return Ok(());
        }

        if self.entries.load(Ordering::Relaxed) >= self.max_entries {
            log::warn!("MAC table full ({} entries), {mac}@{vlan} not added", self.max_entries);
            return Err(TableError::TableFull);
        }
        let mut next = Vec::with_capacity(chain.len() + 1);
        next.extend_from_slice(chain);
        next.push(Entry { key, port });
        bucket.store(Some(Arc::new(next)));
        self.entries.fetch_add(1, Ordering::Relaxed);
        log::debug!("MAC table add {mac}@{vlan} -> {port}");
        Ok(())
    }

    pub fn delete(&self, mac: MacAddr, vlan: u16) -> Result<(), TableError> {
        let key = cam_key(mac, vlan);
        let bucket = self.bucket(key);
        let _writer = self.writer.lock();
        let current = bucket.load_full();
        let chain = current.as_deref().map_or(&[][..], Vec::as_slice);
        let pos = chain
            .iter()
            .position(|e| e.key == key)
            .ok_or(TableError::NotFound)?;

        if chain.len() == 1 {
            bucket.store(None);
        } else {
            let mut next = chain.to_vec();
            next.swap_remove(pos);
            bucket.store(Some(Arc::new(next)));
        }
        self.entries.fetch_sub(1, Ordering::Relaxed);
        log::debug!("MAC table delete {mac}@{vlan}");
        Ok(())
    }

    /// Port for `(mac, vlan)`, or `INVALID_PORT`.
    #[inline]
    pub fn lookup(&self, mac: MacAddr, vlan: u16) -> u32 {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let key = cam_key(mac, vlan);
        let chain = self.bucket(key).load();
        match chain.as_deref().and_then(|c| c.iter().find(|e| e.key == key)) {
            Some(e) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                e.port
            }
            None => INVALID_PORT,
        }
    }

    #[inline]
    pub fn get(&self, mac: MacAddr, vlan: u16) -> Option<u32> {
        match self.lookup(mac, vlan) {
            INVALID_PORT => None,
            port => Some(port),
        }
    }

    /// Membership test that leaves the counters alone.
    pub fn contains(&self, mac: MacAddr, vlan: u16) -> bool {
        let key = cam_key(mac, vlan);
        self.bucket(key)
            .load()
            .as_deref()
            .is_some_and(|c| c.iter().any(|e| e.key == key))
    }

    /// Drops every entry and resets the counters. Buckets are kept.
    pub fn clear(&self) {
        let _writer = self.writer.lock();
        for bucket in self.buckets.iter() {
            bucket.store(None);
        }
        self.entries.store(0, Ordering::Relaxed);
        self.lookups.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        log::debug!("MAC table cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Counters are sampled without a lock and readers may race a `clear`;
    /// the snapshot never reports more hits than lookups.
    pub fn stats(&self) -> CamStats {
        let hits = self.hits.load(Ordering::Relaxed);
        CamStats {
            entries: self.len(),
            capacity: self.max_entries,
            buckets: self.buckets.len(),
            lookups: self.lookups.load(Ordering::Relaxed).max(hits),
            hits,
        }
    }
}

impl fmt::Debug for MacTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacTable").field("stats", &self.stats()).finish()
    }
}

impl Drop for MacTable {
    fn drop(&mut self) {
        log::debug!("MAC table destroyed: {}", self.stats());
    }
}
