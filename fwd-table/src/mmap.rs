//! # Zero-Filled Slot Regions
//!
//! ## Purpose
//!
//! The prefix trie keeps its directly indexed top level (2^24 slots) and its
//! extension-block pool in large flat arrays of atomic slots. This module owns
//! that memory.
//!
//! ## How it works
//!
//! An anonymous private `mmap` is zero-filled by the kernel and only consumes
//! physical memory for the pages actually touched, so a 128 MiB top level for
//! a table holding a handful of routes costs a few pages. Zero is the "no
//! route" slot encoding, which makes a fresh mapping a valid empty table. The
//! region can optionally be backed by 2 MiB huge pages to cut TLB misses on
//! the lookup path; `munmap` runs in `Drop`.
//!
//! ## Main components
//!
//! - `SlotRegion`: owner of a mapping, viewed as `&[AtomicU64]`.
//! - `get_hugepage_info()`: `/proc/meminfo` huge page counters.

use std::fs::File;
use std::io::{BufRead as _, BufReader};
use std::sync::atomic::AtomicU64;
use std::{io, mem, ptr, slice};

const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// An anonymous mapping holding `count` zero-initialised `AtomicU64` slots.
pub struct SlotRegion {
    ptr: *mut libc::c_void,
    len: usize,
    count: usize,
    huge: bool,
}

// The region is only ever accessed through `&[AtomicU64]`.
unsafe impl Send for SlotRegion {}
unsafe impl Sync for SlotRegion {}

impl SlotRegion {
    /// Maps a region large enough for `count` slots.
    ///
    /// With `huge_page == None` huge pages are used only when enough free ones
    /// are reported to back the whole region.
    pub fn zeroed(count: usize, huge_page: Option<bool>) -> io::Result<Self> {
        let size = count
            .checked_mul(mem::size_of::<AtomicU64>())
            .ok_or_else(|| io::Error::other("slot region size overflows"))?
            .max(1);
        let huge = match huge_page {
            Some(yes) => yes,
            None => {
                let info = get_hugepage_info().unwrap_or_default();
                match (info.free, info.size_kb) {
                    (Some(free), Some(2048)) => free as usize * HUGE_PAGE_SIZE >= size,
                    _ => false,
                }
            }
        };
        let page_size = if huge {
            HUGE_PAGE_SIZE
        } else {
            unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
        };
        let aligned = (size + page_size - 1) & !(page_size - 1);
        // Huge pages are reserved at map time; regular pages are not, a large
        // sparse table must not count against the commit limit.
        let flags = libc::MAP_PRIVATE
            | libc::MAP_ANONYMOUS
            | if huge {
                libc::MAP_HUGETLB | libc::MAP_HUGE_2MB
            } else {
                libc::MAP_NORESERVE
            };
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                aligned,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(SlotRegion {
            ptr,
            len: aligned,
            count,
            huge,
        })
    }

    /// The slots of the region.
    #[inline(always)]
    pub fn slots(&self) -> &[AtomicU64] {
        // SAFETY: the mapping is page aligned, at least `count * 8` bytes long,
        // zero-filled (a valid AtomicU64 bit pattern) and lives as long as self.
        unsafe { slice::from_raw_parts(self.ptr as *const AtomicU64, self.count) }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes actually mapped (page aligned).
    pub fn mapped_bytes(&self) -> usize {
        self.len
    }

    pub fn is_huge(&self) -> bool {
        self.huge
    }
}

impl Drop for SlotRegion {
    fn drop(&mut self) {
        unsafe {
            if self.ptr != libc::MAP_FAILED && !self.ptr.is_null() {
                let res = libc::munmap(self.ptr, self.len);
                if res < 0 {
                    log::error!("Failed to unmap slot region: {}", io::Error::last_os_error());
                }
            }
        }
    }
}

/// Contains information about the system's huge page configuration.
#[derive(Debug, Default)]
pub struct HugePageInfo {
    /// The size of a huge page in kilobytes.
    pub size_kb: Option<u64>,
    /// The total number of huge pages configured in the system.
    pub total: Option<u64>,
    /// The number of free (available) huge pages.
    pub free: Option<u64>,
}

/// Parses `/proc/meminfo` to get information about huge pages.
pub fn get_hugepage_info() -> io::Result<HugePageInfo> {
    let file = File::open("/proc/meminfo")?;
    let reader = BufReader::new(file);
    let mut info = HugePageInfo::default();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_end_matches(" kB");
        let slot = match key.trim() {
            "Hugepagesize" => &mut info.size_kb,
            "HugePages_Total" => &mut info.total,
            "HugePages_Free" => &mut info.free,
            _ => continue,
        };
        *slot = Some(value.parse().map_err(io::Error::other)?);
    }
    Ok(info)
}
