//! Resident Memory Arena.
//!
//! This module provides the backing storage for every probe address. The arena:
//! 1. Is aligned to a caller-chosen power of two (64 KiB by default) so the
//!    low address bits that select column and bank are stable across runs.
//! 2. Is filled with a byte pattern and touched once per page before it is
//!    handed out, so no first-touch page fault lands inside a timed region.
//! 3. Can optionally be locked into RAM with `mlock`.
//!
//! On Unix the memory comes from an anonymous `mmap`; elsewhere from the
//! global allocator.

use std::io;
use std::ptr::{self, NonNull};
use std::slice;

use tracing::{debug, info, warn};

use crate::common::constants::{CACHE_LINE, PAGE_SIZE};
use crate::common::ProbeError;
use crate::config::ArenaConfig;

/// Aligned, pre-faulted, exclusively owned block of memory.
pub struct Arena {
    /// Aligned start handed out to callers.
    ptr: NonNull<u8>,
    /// Usable size in bytes.
    size: usize,
    alignment: usize,
    /// Start of the underlying mapping (may precede `ptr`).
    map_base: *mut u8,
    /// Length of the underlying mapping.
    map_len: usize,
    locked: bool,
}

impl Arena {
    /// Allocates `size` bytes aligned to `alignment`, fills them with `fill`
    /// and pre-faults every page.
    ///
    /// # Arguments
    ///
    /// * `size` - Usable length in bytes.
    /// * `alignment` - Base address alignment; a power of two of at least one cache line.
    /// * `fill` - Byte written over the whole arena.
    ///
    /// # Returns
    ///
    /// A resident arena, unmapped on drop.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidAlignment`] if `alignment` is not a power of two
    /// of at least one cache line; [`ProbeError::Allocation`] if the OS
    /// refuses the mapping or `size` is zero.
    pub fn allocate(size: usize, alignment: usize, fill: u8) -> Result<Self, ProbeError> {
        if !alignment.is_power_of_two() || alignment < CACHE_LINE {
            return Err(ProbeError::InvalidAlignment(alignment));
        }
        let alloc_err = |source| ProbeError::Allocation {
            size,
            alignment,
            source,
        };
        if size == 0 {
            return Err(alloc_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "arena size must be non-zero",
            )));
        }

        let (map_base, map_len, ptr) = Self::map(size, alignment).map_err(alloc_err)?;
        let mut arena = Self {
            ptr,
            size,
            alignment,
            map_base,
            map_len,
            locked: false,
        };

        arena.fill(fill);
        arena.prefault(page_size());
        info!(size, alignment, base = ?arena.ptr, "arena allocated and pre-faulted");
        Ok(arena)
    }

    /// Allocates an arena from its configuration section, locking it if requested.
    pub fn from_config(config: &ArenaConfig) -> Result<Self, ProbeError> {
        let mut arena = Self::allocate(config.size_bytes, config.alignment, config.fill_byte)?;
        if config.lock_pages {
            if let Err(err) = arena.lock() {
                warn!(%err, "mlock failed; continuing with unlocked pages");
            }
        }
        Ok(arena)
    }

    #[cfg(unix)]
    fn map(size: usize, alignment: usize) -> io::Result<(*mut u8, usize, NonNull<u8>)> {
        let map_len = size
            .checked_add(alignment)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "arena size overflows"))?;

        // SAFETY: anonymous private mapping with no address hint; the result
        // is checked against MAP_FAILED before use.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let base = raw as *mut u8;
        let pad = (base as usize).next_multiple_of(alignment) - base as usize;
        // SAFETY: pad < alignment, so base + pad + size stays inside the mapping.
        let aligned = unsafe { base.add(pad) };
        let ptr = NonNull::new(aligned)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok((base, map_len, ptr))
    }

    #[cfg(not(unix))]
    fn map(size: usize, alignment: usize) -> io::Result<(*mut u8, usize, NonNull<u8>)> {
        use std::alloc::{Layout, alloc};

        let layout = Layout::from_size_align(size, alignment)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: layout has non-zero size (checked by `allocate`).
        let raw = unsafe { alloc(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "allocator returned null"))?;
        Ok((raw, size, ptr))
    }

    fn fill(&mut self, byte: u8) {
        // SAFETY: ptr..ptr+size is owned, writable and initialised by nobody else.
        unsafe { ptr::write_bytes(self.ptr.as_ptr(), byte, self.size) };
    }

    /// Touches one byte per page plus the final byte.
    fn prefault(&mut self, page: usize) {
        let base = self.ptr.as_ptr();
        let mut touched = 0usize;
        for offset in (0..self.size).step_by(page).chain(std::iter::once(self.size - 1)) {
            // SAFETY: offset < size.
            unsafe {
                let p = base.add(offset);
                ptr::write_volatile(p, ptr::read_volatile(p));
            }
            touched += 1;
        }
        debug!(pages = touched, page, "arena pages touched");
    }

    /// Locks the arena into physical memory.
    pub fn lock(&mut self) -> io::Result<()> {
        if self.locked {
            return Ok(());
        }
        #[cfg(unix)]
        {
            // SAFETY: the range is a live mapping owned by this arena.
            let rc = unsafe { libc::mlock(self.ptr.as_ptr() as *const libc::c_void, self.size) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            self.locked = true;
            debug!(size = self.size, "arena locked");
            Ok(())
        }
        #[cfg(not(unix))]
        {
            Err(io::Error::new(io::ErrorKind::Unsupported, "page locking needs mlock"))
        }
    }

    /// Returns `true` if [`lock`](Self::lock) succeeded.
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Usable size in bytes.
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Always `false`: zero-sized arenas are rejected at allocation.
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Alignment of the base address.
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Base address of the arena.
    pub const fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// The whole arena as a byte slice.
    pub const fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+size is initialised (filled at allocation) and
        // borrowed immutably for the lifetime of `&self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// The whole arena as a mutable byte slice.
    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Borrows the byte at `offset`.
    pub fn byte(&self, offset: usize) -> Result<&u8, ProbeError> {
        self.as_slice().get(offset).ok_or(ProbeError::OutOfBounds {
            offset,
            len: 1,
            size: self.size,
        })
    }

    /// Borrows `len` bytes starting at `offset`.
    pub fn region(&self, offset: usize, len: usize) -> Result<&[u8], ProbeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.as_slice().get(offset..end))
            .ok_or(ProbeError::OutOfBounds {
                offset,
                len,
                size: self.size,
            })
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.ptr)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("locked", &self.locked)
            .finish()
    }
}

impl Drop for Arena {
    /// Unlocks and releases the mapping.
    fn drop(&mut self) {
        #[cfg(unix)]
        // SAFETY: map_base/map_len describe the mapping created in `map`,
        // which is released exactly once here.
        unsafe {
            if self.locked {
                let _ = libc::munlock(self.ptr.as_ptr() as *const libc::c_void, self.size);
            }
            let _ = libc::munmap(self.map_base as *mut libc::c_void, self.map_len);
        }

        #[cfg(not(unix))]
        // SAFETY: same layout as the allocation in `map`.
        unsafe {
            let layout = std::alloc::Layout::from_size_align_unchecked(self.map_len, self.alignment);
            std::alloc::dealloc(self.map_base, layout);
        }
    }
}

/// The OS page size, or [`PAGE_SIZE`] if it cannot be queried.
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page > 0 {
            return page as usize;
        }
    }
    PAGE_SIZE
}
