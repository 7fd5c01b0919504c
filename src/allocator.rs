//! Pluggable allocation for the table's backing arrays.
//!
//! A table owns no memory beyond what its [`RawAlloc`] hands out, and returns
//! every block to the same allocator when it is dropped or rehashed.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocError;

/// A source of raw memory blocks for a table.
///
/// # Safety
///
/// A successful `allocate` must return a block valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, that stays valid until
/// it is passed to `deallocate` on the same allocator. Tables never request
/// zero-sized blocks.
pub unsafe trait RawAlloc {
    /// Allocates a block described by `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block previously returned by `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `allocate` on this allocator with the same
    /// `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

// SAFETY: Forwards to `A`, which upholds the contract.
unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: The caller upholds the contract for `A`.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// The general-purpose heap of the global allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

// SAFETY: Delegates to the global allocator, which upholds the contract for
// non-zero-sized layouts.
unsafe impl RawAlloc for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // SAFETY: Tables never request zero-sized layouts.
        NonNull::new(unsafe { alloc::alloc::alloc(layout) }).ok_or(AllocError)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: `ptr` came from `alloc` with this `layout`.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(all(feature = "mmap", unix))]
pub use self::mmap::MmapAlloc;

#[cfg(all(feature = "mmap", unix))]
mod mmap {
    use core::alloc::Layout;
    use core::mem::size_of;
    use core::ptr;
    use core::ptr::NonNull;

    use super::RawAlloc;
    use crate::error::AllocError;

    /// Two words sit right before every returned pointer: the offset back to
    /// the start of the mapping, then the mapped region size.
    const HEADER: usize = 2 * size_of::<usize>();

    const FALLBACK_PAGE_SIZE: usize = 4096;

    fn page_size() -> usize {
        // SAFETY: `sysconf` has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    }

    /// Page-granular allocator backed by private anonymous `mmap` regions.
    ///
    /// Each block gets its own mapping. The region size lives in a hidden
    /// header immediately before the returned pointer, so blocks are unmapped
    /// without any side table. Blocks come back zero-filled from the kernel.
    ///
    /// Alignments up to half the page size are supported.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use core::alloc::Layout;
    ///
    /// use swiss_table::RawTable;
    /// use swiss_table::allocator::MmapAlloc;
    /// use swiss_table::hash::Fnv1a;
    ///
    /// let mut table = RawTable::with_capacity_in(
    ///     1024,
    ///     Layout::new::<u64>(),
    ///     Layout::new::<u64>(),
    ///     MmapAlloc,
    ///     Fnv1a,
    /// );
    /// let (value, inserted) = table.get_or_insert(&7u64.to_ne_bytes());
    /// value.copy_from_slice(&49u64.to_ne_bytes());
    /// assert!(inserted);
    /// assert_eq!(table.find(&7u64.to_ne_bytes()), Some(&49u64.to_ne_bytes()[..]));
    /// ```
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MmapAlloc;

    // SAFETY: Every block is a fresh read/write mapping of at least
    // `offset + layout.size()` bytes and `offset` is a multiple of the
    // requested alignment within a page-aligned region.
    unsafe impl RawAlloc for MmapAlloc {
        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
            let page = page_size();
            let offset = layout.align().max(HEADER);
            if offset >= page {
                return Err(AllocError);
            }

            let total = layout.size().checked_add(offset).ok_or(AllocError)?;
            let region = total.checked_add(page - 1).ok_or(AllocError)? & !(page - 1);

            // SAFETY: Anonymous private mapping with no address hint; the
            // result is checked against `MAP_FAILED`.
            let base = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    region,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                tracing::warn!(region, "anonymous mmap failed");
                return Err(AllocError);
            }

            // SAFETY: `offset < page <= region`, and the header words lie in
            // `[offset - HEADER, offset)`, inside the mapping. `offset` is a
            // multiple of `HEADER`, so the words are aligned.
            unsafe {
                let user = base.cast::<u8>().add(offset);
                user.sub(HEADER).cast::<usize>().write(offset);
                user.sub(size_of::<usize>()).cast::<usize>().write(region);
                Ok(NonNull::new_unchecked(user))
            }
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
            // SAFETY: `ptr` came from `allocate`, which wrote both header
            // words right before it.
            unsafe {
                let user = ptr.as_ptr();
                let offset = user.sub(HEADER).cast::<usize>().read();
                let region = user.sub(size_of::<usize>()).cast::<usize>().read();
                let base = user.sub(offset);
                if libc::munmap(base.cast(), region) != 0 {
                    tracing::warn!(region, "munmap failed");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use core::cell::Cell;

    use super::*;

    /// Counts live blocks and optionally fails once a budget is spent.
    pub(crate) struct TrackingAlloc {
        pub(crate) live: Cell<isize>,
        pub(crate) budget: Cell<Option<usize>>,
    }

    impl TrackingAlloc {
        pub(crate) fn new() -> Self {
            Self {
                live: Cell::new(0),
                budget: Cell::new(None),
            }
        }

        pub(crate) fn fail_after(&self, allocations: usize) {
            self.budget.set(Some(allocations));
        }
    }

    // SAFETY: Delegates to `Global`.
    unsafe impl RawAlloc for TrackingAlloc {
        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
            match self.budget.get() {
                Some(0) => return Err(AllocError),
                Some(left) => self.budget.set(Some(left - 1)),
                None => {}
            }
            let ptr = Global.allocate(layout)?;
            self.live.set(self.live.get() + 1);
            Ok(ptr)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            self.live.set(self.live.get() - 1);
            // SAFETY: `ptr` came from `Global` with this layout.
            unsafe { Global.deallocate(ptr, layout) }
        }
    }

    #[test]
    fn global_round_trip() {
        let layout = Layout::from_size_align(96, 32).unwrap();
        let ptr = Global.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 32, 0);
        // SAFETY: The block is 96 bytes long.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 96);
            assert_eq!(*ptr.as_ptr().add(95), 0xAB);
            Global.deallocate(ptr, layout);
        }
    }

    #[test]
    fn tracking_alloc_budget() {
        let tracker = TrackingAlloc::new();
        let layout = Layout::new::<u64>();
        tracker.fail_after(1);

        let first = (&tracker).allocate(layout).unwrap();
        assert_eq!((&tracker).allocate(layout), Err(AllocError));
        assert_eq!(tracker.live.get(), 1);

        // SAFETY: `first` came from this allocator with `layout`.
        unsafe { (&tracker).deallocate(first, layout) };
        assert_eq!(tracker.live.get(), 0);
    }

    #[cfg(all(feature = "mmap", unix))]
    #[test]
    fn mmap_header_round_trip() {
        for (size, align) in [(1, 1), (100, 8), (5000, 64), (64 * 1024, 16)] {
            let layout = Layout::from_size_align(size, align).unwrap();
            let ptr = MmapAlloc.allocate(layout).unwrap();
            assert_eq!(ptr.as_ptr() as usize % align, 0);
            // SAFETY: The block is `size` bytes long, zero-filled by the
            // kernel.
            unsafe {
                assert_eq!(*ptr.as_ptr(), 0);
                assert_eq!(*ptr.as_ptr().add(size - 1), 0);
                ptr.as_ptr().write_bytes(0x5A, size);
                let region = ptr.as_ptr().sub(size_of::<usize>()).cast::<usize>().read();
                assert!(region >= size);
                assert_eq!(region % 4096, 0);
                MmapAlloc.deallocate(ptr, layout);
            }
        }
    }

    #[cfg(all(feature = "mmap", unix))]
    #[test]
    fn mmap_rejects_page_alignment() {
        let layout = Layout::from_size_align(16, 1 << 20).unwrap();
        assert_eq!(MmapAlloc.allocate(layout), Err(AllocError));
    }
}
