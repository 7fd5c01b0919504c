//! The swiss table engine over fixed-size byte records.
//!
//! Keys and values live in two separate arrays indexed in lockstep with a
//! control-byte array. Lookups scan the control array one [`Group`] at a time
//! and only compare the key bytes of slots whose 7-bit fragment matches.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::ptr;
use core::ptr::NonNull;
use core::slice;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::allocator::Global;
use crate::allocator::RawAlloc;
use crate::control;
use crate::control::DELETED;
use crate::control::EMPTY;
use crate::control::Group;
use crate::error::TryReserveError;
use crate::hash;
use crate::hash::ByteHasher;
use crate::hash::Fnv1a;

/// Returns `true` if taking one more non-empty slot would push the table to
/// 80% of `capacity` or beyond.
#[inline(always)]
fn exceeds_load_factor(occupied: usize, capacity: usize) -> bool {
    (occupied as u128 + 1) * 5 >= capacity as u128 * 4
}

/// Smallest valid capacity that holds `len` entries without growing.
fn capacity_for_len(len: usize) -> Result<usize, TryReserveError> {
    let min = len as u128 * 5 / 4 + 1;
    usize::try_from(min)
        .ok()
        .and_then(|min| min.max(2).checked_next_power_of_two())
        .ok_or(TryReserveError::CapacityOverflow)
}

#[inline(always)]
fn prefetch(ptr: *const u8) {
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    unsafe {
        use core::arch::x86_64::*;
        _mm_prefetch::<_MM_HINT_T0>(ptr as *const i8);
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
    let _ = ptr;
}

#[inline]
pub(crate) fn unwrap_reserve<T>(result: Result<T, TryReserveError>) -> T {
    match result {
        Ok(value) => value,
        Err(TryReserveError::CapacityOverflow) => panic!("capacity overflow"),
        Err(TryReserveError::AllocError { layout }) => handle_alloc_error(layout),
    }
}

/// Byte layouts of the three backing arrays for one capacity.
#[derive(Debug, Clone, Copy)]
struct DataLayout {
    ctrl: Layout,
    keys: Layout,
    vals: Layout,
}

impl DataLayout {
    /// `key` and `val` are record layouts already padded to their alignment.
    fn new(capacity: usize, key: Layout, val: Layout) -> Result<Self, TryReserveError> {
        let ctrl_len = capacity
            .checked_add(Group::WIDTH)
            .ok_or(TryReserveError::CapacityOverflow)?;
        let ctrl = Layout::array::<u8>(ctrl_len).map_err(|_| TryReserveError::CapacityOverflow)?;

        Ok(DataLayout {
            ctrl,
            keys: Self::array(key, capacity)?,
            vals: Self::array(val, capacity)?,
        })
    }

    fn array(record: Layout, capacity: usize) -> Result<Layout, TryReserveError> {
        let size = record
            .size()
            .checked_mul(capacity)
            .ok_or(TryReserveError::CapacityOverflow)?;
        Layout::from_size_align(size, record.align()).map_err(|_| TryReserveError::CapacityOverflow)
    }

    #[cfg(feature = "stats")]
    fn total_bytes(&self) -> usize {
        self.ctrl.size() + self.keys.size() + self.vals.size()
    }

    /// Allocates all three arrays, control bytes set to `EMPTY`. Nothing is
    /// left allocated on failure.
    fn allocate<A: RawAlloc>(&self, alloc: &A) -> Result<Arrays, TryReserveError> {
        let ctrl = allocate_array(alloc, self.ctrl)?;
        let keys = match allocate_array(alloc, self.keys) {
            Ok(keys) => keys,
            Err(err) => {
                // SAFETY: `ctrl` was just allocated with `self.ctrl`.
                unsafe { free_array(alloc, ctrl, self.ctrl) };
                return Err(err);
            }
        };
        let vals = match allocate_array(alloc, self.vals) {
            Ok(vals) => vals,
            Err(err) => {
                // SAFETY: Both were just allocated with these layouts.
                unsafe {
                    free_array(alloc, keys, self.keys);
                    free_array(alloc, ctrl, self.ctrl);
                }
                return Err(err);
            }
        };

        // SAFETY: `ctrl` is valid for `self.ctrl.size()` bytes.
        unsafe { ctrl.as_ptr().write_bytes(EMPTY, self.ctrl.size()) };

        Ok(Arrays { ctrl, keys, vals })
    }

    /// # Safety
    ///
    /// `arrays` must have been allocated from `alloc` with this layout and
    /// must not be used afterwards.
    unsafe fn free<A: RawAlloc>(&self, alloc: &A, arrays: Arrays) {
        // SAFETY: Guaranteed by the caller.
        unsafe {
            free_array(alloc, arrays.ctrl, self.ctrl);
            free_array(alloc, arrays.keys, self.keys);
            free_array(alloc, arrays.vals, self.vals);
        }
    }
}

fn allocate_array<A: RawAlloc>(alloc: &A, layout: Layout) -> Result<NonNull<u8>, TryReserveError> {
    if layout.size() == 0 {
        // SAFETY: Alignments are never zero.
        return Ok(unsafe { NonNull::new_unchecked(ptr::without_provenance_mut(layout.align())) });
    }

    alloc
        .allocate(layout)
        .map_err(|_| TryReserveError::AllocError { layout })
}

/// # Safety
///
/// `ptr` must come from `allocate_array` with the same allocator and layout.
unsafe fn free_array<A: RawAlloc>(alloc: &A, ptr: NonNull<u8>, layout: Layout) {
    if layout.size() != 0 {
        // SAFETY: Guaranteed by the caller.
        unsafe { alloc.deallocate(ptr, layout) }
    }
}

#[derive(Clone, Copy)]
struct Arrays {
    ctrl: NonNull<u8>,
    keys: NonNull<u8>,
    vals: NonNull<u8>,
}

/// Walks groups from the home bucket, wrapping around the capacity mask.
struct ProbeSeq {
    pos: usize,
}

impl ProbeSeq {
    #[inline(always)]
    fn move_next(&mut self, bucket_mask: usize) {
        self.pos = (self.pos + Group::WIDTH) & bucket_mask;
    }
}

/// Result of probing for a key that may need to be inserted.
pub(crate) enum Slot {
    /// The key lives at this index.
    Found(usize),
    /// The key is absent; this index is where it goes.
    Vacant { index: usize, tag: u8 },
}

/// Debug statistics for hash table analysis.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries.
    pub populated: usize,
    /// Number of slots.
    pub capacity: usize,
    /// Number of tombstones waiting for a rehash.
    pub tombstones: usize,
    /// Live entries divided by slots.
    pub load_factor: f64,
    /// Non-empty slots (live plus tombstones) divided by slots.
    pub slot_utilization: f64,
    /// Bytes held by the control, key and value arrays.
    pub total_bytes: usize,
    /// Bytes of those arrays not holding a live entry.
    pub wasted_bytes: usize,
}

#[cfg(feature = "stats")]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Swiss Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.populated,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Slot Usage: {} tombstones ({:.2}% of slots non-empty)",
            self.tombstones,
            self.slot_utilization * 100.0
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// How far live entries sit from their home bucket, counted in groups.
#[cfg(feature = "stats")]
#[derive(Debug, Clone, Default)]
pub struct ProbeHistogram {
    /// `counts[n]` is the number of entries found after `n` group steps.
    pub counts: alloc::vec::Vec<usize>,
}

#[cfg(feature = "stats")]
impl ProbeHistogram {
    /// Pretty-print the histogram.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let total: usize = self.counts.iter().sum();
        println!("=== Probe Length Histogram (groups of {}) ===", Group::WIDTH);
        for (steps, &count) in self.counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            println!(
                "{:>4}: {:>10} ({:.2}%)",
                steps,
                count,
                count as f64 / total.max(1) as f64 * 100.0
            );
        }
    }
}

/// An open-addressing hash table over fixed-size byte records.
///
/// Every key is `key_size` bytes and every value `val_size` bytes, both fixed
/// at construction. Keys are hashed with `H` and compared byte for byte. All
/// memory comes from `A` and goes back to it when the table is dropped.
///
/// The table grows by doubling before an insertion would take it to 80%
/// load. There is no shrinking.
///
/// ## Example
///
/// ```rust
/// use swiss_table::RawTable;
///
/// let mut table = RawTable::with_capacity(16, 8, 8);
///
/// let (value, inserted) = table.get_or_insert(&1u64.to_ne_bytes());
/// assert!(inserted);
/// value.copy_from_slice(&100u64.to_ne_bytes());
///
/// assert_eq!(table.find(&1u64.to_ne_bytes()), Some(&100u64.to_ne_bytes()[..]));
/// assert!(table.remove(&1u64.to_ne_bytes()));
/// assert_eq!(table.find(&1u64.to_ne_bytes()), None);
/// ```
pub struct RawTable<A: RawAlloc = Global, H: ByteHasher = Fnv1a> {
    arrays: Arrays,
    layout: DataLayout,

    key_record: Layout,
    val_record: Layout,
    key_size: usize,
    val_size: usize,

    capacity: usize,
    log2_capacity: u32,
    populated: usize,
    tombstones: usize,

    alloc: A,
    hasher: H,
}

// SAFETY: The table exclusively owns its arrays, which hold plain bytes.
unsafe impl<A: RawAlloc + Send, H: ByteHasher + Send> Send for RawTable<A, H> {}

// SAFETY: Shared access never writes through the arrays.
unsafe impl<A: RawAlloc + Sync, H: ByteHasher + Sync> Sync for RawTable<A, H> {}

impl<A: RawAlloc, H: ByteHasher> Debug for RawTable<A, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::vec::Vec;

        let ctrl = self.ctrl_bytes();
        f.debug_struct("RawTable")
            .field(
                "control",
                &ctrl[..self.capacity]
                    .chunks(Group::WIDTH)
                    .map(|group| {
                        group
                            .iter()
                            .map(|&byte| match byte {
                                EMPTY => String::from(".."),
                                DELETED => String::from("--"),
                                tag => format!("{tag:02x}"),
                            })
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("populated", &self.populated)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.capacity)
            .field("key_size", &self.key_size)
            .field("val_size", &self.val_size)
            .finish()
    }
}

impl<A: RawAlloc + Clone, H: ByteHasher + Clone> Clone for RawTable<A, H> {
    fn clone(&self) -> Self {
        let alloc = self.alloc.clone();
        let arrays = unwrap_reserve(self.layout.allocate(&alloc));

        // SAFETY: Both tables have the same layout, so every copy stays in
        // bounds. Only live key and value records are read.
        unsafe {
            ptr::copy_nonoverlapping(
                self.arrays.ctrl.as_ptr(),
                arrays.ctrl.as_ptr(),
                self.layout.ctrl.size(),
            );
            for index in 0..self.capacity {
                if control::is_full(*self.arrays.ctrl.as_ptr().add(index)) {
                    ptr::copy_nonoverlapping(
                        self.key_ptr(index),
                        arrays.keys.as_ptr().add(index * self.key_record.size()),
                        self.key_size,
                    );
                    ptr::copy_nonoverlapping(
                        self.val_ptr(index),
                        arrays.vals.as_ptr().add(index * self.val_record.size()),
                        self.val_size,
                    );
                }
            }
        }

        Self {
            arrays,
            layout: self.layout,
            key_record: self.key_record,
            val_record: self.val_record,
            key_size: self.key_size,
            val_size: self.val_size,
            capacity: self.capacity,
            log2_capacity: self.log2_capacity,
            populated: self.populated,
            tombstones: self.tombstones,
            alloc,
            hasher: self.hasher.clone(),
        }
    }
}

impl<A: RawAlloc, H: ByteHasher> Drop for RawTable<A, H> {
    fn drop(&mut self) {
        // SAFETY: The arrays were allocated from `self.alloc` with
        // `self.layout` and are not touched again.
        unsafe { self.layout.free(&self.alloc, self.arrays) }
    }
}

impl RawTable {
    /// Creates a table for `key_size`-byte keys and `val_size`-byte values
    /// with the minimum capacity, the global heap and FNV-1a.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::RawTable;
    /// #
    /// let table = RawTable::new(4, 12);
    /// assert_eq!(table.capacity(), 2);
    /// assert_eq!(table.key_size(), 4);
    /// assert!(table.is_empty());
    /// ```
    pub fn new(key_size: usize, val_size: usize) -> Self {
        Self::with_capacity(0, key_size, val_size)
    }

    /// Creates a table with room for `capacity` slots, rounded up to the next
    /// power of two (minimum 2).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::RawTable;
    /// #
    /// assert_eq!(RawTable::with_capacity(16, 8, 8).capacity(), 16);
    /// assert_eq!(RawTable::with_capacity(17, 8, 8).capacity(), 32);
    /// assert_eq!(RawTable::with_capacity(0, 8, 8).capacity(), 2);
    /// ```
    pub fn with_capacity(capacity: usize, key_size: usize, val_size: usize) -> Self {
        let record = |size| {
            unwrap_reserve(Layout::array::<u8>(size).map_err(|_| TryReserveError::CapacityOverflow))
        };
        Self::with_capacity_in(capacity, record(key_size), record(val_size), Global, Fnv1a)
    }
}

impl<A: RawAlloc, H: ByteHasher> RawTable<A, H> {
    /// Creates a table with the given record layouts, allocator and hasher.
    ///
    /// Key and value records are stored at their layout's alignment. Only
    /// `layout.size()` bytes of each record are compared, copied or exposed.
    ///
    /// Aborts through [`handle_alloc_error`] if the allocator fails.
    pub fn with_capacity_in(
        capacity: usize,
        key_layout: Layout,
        val_layout: Layout,
        alloc: A,
        hasher: H,
    ) -> Self {
        unwrap_reserve(Self::try_with_capacity_in(
            capacity, key_layout, val_layout, alloc, hasher,
        ))
    }

    /// Fallible version of [`with_capacity_in`](Self::with_capacity_in).
    pub fn try_with_capacity_in(
        capacity: usize,
        key_layout: Layout,
        val_layout: Layout,
        alloc: A,
        hasher: H,
    ) -> Result<Self, TryReserveError> {
        let capacity = capacity
            .max(2)
            .checked_next_power_of_two()
            .ok_or(TryReserveError::CapacityOverflow)?;
        let key_record = key_layout.pad_to_align();
        let val_record = val_layout.pad_to_align();
        let layout = DataLayout::new(capacity, key_record, val_record)?;
        let arrays = layout.allocate(&alloc)?;

        trace!(
            capacity,
            key_size = key_layout.size(),
            val_size = val_layout.size(),
            "created swiss table"
        );

        Ok(Self {
            arrays,
            layout,
            key_record,
            val_record,
            key_size: key_layout.size(),
            val_size: val_layout.size(),
            capacity,
            log2_capacity: capacity.trailing_zeros(),
            populated: 0,
            tombstones: 0,
            alloc,
            hasher,
        })
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots. Always a power of two, at least 2.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the fixed key width in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Returns the fixed value width in bytes.
    pub fn val_size(&self) -> usize {
        self.val_size
    }

    /// Returns the table's hasher.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Returns the table's allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline(always)]
    fn bucket_mask(&self) -> usize {
        self.capacity - 1
    }

    #[inline(always)]
    fn probe_seq(&self, hash: u64) -> ProbeSeq {
        ProbeSeq {
            pos: hash::bucket_index(hash, self.log2_capacity),
        }
    }

    fn ctrl_bytes(&self) -> &[u8] {
        // SAFETY: The control array is initialized for its whole layout.
        unsafe { slice::from_raw_parts(self.arrays.ctrl.as_ptr(), self.layout.ctrl.size()) }
    }

    /// # Safety
    ///
    /// `pos` must be less than the capacity.
    #[inline(always)]
    unsafe fn load_group(&self, pos: usize) -> Group {
        debug_assert!(pos < self.capacity);
        // SAFETY: `pos + Group::WIDTH <= capacity + Group::WIDTH`, the length
        // of the control array.
        unsafe { Group::load(self.arrays.ctrl.as_ptr().add(pos)) }
    }

    /// Writes a control byte and its mirrors in the trailing group.
    ///
    /// The array holds `capacity + WIDTH` bytes and byte `i` always equals
    /// byte `i & (capacity - 1)`, so a group loaded at any position below the
    /// capacity sees the wrapped slots. When the capacity is smaller than a
    /// group, a slot is mirrored more than once.
    ///
    /// # Safety
    ///
    /// `index` must be less than the capacity.
    #[inline(always)]
    unsafe fn set_ctrl(&mut self, index: usize, byte: u8) {
        debug_assert!(index < self.capacity);
        let ctrl = self.arrays.ctrl.as_ptr();
        let end = self.capacity + Group::WIDTH;
        let mut mirror = index;
        while mirror < end {
            // SAFETY: `mirror < end`, the length of the control array.
            unsafe { *ctrl.add(mirror) = byte };
            mirror += self.capacity;
        }
    }

    /// # Safety
    ///
    /// `index` must be less than the capacity.
    #[inline(always)]
    unsafe fn key_ptr(&self, index: usize) -> *mut u8 {
        // SAFETY: In bounds of the key array for `index < capacity`.
        unsafe { self.arrays.keys.as_ptr().add(index * self.key_record.size()) }
    }

    /// # Safety
    ///
    /// `index` must be less than the capacity.
    #[inline(always)]
    unsafe fn val_ptr(&self, index: usize) -> *mut u8 {
        // SAFETY: In bounds of the value array for `index < capacity`.
        unsafe { self.arrays.vals.as_ptr().add(index * self.val_record.size()) }
    }

    /// # Safety
    ///
    /// `index` must be a live slot.
    #[inline(always)]
    pub(crate) unsafe fn key_at(&self, index: usize) -> &[u8] {
        // SAFETY: Live slots hold `key_size` initialized key bytes.
        unsafe { slice::from_raw_parts(self.key_ptr(index), self.key_size) }
    }

    /// # Safety
    ///
    /// `index` must be a live slot.
    #[inline(always)]
    pub(crate) unsafe fn val_at(&self, index: usize) -> &[u8] {
        // SAFETY: Live slots hold `val_size` initialized value bytes.
        unsafe { slice::from_raw_parts(self.val_ptr(index), self.val_size) }
    }

    /// # Safety
    ///
    /// `index` must be a live slot.
    #[inline(always)]
    pub(crate) unsafe fn val_at_mut(&mut self, index: usize) -> &mut [u8] {
        // SAFETY: Live slots hold `val_size` initialized value bytes, and
        // `&mut self` makes the borrow unique.
        unsafe { slice::from_raw_parts_mut(self.val_ptr(index), self.val_size) }
    }

    #[inline(always)]
    fn check_key(&self, key: &[u8]) {
        assert_eq!(
            key.len(),
            self.key_size,
            "key is {} bytes but the table stores {}-byte keys",
            key.len(),
            self.key_size
        );
    }

    /// Returns the index of the live slot holding `key`.
    #[inline]
    fn find_index(&self, hash: u64, key: &[u8]) -> Option<usize> {
        let tag = hash::fragment(hash);
        let mask = self.bucket_mask();
        let mut probe = self.probe_seq(hash);

        loop {
            // SAFETY: Probe positions are always masked below the capacity.
            let group = unsafe { self.load_group(probe.pos) };

            for lane in group.match_byte(tag) {
                let index = (probe.pos + lane) & mask;
                // SAFETY: A fragment match means the slot is live.
                if unsafe { self.key_at(index) } == key {
                    return Some(index);
                }
            }

            // A key is always stored before the first empty slot of its probe
            // sequence, and deletions never create empty slots.
            if group.match_empty().any_bit_set() {
                return None;
            }

            probe.move_next(mask);
        }
    }

    /// Finds `key`, or the slot it should be inserted into.
    ///
    /// The insertion slot is the first empty or deleted lane in probe order,
    /// but the walk only stops at a group containing an empty lane, so a
    /// tombstone is never reused while the key might still live further on.
    #[inline]
    fn find_or_find_insert_slot(&self, hash: u64, key: &[u8]) -> Slot {
        let tag = hash::fragment(hash);
        let mask = self.bucket_mask();
        let mut probe = self.probe_seq(hash);
        let mut insert_slot = None;

        loop {
            // SAFETY: Probe positions are always masked below the capacity.
            let group = unsafe { self.load_group(probe.pos) };
            prefetch(
                self.arrays
                    .ctrl
                    .as_ptr()
                    .wrapping_add(probe.pos + Group::WIDTH),
            );

            for lane in group.match_byte(tag) {
                let index = (probe.pos + lane) & mask;
                // SAFETY: A fragment match means the slot is live.
                if unsafe { self.key_at(index) } == key {
                    return Slot::Found(index);
                }
            }

            if let Some(lane) = group.match_empty_or_deleted().lowest_set_bit() {
                let index = *insert_slot.get_or_insert((probe.pos + lane) & mask);
                if group.match_empty().any_bit_set() {
                    return Slot::Vacant { index, tag };
                }
            }

            probe.move_next(mask);
        }
    }

    /// First empty slot on the probe sequence of `hash`. Only valid while the
    /// table holds no tombstones on that sequence, i.e. during a rehash.
    #[inline]
    fn find_empty_slot(&self, hash: u64) -> usize {
        let mask = self.bucket_mask();
        let mut probe = self.probe_seq(hash);
        loop {
            // SAFETY: Probe positions are always masked below the capacity.
            let group = unsafe { self.load_group(probe.pos) };
            if let Some(lane) = group.match_empty().lowest_set_bit() {
                return (probe.pos + lane) & mask;
            }
            probe.move_next(mask);
        }
    }

    /// Claims a vacant slot for `key` and returns its zeroed value record.
    ///
    /// # Safety
    ///
    /// `index` and `tag` must come from a `Slot::Vacant` probed for `key` with
    /// no mutation of the table in between.
    pub(crate) unsafe fn insert_in_slot(&mut self, index: usize, tag: u8, key: &[u8]) -> &mut [u8] {
        debug_assert_eq!(key.len(), self.key_size);
        // SAFETY: `index` is below the capacity per the caller.
        unsafe {
            if *self.arrays.ctrl.as_ptr().add(index) == DELETED {
                self.tombstones -= 1;
            }
            self.set_ctrl(index, tag);
            ptr::copy_nonoverlapping(key.as_ptr(), self.key_ptr(index), self.key_size);
            self.val_ptr(index).write_bytes(0, self.val_size);
        }
        self.populated += 1;

        // SAFETY: The slot was just made live.
        unsafe { self.val_at_mut(index) }
    }

    /// Turns a live slot into a tombstone.
    ///
    /// # Safety
    ///
    /// `index` must be a live slot.
    pub(crate) unsafe fn erase(&mut self, index: usize) {
        // SAFETY: `index` is below the capacity per the caller.
        unsafe { self.set_ctrl(index, DELETED) };
        self.populated -= 1;
        self.tombstones += 1;
    }

    /// Grows or purges tombstones so one more slot can be claimed while an
    /// empty slot remains for every probe to stop at.
    #[inline]
    fn reserve_for_insert(&mut self) -> Result<(), TryReserveError> {
        if exceeds_load_factor(self.populated, self.capacity) {
            let capacity = self
                .capacity
                .checked_mul(2)
                .ok_or(TryReserveError::CapacityOverflow)?;
            self.resize(capacity)
        } else if exceeds_load_factor(self.populated + self.tombstones, self.capacity) {
            self.resize(self.capacity)
        } else {
            Ok(())
        }
    }

    /// Probes for `key` after making room for it. The returned slot stays
    /// valid until the next mutation.
    pub(crate) fn try_slot_for(&mut self, key: &[u8]) -> Result<Slot, TryReserveError> {
        self.check_key(key);
        self.reserve_for_insert()?;
        let hash = self.hasher.hash_bytes(key);
        Ok(self.find_or_find_insert_slot(hash, key))
    }

    /// Rebuilds the table with `capacity` slots, dropping all tombstones.
    ///
    /// The new arrays are allocated before the old ones are released, so the
    /// table is unchanged if allocation fails.
    #[cold]
    #[inline(never)]
    fn resize(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        let layout = DataLayout::new(capacity, self.key_record, self.val_record)?;
        let arrays = match layout.allocate(&self.alloc) {
            Ok(arrays) => arrays,
            Err(err) => {
                warn!(from = self.capacity, to = capacity, %err, "swiss table rehash failed");
                return Err(err);
            }
        };

        if capacity == self.capacity {
            debug!(
                capacity,
                len = self.populated,
                tombstones = self.tombstones,
                "purging swiss table tombstones"
            );
        } else {
            debug!(
                from = self.capacity,
                to = capacity,
                len = self.populated,
                "growing swiss table"
            );
        }

        let old_arrays = mem::replace(&mut self.arrays, arrays);
        let old_layout = mem::replace(&mut self.layout, layout);
        let old_capacity = mem::replace(&mut self.capacity, capacity);
        let old_populated = mem::replace(&mut self.populated, 0);
        self.log2_capacity = capacity.trailing_zeros();
        self.tombstones = 0;

        let key_stride = self.key_record.size();
        let val_stride = self.val_record.size();
        for old_index in 0..old_capacity {
            // SAFETY: `old_index` is below the old capacity, so every read
            // stays inside the old arrays, and the record is live.
            unsafe {
                if !control::is_full(*old_arrays.ctrl.as_ptr().add(old_index)) {
                    continue;
                }

                let key_src = old_arrays.keys.as_ptr().add(old_index * key_stride);
                let key = slice::from_raw_parts(key_src, self.key_size);
                let hash = self.hasher.hash_bytes(key);
                let index = self.find_empty_slot(hash);

                self.set_ctrl(index, hash::fragment(hash));
                ptr::copy_nonoverlapping(key_src, self.key_ptr(index), self.key_size);
                ptr::copy_nonoverlapping(
                    old_arrays.vals.as_ptr().add(old_index * val_stride),
                    self.val_ptr(index),
                    self.val_size,
                );
            }
            self.populated += 1;
        }
        debug_assert_eq!(self.populated, old_populated);

        // SAFETY: The old arrays came from `self.alloc` with `old_layout` and
        // have been fully moved out of.
        unsafe { old_layout.free(&self.alloc, old_arrays) };
        Ok(())
    }

    /// Looks up `key`, inserting it if absent, and returns its value record
    /// together with `true` if it was just inserted.
    ///
    /// A freshly inserted value is all zero bytes. The table may grow before
    /// probing, which moves every record, so the returned slice must not be
    /// relied on across later mutations.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not `key_size` bytes long. Aborts through
    /// [`handle_alloc_error`] if growing fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::RawTable;
    /// #
    /// let mut table = RawTable::new(2, 4);
    ///
    /// let (value, inserted) = table.get_or_insert(b"hi");
    /// assert!(inserted);
    /// assert_eq!(value, &[0, 0, 0, 0]);
    /// value.copy_from_slice(b"abcd");
    ///
    /// let (value, inserted) = table.get_or_insert(b"hi");
    /// assert!(!inserted);
    /// assert_eq!(value, b"abcd");
    /// ```
    pub fn get_or_insert(&mut self, key: &[u8]) -> (&mut [u8], bool) {
        unwrap_reserve(self.try_get_or_insert(key))
    }

    /// Fallible version of [`get_or_insert`](Self::get_or_insert). On error
    /// the table is left as it was.
    pub fn try_get_or_insert(&mut self, key: &[u8]) -> Result<(&mut [u8], bool), TryReserveError> {
        match self.try_slot_for(key)? {
            // SAFETY: `index` is a live slot.
            Slot::Found(index) => Ok((unsafe { self.val_at_mut(index) }, false)),
            // SAFETY: The slot was just probed for `key`.
            Slot::Vacant { index, tag } => Ok((unsafe { self.insert_in_slot(index, tag, key) }, true)),
        }
    }

    /// Returns the value record of `key`, if present. Never mutates or grows
    /// the table.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not `key_size` bytes long.
    #[inline]
    pub fn find(&self, key: &[u8]) -> Option<&[u8]> {
        self.check_key(key);
        if self.populated == 0 {
            return None;
        }

        let hash = self.hasher.hash_bytes(key);
        let index = self.find_index(hash, key)?;
        // SAFETY: `find_index` only returns live slots.
        Some(unsafe { self.val_at(index) })
    }

    /// Returns the value record of `key` for modification, if present.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not `key_size` bytes long.
    #[inline]
    pub fn find_mut(&mut self, key: &[u8]) -> Option<&mut [u8]> {
        self.check_key(key);
        if self.populated == 0 {
            return None;
        }

        let hash = self.hasher.hash_bytes(key);
        let index = self.find_index(hash, key)?;
        // SAFETY: `find_index` only returns live slots.
        Some(unsafe { self.val_at_mut(index) })
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Removes `key`, returning `true` if it was present.
    ///
    /// The slot becomes a tombstone; its value bytes are left in place but
    /// are never visible through the table again.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::RawTable;
    /// #
    /// let mut table = RawTable::new(1, 1);
    /// table.get_or_insert(b"k").0.copy_from_slice(b"v");
    ///
    /// assert!(table.remove(b"k"));
    /// assert!(!table.remove(b"k"));
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.take(key).is_some()
    }

    /// Removes `key` and returns the value record it held.
    ///
    /// The returned bytes stay readable until the table is next mutated.
    pub fn take(&mut self, key: &[u8]) -> Option<&[u8]> {
        self.check_key(key);
        if self.populated == 0 {
            return None;
        }

        let hash = self.hasher.hash_bytes(key);
        let index = self.find_index(hash, key)?;
        // SAFETY: `find_index` only returns live slots. Erasing only rewrites
        // the control byte, so the value bytes are still initialized.
        unsafe {
            self.erase(index);
            Some(slice::from_raw_parts(self.val_ptr(index), self.val_size))
        }
    }

    /// Removes every entry, keeping the allocated capacity.
    pub fn clear(&mut self) {
        // SAFETY: The control array is valid for its whole layout.
        unsafe {
            self.arrays
                .ctrl
                .as_ptr()
                .write_bytes(EMPTY, self.layout.ctrl.size());
        }
        self.populated = 0;
        self.tombstones = 0;
    }

    /// Makes room for at least `additional` more entries without rehashing.
    ///
    /// Aborts through [`handle_alloc_error`] if the allocator fails.
    pub fn reserve(&mut self, additional: usize) {
        unwrap_reserve(self.try_reserve(additional))
    }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let required = self
            .populated
            .checked_add(additional)
            .ok_or(TryReserveError::CapacityOverflow)?;
        let capacity = capacity_for_len(required)?;
        if capacity > self.capacity {
            self.resize(capacity)
        } else if additional > 0 && exceeds_load_factor(required - 1 + self.tombstones, self.capacity) {
            self.resize(self.capacity)
        } else {
            Ok(())
        }
    }

    /// Returns an iterator over live `(key, value)` records in slot order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::RawTable;
    /// #
    /// let mut table = RawTable::new(1, 1);
    /// for byte in 0u8..10 {
    ///     table.get_or_insert(&[byte]).0[0] = byte * 2;
    /// }
    ///
    /// let mut pairs: Vec<(u8, u8)> = table.iter().map(|(k, v)| (k[0], v[0])).collect();
    /// pairs.sort();
    /// assert_eq!(pairs[3], (3, 6));
    /// assert_eq!(pairs.len(), 10);
    /// ```
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            raw: self.raw_iter(),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over live records with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_> {
        IterMut {
            raw: self.raw_iter(),
            _marker: PhantomData,
        }
    }

    fn raw_iter(&self) -> RawIter {
        RawIter {
            arrays: self.arrays,
            key_stride: self.key_record.size(),
            val_stride: self.val_record.size(),
            key_size: self.key_size,
            val_size: self.val_size,
            capacity: self.capacity,
            index: 0,
            remaining: self.populated,
        }
    }

    /// Collects statistics about the current state of the table.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> DebugStats {
        let total_bytes = self.layout.total_bytes();
        let live_bytes = self.populated * (1 + self.key_record.size() + self.val_record.size());
        DebugStats {
            populated: self.populated,
            capacity: self.capacity,
            tombstones: self.tombstones,
            load_factor: self.populated as f64 / self.capacity as f64,
            slot_utilization: (self.populated + self.tombstones) as f64 / self.capacity as f64,
            total_bytes,
            wasted_bytes: total_bytes - live_bytes,
        }
    }

    /// Counts, for every live entry, how many groups past its home bucket a
    /// lookup has to step before reaching it.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mut histogram = ProbeHistogram::default();
        let mask = self.bucket_mask();
        for index in 0..self.capacity {
            // SAFETY: `index` is below the capacity.
            if !control::is_full(unsafe { *self.arrays.ctrl.as_ptr().add(index) }) {
                continue;
            }
            // SAFETY: The slot is live.
            let hash = self.hasher.hash_bytes(unsafe { self.key_at(index) });
            let home = hash::bucket_index(hash, self.log2_capacity);
            let steps = ((index.wrapping_sub(home)) & mask) / Group::WIDTH;
            if histogram.counts.len() <= steps {
                histogram.counts.resize(steps + 1, 0);
            }
            histogram.counts[steps] += 1;
        }
        histogram
    }
}

/// Pointer-based scan over live slots shared by [`Iter`] and [`IterMut`].
struct RawIter {
    arrays: Arrays,
    key_stride: usize,
    val_stride: usize,
    key_size: usize,
    val_size: usize,
    capacity: usize,
    index: usize,
    remaining: usize,
}

impl RawIter {
    /// Returns pointers to the next live key and value records.
    #[inline]
    fn next(&mut self) -> Option<(*const u8, *mut u8)> {
        if self.remaining == 0 {
            return None;
        }

        while self.index < self.capacity {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is below the capacity, so all three pointers
            // are in bounds.
            unsafe {
                if control::is_full(*self.arrays.ctrl.as_ptr().add(index)) {
                    self.remaining -= 1;
                    return Some((
                        self.arrays.keys.as_ptr().add(index * self.key_stride),
                        self.arrays.vals.as_ptr().add(index * self.val_stride),
                    ));
                }
            }
        }

        None
    }
}

/// An iterator over the live records of a [`RawTable`].
///
/// This struct is created by [`RawTable::iter`].
pub struct Iter<'a> {
    raw: RawIter,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (key, val) = self.raw.next()?;
        // SAFETY: The records are live and the table is borrowed for `'a`.
        unsafe {
            Some((
                slice::from_raw_parts(key, self.raw.key_size),
                slice::from_raw_parts(val, self.raw.val_size),
            ))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining, Some(self.raw.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}
impl FusedIterator for Iter<'_> {}

/// An iterator over the live records of a [`RawTable`] with mutable values.
///
/// This struct is created by [`RawTable::iter_mut`].
pub struct IterMut<'a> {
    raw: RawIter,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> Iterator for IterMut<'a> {
    type Item = (&'a [u8], &'a mut [u8]);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (key, val) = self.raw.next()?;
        // SAFETY: The records are live, each slot is yielded once, and the
        // table is mutably borrowed for `'a`.
        unsafe {
            Some((
                slice::from_raw_parts(key, self.raw.key_size),
                slice::from_raw_parts_mut(val, self.raw.val_size),
            ))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining, Some(self.raw.remaining))
    }
}

impl ExactSizeIterator for IterMut<'_> {}
impl FusedIterator for IterMut<'_> {}
