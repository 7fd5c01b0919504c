use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use bytemuck::Pod;

use crate::allocator::Global;
use crate::allocator::RawAlloc;
use crate::error::TryReserveError;
use crate::hash::ByteHasher;
use crate::hash::Fnv1a;
use crate::raw_table;
use crate::raw_table::RawTable;
use crate::raw_table::Slot;

/// A typed map over a [`RawTable`].
///
/// Keys and values are plain-old-data types. A key is hashed and compared by
/// its bytes, so two keys are equal exactly when their byte representations
/// are. Types with padding cannot be [`Pod`] and are therefore rejected.
///
/// # Performance Characteristics
///
/// - **Memory**: 1 control byte per slot plus `size_of::<K>()` and
///   `size_of::<V>()` per slot, rounded to their alignment
/// - **Load**: below 80% live entries, doubling on growth
///
/// # Examples
///
/// ```rust
/// use swiss_table::SwissMap;
///
/// let mut map: SwissMap<u32, f64> = SwissMap::new();
/// map.insert(7, 0.5);
/// *map.entry(7).or_default() += 1.0;
/// *map.entry(8).or_default() += 1.0;
///
/// assert_eq!(map.get(&7), Some(&1.5));
/// assert_eq!(map.get(&8), Some(&1.0));
/// assert_eq!(map.len(), 2);
/// ```
pub struct SwissMap<K, V, A: RawAlloc = Global, H: ByteHasher = Fnv1a> {
    table: RawTable<A, H>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, A, H> Debug for SwissMap<K, V, A, H>
where
    K: Pod + Debug,
    V: Pod + Debug,
    A: RawAlloc,
    H: ByteHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, A, H> Clone for SwissMap<K, V, A, H>
where
    A: RawAlloc + Clone,
    H: ByteHasher + Clone,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K: Pod, V: Pod> SwissMap<K, V> {
    /// Creates an empty map on the global heap with the FNV-1a hasher.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with at least `capacity` slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::SwissMap;
    /// #
    /// let map: SwissMap<u64, u64> = SwissMap::with_capacity(100);
    /// assert_eq!(map.capacity(), 128);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global, Fnv1a)
    }
}

impl<K: Pod, V: Pod> Default for SwissMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, A, H> SwissMap<K, V, A, H>
where
    K: Pod,
    V: Pod,
    A: RawAlloc,
    H: ByteHasher,
{
    /// Creates an empty map with the given allocator and hasher.
    pub fn with_capacity_in(capacity: usize, alloc: A, hasher: H) -> Self {
        Self {
            table: RawTable::with_capacity_in(
                capacity,
                Layout::new::<K>(),
                Layout::new::<V>(),
                alloc,
                hasher,
            ),
            _marker: PhantomData,
        }
    }

    /// Fallible version of [`with_capacity_in`](Self::with_capacity_in).
    pub fn try_with_capacity_in(capacity: usize, alloc: A, hasher: H) -> Result<Self, TryReserveError> {
        Ok(Self {
            table: RawTable::try_with_capacity_in(
                capacity,
                Layout::new::<K>(),
                Layout::new::<V>(),
                alloc,
                hasher,
            )?,
            _marker: PhantomData,
        })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the underlying table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every entry, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Makes room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table.try_reserve(additional)
    }

    /// Returns the underlying byte table.
    pub fn as_raw(&self) -> &RawTable<A, H> {
        &self.table
    }

    /// Inserts a key-value pair, returning the previous value if the key was
    /// already present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::SwissMap;
    /// #
    /// let mut map: SwissMap<u8, u16> = SwissMap::new();
    /// assert_eq!(map.insert(1, 10), None);
    /// assert_eq!(map.insert(1, 20), Some(10));
    /// assert_eq!(map.get(&1), Some(&20));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Some(entry.insert(value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Returns the value for `key`, inserting a zeroed value first if the key
    /// is absent. The flag is `true` if the key was inserted.
    pub fn get_or_insert(&mut self, key: K) -> (&mut V, bool) {
        let (value, inserted) = self.table.get_or_insert(bytemuck::bytes_of(&key));
        (bytemuck::from_bytes_mut(value), inserted)
    }

    /// Returns a reference to the value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.table
            .find(bytemuck::bytes_of(key))
            .map(bytemuck::from_bytes)
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.table
            .find_mut(bytemuck::bytes_of(key))
            .map(bytemuck::from_bytes_mut)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table.contains(bytemuck::bytes_of(key))
    }

    /// Removes `key`, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::SwissMap;
    /// #
    /// let mut map: SwissMap<u64, u64> = SwissMap::new();
    /// map.insert(3, 9);
    /// assert_eq!(map.remove(&3), Some(9));
    /// assert_eq!(map.remove(&3), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.table
            .take(bytemuck::bytes_of(key))
            .map(bytemuck::pod_read_unaligned)
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// Room for one more entry is made up front, so a vacant entry never
    /// needs to grow the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::SwissMap;
    /// #
    /// let mut counts: SwissMap<u8, u32> = SwissMap::new();
    /// for byte in b"hello" {
    ///     counts.entry(*byte).and_modify(|n| *n += 1).or_insert(1);
    /// }
    /// assert_eq!(counts.get(&b'l'), Some(&2));
    /// assert_eq!(counts.get(&b'h'), Some(&1));
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, A, H> {
        match raw_table::unwrap_reserve(self.table.try_slot_for(bytemuck::bytes_of(&key))) {
            Slot::Found(index) => Entry::Occupied(OccupiedEntry {
                table: &mut self.table,
                index,
                _marker: PhantomData,
            }),
            Slot::Vacant { index, tag } => Entry::Vacant(VacantEntry {
                table: &mut self.table,
                index,
                tag,
                key,
                _marker: PhantomData,
            }),
        }
    }

    /// Returns an iterator over the entries in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over the entries with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_table::SwissMap;
    /// #
    /// let mut map: SwissMap<u32, u32> = (0..10).map(|k| (k, k)).collect();
    /// for value in map.values_mut() {
    ///     *value *= 3;
    /// }
    /// assert_eq!(map.get(&4), Some(&12));
    /// ```
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
}

impl<K, V, A, H> Extend<(K, V)> for SwissMap<K, V, A, H>
where
    K: Pod,
    V: Pod,
    A: RawAlloc,
    H: ByteHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Pod, V: Pod> FromIterator<(K, V)> for SwissMap<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`SwissMap`].
///
/// [`entry`]: SwissMap::entry
pub enum Entry<'a, K, V, A: RawAlloc = Global, H: ByteHasher = Fnv1a> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, A, H>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, A, H>),
}

impl<'a, K, V, A, H> Entry<'a, K, V, A, H>
where
    K: Pod,
    V: Pod,
    A: RawAlloc,
    H: ByteHasher,
{
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts a value computed from a closure if the entry is vacant and
    /// returns a mutable reference to the value.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Inserts an all-zero value if the entry is vacant.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(V::zeroed)
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V, A: RawAlloc = Global, H: ByteHasher = Fnv1a> {
    table: &'a mut RawTable<A, H>,
    index: usize,
    tag: u8,
    key: K,
    _marker: PhantomData<V>,
}

impl<'a, K, V, A, H> VacantEntry<'a, K, V, A, H>
where
    K: Pod,
    V: Pod,
    A: RawAlloc,
    H: ByteHasher,
{
    /// Gets a reference to the key that would be used when inserting.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let Self {
            table,
            index,
            tag,
            key,
            ..
        } = self;
        // SAFETY: The slot was probed for this key and the exclusive borrow
        // has kept the table unchanged since.
        let slot = unsafe { table.insert_in_slot(index, tag, bytemuck::bytes_of(&key)) };
        let slot: &'a mut V = bytemuck::from_bytes_mut(slot);
        *slot = value;
        slot
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V, A: RawAlloc = Global, H: ByteHasher = Fnv1a> {
    table: &'a mut RawTable<A, H>,
    index: usize,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K, V, A, H> OccupiedEntry<'a, K, V, A, H>
where
    K: Pod,
    V: Pod,
    A: RawAlloc,
    H: ByteHasher,
{
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        // SAFETY: `index` is live for as long as the entry exists.
        bytemuck::from_bytes(unsafe { self.table.key_at(self.index) })
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: `index` is live for as long as the entry exists.
        bytemuck::from_bytes(unsafe { self.table.val_at(self.index) })
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: `index` is live for as long as the entry exists.
        bytemuck::from_bytes_mut(unsafe { self.table.val_at_mut(self.index) })
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        let table = self.table;
        // SAFETY: `index` is live and the table stays borrowed for `'a`.
        bytemuck::from_bytes_mut(unsafe { table.val_at_mut(self.index) })
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry from the map and returns the value.
    pub fn remove(self) -> V {
        let value = *self.get();
        // SAFETY: `index` is live and is not used after this.
        unsafe { self.table.erase(self.index) };
        value
    }
}

/// An iterator over the entries of a [`SwissMap`].
pub struct Iter<'a, K, V> {
    inner: raw_table::Iter<'a>,
    _marker: PhantomData<&'a (K, V)>,
}

impl<'a, K: Pod, V: Pod> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (bytemuck::from_bytes(k), bytemuck::from_bytes(v)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: Pod, V: Pod> ExactSizeIterator for Iter<'_, K, V> {}
impl<K: Pod, V: Pod> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the entries of a [`SwissMap`] with mutable values.
pub struct IterMut<'a, K, V> {
    inner: raw_table::IterMut<'a>,
    _marker: PhantomData<&'a mut (K, V)>,
}

impl<'a, K: Pod, V: Pod> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (bytemuck::from_bytes(k), bytemuck::from_bytes_mut(v)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: Pod, V: Pod> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K: Pod, V: Pod> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`SwissMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K: Pod, V: Pod> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`SwissMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K: Pod, V: Pod> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// A mutable iterator over the values of a [`SwissMap`].
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K: Pod, V: Pod> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use bytemuck::Pod;
    use bytemuck::Zeroable;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::allocator::tests::TrackingAlloc;

    #[derive(Clone)]
    struct SipBytes {
        k0: u64,
        k1: u64,
    }

    impl Default for SipBytes {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap_or(0),
                k1: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    impl ByteHasher for SipBytes {
        fn hash_bytes(&self, bytes: &[u8]) -> u64 {
            let mut hasher = SipHasher::new_with_keys(self.k0, self.k1);
            hasher.write(bytes);
            hasher.finish()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Stats {
        hits: u64,
        weight: f64,
    }

    #[test]
    fn insert_get_remove() {
        let mut map = SwissMap::<u64, u32, _, _>::with_capacity_in(0, Global, SipBytes::default());

        assert_eq!(map.insert(1, 10), None);
        assert_eq!(map.insert(2, 20), None);
        assert_eq!(map.insert(1, 11), Some(10));
        assert_eq!(map.len(), 2);

        assert_eq!(map.get(&1), Some(&11));
        assert_eq!(map.get(&3), None);
        assert!(map.contains_key(&2));

        assert_eq!(map.remove(&2), Some(20));
        assert_eq!(map.remove(&2), None);
        assert!(!map.contains_key(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn struct_keys_and_values() {
        let mut map: SwissMap<Point, Stats> = SwissMap::new();
        for x in -10..10 {
            for y in -10..10 {
                map.insert(Point { x, y }, Stats {
                    hits: (x * y).unsigned_abs() as u64,
                    weight: x as f64 / 2.0,
                });
            }
        }
        assert_eq!(map.len(), 400);
        assert_eq!(
            map.get(&Point { x: -3, y: 4 }),
            Some(&Stats {
                hits: 12,
                weight: -1.5
            })
        );

        map.get_mut(&Point { x: 0, y: 0 }).unwrap().hits = 99;
        assert_eq!(map.get(&Point { x: 0, y: 0 }).unwrap().hits, 99);
    }

    #[test]
    fn get_or_insert_zeroes_new_values() {
        let mut map: SwissMap<u32, Stats> = SwissMap::new();
        let (stats, inserted) = map.get_or_insert(5);
        assert!(inserted);
        assert_eq!(*stats, Stats::zeroed());
        stats.hits = 3;

        let (stats, inserted) = map.get_or_insert(5);
        assert!(!inserted);
        assert_eq!(stats.hits, 3);
    }

    #[test]
    fn entry_api() {
        let mut map: SwissMap<u16, u64> = SwissMap::new();

        match map.entry(1) {
            Entry::Vacant(entry) => {
                assert_eq!(*entry.key(), 1);
                *entry.insert(100) += 1;
            }
            Entry::Occupied(_) => panic!("Expected vacant entry"),
        }
        assert_eq!(map.get(&1), Some(&101));

        match map.entry(1) {
            Entry::Occupied(mut entry) => {
                assert_eq!(*entry.key(), 1);
                assert_eq!(*entry.get(), 101);
                assert_eq!(entry.insert(5), 101);
                *entry.get_mut() += 1;
                assert_eq!(*entry.get(), 6);
            }
            Entry::Vacant(_) => panic!("Expected occupied entry"),
        }

        match map.entry(1) {
            Entry::Occupied(entry) => assert_eq!(entry.remove(), 6),
            Entry::Vacant(_) => panic!("Expected occupied entry"),
        }
        assert!(map.is_empty());

        assert_eq!(*map.entry(2).or_insert_with(|| 7), 7);
        assert_eq!(*map.entry(2).or_insert(8), 7);
        assert_eq!(*map.entry(3).or_default(), 0);
        assert_eq!(map.entry(9).key(), &9);
        match map.entry(10) {
            Entry::Vacant(entry) => assert_eq!(entry.into_key(), 10),
            Entry::Occupied(_) => panic!("Expected vacant entry"),
        }
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn entry_through_growth() {
        let mut map: SwissMap<u32, u32> = SwissMap::with_capacity(2);
        for k in 0..1000 {
            *map.entry(k % 250).or_default() += 1;
        }
        assert_eq!(map.len(), 250);
        assert!(map.values().all(|&count| count == 4));
    }

    #[test]
    fn iterators() {
        let mut map: SwissMap<u32, u32> = (0..50).map(|k| (k, k * k)).collect();
        assert_eq!(map.iter().len(), 50);

        let mut keys: Vec<u32> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..50).collect::<Vec<_>>());

        let total: u32 = map.values().sum();
        assert_eq!(total, (0..50).map(|k| k * k).sum());

        for (k, v) in map.iter_mut() {
            *v -= k * k;
        }
        assert!(map.values().all(|&v| v == 0));
    }

    #[test]
    fn extend_and_clear() {
        let mut map: SwissMap<u64, u64> = SwissMap::new();
        map.extend((0..100).map(|k| (k, k + 1)));
        map.extend((50..150).map(|k| (k, 0)));
        assert_eq!(map.len(), 150);
        assert_eq!(map.get(&10), Some(&11));
        assert_eq!(map.get(&60), Some(&0));

        let capacity = map.capacity();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
    }

    #[test]
    fn clone_and_debug() {
        let mut map: SwissMap<u8, u8> = SwissMap::new();
        map.insert(1, 2);
        let copy = map.clone();
        map.insert(1, 3);

        assert_eq!(copy.get(&1), Some(&2));
        assert_eq!(format!("{copy:?}"), "{1: 2}");
    }

    #[test]
    fn unit_values_act_as_a_set() {
        let mut set: SwissMap<u64, ()> = SwissMap::new();
        for k in [3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5] {
            set.insert(k, ());
        }
        assert_eq!(set.len(), 7);
        assert!(set.contains_key(&9));
        assert!(!set.contains_key(&7));
    }

    #[test]
    fn custom_allocator_is_released() {
        let tracker = TrackingAlloc::new();
        {
            let mut map = SwissMap::<u32, u32, _, _>::with_capacity_in(0, &tracker, Fnv1a);
            for k in 0..300 {
                map.insert(k, k);
            }
            assert_eq!(tracker.live.get(), 3);
        }
        assert_eq!(tracker.live.get(), 0);
    }

    #[test]
    fn try_constructor_reports_failure() {
        let tracker = TrackingAlloc::new();
        tracker.fail_after(1);
        let result = SwissMap::<u32, u32, _, _>::try_with_capacity_in(64, &tracker, Fnv1a);
        assert!(matches!(result, Err(TryReserveError::AllocError { .. })));
        assert_eq!(tracker.live.get(), 0);
    }
}
