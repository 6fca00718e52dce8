use crate::codec::{MapKey, MapValue};
use crate::error::MapError;
use crate::layout::{
    bucket, calc_threshold, capacity_to_power_of_two, read_flag, write_flag, DEFAULT_LOAD_FACTOR,
    DELETED_FLAG, FLAG_SIZE, GENERATION_MASK, MAX_CAPACITY,
};
use std::ops::Range;

/// Open-addressed hash table with opaque keys, stored inline in one
/// contiguous byte slab.
///
/// The key is any [`MapKey`]: it serializes itself into the slot's key bytes
/// and compares itself against a serialized key in place, so the probe loop
/// never materializes stored keys. Each slot is
/// `[key: key_size bytes | flag: 2 bytes | value: data_size bytes]`.
///
/// Probing, growth, tombstones and generation-tagged clear behave exactly as
/// in [`IntKeyMap`](crate::IntKeyMap); only the key path differs.
pub struct LhMap<K: MapKey> {
    threshold: usize,
    capacity: usize,
    item_size: usize,
    data_size: usize,
    key_size: usize,
    header_size: usize,
    data: Box<[u8]>,
    live_items: usize,
    allocated_items: usize,
    generation: u16,
    /// Prototype key: fixes `key_size` at construction and is cloned into a
    /// scratch key when rehash needs to re-read stored keys.
    key_proto: K,
}

impl<K: MapKey> LhMap<K> {
    /// Creates a map whose key layout is taken from `key_proto` and which
    /// reserves `data_size` bytes per value.
    ///
    /// `initial_capacity` is rounded up to the next power of two in
    /// `[8, 2^30]`.
    ///
    /// # Panics
    ///
    /// Panics if `initial_capacity` exceeds 2^30.
    pub fn new(key_proto: K, data_size: usize, initial_capacity: usize) -> Self {
        let capacity = capacity_to_power_of_two(initial_capacity);
        let key_size = key_proto.size();
        let header_size = key_size + FLAG_SIZE;
        let item_size = header_size + data_size;

        Self {
            threshold: calc_threshold(capacity, DEFAULT_LOAD_FACTOR),
            capacity,
            item_size,
            data_size,
            key_size,
            header_size,
            data: vec![0u8; capacity * item_size].into_boxed_slice(),
            live_items: 0,
            allocated_items: 0,
            generation: 1,
            key_proto,
        }
    }

    // ---------------------------------------------------------------------
    // SLOT ACCESS
    // ---------------------------------------------------------------------

    #[inline]
    fn shift(&self, index: usize) -> usize {
        index * self.item_size
    }

    #[inline]
    fn key_range(&self, index: usize) -> Range<usize> {
        let start = self.shift(index);
        start..start + self.key_size
    }

    #[inline]
    fn flag_at(&self, index: usize) -> u16 {
        read_flag(&self.data, self.shift(index) + self.key_size)
    }

    #[inline]
    fn set_flag(&mut self, index: usize, flag: u16) {
        let off = self.shift(index) + self.key_size;
        write_flag(&mut self.data, off, flag);
    }

    #[inline]
    fn value_range(&self, index: usize) -> Range<usize> {
        let start = self.shift(index) + self.header_size;
        start..start + self.data_size
    }

    #[inline]
    fn is_live(&self, index: usize) -> bool {
        let f = self.flag_at(index);
        f & DELETED_FLAG == 0 && f & GENERATION_MASK == self.generation
    }

    // ---------------------------------------------------------------------
    // PROBING
    // ---------------------------------------------------------------------

    /// Same contract as `IntKeyMap::find_slot`: `(index, true)` for a live
    /// match, `(index, false)` for the insertion point, `None` when the whole
    /// table was probed. Tombstones are probed past, never matched.
    fn find_slot(&self, key: &K) -> Option<(usize, bool)> {
        let mut index = bucket(key.hash(), self.capacity);

        for _ in 0..self.capacity {
            let f = self.flag_at(index);
            if f & DELETED_FLAG == 0 {
                if f & GENERATION_MASK != self.generation {
                    return Some((index, false));
                }
                if key.equals(&self.data[self.key_range(index)]) {
                    return Some((index, true));
                }
            }

            index += 1;
            if index >= self.capacity {
                index = 0;
            }
        }
        None
    }

    fn ensure_capacity(&mut self, new_count: usize) -> Result<(), MapError> {
        if new_count > MAX_CAPACITY {
            return Err(MapError::CapacityExceeded);
        }
        if new_count <= self.threshold {
            return Ok(());
        }
        if self.capacity >= MAX_CAPACITY {
            return Err(MapError::CapacityExceeded);
        }
        self.rehash(self.capacity << 1);
        Ok(())
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old_capacity = self.capacity;
        let old_data = std::mem::replace(
            &mut self.data,
            vec![0u8; new_capacity * self.item_size].into_boxed_slice(),
        );

        self.capacity = new_capacity;
        self.threshold = calc_threshold(new_capacity, DEFAULT_LOAD_FACTOR);

        // One scratch key per rehash, reused for every stored key.
        let mut scratch = self.key_proto.clone();

        for i in 0..old_capacity {
            let off = i * self.item_size;
            let f = read_flag(&old_data, off + self.key_size);
            let live = f & DELETED_FLAG == 0 && f & GENERATION_MASK == self.generation;
            if !live {
                continue;
            }

            scratch.read_from(&old_data[off..off + self.key_size]);
            let Some((idx, _)) = self.find_slot(&scratch) else {
                panic!("rehash found no free slot; slab state is corrupt");
            };
            let dst = self.shift(idx);
            self.data[dst..dst + self.item_size]
                .copy_from_slice(&old_data[off..off + self.item_size]);
        }

        self.allocated_items = self.live_items;
    }

    fn find_or_insert_slot(&mut self, key: &K) -> Result<(usize, bool), MapError> {
        self.ensure_capacity(self.allocated_items + 1)?;
        match self.find_slot(key) {
            Some(r) => Ok(r),
            None => panic!("probe failed after ensure_capacity; slab state is corrupt"),
        }
    }

    // ---------------------------------------------------------------------
    // PUBLIC API
    // ---------------------------------------------------------------------

    /// Stores `value` under `key`, overwriting any prior live entry. Grows by
    /// doubling at the load-factor threshold.
    pub fn try_put<V: MapValue>(&mut self, key: &K, value: &V) -> Result<(), MapError> {
        debug_assert_eq!(
            key.size(),
            self.key_size,
            "key footprint does not match the map's prototype"
        );
        debug_assert_eq!(
            value.size(),
            self.data_size,
            "value footprint does not match the map's data_size"
        );

        let (index, found) = self.find_or_insert_slot(key)?;
        if !found {
            self.live_items += 1;
            self.allocated_items += 1;
            let kr = self.key_range(index);
            key.write_to(&mut self.data[kr]);
            self.set_flag(index, self.generation);
        }

        let r = self.value_range(index);
        value.write_to(&mut self.data[r]);
        Ok(())
    }

    /// Panicking variant of [`try_put`](Self::try_put).
    pub fn put<V: MapValue>(&mut self, key: &K, value: &V) {
        if let Err(e) = self.try_put(key, value) {
            panic!("LhMap::put: {e}");
        }
    }

    /// Fills `value` from the live entry for `key`; `false` when absent.
    pub fn get<V: MapValue>(&self, key: &K, value: &mut V) -> bool {
        match self.find_slot(key) {
            Some((index, true)) => {
                let r = self.value_range(index);
                value.read_from(&self.data[r]);
                true
            }
            _ => false,
        }
    }

    /// Presence probe without deserializing the value.
    pub fn contains(&self, key: &K) -> bool {
        matches!(self.find_slot(key), Some((_, true)))
    }

    /// Tombstones the entry for `key`; `true` iff a live entry was removed.
    pub fn del(&mut self, key: &K) -> bool {
        match self.find_slot(key) {
            Some((index, true)) => {
                let f = self.flag_at(index);
                self.set_flag(index, f | DELETED_FLAG);
                self.live_items -= 1;
                true
            }
            _ => false,
        }
    }

    /// O(1) logical clear via generation bump; physical zeroing only on
    /// 15-bit wrap.
    pub fn clear(&mut self) {
        self.generation = (self.generation + 1) & GENERATION_MASK;
        self.live_items = 0;
        self.allocated_items = 0;

        if self.generation == 0 {
            self.data.fill(0);
            self.generation = 1;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live_items
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_items == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ---------------------------------------------------------------------
    // TRAVERSAL
    // ---------------------------------------------------------------------

    /// Visits every live slot in physical order as
    /// `(slot index, key bytes, value bytes)`.
    pub fn visit_all<F>(&self, mut visitor: F)
    where
        F: FnMut(usize, &[u8], &[u8]),
    {
        for i in 0..self.capacity {
            if self.is_live(i) {
                visitor(i, &self.data[self.key_range(i)], &self.data[self.value_range(i)]);
            }
        }
    }

    /// Visits up to `count` live slots starting at physical index `start`;
    /// returns the resume index, or 0 when exhausted.
    pub fn visit<F>(&self, start: usize, count: usize, mut visitor: F) -> usize
    where
        F: FnMut(usize, &[u8], &[u8]),
    {
        if start >= self.capacity {
            return 0;
        }

        let mut visited = 0;
        let mut i = start;
        while i < self.capacity && visited < count {
            if self.is_live(i) {
                visitor(i, &self.data[self.key_range(i)], &self.data[self.value_range(i)]);
                visited += 1;
            }
            i += 1;
        }

        if i == self.capacity {
            0
        } else {
            i
        }
    }
}

impl<K: MapKey> std::fmt::Debug for LhMap<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LhMap")
            .field("len", &self.live_items)
            .field("allocated", &self.allocated_items)
            .field("capacity", &self.capacity)
            .field("threshold", &self.threshold)
            .field("generation", &self.generation)
            .field("key_size", &self.key_size)
            .field("data_size", &self.data_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_keys_round_trip() {
        let mut map = LhMap::new(0u64, 8, 8);
        map.put(&3u64, &30u64);
        map.put(&4u64, &40u64);

        let mut out = 0u64;
        assert!(map.get(&3u64, &mut out));
        assert_eq!(out, 30);
        assert!(map.get(&4u64, &mut out));
        assert_eq!(out, 40);
        assert!(!map.get(&5u64, &mut out));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn overwrite_keeps_len() {
        let mut map = LhMap::new(0u64, 8, 8);
        map.put(&1u64, &1u64);
        map.put(&1u64, &2u64);
        assert_eq!(map.len(), 1);

        let mut out = 0u64;
        assert!(map.get(&1u64, &mut out));
        assert_eq!(out, 2);
    }

    #[test]
    fn del_then_reinsert_uses_fresh_slot() {
        let mut map = LhMap::new(0u64, 8, 8);
        map.put(&1u64, &1u64);
        assert!(map.del(&1u64));
        assert!(!map.contains(&1u64));

        // The tombstone is skipped and a new slot allocated further along.
        map.put(&1u64, &9u64);
        let mut out = 0u64;
        assert!(map.get(&1u64, &mut out));
        assert_eq!(out, 9);
        assert_eq!(map.len(), 1);
        assert_eq!(map.allocated_items, 2);
    }

    #[test]
    fn grows_through_many_inserts() {
        let mut map = LhMap::new(0u64, 8, 8);
        for k in 0..100u64 {
            map.put(&k, &(k * 2));
        }
        assert_eq!(map.len(), 100);
        assert!(map.capacity() >= 128);

        let mut out = 0u64;
        for k in 0..100u64 {
            assert!(map.get(&k, &mut out), "key {k} lost after growth");
            assert_eq!(out, k * 2);
        }
    }

    #[test]
    fn visit_reports_slot_index_and_bytes() {
        let mut map = LhMap::new(0u64, 8, 16);
        map.put(&1u64, &10u64);

        let mut hits = 0;
        map.visit_all(|idx, key_bytes, value_bytes| {
            assert!(idx < map.capacity());
            let mut k = 0u64;
            k.read_from(key_bytes);
            let mut v = 0u64;
            v.read_from(value_bytes);
            assert_eq!((k, v), (1, 10));
            hits += 1;
        });
        assert_eq!(hits, 1);
    }
}
