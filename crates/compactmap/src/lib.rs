//! Contiguous-memory hash maps for allocation-sensitive workloads.
//!
//! Both maps in this crate store fixed-size key/value records inline in one
//! byte slab, so a populated map is a single heap allocation regardless of
//! entry count. Collisions are resolved by linear probing; the load factor is
//! bounded at 0.75 and tombstones are swept on rehash.
//!
//! Clearing is O(1): every slot carries a 15-bit generation tag, and `clear`
//! bumps the map's generation, which logically empties all pre-existing slots
//! without touching the slab. This makes the maps cheap to recycle through an
//! object pool.
//!
//! - [`IntKeyMap`] — `u32` keys stored inline, no dispatch on the key path.
//! - [`LhMap`] — opaque keys described by the [`MapKey`] trait.
//!
//! # Example
//!
//! ```
//! use compactmap::IntKeyMap;
//!
//! let mut map = IntKeyMap::new(8, 16);
//! map.put(7, &42u64);
//!
//! let mut out = 0u64;
//! assert!(map.get(7, &mut out));
//! assert_eq!(out, 42);
//!
//! map.clear(); // O(1), slab retained
//! assert!(!map.contains(7));
//! ```
//!
//! Neither map is thread-safe: all mutators take `&mut self`. The intended
//! concurrent deployment is one map per task, recycled through a pool.

mod codec;
mod error;
mod int_key_map;
mod layout;
mod lh_map;

pub use codec::{MapKey, MapValue};
pub use error::MapError;
pub use int_key_map::IntKeyMap;
pub use lh_map::LhMap;
