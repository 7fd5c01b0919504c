#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Allocators that back a table's control, key and value arrays.
pub mod allocator;

mod control;

/// Error types for fallible allocation.
pub mod error;

/// Byte hashers and the mapping from a hash to a slot and control fragment.
pub mod hash;

/// The untyped swiss table over fixed-size byte records.
pub mod raw_table;

/// A typed map over plain-old-data keys and values.
///
/// This module provides a `SwissMap` that wraps the `RawTable` and converts
/// keys and values to and from their byte records.
pub mod swiss_map;

#[cfg(all(feature = "mmap", unix))]
pub use allocator::MmapAlloc;
pub use allocator::Global;
pub use allocator::RawAlloc;
pub use error::AllocError;
pub use error::TryReserveError;
pub use hash::ByteHasher;
pub use hash::Fnv1a;
pub use raw_table::RawTable;
pub use swiss_map::Entry;
pub use swiss_map::SwissMap;

/// Number of control bytes scanned per probe step on this build.
pub const GROUP_WIDTH: usize = control::Group::WIDTH;
