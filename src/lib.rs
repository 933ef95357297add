//! General purpose allocator for medium and large allocations. Memory is
//! obtained from a [`BackingAllocator`] in coarse "primary" regions and
//! carved into variably sized blocks tracked by an index-linked free list,
//! so most requests are served without touching the backing at all:
//!
//! ```text
//! +-----------------------------------+     +--------------------------+
//! |             Primary               |     |         Primary          |
//! | +-------+    +-------+    +-----+ |     | +--------------+   +---+ |
//! | | Alloc | -> | Free  | -> |Alloc| | --> | |     Free     |-> |...| |
//! | +-------+    +-------+    +-----+ |     | +--------------+   +---+ |
//! +-----------------------------------+     +--------------------------+
//! ```
//!
//! Blocks are selected best-fit, split when the remainder is worth keeping
//! and coalesced with their neighbours on free. Entirely free primaries are
//! handed back to the backing by [`DynamicAllocator::resize`] and
//! [`DynamicAllocator::clear`].
//!
//! Returned pointers carry no alignment guarantee beyond whatever the
//! backing provides, and the allocator is strictly single threaded (the
//! type is neither [`Send`] nor [`Sync`]).
//!
//! # Cargo features
//!
//! - `report`: diagnostics through [`log`] at allocator decision points.
//! - `stats`: enables [`DynamicAllocator::stats`].
//!
//! # Example
//!
//! ```rust
//! use dynalloc::DynamicAllocator;
//!
//! let mut allocator = DynamicAllocator::new(1024 * 1024);
//!
//! let address = allocator.allocate(200).unwrap();
//! unsafe { address.as_ptr().write(42) };
//!
//! assert!(allocator.free(address));
//! assert_eq!(allocator.free_size(), 1024 * 1024);
//! ```

use std::ptr::NonNull;

mod allocator;
mod backing;
mod block;
mod registry;

#[cfg(feature = "stats")]
mod stats;

/// Non-null pointer to `T`. We use this instead of `*mut T` because the
/// compiler will yell at us if we don't write code for the `None` case.
/// It also doubles as the "no memory" state of empty descriptor slots.
pub type Pointer<T> = Option<NonNull<T>>;

/// Diagnostics at allocator decision points. Compiles away entirely unless
/// the `report` feature is enabled.
#[cfg(feature = "report")]
macro_rules! report {
    ($($arg:tt)*) => { log::debug!(target: "dynalloc", $($arg)*) };
}

#[cfg(not(feature = "report"))]
macro_rules! report {
    ($($arg:tt)*) => {{}};
}

pub(crate) use report;

pub use allocator::DynamicAllocator;
pub use backing::{BackingAllocator, SystemHeap};
pub use block::MIN_ALLOC_SIZE;
pub use registry::DEFAULT_MAX_DESCRIPTORS;
