#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-capacity typed memory pool.
//!
//! [`SlotAllocator<T, N>`][SlotAllocator] reserves one contiguous block of memory for up to `N`
//! values of type `T` and then hands out individual slots of that block on demand, constructing
//! values in place and destroying them in place when they are returned. After the initial
//! reservation, allocating and deallocating never touch the system allocator.
//!
//! This is part of the [Folo project](https://github.com/folo-rs/folo) that provides mechanisms for
//! high-performance hardware-aware programming in Rust.
//!
//! # Building blocks
//!
//! * [`SlotRegistry<N>`][SlotRegistry] tracks which of `N` slot indices are free, using one bit per
//!   slot plus an atomic occupancy counter. It knows nothing about memory and can be used on its
//!   own to manage any set of `N` numbered resources.
//! * [`SlotAllocator<T, N>`][SlotAllocator] owns the storage block and uses a registry to decide
//!   which slot each new value goes into.
//! * [`Handle<T>`][Handle] refers to a value in its slot.
//! * [`Bucket<T, K>`][Bucket] groups the handles of `K` values allocated in one step.
//!
//! # Lifecycle
//!
//! A new allocator does not own any memory yet. Call [`initialize()`][1] to reserve the storage
//! block, then allocate and deallocate values. [`deinitialize()`][2] drops every remaining value
//! and releases the storage block; dropping the allocator does the same.
//!
//! # Errors
//!
//! All fallible operations return [`Result`], with the [`ErrorKind`] of the [`Error`] telling
//! what went wrong. Panics raised while constructing or dropping a value are caught and turned
//! into errors, without leaving slots reserved that do not hold a value.
//!
//! # Example
//!
//! ```
//! use slot_pool::SlotAllocator;
//!
//! let mut allocator = SlotAllocator::<String, 4>::new();
//! allocator.initialize().unwrap();
//!
//! let greeting = allocator.insert("Hello".to_string()).unwrap();
//! let bucket = allocator.allocate_bucket::<3>().unwrap();
//!
//! assert!(allocator.is_full());
//!
//! allocator.get_mut(greeting).unwrap().push_str(", world");
//! assert_eq!(allocator.get(greeting).unwrap(), "Hello, world");
//!
//! allocator.deallocate_bucket(&bucket).unwrap();
//! allocator.deallocate(greeting).unwrap();
//!
//! let status = allocator.status();
//! assert_eq!(status.used(), 0);
//! assert_eq!(status.free(), 4);
//! ```
//!
//! [1]: SlotAllocator::initialize
//! [2]: SlotAllocator::deinitialize

mod allocator;
mod bucket;
mod builder;
mod drop_policy;
mod error;
mod handle;
mod registry;
mod status;

pub use allocator::*;
pub use bucket::*;
pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use handle::*;
pub use registry::*;
pub use status::*;
