use std::{fmt, iter, slice};

use crate::{Error, ErrorKind, Handle, Result};

/// A group of up to `K` handles produced by one
/// [`SlotAllocator::allocate_bucket()`][crate::SlotAllocator::allocate_bucket] call.
///
/// The handles are kept in allocation order, which is also ascending slot order. Only the
/// allocator can add handles to a bucket; to callers it is read-only.
///
/// A bucket does not own the values its handles refer to. Return them all at once via
/// [`SlotAllocator::deallocate_bucket()`][crate::SlotAllocator::deallocate_bucket]. If any of the
/// handles is deallocated individually, the bucket must not be used afterwards.
///
/// # Examples
///
/// ```
/// use slot_pool::{ErrorKind, SlotAllocator};
///
/// let mut allocator = SlotAllocator::<u64, 5>::new();
/// allocator.initialize().unwrap();
///
/// let bucket = allocator.allocate_bucket::<3>().unwrap();
/// assert_eq!(bucket.len(), 3);
///
/// for handle in &bucket {
///     *allocator.get_mut(handle).unwrap() = 7;
/// }
///
/// assert_eq!(bucket.get(3).unwrap_err().kind(), ErrorKind::OutOfBounds);
///
/// allocator.deallocate_bucket(&bucket).unwrap();
/// assert_eq!(allocator.status().free(), 5);
/// ```
pub struct Bucket<T, const K: usize> {
    handles: heapless::Vec<Handle<T>, K>,
}

impl<T, const K: usize> Bucket<T, K> {
    #[must_use]
    pub(crate) fn new() -> Self {
        const { assert!(K > 0, "Bucket must have non-zero capacity") };

        Self {
            handles: heapless::Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, handle: Handle<T>) -> Result<()> {
        self.handles.push(handle).map_err(|_| {
            Error::new(
                ErrorKind::BadLogic,
                format!("cannot push more than {K} handles into bucket"),
            )
        })
    }

    /// Number of handles in the bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the bucket holds no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Maximum number of handles the bucket can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        K
    }

    /// Returns the handle at position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::OutOfBounds`] if `index` is not less than [`len()`][Self::len].
    pub fn get(&self, index: usize) -> Result<Handle<T>> {
        self.handles.get(index).copied().ok_or_else(|| {
            Error::new(
                ErrorKind::OutOfBounds,
                format!("bucket index {index} with length {}", self.handles.len()),
            )
        })
    }

    /// Iterates over the handles in allocation order.
    ///
    /// Every call starts a fresh iteration from the first handle.
    pub fn iter(&self) -> Iter<'_, T> {
        self.handles.iter().copied()
    }
}

/// Iterator over the handles in a [`Bucket`].
pub type Iter<'a, T> = iter::Copied<slice::Iter<'a, Handle<T>>>;

impl<'a, T, const K: usize> IntoIterator for &'a Bucket<T, K> {
    type Item = Handle<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, const K: usize> fmt::Debug for Bucket<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("item_type", &format_args!("{}", std::any::type_name::<T>()))
            .field("capacity", &K)
            .field("handles", &self.handles.as_slice())
            .finish()
    }
}
