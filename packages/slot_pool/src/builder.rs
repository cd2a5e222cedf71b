use std::marker::PhantomData;

use crate::{DropPolicy, SlotAllocator};

/// Builder for creating an instance of [`SlotAllocator`].
///
/// You only need to use this builder if you want to customize the allocator configuration.
/// The default configuration used by [`SlotAllocator::new()`][1] is sufficient for most use
/// cases.
///
/// The built allocator is not yet initialized; call [`SlotAllocator::initialize()`][2] to
/// reserve its storage.
///
/// # Examples
///
/// ```
/// use slot_pool::{DropPolicy, SlotAllocator};
///
/// let mut allocator = SlotAllocator::<u32, 8>::builder()
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
///
/// allocator.initialize().unwrap();
/// ```
///
/// [1]: SlotAllocator::new
/// [2]: SlotAllocator::initialize
#[must_use]
pub struct SlotAllocatorBuilder<T, const N: usize> {
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T, const N: usize> std::fmt::Debug for SlotAllocatorBuilder<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotAllocatorBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("capacity", &N)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T, const N: usize> SlotAllocatorBuilder<T, N> {
    pub(crate) fn new() -> Self {
        Self {
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the [drop policy][DropPolicy] for the allocator. This governs how
    /// to treat remaining values in the allocator when the allocator is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_pool::{DropPolicy, SlotAllocator};
    ///
    /// let allocator = SlotAllocator::<u32, 8>::builder()
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the allocator with the specified configuration.
    ///
    /// Zero-sized `T` and zero capacity are rejected at compile time.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_pool::SlotAllocator;
    ///
    /// let allocator = SlotAllocator::<u32, 8>::builder().build();
    /// assert!(!allocator.is_initialized());
    /// ```
    #[must_use]
    pub fn build(self) -> SlotAllocator<T, N> {
        SlotAllocator::new_inner(self.drop_policy)
    }
}
