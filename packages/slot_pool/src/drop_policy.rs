/// Determines how an allocator treats values that are still allocated when it is dropped.
///
/// Either way, every remaining value is dropped and the storage is released. The policy only
/// decides whether this situation is considered a bug.
///
/// # Examples
///
/// ```
/// use slot_pool::{DropPolicy, SlotAllocator};
///
/// // The drop policy is set at allocator creation time.
/// let allocator = SlotAllocator::<u32, 16>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Remaining values are silently dropped together with the allocator. This is the default.
    #[default]
    MayDropItems,

    /// The allocator panics after cleanup if it still contained values when it was dropped.
    ///
    /// This may be valuable if handles to the values are held elsewhere, so that dropping a
    /// non-empty allocator would leave those handles dangling. Explicitly calling
    /// [`deinitialize()`][crate::SlotAllocator::deinitialize] before dropping the allocator is
    /// always allowed.
    MustNotDropItems,
}
