use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A point-in-time snapshot of slot occupancy.
///
/// `used() + free()` always equals the capacity of the registry or allocator the snapshot was
/// taken from.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Status {
    used: usize,
    free: usize,
}

impl Status {
    #[must_use]
    pub(crate) fn from_used(used: usize, capacity: usize) -> Self {
        Self {
            used,
            free: capacity.saturating_sub(used),
        }
    }

    /// Number of slots currently in use.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of slots currently available for allocation.
    #[must_use]
    pub fn free(&self) -> usize {
        self.free
    }
}

/// Reads slot occupancy without access to the registry that owns the slots.
///
/// Mutating a registry requires exclusive access to it, so the owner cannot share it with other
/// threads while it keeps allocating. A probe shares only the occupancy counter, which is
/// maintained atomically, so any number of threads can observe occupancy while the owner keeps
/// mutating the registry.
///
/// The probe remains valid after the registry is dropped; it then reports the last known
/// occupancy.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use slot_pool::SlotRegistry;
///
/// let mut registry = SlotRegistry::<8>::new();
/// let probe = registry.probe();
///
/// registry.fetch(3).unwrap();
///
/// thread::spawn(move || {
///     assert_eq!(probe.status().used(), 3);
/// })
/// .join()
/// .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct StatusProbe {
    used: Arc<AtomicUsize>,
    capacity: usize,
}

impl StatusProbe {
    #[must_use]
    pub(crate) fn new(used: Arc<AtomicUsize>, capacity: usize) -> Self {
        Self { used, capacity }
    }

    /// Takes a snapshot of the current occupancy.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_used(self.used.load(Ordering::Acquire), self.capacity)
    }

    /// Total number of slots observed by this probe.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
