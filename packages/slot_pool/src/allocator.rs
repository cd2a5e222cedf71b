use std::alloc::{Layout, alloc, dealloc};
use std::any::{Any, type_name};
use std::convert::Infallible;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::thread;

use scopeguard::ScopeGuard;
use tracing::{debug, trace, warn};

use crate::{
    Bucket, DropPolicy, Error, ErrorKind, Handle, Result, SlotAllocatorBuilder, SlotRegistry,
    Status, StatusProbe,
};

/// A fixed-capacity pool of `N` slots, each able to hold one value of type `T`.
///
/// The allocator reserves a single contiguous block of memory for all `N` values when it is
/// [initialized][Self::initialize] and does not touch the system allocator again until it is
/// [deinitialized][Self::deinitialize]. Values are constructed directly in their slot and
/// destroyed in place when deallocated, after which the slot is reused by later allocations.
///
/// Slots are handed out lowest index first, as decided by the underlying [`SlotRegistry`].
///
/// # Handles
///
/// Allocating returns a [`Handle`], which is a pointer to the value in its slot. Handles do not
/// borrow the allocator, so values can be accessed out of band via unsafe code while the
/// allocator is used for other operations. Safe, checked access is available through
/// [`get()`][1] and [`get_mut()`][2], which borrow the allocator.
///
/// # Errors instead of panics
///
/// Every fallible operation returns a [`Result`]. Panics raised by the code constructing or
/// dropping a value are caught at the slot boundary and reported as
/// [`ErrorKind::ConstructorPanicked`] or [`ErrorKind::DestructorPanicked`], leaving the
/// allocator consistent. This requires the default `panic = "unwind"` strategy.
///
/// # Thread safety
///
/// The allocator can be moved between threads if `T` can. All mutating operations take
/// `&mut self`; to share an allocator between threads, wrap it in a `Mutex`. Occupancy can be
/// observed from other threads without locking via [`status_probe()`][3].
///
/// # Examples
///
/// ```
/// use slot_pool::{ErrorKind, SlotAllocator};
///
/// #[derive(Default)]
/// struct Parameter {
///     id: String,
///     value: f32,
/// }
///
/// let mut allocator = SlotAllocator::<Parameter, 1>::new();
/// allocator.initialize().unwrap();
///
/// let handle = allocator.allocate().unwrap();
///
/// let parameter = allocator.get_mut(handle).unwrap();
/// parameter.id = "A".to_string();
/// parameter.value = 1.5;
///
/// let error = allocator.allocate().unwrap_err();
/// assert_eq!(error.kind(), ErrorKind::NotEnoughSpace);
///
/// assert!(allocator.deallocate(handle).unwrap());
/// ```
///
/// [1]: Self::get
/// [2]: Self::get_mut
/// [3]: Self::status_probe
pub struct SlotAllocator<T, const N: usize> {
    registry: SlotRegistry<N>,

    /// Base of the storage block with room for `N` values. Present iff initialized.
    ///
    /// A slot holds a live value iff the registry reports it as in use.
    storage: Option<NonNull<T>>,

    drop_policy: DropPolicy,
}

impl<T, const N: usize> SlotAllocator<T, N> {
    /// Creates an allocator with the default configuration.
    ///
    /// The allocator is not yet initialized and has not reserved any storage.
    ///
    /// Zero-sized `T` and zero capacity are rejected at compile time.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring an allocator with non-default settings.
    pub fn builder() -> SlotAllocatorBuilder<T, N> {
        SlotAllocatorBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(drop_policy: DropPolicy) -> Self {
        const {
            assert!(N > 0, "SlotAllocator must have non-zero capacity");
            assert!(
                size_of::<T>() > 0,
                "SlotAllocator must have non-zero item size"
            );
        };

        Self {
            registry: SlotRegistry::unreserved(),
            storage: None,
            drop_policy,
        }
    }

    /// Reserves the storage block for all `N` values, together with the bitmap that tracks
    /// which slots are in use.
    ///
    /// No values are constructed; the slots stay empty until allocated.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::AlreadyInitialized`] if the allocator is already initialized.
    ///
    /// Returns [`ErrorKind::CannotReserveSystemMemory`] if the storage size overflows or the
    /// system allocator cannot provide the memory. Nothing stays reserved in that case.
    pub fn initialize(&mut self) -> Result<bool> {
        if self.is_initialized() {
            return Err(Error::new(
                ErrorKind::AlreadyInitialized,
                "initialize() called twice without deinitialize() in between",
            ));
        }

        let layout = Self::layout().ok_or_else(|| {
            Error::new(
                ErrorKind::CannotReserveSystemMemory,
                format!("storage for {N} x {} overflows", type_name::<T>()),
            )
        })?;

        self.registry.reserve()?;

        // SAFETY: The layout is not zero-sized because both N and size_of::<T>() are
        // asserted non-zero at compile time.
        let Some(storage) = NonNull::new(unsafe { alloc(layout) }.cast::<T>()) else {
            self.registry.unreserve();

            return Err(Error::new(
                ErrorKind::CannotReserveSystemMemory,
                format!("system allocator refused {} bytes", layout.size()),
            ));
        };

        self.storage = Some(storage);

        debug!(
            item_type = type_name::<T>(),
            capacity = N,
            bytes = layout.size(),
            "initialized slot allocator"
        );

        Ok(true)
    }

    /// Drops every value still allocated, then releases the storage block and the slot bitmap.
    ///
    /// Afterwards the allocator is uninitialized and may be initialized again. Handles obtained
    /// before this call dangle. Calling this on an uninitialized allocator does nothing.
    ///
    /// Panics raised while dropping values are caught and logged; the remaining values are
    /// still dropped.
    pub fn deinitialize(&mut self) {
        let Some(storage) = self.storage.take() else {
            self.registry.unreserve();
            return;
        };

        let mut dropped: usize = 0;
        let mut panicked: usize = 0;

        for index in self.registry.in_use_indices() {
            // SAFETY: The slot is in use, so it holds a live value that nobody else will drop.
            match unsafe { drop_slot(storage, index) } {
                Ok(()) => dropped = dropped.saturating_add(1),
                Err(payload) => {
                    warn!(
                        index,
                        item_type = type_name::<T>(),
                        panic = %describe_panic(payload.as_ref()),
                        "destructor panicked during deinitialize"
                    );
                    panicked = panicked.saturating_add(1);
                }
            }
        }

        // SAFETY: The storage was allocated in initialize() with this same layout.
        unsafe {
            dealloc(
                storage.as_ptr().cast(),
                Self::layout().expect("layout was valid when the storage was allocated"),
            );
        }

        self.registry.unreserve();

        debug!(
            item_type = type_name::<T>(),
            dropped, panicked, "deinitialized slot allocator"
        );
    }

    /// Whether the allocator currently owns its storage block.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    /// Allocates a slot and fills it with the value returned by `constructor`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotInitialized`] if the allocator is not initialized.
    ///
    /// Returns [`ErrorKind::NotEnoughSpace`] if every slot is in use.
    ///
    /// Returns [`ErrorKind::ConstructorPanicked`] if `constructor` panics. The slot reserved for
    /// the value is released again.
    pub fn allocate_with(&mut self, constructor: impl FnOnce() -> T) -> Result<Handle<T>> {
        self.try_allocate_with(|| Ok::<_, Infallible>(constructor()))
    }

    /// Allocates a slot and fills it with the value returned by a fallible `constructor`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConstructorFailed`] if `constructor` returns an error, with the
    /// error's message as the description. The slot reserved for the value is released again.
    ///
    /// Otherwise the same as [`allocate_with()`][Self::allocate_with].
    pub fn try_allocate_with<E: Display>(
        &mut self,
        constructor: impl FnOnce() -> std::result::Result<T, E>,
    ) -> Result<Handle<T>> {
        let storage = self.storage()?;

        let index = *self
            .registry
            .fetch_array::<1>()?
            .first()
            .ok_or_else(|| Error::new(ErrorKind::BadLogic, "registry returned no index"))?;

        // The reservation goes back to the registry on every path except successful
        // construction.
        let registry = scopeguard::guard(&mut self.registry, |registry| registry.release(index));

        let value = match panic::catch_unwind(AssertUnwindSafe(constructor)) {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                warn!(index, item_type = type_name::<T>(), %error, "constructor failed");

                return Err(Error::new(ErrorKind::ConstructorFailed, error.to_string()));
            }
            Err(payload) => {
                let message = describe_panic(payload.as_ref());
                warn!(index, item_type = type_name::<T>(), panic = %message, "constructor panicked");

                return Err(Error::new(ErrorKind::ConstructorPanicked, message));
            }
        };

        let slot = slot_ptr(storage, index);

        // SAFETY: The slot is within the storage block and was free until we reserved it, so
        // it holds no live value that would be overwritten without being dropped.
        unsafe {
            slot.write(value);
        }

        ScopeGuard::into_inner(registry);

        trace!(index, "allocated slot");

        Ok(Handle::new(slot))
    }

    /// Allocates a slot and moves `value` into it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotInitialized`] if the allocator is not initialized.
    ///
    /// Returns [`ErrorKind::NotEnoughSpace`] if every slot is in use.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>> {
        self.allocate_with(|| value)
    }

    /// Returns a shared reference to the value `handle` refers to, or `None` if the handle does
    /// not refer to a live value in this allocator.
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let index = self.live_index_of(handle)?;
        let slot = slot_ptr(self.storage?, index);

        // SAFETY: The slot is in use, so it holds a live value. The returned reference borrows
        // the allocator, so the value cannot be deallocated while the reference exists.
        Some(unsafe { slot.as_ref() })
    }

    /// Returns an exclusive reference to the value `handle` refers to, or `None` if the handle
    /// does not refer to a live value in this allocator.
    ///
    /// Creating the reference is only valid if no reference to the same value was created out of
    /// band via the handle and is still in use.
    #[must_use]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let index = self.live_index_of(handle)?;
        let mut slot = slot_ptr(self.storage?, index);

        // SAFETY: The slot is in use, so it holds a live value. The returned reference borrows
        // the allocator exclusively, so no other safe access can happen concurrently.
        Some(unsafe { slot.as_mut() })
    }

    /// Takes a snapshot of slot occupancy.
    #[must_use]
    pub fn status(&self) -> Status {
        self.registry.status()
    }

    /// Creates a probe that observes slot occupancy from anywhere, including other threads.
    #[must_use]
    pub fn status_probe(&self) -> StatusProbe {
        self.registry.probe()
    }

    /// Number of values currently allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.status().used()
    }

    /// Whether no values are currently allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot is in use.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.status().free() == 0
    }

    /// The number of slots, which is the maximum number of values the allocator can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    fn layout() -> Option<Layout> {
        Layout::array::<T>(N).ok()
    }

    fn storage(&self) -> Result<NonNull<T>> {
        self.storage.ok_or_else(|| {
            Error::new(
                ErrorKind::NotInitialized,
                "initialize() must be called before using the allocator",
            )
        })
    }

    /// Resolves a handle to the index of the slot it points to, without checking occupancy.
    ///
    /// Handles that point outside the storage block or between slots resolve to nothing.
    #[must_use]
    fn index_of(&self, handle: Handle<T>) -> Option<usize> {
        let base = self.storage?.as_ptr().addr();
        let offset = handle.as_ptr().as_ptr().addr().checked_sub(base)?;

        let item_size = size_of::<T>();

        if offset.checked_rem(item_size)? != 0 {
            return None;
        }

        let index = offset.checked_div(item_size)?;

        (index < N).then_some(index)
    }

    #[must_use]
    fn live_index_of(&self, handle: Handle<T>) -> Option<usize> {
        self.index_of(handle)
            .filter(|&index| self.registry.is_in_use(index))
    }
}

impl<T: Default, const N: usize> SlotAllocator<T, N> {
    /// Allocates a slot and fills it with `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotInitialized`] if the allocator is not initialized.
    ///
    /// Returns [`ErrorKind::NotEnoughSpace`] if every slot is in use.
    ///
    /// Returns [`ErrorKind::ConstructorPanicked`] if `T::default()` panics. The slot reserved for
    /// the value is released again.
    pub fn allocate(&mut self) -> Result<Handle<T>> {
        self.allocate_with(T::default)
    }

    /// Allocates `K` slots at once, fills each with `T::default()` and returns their handles
    /// grouped in a [`Bucket`].
    ///
    /// The slots are reserved in a single step, so the allocation either fully succeeds or
    /// leaves the allocator unchanged. The slots are not necessarily adjacent.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotInitialized`] if the allocator is not initialized.
    ///
    /// Returns [`ErrorKind::NotEnoughSpace`] if fewer than `K` slots are free.
    ///
    /// Returns [`ErrorKind::ConstructorPanicked`] if any `T::default()` call panics. The values
    /// constructed by this call so far are dropped and every slot reserved by this call is
    /// released again.
    ///
    /// A bucket size of zero is rejected at compile time.
    pub fn allocate_bucket<const K: usize>(&mut self) -> Result<Bucket<T, K>> {
        let storage = self.storage()?;
        let indices = self.registry.fetch_array::<K>()?;

        let mut bucket = Bucket::new();

        // Until every value is in place, unwinding drops the values constructed so far and
        // releases every reserved slot. The second field counts the constructed values, which
        // always occupy a prefix of `indices`.
        let mut rollback = scopeguard::guard(
            (&mut self.registry, 0_usize),
            |(registry, constructed)| {
                for (position, &index) in indices.iter().enumerate() {
                    if position < constructed {
                        // SAFETY: The first `constructed` slots hold values written below and
                        // not yet handed out to anyone.
                        if let Err(payload) = unsafe { drop_slot(storage, index) } {
                            warn!(
                                index,
                                panic = %describe_panic(payload.as_ref()),
                                "destructor panicked while unwinding bucket allocation"
                            );
                        }
                    }

                    registry.release(index);
                }
            },
        );

        for &index in &indices {
            let value = panic::catch_unwind(T::default).map_err(|payload| {
                let message = describe_panic(payload.as_ref());
                warn!(index, item_type = type_name::<T>(), panic = %message, "constructor panicked");

                Error::new(ErrorKind::ConstructorPanicked, message)
            })?;

            let slot = slot_ptr(storage, index);

            // SAFETY: The slot is within the storage block and was free until we reserved it.
            unsafe {
                slot.write(value);
            }

            rollback.1 = rollback
                .1
                .checked_add(1)
                .expect("bounded by K, which fits in memory");

            bucket.push(Handle::new(slot))?;
        }

        ScopeGuard::into_inner(rollback);

        trace!(size = K, first = ?indices.first(), "allocated bucket");

        Ok(bucket)
    }

    /// Drops the value `handle` refers to and frees its slot for reuse.
    ///
    /// Before the slot is freed, its memory is overwritten with a fresh `T::default()` (which is
    /// then dropped again), so that data from the previous occupant does not linger in the slot.
    ///
    /// The handle is resolved to its slot by address arithmetic. If it does not point to a live
    /// value in this allocator (a handle from a different allocator, or a value that was already
    /// deallocated), nothing happens and `Ok(false)` is returned. `Ok(true)` means the value was
    /// dropped and its slot freed.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotInitialized`] if the allocator is not initialized.
    ///
    /// Returns [`ErrorKind::DestructorPanicked`] if dropping the value panics. The slot then stays
    /// in use, holding a fresh `T::default()` in place of the failed value. Only if creating that
    /// replacement panics as well is the slot freed.
    pub fn deallocate(&mut self, handle: Handle<T>) -> Result<bool> {
        let storage = self.storage()?;

        let Some(index) = self.live_index_of(handle) else {
            trace!(ptr = ?handle.as_ptr(), "ignoring handle without a live value in this allocator");
            return Ok(false);
        };

        let slot = slot_ptr(storage, index);

        // SAFETY: The slot is in use, so it holds a live value. After this call it does not.
        if let Err(payload) = unsafe { drop_slot(storage, index) } {
            let message = describe_panic(payload.as_ref());
            warn!(index, item_type = type_name::<T>(), panic = %message, "destructor panicked");

            match panic::catch_unwind(T::default) {
                // SAFETY: The previous value is gone, so nothing is overwritten without a drop.
                Ok(replacement) => unsafe { slot.write(replacement) },
                Err(_) => self.registry.release(index),
            }

            return Err(Error::new(ErrorKind::DestructorPanicked, message));
        }

        // SAFETY: The value in the slot was just dropped.
        unsafe {
            scrub_slot(slot);
        }

        self.registry.release(index);

        trace!(index, "deallocated slot");

        Ok(true)
    }

    /// Deallocates every handle in `bucket`, in order.
    ///
    /// Stops at the first error and returns it without attempting the remaining handles, so the
    /// bucket may end up partially deallocated. Calling this again resumes with the handles that
    /// were not yet deallocated, as the already deallocated ones are skipped.
    ///
    /// Returns `Ok(true)` if every handle was deallocated by this call and `Ok(false)` if some of
    /// them did not refer to a live value.
    ///
    /// # Errors
    ///
    /// See [`deallocate()`][Self::deallocate].
    pub fn deallocate_bucket<const K: usize>(&mut self, bucket: &Bucket<T, K>) -> Result<bool> {
        self.storage()?;

        let mut all_deallocated = true;

        for handle in bucket {
            all_deallocated &= self.deallocate(handle)?;
        }

        Ok(all_deallocated)
    }
}

impl<T, const N: usize> Default for SlotAllocator<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> std::fmt::Debug for SlotAllocator<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &N)
            .field("initialized", &self.is_initialized())
            .field("status", &self.status())
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl<T, const N: usize> Drop for SlotAllocator<T, N> {
    fn drop(&mut self) {
        let was_empty = self.is_empty();

        self.deinitialize();

        // We check at the end so the memory is released first. If we are already panicking,
        // we do not want to panic again because that would obscure the original panic.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a non-empty SlotAllocator of {} with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

// SAFETY: The raw storage pointer is owned exclusively by the allocator. Nothing about it is tied
// to a thread, so as long as T itself can move between threads, the allocator can do so, too.
unsafe impl<T: Send, const N: usize> Send for SlotAllocator<T, N> {}

#[must_use]
fn slot_ptr<T>(storage: NonNull<T>, index: usize) -> NonNull<T> {
    debug_assert!(
        index < usize::MAX / size_of::<T>().max(1),
        "slot index {index} cannot be part of any allocation"
    );

    // SAFETY: Callers only pass indices handed out by the registry, which are below the capacity
    // the storage block was allocated for.
    unsafe { storage.add(index) }
}

/// Drops the value in the slot at `index`, catching any panic raised by its destructor.
///
/// # Safety
///
/// The slot must hold a live value. Regardless of the outcome, it no longer does afterwards.
unsafe fn drop_slot<T>(storage: NonNull<T>, index: usize) -> thread::Result<()> {
    let slot = slot_ptr(storage, index);

    // SAFETY: Forwarding guarantees from the caller.
    panic::catch_unwind(AssertUnwindSafe(|| unsafe { slot.drop_in_place() }))
}

/// Overwrites the slot with a blank `T::default()` and drops that blank right away, leaving the
/// slot without a live value but without the previous occupant's bytes either.
///
/// If creating or dropping the blank panics, the panic is swallowed; the slot is left without a
/// live value in either case.
///
/// # Safety
///
/// The slot must not hold a live value.
unsafe fn scrub_slot<T: Default>(slot: NonNull<T>) {
    let Ok(blank) = panic::catch_unwind(T::default) else {
        return;
    };

    // SAFETY: The caller guarantees there is no live value to overwrite.
    unsafe {
        slot.write(blank);
    }

    // SAFETY: We just wrote a live value into the slot.
    _ = panic::catch_unwind(AssertUnwindSafe(|| unsafe { slot.drop_in_place() }));
}

#[must_use]
fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic payload is not a string".to_string()
    }
}
