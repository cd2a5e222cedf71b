use std::fmt;
use std::ptr::NonNull;

/// Refers to a value living in a slot of a [`SlotAllocator`][crate::SlotAllocator].
///
/// A handle is a thin wrapper around a pointer into the allocator's storage. It can be copied
/// freely and does not borrow the allocator, so it can be used to access the value out of band
/// from unsafe code while the allocator is used for other operations.
///
/// The handle does not keep the value alive. After the value is deallocated (or the allocator is
/// deinitialized or dropped), the handle dangles and dereferencing it is undefined behavior. The
/// allocator itself never dereferences a handle without first checking that it refers to a live
/// value, so passing a stale handle back to the allocator is safe.
///
/// For checked access that does not require unsafe code, use
/// [`SlotAllocator::get()`][crate::SlotAllocator::get] and
/// [`SlotAllocator::get_mut()`][crate::SlotAllocator::get_mut].
pub struct Handle<T> {
    ptr: NonNull<T>,
}

impl<T> Handle<T> {
    #[must_use]
    pub(crate) fn new(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    /// The address of the value in the allocator's storage.
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// Returns a shared reference to the value.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the value is still allocated for the entire lifetime `'a` and
    /// that no exclusive reference to the value exists during that lifetime.
    #[must_use]
    pub unsafe fn as_ref<'a>(&self) -> &'a T {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { self.ptr.as_ref() }
    }

    /// Returns an exclusive reference to the value.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the value is still allocated for the entire lifetime `'a` and
    /// that no other reference to the value exists during that lifetime.
    #[must_use]
    #[allow(
        clippy::mut_from_ref,
        reason = "handles are pointers, aliasing is up to the caller"
    )]
    pub unsafe fn as_mut<'a>(&self) -> &'a mut T {
        let mut ptr = self.ptr;

        // SAFETY: Forwarding guarantees from the caller.
        unsafe { ptr.as_mut() }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("item_type", &format_args!("{}", std::any::type_name::<T>()))
            .field("ptr", &self.ptr)
            .finish()
    }
}

// SAFETY: A handle is only an address. Moving it to another thread does not grant access to the
// value by itself; every dereference is unsafe and the caller must uphold the usual rules,
// which include T being Send/Sync as appropriate for the access performed.
unsafe impl<T: Send> Send for Handle<T> {}

// SAFETY: See above. Sharing the address is as safe as sharing &T.
unsafe impl<T: Sync> Sync for Handle<T> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Handle<u32>: Send, Sync, Copy, Eq, fmt::Debug);
    assert_not_impl_any!(Handle<Cell<u32>>: Sync);
    assert_not_impl_any!(Handle<std::rc::Rc<u32>>: Send);

    #[test]
    fn equality_is_by_address() {
        let mut a = 1_u32;
        let mut b = 1_u32;

        let handle_a = Handle::new(NonNull::from(&mut a));
        let handle_b = Handle::new(NonNull::from(&mut b));

        let copied = handle_a;

        assert_eq!(handle_a, copied);
        assert_ne!(handle_a, handle_b);
    }

    #[test]
    fn access_through_handle() {
        let mut value = 10_u64;
        let handle = Handle::new(NonNull::from(&mut value));

        // SAFETY: `value` outlives the references and they do not overlap.
        unsafe {
            *handle.as_mut() += 5;
        }

        // SAFETY: `value` outlives the reference and no exclusive reference exists.
        let read = unsafe { *handle.as_ref() };

        assert_eq!(read, 15);
    }

    #[test]
    fn debug_names_item_type() {
        let mut value = 'x';
        let handle = Handle::new(NonNull::from(&mut value));

        let output = format!("{handle:?}");

        assert!(output.contains("Handle"));
        assert!(output.contains("char"));
    }
}
