use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use smallvec::SmallVec;
use tracing::error;

use crate::{Error, ErrorKind, Result, Status, StatusProbe};

/// Indices returned by [`SlotRegistry::fetch()`], in ascending order.
///
/// Small requests are stored inline without touching the heap.
pub type Indices = SmallVec<[usize; 8]>;

const WORD_BITS: usize = usize::BITS as usize;

// `usize::BITS` is a power of two, so word/bit lookup is a shift and a mask.
const WORD_SHIFT: u32 = usize::BITS.trailing_zeros();
const BIT_MASK: usize = WORD_BITS - 1;

/// Tracks which of `N` slots are free and which are in use.
///
/// The registry knows nothing about what the slots contain or where they live. It only hands out
/// slot indices and takes them back. Each slot is represented by one bit in a bitmap, next to an
/// atomic counter of the slots in use.
///
/// # Allocation order
///
/// [`fetch()`][1] always scans from index 0 upward, so the lowest free indices are returned
/// first. The indices returned by one call are ascending but not necessarily contiguous.
///
/// # Thread safety
///
/// Every method that changes slot state takes `&mut self`, so mutation requires exclusive
/// access: wrap the registry in a `Mutex` to share it between threads. Occupancy can still be
/// observed concurrently with mutation through a [`StatusProbe`] obtained from [`probe()`][2].
///
/// # Examples
///
/// ```
/// use slot_pool::SlotRegistry;
///
/// let mut registry = SlotRegistry::<10>::new();
///
/// let indices = registry.fetch(3).unwrap();
/// assert_eq!(indices.as_slice(), &[0, 1, 2]);
///
/// registry.release(1);
///
/// let status = registry.status();
/// assert_eq!(status.used(), 2);
/// assert_eq!(status.free(), 8);
/// ```
///
/// [1]: Self::fetch
/// [2]: Self::probe
#[derive(Debug)]
pub struct SlotRegistry<const N: usize> {
    /// One bit per slot, 1 meaning "in use". Bits at or beyond `N` in the last word stay 0.
    words: Box<[usize]>,

    /// Always equal to the number of set bits in `words`. Shared with probes.
    used: Arc<AtomicUsize>,
}

impl<const N: usize> SlotRegistry<N> {
    /// Creates a registry with all `N` slots free.
    ///
    /// A zero capacity is rejected at compile time.
    #[must_use]
    pub fn new() -> Self {
        const { assert!(N > 0, "SlotRegistry must have non-zero capacity") };

        Self {
            words: vec![0; word_count::<N>()].into_boxed_slice(),
            used: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a registry with all `N` slots free, reporting a failure to allocate the bitmap
    /// as an error instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CannotReserveSystemMemory`] if the system allocator cannot provide
    /// the bitmap.
    pub fn try_new() -> Result<Self> {
        let mut registry = Self::unreserved();
        registry.reserve()?;
        Ok(registry)
    }

    /// Creates a registry that does not own a bitmap yet. It reports all slots as free but
    /// cannot hand any out until [`reserve()`][Self::reserve] succeeds.
    #[must_use]
    pub(crate) fn unreserved() -> Self {
        const { assert!(N > 0, "SlotRegistry must have non-zero capacity") };

        Self {
            words: Box::default(),
            used: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allocates the bitmap with every slot free, unless it is already allocated.
    pub(crate) fn reserve(&mut self) -> Result<()> {
        let word_count = word_count::<N>();

        if self.words.len() == word_count {
            return Ok(());
        }

        let mut words = Vec::new();
        words.try_reserve_exact(word_count).map_err(|error| {
            Error::new(
                ErrorKind::CannotReserveSystemMemory,
                format!("slot bitmap of {word_count} words for {N} slots: {error}"),
            )
        })?;
        words.resize(word_count, 0);

        self.words = words.into_boxed_slice();
        self.used.store(0, Ordering::Release);

        Ok(())
    }

    /// Frees the bitmap and marks every slot free.
    pub(crate) fn unreserve(&mut self) {
        self.words = Box::default();
        self.used.store(0, Ordering::Release);
    }

    /// The number of slots tracked by the registry.
    #[must_use]
    pub fn capacity(&self) -> usize {
        N
    }

    /// Reserves `quantity` free slots and returns their indices in ascending order.
    ///
    /// The request is all-or-nothing: either every requested slot is reserved or none is.
    /// Requesting zero slots succeeds with an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotEnoughSpace`] if fewer than `quantity` slots are free. The registry
    /// is left unchanged in this case.
    ///
    /// Returns [`ErrorKind::BadLogic`] if the bitmap and the occupancy counter disagree. This
    /// indicates a bug in the registry; any slots reserved during the call are released again.
    pub fn fetch(&mut self, quantity: usize) -> Result<Indices> {
        self.ensure_free(quantity)?;

        let mut indices = Indices::new();
        self.mark_free_slots(quantity, |index| indices.push(index));
        self.verify_fetched(quantity, &indices)?;

        Ok(indices)
    }

    /// Reserves `K` free slots and returns their indices in ascending order.
    ///
    /// Same as [`fetch()`][1] but with a quantity known at compile time, which allows the result
    /// to be returned without touching the heap regardless of the quantity.
    ///
    /// # Errors
    ///
    /// See [`fetch()`][1].
    ///
    /// [1]: Self::fetch
    pub fn fetch_array<const K: usize>(&mut self) -> Result<heapless::Vec<usize, K>> {
        self.ensure_free(K)?;

        let mut indices = heapless::Vec::<usize, K>::new();
        self.mark_free_slots(K, |index| {
            indices
                .push(index)
                .expect("we never mark more than K slots so the vec cannot overflow");
        });
        self.verify_fetched(K, &indices)?;

        Ok(indices)
    }

    /// Marks the slot at `index` as free.
    ///
    /// Releasing a slot that is already free or an index beyond the capacity does nothing.
    pub fn release(&mut self, index: usize) {
        if !self.is_in_use(index) {
            return;
        }

        let (word_index, mask) = locate(index);

        let word = self
            .words
            .get_mut(word_index)
            .expect("is_in_use() returned true so the index is in bounds");
        *word &= !mask;

        self.used.fetch_sub(1, Ordering::Release);
    }

    /// Marks every slot as free, regardless of current occupancy.
    pub fn reset(&mut self) {
        self.words.fill(0);
        self.used.store(0, Ordering::Release);
    }

    /// Whether the slot at `index` is currently in use. Indices beyond the capacity are never
    /// in use.
    #[must_use]
    pub fn is_in_use(&self, index: usize) -> bool {
        if index >= N {
            return false;
        }

        let (word_index, mask) = locate(index);

        self.words
            .get(word_index)
            .is_some_and(|word| word & mask != 0)
    }

    /// Iterates over the indices of all slots in use, in ascending order.
    pub fn in_use_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .filter(|(_, word)| **word != 0)
            .flat_map(|(word_index, &word)| {
                (0..WORD_BITS)
                    .filter(move |&bit| word & (1 << bit) != 0)
                    .map(move |bit| (word_index << WORD_SHIFT) | bit)
            })
    }

    /// Takes a snapshot of the current occupancy.
    ///
    /// This only reads the atomic occupancy counter and never touches the bitmap.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_used(self.used.load(Ordering::Acquire), N)
    }

    /// Creates a probe that observes the occupancy of this registry from anywhere.
    #[must_use]
    pub fn probe(&self) -> StatusProbe {
        StatusProbe::new(Arc::clone(&self.used), N)
    }

    fn ensure_free(&self, quantity: usize) -> Result<()> {
        let free = self.status().free();

        if quantity > free {
            return Err(Error::new(
                ErrorKind::NotEnoughSpace,
                format!("requested {quantity} slots but only {free} of {N} are free"),
            ));
        }

        Ok(())
    }

    /// Scans the bitmap from index 0 upward, marking free slots as used and reporting each one
    /// to `on_marked`, until `quantity` slots have been marked or the bitmap is exhausted.
    fn mark_free_slots(&mut self, quantity: usize, mut on_marked: impl FnMut(usize)) {
        let mut marked: usize = 0;

        for (word_index, word) in self.words.iter_mut().enumerate() {
            while marked < quantity {
                let vacant = !*word;

                if vacant == 0 {
                    break;
                }

                let bit = vacant.trailing_zeros();

                // Cannot overflow: word_index * WORD_BITS is bounded by the bitmap length.
                let index = (word_index << WORD_SHIFT) | bit as usize;

                if index >= N {
                    // The tail bits of the last word do not correspond to slots.
                    break;
                }

                *word |= 1 << bit;
                self.used.fetch_add(1, Ordering::Release);

                on_marked(index);

                marked = marked
                    .checked_add(1)
                    .expect("guarded by marked < quantity above");
            }

            if marked == quantity {
                break;
            }
        }
    }

    fn verify_fetched(&mut self, quantity: usize, indices: &[usize]) -> Result<()> {
        if indices.len() == quantity {
            return Ok(());
        }

        error!(
            quantity,
            found = indices.len(),
            capacity = N,
            "slot bitmap disagrees with occupancy counter"
        );

        for &index in indices {
            self.release(index);
        }

        Err(Error::new(
            ErrorKind::BadLogic,
            format!(
                "found only {} free slots after the counter promised {quantity}",
                indices.len()
            ),
        ))
    }
}

impl<const N: usize> Default for SlotRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of bitmap words needed to hold one bit per slot.
#[must_use]
const fn word_count<const N: usize>() -> usize {
    N.div_ceil(WORD_BITS)
}

/// Maps a slot index to the bitmap word holding it and the mask of its bit within that word.
#[must_use]
fn locate(index: usize) -> (usize, usize) {
    (index >> WORD_SHIFT, 1 << (index & BIT_MASK))
}
