//! End-to-end scenarios exercising the public API of `slot_pool`.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use slot_pool::{ErrorKind, Handle, SlotAllocator, SlotRegistry};

#[derive(Debug, Default, PartialEq)]
struct Parameter {
    id: String,
    value: f32,
}

#[test]
fn registry_fetch_everything_in_order() {
    let mut registry = SlotRegistry::<10>::new();

    let fetched: Vec<usize> = (0..10)
        .map(|_| registry.fetch(1).unwrap()[0])
        .collect();

    assert_eq!(fetched, (0..10).collect::<Vec<_>>());
    assert_eq!(
        registry.fetch(1).unwrap_err().kind(),
        ErrorKind::NotEnoughSpace
    );
}

#[test]
fn registry_refills_gaps_in_ascending_order() {
    let mut registry = SlotRegistry::<10>::new();

    _ = registry.fetch(10).unwrap();

    for index in [9, 2, 7, 3, 5] {
        registry.release(index);
    }

    assert_eq!(registry.status().used(), 5);
    assert_eq!(registry.status().free(), 5);

    let indices = registry.fetch(4).unwrap();

    assert_eq!(indices.as_slice(), &[2, 3, 5, 7]);
    assert_eq!(registry.status().used(), 9);
    assert_eq!(registry.status().free(), 1);
}

#[test]
fn registry_fetch_results_are_strictly_ascending_and_unique() {
    let mut registry = SlotRegistry::<200>::new();

    // Punch an irregular pattern of holes into a full registry.
    _ = registry.fetch(200).unwrap();
    for index in (0..200).filter(|index| index % 7 == 0 || index % 11 == 3) {
        registry.release(index);
    }

    let free_before = registry.status().free();
    let indices = registry.fetch(free_before).unwrap();

    assert_eq!(indices.len(), free_before);
    assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(indices.iter().all(|&index| index < 200));
    assert!(indices
        .iter()
        .all(|&index| index % 7 == 0 || index % 11 == 3));
    assert_eq!(registry.status().free(), 0);
}

#[test]
fn record_allocation_with_single_slot() {
    let mut allocator = SlotAllocator::<Parameter, 1>::new();
    allocator.initialize().unwrap();

    let handle = allocator.allocate().unwrap();

    // SAFETY: The value is live and no other reference to it exists.
    let parameter = unsafe { handle.as_mut() };
    parameter.id = "A".to_string();
    parameter.value = 1.5;

    // SAFETY: The value is live and the exclusive reference above is no longer used.
    let parameter = unsafe { handle.as_ref() };
    assert_eq!(parameter.id, "A");
    assert_eq!(parameter.value.to_bits(), 1.5_f32.to_bits());

    let error = allocator.allocate().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotEnoughSpace);
}

#[test]
fn bucket_round_trip() {
    let mut allocator = SlotAllocator::<Parameter, 5>::new();
    allocator.initialize().unwrap();

    let bucket = allocator.allocate_bucket::<3>().unwrap();

    for (handle, id) in bucket.iter().zip(["A", "B", "Cx"]) {
        allocator.get_mut(handle).unwrap().id = id.to_string();
    }

    assert_eq!(bucket.len(), 3);
    assert_eq!(bucket.get(3).unwrap_err().kind(), ErrorKind::OutOfBounds);

    let ids: Vec<_> = bucket
        .iter()
        .map(|handle| allocator.get(handle).unwrap().id.clone())
        .collect();
    assert_eq!(ids, ["A", "B", "Cx"]);

    assert!(allocator.deallocate_bucket(&bucket).unwrap());

    let status = allocator.status();
    assert_eq!(status.used(), 0);
    assert_eq!(status.free(), 5);
}

#[test]
fn lifecycle_errors() {
    let mut allocator = SlotAllocator::<u32, 2>::new();

    assert_eq!(
        allocator.allocate().unwrap_err().kind(),
        ErrorKind::NotInitialized
    );

    allocator.initialize().unwrap();
    assert_eq!(
        allocator.initialize().unwrap_err().kind(),
        ErrorKind::AlreadyInitialized
    );

    allocator.deinitialize();
    allocator.deinitialize();
    assert!(!allocator.is_initialized());

    assert_eq!(
        allocator.allocate().unwrap_err().kind(),
        ErrorKind::NotInitialized
    );
}

#[test]
fn reused_slot_holds_default_value() {
    let mut allocator = SlotAllocator::<Parameter, 1>::new();
    allocator.initialize().unwrap();

    let handle = allocator.allocate().unwrap();
    *allocator.get_mut(handle).unwrap() = Parameter {
        id: "previous occupant".to_string(),
        value: 99.0,
    };

    assert!(allocator.deallocate(handle).unwrap());

    let reused = allocator.allocate().unwrap();

    assert_eq!(reused, handle);
    assert_eq!(allocator.get(reused), Some(&Parameter::default()));
}

#[test]
fn errors_describe_themselves() {
    let mut allocator = SlotAllocator::<u8, 1>::new();

    let error = allocator.allocate().unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotInitialized);
    assert!(!error.description().is_empty());
    assert!(error.location().file().ends_with(".rs"));
    assert!(error.to_string().contains("not initialized"));
}

#[test]
fn every_allocated_value_is_dropped_exactly_once() {
    /// Only values that carry a counter are counted; blanks made via `Default` are not.
    #[derive(Default)]
    struct Tracked(Option<Rc<Cell<usize>>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            if let Some(drops) = &self.0 {
                drops.set(drops.get() + 1);
            }
        }
    }

    let drops = Rc::new(Cell::new(0));

    {
        let mut allocator = SlotAllocator::<Tracked, 8>::new();
        allocator.initialize().unwrap();

        let handles: Vec<Handle<Tracked>> = (0..8)
            .map(|_| {
                allocator
                    .insert(Tracked(Some(Rc::clone(&drops))))
                    .unwrap()
            })
            .collect();

        for handle in handles.iter().step_by(2) {
            assert!(allocator.deallocate(*handle).unwrap());
        }

        assert_eq!(drops.get(), 4);
        assert_eq!(allocator.len(), 4);
    }

    assert_eq!(drops.get(), 8);
}

#[test]
fn probe_observes_allocator_from_other_thread() {
    let mut allocator = SlotAllocator::<u64, 4>::new();
    allocator.initialize().unwrap();

    let probe = allocator.status_probe();
    let allocated = Arc::new(Barrier::new(2));
    let observed = Arc::new(Barrier::new(2));

    let observer = thread::spawn({
        let allocated = Arc::clone(&allocated);
        let observed = Arc::clone(&observed);

        move || {
            allocated.wait();
            let status = probe.status();
            observed.wait();
            status
        }
    });

    let bucket = allocator.allocate_bucket::<3>().unwrap();
    allocated.wait();
    observed.wait();

    let status = observer.join().unwrap();
    assert_eq!(status.used(), 3);
    assert_eq!(status.free(), 1);

    allocator.deallocate_bucket(&bucket).unwrap();
}

#[test]
fn shared_between_threads_via_mutex() {
    let allocator = Arc::new(Mutex::new(SlotAllocator::<u64, 64>::new()));
    allocator.lock().unwrap().initialize().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let allocator = Arc::clone(&allocator);

            thread::spawn(move || {
                for round in 0..100 {
                    let mut allocator = allocator.lock().unwrap();

                    let handle = allocator.insert(worker * 1000 + round).unwrap();
                    assert_eq!(allocator.get(handle), Some(&(worker * 1000 + round)));
                    assert!(allocator.deallocate(handle).unwrap());
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(allocator.lock().unwrap().is_empty());
}
