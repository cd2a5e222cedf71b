//! Allocating several slots at once with `allocate_bucket()` and observing occupancy from
//! another thread through a status probe.

use std::thread;

use slot_pool::{ErrorKind, SlotAllocator};

fn main() {
    let mut allocator = SlotAllocator::<u64, 5>::new();
    allocator.initialize().unwrap();

    let probe = allocator.status_probe();

    // Either all three slots are reserved or none is.
    let bucket = allocator.allocate_bucket::<3>().unwrap();

    for (handle, value) in bucket.iter().zip(100_u64..) {
        *allocator.get_mut(handle).unwrap() = value;
    }

    // The probe reads the occupancy counter without touching the allocator.
    thread::spawn(move || {
        let status = probe.status();
        println!("Seen from another thread: {} used, {} free", status.used(), status.free());
    })
    .join()
    .unwrap();

    match allocator.allocate_bucket::<3>() {
        Err(error) if error.kind() == ErrorKind::NotEnoughSpace => {
            println!("Second bucket does not fit: {error}");
        }
        other => println!("Unexpected outcome: {other:?}"),
    }

    match bucket.get(3) {
        Ok(handle) => println!("Unexpected handle: {handle:?}"),
        Err(error) => println!("Indexing past the end fails: {error}"),
    }

    for handle in &bucket {
        println!("Bucket value: {:?}", allocator.get(handle));
    }

    allocator.deallocate_bucket(&bucket).unwrap();
    println!("After returning the bucket: {:?}", allocator.status());
}
