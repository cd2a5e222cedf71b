//! Basic usage of the `slot_pool` crate:
//!
//! * Creating and initializing an allocator.
//! * Allocating values.
//! * Accessing values.
//! * Deallocating values.

use slot_pool::SlotAllocator;

#[derive(Debug, Default)]
struct Parameter {
    id: String,
    value: f32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let mut allocator = SlotAllocator::<Parameter, 4>::new();

    // Nothing is reserved until the allocator is initialized.
    allocator
        .initialize()
        .expect("a few small parameters always fit in memory");

    // Allocating gives you a handle that refers to the value in its slot.
    let gain = allocator.allocate().unwrap();
    let offset = allocator
        .insert(Parameter {
            id: "offset".to_string(),
            value: -0.25,
        })
        .unwrap();

    // Checked access borrows the allocator for as long as you use the value.
    if let Some(parameter) = allocator.get_mut(gain) {
        parameter.id = "gain".to_string();
        parameter.value = 1.5;
    }

    println!("Retrieved item: {:?}", allocator.get(gain));
    println!("Retrieved item: {:?}", allocator.get(offset));

    let status = allocator.status();
    println!(
        "Allocator holds {} items with room for {} more",
        status.used(),
        status.free()
    );

    allocator.deallocate(offset).unwrap();

    // The slot is reused, and it holds a fresh value rather than leftovers.
    let reused = allocator.allocate().unwrap();
    println!("Reused slot holds: {:?}", allocator.get(reused));

    allocator.deinitialize();
}
