//! Demo driver for the dynamic allocator. Run with:
//!
//! ```text
//! cargo run --example standalone --features stats
//! ```

use dynalloc::DynamicAllocator;

fn main() {
    let mut allocator = DynamicAllocator::new(1024 * 1024);

    // An "array" of 200 ints, written through the raw pointer.
    let ints = allocator.allocate(200 * std::mem::size_of::<i32>()).unwrap();
    unsafe {
        ints.as_ptr().cast::<i32>().add(18).write_unaligned(163_456);
        println!(
            "int #18 reads back as {}",
            ints.as_ptr().cast::<i32>().add(18).read_unaligned()
        );
    }

    // Churn: allocations of growing size, each freed right away. The pool
    // never grows because everything merges back.
    for i in 8..10_000usize {
        let address = allocator.allocate(i * 10).unwrap();
        unsafe { address.as_ptr().cast::<i32>().write_unaligned(15) };
        allocator.free(address);
    }
    println!(
        "after churn: total {} bytes, free {} bytes",
        allocator.total_size(),
        allocator.free_size()
    );

    // Grow the pool, make a big allocation, then ask for a shrink. The
    // first shrink releases the fresh 10,000 byte primary but reports
    // false because the pool still exceeds the target: the original
    // primary is split by live allocations and stays pinned. It stays
    // pinned even after the big block is freed, since the int array
    // still sits at its head.
    allocator.resize(1024 * 1024 + 10_000);
    let big = allocator.allocate(1024 * 980).unwrap();
    println!("shrink with live blocks: {}", allocator.resize(1024 * 5));
    allocator.free(big);
    println!("shrink with pinned primary: {}", allocator.resize(1024 * 5));

    println!("{}", allocator.stats());

    allocator.clear();

    // The allocator bootstraps itself again after a clear.
    let ints = allocator.allocate(50 * std::mem::size_of::<i32>()).unwrap();
    unsafe {
        ints.as_ptr().cast::<i32>().add(49).write_unaligned(637);
        println!(
            "after clear, int #49 reads back as {}",
            ints.as_ptr().cast::<i32>().add(49).read_unaligned()
        );
    }
    allocator.free(ints);
}
