use std::ptr::NonNull;

use crate::{
    backing::{BackingAllocator, SystemHeap},
    block::{Block, BlockId, MIN_ALLOC_SIZE},
    registry::{Registry, DEFAULT_MAX_DESCRIPTORS},
    report, Pointer,
};

/// General purpose allocator for medium and large allocations. Owns one or
/// more primary regions acquired from a [`BackingAllocator`] and carves
/// them into blocks tracked by the descriptor registry:
///
/// ```text
///  registry                        backing memory
/// +--------------------+
/// | 0: Alloc, next: 2 -|-------> +---------+--------+-------+
/// +--------------------+         |    0    |   2    |   1   |  primary A
/// | 1: Free,  next: 3 -|--+      +---------+--------+-------+
/// +--------------------+  |
/// | 2: Free,  next: 1 -|--+----> +------------------+
/// +--------------------+         |        3         |          primary B
/// | 3: Free            |         +------------------+
/// +--------------------+
/// ```
///
/// Allocation walks the whole list and takes the best fit, splitting off
/// the tail of the chosen block when the remainder is at least
/// [`MIN_ALLOC_SIZE`] bytes. Freeing coalesces the block with free
/// byte-contiguous neighbours, so a primary that drains completely
/// collapses back into a single descriptor eligible for release.
///
/// The pool grows on demand ([`DynamicAllocator::allocate`] resizes when
/// nothing fits) and shrinks only when asked to
/// ([`DynamicAllocator::resize`] with a smaller target). Dropping the
/// allocator releases every primary region, as does
/// [`DynamicAllocator::clear`].
///
/// Returned addresses are not aligned beyond whatever the backing
/// provides. The type contains raw pointers and is therefore neither
/// [`Send`] nor [`Sync`]; wrap it yourself if you need to share it, the
/// registry itself is not guarded.
pub struct DynamicAllocator<B: BackingAllocator = SystemHeap> {
    pub(crate) registry: Registry,
    backing: B,
}

impl DynamicAllocator<SystemHeap> {
    /// Builds an allocator over the process heap with `base_size` bytes of
    /// initial pool and room for [`DEFAULT_MAX_DESCRIPTORS`] descriptors.
    pub fn new(base_size: usize) -> Self {
        Self::with_backing(SystemHeap, base_size, DEFAULT_MAX_DESCRIPTORS)
    }

    /// Same as [`DynamicAllocator::new`] with an explicit descriptor
    /// reservation. `max_descriptors` is a capacity hint, not a limit.
    pub fn with_max_descriptors(base_size: usize, max_descriptors: usize) -> Self {
        Self::with_backing(SystemHeap, base_size, max_descriptors)
    }
}

impl<B: BackingAllocator> DynamicAllocator<B> {
    /// Builds an allocator over a custom backing. If the backing refuses
    /// the initial region the allocator starts out empty and the first
    /// allocation retries.
    pub fn with_backing(backing: B, base_size: usize, max_descriptors: usize) -> Self {
        let mut allocator = Self {
            registry: Registry::with_capacity(max_descriptors),
            backing,
        };

        if !allocator.resize(base_size) {
            report!("initial resize to {base_size} bytes failed, starting empty");
        }

        allocator
    }

    /// Allocates `size` bytes and returns their address, or `None` when
    /// the pool cannot grow enough to satisfy the request. The address
    /// stays valid until it is passed to [`DynamicAllocator::free`] or the
    /// allocator is cleared or dropped.
    ///
    /// `size` must be greater than zero.
    pub fn allocate(&mut self, size: usize) -> Pointer<u8> {
        debug_assert!(size > 0, "allocation of zero bytes");

        if size <= MIN_ALLOC_SIZE {
            report!("allocation of only {size} bytes, consider a small object allocator");
        }

        if size > self.registry.free_size {
            // Failure is not final here, the best-fit walk below has the
            // last word on whether anything fits.
            let _ = self.resize(self.registry.total_size + size);
        }

        let target = match self.find_best_fit(size) {
            Some(id) => id,
            None => {
                report!("no free block fits {size} bytes, growing the pool");
                if !self.resize(self.registry.total_size + size) {
                    return None;
                }
                // Growth appends the fresh primary at the tail.
                self.registry.tail?
            }
        };

        self.split_block_if_possible(target, size);

        let block = self.registry.block_mut(target);
        block.is_free = false;
        let taken = block.size;
        self.registry.free_size -= taken;

        self.registry.block(target).memory
    }

    /// Returns the block at `address` to the pool, coalescing it with free
    /// byte-contiguous neighbours. `true` when the address was recognised
    /// and freed; `false` for unknown or already free addresses.
    pub fn free(&mut self, address: NonNull<u8>) -> bool {
        let mut previous = None;
        let mut cursor = self.registry.head;

        while let Some(id) = cursor {
            let block = *self.registry.block(id);

            if block.memory == Some(address) {
                if block.is_free {
                    report!("double free of {address:p}");
                    return false;
                }

                self.coalesce_freed(id, previous);
                return true;
            }

            previous = Some(id);
            cursor = block.next;
        }

        report!("free of unrecognised address {address:p}");
        false
    }

    /// Adjusts the pool toward `target` total bytes.
    ///
    /// Growing acquires a single fresh primary region for the difference
    /// and always leaves a free block of at least that size. Shrinking
    /// releases entirely free primary regions until the pool no longer
    /// exceeds the target; it returns `false` when not enough could be
    /// shed (any partial shrinkage is kept). A shrink is refused outright
    /// when the free slack is below `target`.
    pub fn resize(&mut self, target: usize) -> bool {
        if target <= MIN_ALLOC_SIZE {
            report!("resizing to only {target} bytes");
        }

        if self.registry.is_empty() && self.registry.total_size == 0 {
            debug_assert!(self.registry.head.is_none());
            return self.bootstrap(target);
        }

        debug_assert!(target != 0, "resize of a non-empty pool to zero bytes");

        if target < self.registry.total_size && self.registry.free_size >= target {
            self.shrink(target)
        } else if target > self.registry.total_size {
            self.grow(target)
        } else if target == self.registry.total_size {
            true
        } else {
            // Not enough slack to shed down to the target.
            report!(
                "cannot shrink to {target} bytes, only {} of {} bytes are free",
                self.registry.free_size,
                self.registry.total_size
            );
            false
        }
    }

    /// Releases every primary region and resets the registry to the empty
    /// state. Addresses handed out by [`DynamicAllocator::allocate`] are
    /// all invalidated.
    pub fn clear(&mut self) {
        let mut cursor = self.registry.head;

        while let Some(id) = cursor {
            let block = *self.registry.block(id);
            cursor = block.next;

            if block.is_primary {
                debug_assert!(block.memory.is_some());
                if let Some(memory) = block.memory {
                    unsafe { self.backing.release(memory) };
                }
            }
        }

        self.registry.clear();
    }

    /// Total bytes owned by the pool.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.registry.total_size
    }

    /// Bytes currently available for allocation.
    #[inline]
    pub fn free_size(&self) -> usize {
        self.registry.free_size
    }

    /// Bytes currently handed out.
    #[inline]
    pub fn occupied_size(&self) -> usize {
        debug_assert!(self.registry.free_size <= self.registry.total_size);
        self.registry.total_size - self.registry.free_size
    }

    /// Walks the whole list and picks the smallest free block that can
    /// hold `size` bytes, first occurrence winning ties.
    fn find_best_fit(&self, size: usize) -> Option<BlockId> {
        let mut best: Option<(BlockId, usize)> = None;

        for (id, block) in self.registry.iter() {
            if !block.is_free || block.size < size {
                continue;
            }

            // Strict comparison keeps the first of equally sized
            // candidates.
            let better = match best {
                None => true,
                Some((_, best_size)) => best_size > block.size,
            };

            if better {
                best = Some((id, block.size));
            }
        }

        best.map(|(id, _)| id)
    }

    /// Splits the tail of block `id` off into a new free descriptor so
    /// only `size` bytes are handed out. Declined when the block is not
    /// strictly larger than the request or the remainder would be smaller
    /// than [`MIN_ALLOC_SIZE`]; in that case the caller keeps the whole
    /// block, slack included.
    fn split_block_if_possible(&mut self, id: BlockId, size: usize) {
        let block = *self.registry.block(id);

        if block.size <= size || block.size - size < MIN_ALLOC_SIZE {
            return;
        }

        let remainder = Block {
            size: block.size - size,
            memory: unsafe { block.address_at(size) },
            next: block.next,
            is_adjacent_to_next: block.is_adjacent_to_next,
            is_free: true,
            // The remainder never represents a whole acquired region.
            is_primary: false,
        };

        let remainder_id = self.registry.allocate_slot(remainder);

        let block = self.registry.block_mut(id);
        block.size = size;
        block.next = Some(remainder_id);
        block.is_adjacent_to_next = true;

        if self.registry.tail == Some(id) {
            self.registry.tail = Some(remainder_id);
        }
    }

    /// Marks block `id` free and merges it with free byte-contiguous
    /// neighbours, forward first, so freeing the middle of three
    /// mergeable blocks collapses all of them in one call. `previous` is
    /// the list predecessor of `id` as seen during the lookup walk.
    fn coalesce_freed(&mut self, id: BlockId, previous: Option<BlockId>) {
        self.registry.block_mut(id).is_free = true;

        let freed = *self.registry.block(id);
        self.registry.free_size += freed.size;

        if let Some(next_id) = freed.next {
            if freed.is_adjacent_to_next && self.registry.block(next_id).is_free {
                let absorbed = *self.registry.block(next_id);

                let current = self.registry.block_mut(id);
                current.size += absorbed.size;
                current.is_adjacent_to_next = absorbed.is_adjacent_to_next;
                current.next = absorbed.next;

                if self.registry.tail == Some(next_id) {
                    self.registry.tail = Some(id);
                }

                self.registry.invalidate(next_id);
            }
        }

        if let Some(previous_id) = previous {
            let before = *self.registry.block(previous_id);

            if before.is_adjacent_to_next && before.is_free {
                let absorbed = *self.registry.block(id);

                let previous = self.registry.block_mut(previous_id);
                previous.size += absorbed.size;
                previous.is_adjacent_to_next = absorbed.is_adjacent_to_next;
                previous.next = absorbed.next;

                if self.registry.tail == Some(id) {
                    self.registry.tail = Some(previous_id);
                }

                self.registry.invalidate(id);
            }
        }
    }

    /// First acquisition of an empty allocator: one primary covering the
    /// whole pool.
    fn bootstrap(&mut self, target: usize) -> bool {
        let Some(memory) = (unsafe { self.backing.acquire(target) }) else {
            report!("backing refused the initial {target} byte region");
            return false;
        };

        let id = self.registry.allocate_slot(Block {
            size: target,
            memory: Some(memory),
            next: None,
            is_adjacent_to_next: false,
            is_free: true,
            is_primary: true,
        });

        self.registry.head = Some(id);
        self.registry.tail = Some(id);
        self.registry.total_size = target;
        self.registry.free_size = target;

        true
    }

    /// Acquires one fresh primary for the difference up to `target` and
    /// links it at the tail.
    fn grow(&mut self, target: usize) -> bool {
        let amount = target - self.registry.total_size;

        let Some(memory) = (unsafe { self.backing.acquire(amount) }) else {
            report!("backing refused a {amount} byte region");
            return false;
        };

        let id = self.registry.allocate_slot(Block {
            size: amount,
            memory: Some(memory),
            next: None,
            is_adjacent_to_next: false,
            is_free: true,
            is_primary: true,
        });

        // Distinct acquisitions are assumed non-contiguous, so the old
        // tail keeps is_adjacent_to_next unset.
        match self.registry.tail {
            Some(tail_id) => self.registry.block_mut(tail_id).next = Some(id),
            // Every earlier primary was released; the list restarts here.
            None => self.registry.head = Some(id),
        }
        self.registry.tail = Some(id);

        self.registry.total_size = target;
        self.registry.free_size += amount;

        true
    }

    /// Walks the list releasing primaries that are entirely free and
    /// still whole, until the pool no longer exceeds `target`. A primary
    /// that has been split stays pinned until its remainder merges back,
    /// even if every byte of it is free.
    fn shrink(&mut self, target: usize) -> bool {
        let mut previous = None;
        let mut cursor = self.registry.head;

        while let Some(id) = cursor {
            let block = *self.registry.block(id);
            cursor = block.next;

            if !(block.is_primary && block.is_free && !block.is_adjacent_to_next) {
                previous = Some(id);
                continue;
            }

            debug_assert!(block.memory.is_some());
            if let Some(memory) = block.memory {
                unsafe { self.backing.release(memory) };
            }

            self.registry.total_size -= block.size;
            self.registry.free_size -= block.size;

            // Splice the released descriptor out of the logical list.
            if self.registry.head == Some(id) {
                self.registry.head = block.next;
            }
            if let Some(previous_id) = previous {
                self.registry.block_mut(previous_id).next = block.next;
            }
            if self.registry.tail == Some(id) {
                self.registry.tail = previous;
            }
            self.registry.invalidate(id);

            if self.registry.total_size <= target || self.registry.free_size <= target {
                break;
            }
        }

        let reached = self.registry.total_size <= target || self.registry.free_size <= target;

        if !reached {
            report!(
                "shrink stopped at {} total bytes, above the requested {target}",
                self.registry.total_size
            );
        }

        reached
    }
}

impl<B: BackingAllocator> Drop for DynamicAllocator<B> {
    fn drop(&mut self) {
        self.clear();
    }
}
