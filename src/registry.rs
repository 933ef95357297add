use crate::block::{Block, BlockId};

/// Descriptor slots reserved at construction unless the caller asks for a
/// different amount.
pub const DEFAULT_MAX_DESCRIPTORS: usize = 50 * 1024;

/// Once more than this many invalidated slots pile up in the recycle bin,
/// new descriptors start reusing them instead of growing the slot array.
pub(crate) const FREE_IDS_THRESHOLD: usize = 64;

/// Compact, index-addressed pool of block descriptors. This struct was
/// created as an abstraction to keep the slot bookkeeping (dense storage,
/// the recycle bin, the size counters) out of the allocation algorithms;
/// [`crate::allocator`] only deals with logical list order.
///
/// Slot storage never shrinks. Invalidated slots are parked in `free_ids`
/// and handed out again by [`Registry::allocate_slot`], but only once the
/// bin grows past [`FREE_IDS_THRESHOLD`], and then until it drains
/// completely. The hysteresis keeps a workload that frees and splits in
/// lockstep from bouncing a single slot in and out of the bin.
pub(crate) struct Registry {
    /// Dense descriptor storage. Indices are stable identifiers.
    blocks: Vec<Block>,
    /// Slot indices invalidated by coalescing or release, available for
    /// reuse.
    pub free_ids: Vec<BlockId>,
    /// First descriptor in logical order.
    pub head: Option<BlockId>,
    /// Last descriptor in logical order. Its `next` is always `None`.
    pub tail: Option<BlockId>,
    /// Sum of `size` over all live descriptors.
    pub total_size: usize,
    /// Sum of `size` over live descriptors with `is_free` set.
    pub free_size: usize,
    /// Recycle bin latch. See [`Registry::allocate_slot`].
    use_free_bin: bool,
}

impl Registry {
    pub fn with_capacity(max_descriptors: usize) -> Self {
        Self {
            blocks: Vec::with_capacity(max_descriptors),
            free_ids: Vec::with_capacity(max_descriptors),
            head: None,
            tail: None,
            total_size: 0,
            free_size: 0,
            use_free_bin: false,
        }
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id as usize]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id as usize]
    }

    /// Whether any slot storage exists at all. Note that a registry whose
    /// primaries have all been released is *not* empty in this sense: the
    /// slots stay behind in the bin.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Stores `block` in a slot and returns its id. Reuses a binned slot
    /// while the latch is set, clearing the latch when the bin drains;
    /// otherwise appends.
    pub fn allocate_slot(&mut self, block: Block) -> BlockId {
        if self.use_free_bin {
            debug_assert!(!self.free_ids.is_empty());

            if let Some(id) = self.free_ids.pop() {
                if self.free_ids.is_empty() {
                    self.use_free_bin = false;
                }
                self.blocks[id as usize] = block;
                return id;
            }
        }

        self.blocks.push(block);

        (self.blocks.len() - 1) as BlockId
    }

    /// Overwrites the slot with an empty descriptor and parks its id in
    /// the recycle bin, latching the bin once it grows past
    /// [`FREE_IDS_THRESHOLD`]. The caller must have unlinked `id` from the
    /// logical list already.
    pub fn invalidate(&mut self, id: BlockId) {
        self.blocks[id as usize] = Block::default();
        self.free_ids.push(id);

        if self.free_ids.len() > FREE_IDS_THRESHOLD {
            self.use_free_bin = true;
        }
    }

    /// Forgets every descriptor and counter. The only reset path; slot
    /// storage capacity is kept.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.free_ids.clear();
        self.head = None;
        self.tail = None;
        self.total_size = 0;
        self.free_size = 0;
        self.use_free_bin = false;
    }

    /// Visits live descriptors in logical order, head to tail.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }
}

pub(crate) struct Iter<'a> {
    registry: &'a Registry,
    cursor: Option<BlockId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (BlockId, &'a Block);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let block = self.registry.block(id);
        self.cursor = block.next;

        Some((id, block))
    }
}
