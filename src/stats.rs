//! Textual snapshot of the allocator registry, gated behind the `stats`
//! cargo feature. The format is diagnostic output for humans, not a
//! compatibility surface.

use std::fmt::Write;

use crate::{allocator::DynamicAllocator, backing::BackingAllocator};

impl<B: BackingAllocator> DynamicAllocator<B> {
    /// Renders every live descriptor and the recycle bin. Read-only.
    pub fn stats(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "dynamic allocator stats for {:p}", self);
        let _ = writeln!(
            out,
            " total[{}] free[{}] occupied[{}]",
            self.total_size(),
            self.free_size(),
            self.occupied_size()
        );

        let _ = writeln!(out, " blocks:");
        for (id, block) in self.registry.iter() {
            let memory = block
                .memory
                .map(|memory| memory.as_ptr() as usize)
                .unwrap_or(0);
            let next = match block.next {
                Some(next) => next.to_string(),
                None => "-".into(),
            };

            let _ = writeln!(
                out,
                "  id[{id}] size[{}] free[{}] primary[{}] next[{next}] adjacent[{}] memory[{memory:#x}]",
                block.size, block.is_free, block.is_primary, block.is_adjacent_to_next,
            );
        }

        if self.registry.free_ids.is_empty() {
            let _ = writeln!(out, " no free ids");
        } else {
            let _ = write!(out, " free ids:");
            for id in &self.registry.free_ids {
                let _ = write!(out, " {id}");
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use crate::DynamicAllocator;

    #[test]
    fn snapshot_lists_blocks_and_free_ids() {
        let mut allocator = DynamicAllocator::new(1024);

        let a = allocator.allocate(200).unwrap();
        let b = allocator.allocate(200).unwrap();
        allocator.free(a);

        let snapshot = allocator.stats();
        assert!(snapshot.contains("total[1024]"));
        assert!(snapshot.contains("id[0]"));
        assert!(snapshot.contains(" no free ids"));

        // Merging A into the pool after B goes parks a slot in the bin.
        allocator.free(b);
        assert!(allocator.stats().contains(" free ids:"));
    }
}
