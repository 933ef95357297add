use std::ptr::NonNull;

use crate::Pointer;

/// Abstraction over the source of raw memory. The allocator only needs to
/// acquire contiguous byte regions and hand them back when they become
/// entirely free, it doesn't care which heap, kernel API or arena they come
/// from.
///
/// Regions obtained from distinct [`BackingAllocator::acquire`] calls are
/// assumed non-contiguous in address space; the allocator never merges
/// blocks across them.
pub trait BackingAllocator {
    /// Requests a fresh, uninitialised region where `size` bytes can be
    /// written safely. Returns `None` when the backing is exhausted.
    ///
    /// # Safety
    ///
    /// Implementations hand out raw memory. The returned region must stay
    /// valid and stable until it is passed back to
    /// [`BackingAllocator::release`].
    unsafe fn acquire(&mut self, size: usize) -> Pointer<u8>;

    /// Relinquishes a region previously returned by
    /// [`BackingAllocator::acquire`].
    ///
    /// # Safety
    ///
    /// `address` must be the exact address of a previous
    /// [`BackingAllocator::acquire`] that has not been released since.
    unsafe fn release(&mut self, address: NonNull<u8>);
}

/// Default [`BackingAllocator`]: the process heap. Carries no state, so a
/// fresh value can be constructed wherever one is needed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHeap;

#[cfg(unix)]
#[cfg(not(miri))]
mod unix {
    use std::ptr::NonNull;

    use super::{BackingAllocator, SystemHeap};
    use crate::Pointer;

    impl BackingAllocator for SystemHeap {
        unsafe fn acquire(&mut self, size: usize) -> Pointer<u8> {
            NonNull::new(libc::malloc(size).cast())
        }

        unsafe fn release(&mut self, address: NonNull<u8>) {
            libc::free(address.cast().as_ptr());
        }
    }
}

#[cfg(windows)]
#[cfg(not(miri))]
mod windows {
    use std::ptr::NonNull;

    use windows::Win32::System::Memory;

    use super::{BackingAllocator, SystemHeap};
    use crate::Pointer;

    impl BackingAllocator for SystemHeap {
        unsafe fn acquire(&mut self, size: usize) -> Pointer<u8> {
            // Memory has to be reserved and then committed to become
            // usable, both can be done in a single call. See
            // https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualalloc#parameters
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;
            let protection = Memory::PAGE_READWRITE;

            let address = Memory::VirtualAlloc(None, size, flags, protection);

            NonNull::new(address.cast())
        }

        unsafe fn release(&mut self, address: NonNull<u8>) {
            // Specifying length 0 with MEM_RELEASE decommits and releases
            // the whole allocation, so the address alone is enough. See
            // https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualfree#parameters
            let length = 0;
            let flags = Memory::MEM_RELEASE;

            if !Memory::VirtualFree(address.cast().as_ptr(), length, flags).as_bool() {
                // TODO: Release failed and the region is still mapped.
                // Nothing sensible to do without an error channel here.
            }
        }
    }
}

#[cfg(miri)]
mod miri {
    //! Miri has no FFI support, so the process heap is mocked with the
    //! global allocator. [`BackingAllocator::release`] only receives the
    //! address back, while [`std::alloc::dealloc`] wants the full layout,
    //! so the region length is stashed in a word ahead of the handed-out
    //! address.

    use std::{alloc, mem, ptr::NonNull};

    use super::{BackingAllocator, SystemHeap};
    use crate::Pointer;

    const HEADER: usize = mem::size_of::<usize>();

    fn to_layout(size: usize) -> alloc::Layout {
        alloc::Layout::from_size_align(HEADER + size, mem::align_of::<usize>()).unwrap()
    }

    impl BackingAllocator for SystemHeap {
        unsafe fn acquire(&mut self, size: usize) -> Pointer<u8> {
            let raw = alloc::alloc(to_layout(size));
            if raw.is_null() {
                return None;
            }

            raw.cast::<usize>().write(size);

            Some(NonNull::new_unchecked(raw.add(HEADER)))
        }

        unsafe fn release(&mut self, address: NonNull<u8>) {
            let raw = address.as_ptr().sub(HEADER);
            let size = raw.cast::<usize>().read();

            alloc::dealloc(raw, to_layout(size));
        }
    }
}
