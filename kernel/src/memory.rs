//! Physical memory access: copying bytes between the RAM the pager/DMA
//! layers manage directly (by physical address or frame number) and
//! buffers supplied by user-mode callers.
//!
//! Kept as its own narrow trait for the same reason `device::DeviceBus`
//! is: production code touches real memory through raw pointers, tests
//! substitute an in-memory double, and handler code never sees the
//! difference.

use crate::konst::PAGE_SIZE;
use crate::types::Frame;

/// Byte-level access to physical RAM, addressed either by raw physical
/// address (user buffers, DMA frames) or by frame number (swap pool /
/// page-table frames).
pub trait Ram {
    fn copy_from_addr(&self, addr: u32, dst: &mut [u8]);
    fn copy_to_addr(&self, addr: u32, src: &[u8]);

    fn read_frame(&self, frame_addr: u32, dst: &mut [u8; PAGE_SIZE]) {
        self.copy_from_addr(frame_addr, dst);
    }

    fn write_frame(&self, frame_addr: u32, src: &[u8; PAGE_SIZE]) {
        self.copy_to_addr(frame_addr, src);
    }
}

/// Production [`Ram`] backed by real memory.
///
/// # Safety
/// Callers must ensure `addr` and `addr + dst.len()` describe readable (for
/// `copy_from_addr`) or writable (for `copy_to_addr`) physical memory — in
/// particular that a user-supplied address has already been validated to
/// lie within that process's mapped segment before this is called.
pub struct PhysicalRam;

impl Ram for PhysicalRam {
    fn copy_from_addr(&self, addr: u32, dst: &mut [u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(addr as *const u8, dst.as_mut_ptr(), dst.len());
        }
    }

    fn copy_to_addr(&self, addr: u32, src: &[u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), addr as *mut u8, src.len());
        }
    }
}

/// Physical address of swap-pool-local frame `index` (0-based within the
/// pool), using the base-plus-offset formula the specification calls for
/// — *not* `frame << VPNSHIFT`, which the drafts in `original_source/`
/// get wrong.
pub fn swap_frame_addr(index: usize) -> u32 {
    use crate::konst::{RAMSTART, SWAP_POOL_START_FRAME};
    RAMSTART + (SWAP_POOL_START_FRAME + index as u32) * PAGE_SIZE as u32
}

/// Physical address of the DMA buffer frame reserved for disk `disk_index`.
pub fn dma_disk_frame_addr(disk_index: u8) -> u32 {
    use crate::konst::{DMA_DISK_START_FRAME, RAMSTART};
    RAMSTART + (DMA_DISK_START_FRAME + disk_index as u32) * PAGE_SIZE as u32
}

/// Physical address of the DMA buffer frame reserved for flash device
/// `flash_index`.
pub fn dma_flash_frame_addr(flash_index: u8) -> u32 {
    use crate::konst::{DMA_FLASH_START_FRAME, RAMSTART};
    RAMSTART + (DMA_FLASH_START_FRAME + flash_index as u32) * PAGE_SIZE as u32
}

/// Converts a swap-pool frame index to the [`Frame`] number stored in a
/// page table entry (`entryLo`'s frame field is a page-aligned physical
/// address shifted right by `VPN_SHIFT`, i.e. a frame *number*, not a
/// swap-pool index — the two coincide only because the pool's frames are
/// contiguous).
pub fn swap_frame_number(index: usize) -> Frame {
    swap_frame_addr(index) >> crate::konst::VPN_SHIFT
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use alloc::collections::BTreeMap;
    use core::cell::RefCell;

    /// Sparse in-memory double for [`Ram`]; addresses never collide with
    /// real hardware in tests, so a `BTreeMap` keyed by address is enough.
    #[derive(Default)]
    pub struct MockRam {
        bytes: RefCell<BTreeMap<u32, u8>>,
    }

    impl MockRam {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Ram for MockRam {
        fn copy_from_addr(&self, addr: u32, dst: &mut [u8]) {
            let bytes = self.bytes.borrow();
            for (i, slot) in dst.iter_mut().enumerate() {
                *slot = *bytes.get(&(addr + i as u32)).unwrap_or(&0);
            }
        }

        fn copy_to_addr(&self, addr: u32, src: &[u8]) {
            let mut bytes = self.bytes.borrow_mut();
            for (i, byte) in src.iter().enumerate() {
                bytes.insert(addr + i as u32, *byte);
            }
        }
    }
}
