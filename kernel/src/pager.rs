//! The demand pager (§4.1): the shared 16-frame swap pool, the TLB-invalid
//! fault handler, and the TLB-refill handler that installs an
//! already-resident page table entry without ever touching the swap pool.
//!
//! The swap pool frame *is* the DMA buffer for its own page-out/page-in —
//! unlike the SYS14-17 syscalls, which copy through a separate DMA bank,
//! the pager transfers directly between a pinned physical frame and that
//! process's flash backing store.

use spin::Mutex;

use crate::device::DeviceBus;
use crate::dma::flash;
use crate::error::{PanicReason, SupportError, SupportResult, TerminateReason};
use crate::konst::{
    EXC_MOD, STACK_FLASH_PAGE, STACK_PAGE_INDEX, STACK_PAGE_VPN, STATUS_READY, SWAP_POOL_SIZE,
    VPN_BASE, VPN_SHIFT,
};
use crate::memory::{swap_frame_addr, swap_frame_number};
use crate::nucleus::{critical_section, Nucleus, Semaphore};
use crate::process::SupportTable;
use crate::tlb::{ProbeResult, Tlb};
use crate::types::{Asid, ExceptionSlot, ExceptionState, Vpn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SwapPoolEntry {
    occupied: bool,
    asid: Asid,
    page_index: usize,
}

impl SwapPoolEntry {
    const EMPTY: Self = Self {
        occupied: false,
        asid: 0,
        page_index: 0,
    };
}

/// The shared swap pool: fixed-size, one entry per physical frame it owns.
pub struct SwapPool {
    entries: Mutex<[SwapPoolEntry; SWAP_POOL_SIZE]>,
    /// Round-robin victim cursor, advanced only when every frame is occupied.
    cursor: Mutex<usize>,
}

impl SwapPool {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new([SwapPoolEntry::EMPTY; SWAP_POOL_SIZE]),
            cursor: Mutex::new(0),
        }
    }

    /// Picks a frame for an incoming page: the first unoccupied slot, or
    /// the next frame in round-robin order if the pool is full. Returns
    /// the chosen index and, if a victim is being evicted, its old
    /// occupant.
    fn select_frame(&self) -> (usize, Option<SwapPoolEntry>) {
        let entries = self.entries.lock();
        if let Some(i) = entries.iter().position(|e| !e.occupied) {
            return (i, None);
        }
        drop(entries);
        let mut cursor = self.cursor.lock();
        let i = *cursor;
        *cursor = (*cursor + 1) % SWAP_POOL_SIZE;
        (i, Some(self.entries.lock()[i]))
    }

    fn install(&self, index: usize, asid: Asid, page_index: usize) {
        self.entries.lock()[index] = SwapPoolEntry {
            occupied: true,
            asid,
            page_index,
        };
    }

    #[cfg(test)]
    pub(crate) fn is_occupied(&self, index: usize) -> bool {
        self.entries.lock()[index].occupied
    }

    #[cfg(test)]
    pub(crate) fn install_for_test(&self, index: usize, asid: Asid, page_index: usize) {
        self.install(index, asid, page_index);
    }

    /// Releases every frame currently tagged with `asid`, as part of
    /// orderly termination (§7): the frame itself is left with stale
    /// contents, ready for the next process that round-robins into it.
    pub fn release_owned_by(&self, asid: Asid) {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if entry.occupied && entry.asid == asid {
                entry.occupied = false;
            }
        }
    }
}

impl Default for SwapPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a faulting VPN to its page table index, or `None` if it falls
/// outside the process's 32-entry address space.
fn page_index_for_vpn(vpn: Vpn) -> Option<usize> {
    let stack_vpn = STACK_PAGE_VPN >> VPN_SHIFT;
    if vpn == stack_vpn {
        return Some(STACK_PAGE_INDEX);
    }
    let base_vpn = VPN_BASE >> VPN_SHIFT;
    if vpn < base_vpn {
        return None;
    }
    let index = (vpn - base_vpn) as usize;
    if index < STACK_PAGE_INDEX {
        Some(index)
    } else {
        None
    }
}

/// This process's flash block for page table index `page_index`: the
/// stack page gets its own reserved block, the other 31 map directly.
fn flash_block_for(page_index: usize) -> u32 {
    if page_index == STACK_PAGE_INDEX {
        STACK_FLASH_PAGE as u32
    } else {
        page_index as u32
    }
}

struct SwapPoolGuard<'a, N: Nucleus + ?Sized> {
    nucleus: &'a N,
}

impl<'a, N: Nucleus + ?Sized> Drop for SwapPoolGuard<'a, N> {
    fn drop(&mut self) {
        self.nucleus.v(Semaphore::SwapPool);
    }
}

fn acquire_swap_pool<N: Nucleus + ?Sized>(nucleus: &N) -> SwapPoolGuard<'_, N> {
    nucleus.p(Semaphore::SwapPool);
    SwapPoolGuard { nucleus }
}

/// Moves one page between a swap-pool frame and `asid`'s flash backing
/// store. Any failure here is an environment invariant violation (this
/// crate, not the faulting user process, owns the backing store layout),
/// so it panics the system rather than terminating the caller.
fn transfer_backing_store<N: Nucleus + ?Sized, B: DeviceBus + ?Sized>(
    nucleus: &N,
    bus: &B,
    asid: Asid,
    page_index: usize,
    frame_index: usize,
    write: bool,
) -> SupportResult<()> {
    let flash_index = asid - 1;
    let block = flash_block_for(page_index);
    let frame_addr = swap_frame_addr(frame_index);
    let status = flash::transfer(nucleus, bus, flash_index, block, frame_addr, write)
        .map_err(|_| SupportError::Panic(PanicReason::NucleusInvariantViolated))?;
    if (status & 0xFF) != STATUS_READY {
        return Err(SupportError::Panic(PanicReason::BackingStoreFailure));
    }
    Ok(())
}

/// Handles a TLB-invalid load/store exception pending on `asid`'s
/// page-fault pass-up slot. Mirrors the eleven-step algorithm in §4.1:
/// classify, locate, acquire the pool, evict if necessary, load, update
/// the page table, refresh the TLB, release, resume.
pub fn handle_page_fault<N, B, T>(
    nucleus: &N,
    bus: &B,
    tlb: &T,
    swap_pool: &SwapPool,
    processes: &SupportTable,
    asid: Asid,
) -> SupportResult<()>
where
    N: Nucleus + ?Sized,
    B: DeviceBus + ?Sized,
    T: Tlb + ?Sized,
{
    let state = processes.exception_state(asid, ExceptionSlot::PageFault);
    if state.exc_code() == EXC_MOD {
        return Err(SupportError::Terminate(TerminateReason::TlbModification));
    }
    let page_index = page_index_for_vpn(state.vpn())
        .ok_or(SupportError::Terminate(TerminateReason::BadVirtualAddress))?;

    let _guard = acquire_swap_pool(nucleus);
    let (frame_index, victim) = swap_pool.select_frame();

    if let Some(victim) = victim {
        if victim.occupied {
            let invalidated = {
                let _critical = critical_section(nucleus);
                let invalidated = processes.with_page_table(victim.asid, |pt| {
                    pt[victim.page_index].invalidate();
                    pt[victim.page_index]
                });
                if let ProbeResult::Hit(i) = tlb.probe(invalidated.entry_hi) {
                    tlb.write_at(i, invalidated);
                }
                invalidated
            };
            let _ = invalidated;

            transfer_backing_store(
                nucleus,
                bus,
                victim.asid,
                victim.page_index,
                frame_index,
                true,
            )?;
        }
    }

    transfer_backing_store(nucleus, bus, asid, page_index, frame_index, false)?;

    swap_pool.install(frame_index, asid, page_index);

    let updated = processes.with_page_table(asid, |pt| {
        pt[page_index].map_to(swap_frame_number(frame_index));
        pt[page_index]
    });
    tlb.write_random(updated);

    Ok(())
}

/// Handles a TLB-refill exception: `asid`'s page table entry already
/// exists (possibly still invalid — the miss is just the TLB cache being
/// empty), so this only needs to copy it into the TLB. A VPN that falls
/// outside the page table here indicates corrupted page-fault handling
/// elsewhere in the system, not a user error, so it's fatal.
pub fn refill<T: Tlb + ?Sized>(
    tlb: &T,
    processes: &SupportTable,
    asid: Asid,
    state: &ExceptionState,
) -> SupportResult<()> {
    let page_index = page_index_for_vpn(state.vpn())
        .ok_or(SupportError::Panic(PanicReason::NucleusInvariantViolated))?;
    let entry = processes.with_page_table(asid, |pt| pt[page_index]);
    tlb.write_random(entry);
    Ok(())
}
