//! The per-ASID support structure pool (§3): exception state snapshots,
//! the page table, and the bookkeeping needed to bootstrap and tear down a
//! user process's half of the support level.
//!
//! `UPROCMAX` support structures map one-to-one onto ASIDs `1..=UPROCMAX`,
//! so unlike the reference implementation's explicit free list, "on the
//! free list" here is simply `occupied == false` at that ASID's fixed
//! slot — an arena with a static index, per the design notes.

use spin::Mutex;

use crate::konst::{PAGE_TABLE_SIZE, STACK_PAGE_INDEX, STACK_PAGE_VPN, UPROCMAX, VPN_BASE, VPN_SHIFT};
use crate::types::{Asid, ExceptionSlot, ExceptionState, PageTable, PageTableEntry};

/// Per-process support structure (`support_t` in the reference).
pub struct SupportStructure {
    pub asid: Asid,
    pub occupied: bool,
    /// Index 0: page-fault pass-up state. Index 1: general-exception
    /// pass-up state. Indexed by [`ExceptionSlot`].
    pub exception_state: [ExceptionState; 2],
    pub page_table: PageTable,
}

impl SupportStructure {
    fn empty(asid: Asid) -> Self {
        Self {
            asid,
            occupied: false,
            exception_state: [ExceptionState::default(); 2],
            page_table: new_page_table(asid),
        }
    }
}

/// Builds the initial page table for `asid`: every `entryHi` fully
/// populated (VPN + ASID), every `entryLo` carrying only the dirty bit —
/// nothing resident yet, so the first touch of any page always faults.
///
/// Grounded on `original_source/phase3/initProc.c::initPageTable`.
pub fn new_page_table(asid: Asid) -> PageTable {
    let mut table = [PageTableEntry {
        entry_hi: 0,
        entry_lo: 0,
    }; PAGE_TABLE_SIZE];
    for (i, entry) in table.iter_mut().enumerate() {
        let vpn = if i == STACK_PAGE_INDEX {
            STACK_PAGE_VPN >> VPN_SHIFT
        } else {
            (VPN_BASE >> VPN_SHIFT) + i as u32
        };
        *entry = PageTableEntry::new_unmapped(asid, vpn);
    }
    table
}

/// Fixed-size table of the `UPROCMAX` support structures, indexed by
/// `asid - 1`.
pub struct SupportTable {
    slots: [Mutex<SupportStructure>; UPROCMAX],
}

impl SupportTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| Mutex::new(SupportStructure::empty((i + 1) as Asid))),
        }
    }

    fn index(asid: Asid) -> usize {
        debug_assert!((1..=UPROCMAX as Asid).contains(&asid));
        (asid - 1) as usize
    }

    /// Marks the structure for `asid` in use and resets its state to a
    /// freshly bootstrapped process (fresh page table, zeroed exception
    /// state). Mirrors the reference's "take from the free list" step.
    pub fn bootstrap(&self, asid: Asid) {
        let mut slot = self.slots[Self::index(asid)].lock();
        *slot = SupportStructure {
            asid,
            occupied: true,
            exception_state: [ExceptionState::default(); 2],
            page_table: new_page_table(asid),
        };
    }

    /// Returns the structure for `asid` to the free list.
    pub fn release(&self, asid: Asid) {
        self.slots[Self::index(asid)].lock().occupied = false;
    }

    pub fn is_occupied(&self, asid: Asid) -> bool {
        self.slots[Self::index(asid)].lock().occupied
    }

    pub fn exception_state(&self, asid: Asid, slot: ExceptionSlot) -> ExceptionState {
        self.slots[Self::index(asid)].lock().exception_state[slot as usize]
    }

    pub fn set_exception_state(&self, asid: Asid, slot: ExceptionSlot, state: ExceptionState) {
        self.slots[Self::index(asid)].lock().exception_state[slot as usize] = state;
    }

    /// Runs `f` with exclusive access to `asid`'s page table. Used both by
    /// that process's own pager path and, during eviction, by whichever
    /// process currently holds the swap-pool mutex acting on a victim's
    /// table — mutual exclusion between the two is the swap-pool
    /// semaphore's job (§4.1 invariant ii), not this lock's.
    pub fn with_page_table<F, R>(&self, asid: Asid, f: F) -> R
    where
        F: FnOnce(&mut PageTable) -> R,
    {
        let mut slot = self.slots[Self::index(asid)].lock();
        f(&mut slot.page_table)
    }
}

impl Default for SupportTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::konst::EntryLoFlags;

    #[test]
    fn bootstrap_page_table_has_no_valid_entries() {
        let table = new_page_table(3);
        for entry in table.iter() {
            assert_eq!(entry.entry_lo, EntryLoFlags::DIRTY.bits());
            assert_eq!(entry.entry_lo & EntryLoFlags::VALID.bits(), 0);
        }
    }

    #[test]
    fn stack_entry_uses_fixed_vpn() {
        let table = new_page_table(1);
        let stack = &table[STACK_PAGE_INDEX];
        assert_eq!(stack.entry_hi >> VPN_SHIFT, STACK_PAGE_VPN >> VPN_SHIFT);
    }

    #[test]
    fn support_table_starts_unoccupied() {
        let table = SupportTable::new();
        for asid in 1..=UPROCMAX as Asid {
            assert!(!table.is_occupied(asid));
        }
    }

    #[test]
    fn bootstrap_then_release_round_trips() {
        let table = SupportTable::new();
        table.bootstrap(4);
        assert!(table.is_occupied(4));
        table.release(4);
        assert!(!table.is_occupied(4));
    }
}
