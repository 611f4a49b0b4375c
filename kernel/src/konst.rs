//! Hardware and software constants for the support level.
//!
//! Values here mirror the nucleus's ABI exactly (register layouts, bus
//! addresses, status/command codes) — they are not tunable and must match
//! whatever nucleus this crate is paired with.

use bitflags::bitflags;

/// Bytes per page/frame.
pub const PAGE_SIZE: usize = 4096;

/// Number of user processes (ASIDs 1..=UPROCMAX). ASID 0 is the kernel/daemon.
pub const UPROCMAX: usize = 8;

/// Entries per page table; entry 31 is always the stack page.
pub const PAGE_TABLE_SIZE: usize = 32;

/// Index of the stack page table entry.
pub const STACK_PAGE_INDEX: usize = 31;

/// Virtual base of the code/data region (entries 0..30).
pub const VPN_BASE: u32 = 0x8000_0000;

/// Fixed virtual address of the stack page (entry 31).
pub const STACK_PAGE_VPN: u32 = 0xBFFF_F000;

/// First address past the user segment (`KUSEG`): `STACK_PAGE_VPN +
/// PAGE_SIZE`, the top of the stack page. A buffer a syscall argument
/// points at must lie entirely within `VPN_BASE..KUSEG_TOP`.
pub const KUSEG_TOP: u32 = 0xC000_0000;

/// Mask isolating the VPN (upper 20 bits) from a virtual address.
pub const VPN_MASK: u32 = 0xFFFF_F000;

/// Shift to go from a page-aligned address to a VPN.
pub const VPN_SHIFT: u32 = 12;

/// Bit position of the ASID field within `entryHi`.
pub const ASID_SHIFT: u32 = 6;

bitflags! {
    /// `entryLo` flag bits, low-order within the word (the frame number
    /// occupies the upper bits, shifted by [`VPN_SHIFT`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryLoFlags: u32 {
        const GLOBAL = 1 << 8;
        const VALID = 1 << 9;
        const DIRTY = 1 << 10;
    }
}

/// Number of frames in the shared swap pool.
pub const SWAP_POOL_SIZE: usize = 16;

/// Swap pool's first physical frame number, relative to `RAMSTART`.
pub const SWAP_POOL_START_FRAME: u32 = 32;

/// Sentinel value for an unoccupied swap pool entry's `asid`/`vpn` fields.
pub const SWAP_ENTRY_FREE: i32 = -1;

/// Physical base of RAM (bus register area convention; see `const.h`).
pub const RAMSTART: u32 = 0x2000_0000;

/// First physical frame reserved for disk DMA buffers (one per disk, 0..7).
pub const DMA_DISK_START_FRAME: u32 = 16;

/// First physical frame reserved for flash DMA buffers (one per device, 0..7).
pub const DMA_FLASH_START_FRAME: u32 = 24;

/// Number of disk/flash/terminal/printer lines.
pub const DEVICES_PER_LINE: usize = 8;

/// Exception codes carried in the cause register (bits 2..7, after shifting).
pub const EXC_MOD: u32 = 1;
pub const EXC_TLBL: u32 = 2;
pub const EXC_TLBS: u32 = 3;

/// Program trap exception codes (everything but TLB and syscall).
pub const PROGRAM_TRAP_CODES: [u32; 8] = [4, 5, 6, 7, 9, 10, 11, 12];

/// Syscall exception code.
pub const EXC_SYSCALL: u32 = 8;

/// User syscall numbers (SYS9..SYS18), dispatched by the support level.
pub mod syscall {
    pub const TERMINATE: i32 = 9;
    pub const GET_TOD: i32 = 10;
    pub const WRITE_PRINTER: i32 = 11;
    pub const WRITE_TERMINAL: i32 = 12;
    pub const READ_TERMINAL: i32 = 13;
    pub const DISK_WRITE: i32 = 14;
    pub const DISK_READ: i32 = 15;
    pub const FLASH_READ: i32 = 16;
    pub const FLASH_WRITE: i32 = 17;
    pub const DELAY: i32 = 18;
}

/// Device status codes (low byte of a device's status register).
pub const STATUS_READY: u32 = 1;
pub const STATUS_BUSY: u32 = 3;

/// Disk command opcodes.
pub const CMD_SEEKCYL: u32 = 2;
pub const CMD_DISK_READBLK: u32 = 2;
pub const CMD_DISK_WRITEBLK: u32 = 3;

/// Flash/terminal/printer command opcodes.
pub const CMD_FLASH_READBLK: u32 = 2;
pub const CMD_FLASH_WRITEBLK: u32 = 3;
pub const CMD_PRINTCHR: u32 = 2;
pub const CMD_TRANSMITCHAR: u32 = 2;
pub const CMD_RECEIVECHAR: u32 = 2;

/// Microseconds per second, used to scale `delay(seconds)`.
pub const SECOND_IN_MICROS: i64 = 1_000_000;

/// Maximum character count for a single terminal/printer transfer.
pub const MAX_CHARIO_LEN: usize = 128;

/// Flash backing-store page index for the stack page (kept distinct from the
/// other 31 pages, which map to their own page-table index).
pub const STACK_FLASH_PAGE: usize = 31;
