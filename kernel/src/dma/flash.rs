//! Flash DMA block I/O (§4.4): linear block addressing, no geometry.
//!
//! Flash backs two callers: the user-facing SYS16/SYS17 syscalls (which
//! copy through a DMA buffer, like disk) and the pager's backing store
//! (which, per process ASID `k`, treats flash device `k - 1` as that
//! process's page image and transfers directly into/out of a swap-pool
//! frame — no intermediate buffer, since the frame is already a pinned
//! physical page). [`transfer`] is the shared primitive; [`read`]/[`write`]
//! add the DMA-buffer copy for the syscall path.

use super::{check_device_index, issue_and_wait};
use crate::device::DeviceBus;
use crate::error::{SupportError, SupportResult, TerminateReason};
use crate::konst::{CMD_FLASH_READBLK, CMD_FLASH_WRITEBLK, PAGE_SIZE};
use crate::memory::{dma_flash_frame_addr, Ram};
use crate::nucleus::{InterruptLine, Nucleus};

/// Validates `block` against the device's reported maximum block count
/// (`data1`), terminating the caller if out of range.
fn check_block(data1: u32, block: u32) -> SupportResult<()> {
    if block < data1 {
        Ok(())
    } else {
        Err(SupportError::Terminate(TerminateReason::BlockOutOfRange))
    }
}

/// Issues a single `READBLK`/`WRITEBLK` command with `block` in the upper
/// 24 bits against `phys_addr`, and returns the raw status register —
/// callers decide what a non-ready status means for them (the pager
/// panics, the syscalls report a negated status to the caller).
pub fn transfer<N: Nucleus + ?Sized, B: DeviceBus + ?Sized>(
    nucleus: &N,
    bus: &B,
    flash_index: u8,
    block: u32,
    phys_addr: u32,
    write: bool,
) -> SupportResult<u32> {
    check_device_index(flash_index)?;
    check_block(bus.data1(InterruptLine::Flash, flash_index), block)?;

    let opcode = if write {
        CMD_FLASH_WRITEBLK
    } else {
        CMD_FLASH_READBLK
    };
    let command = opcode | (block << 8);
    Ok(issue_and_wait(
        nucleus,
        bus,
        InterruptLine::Flash,
        flash_index,
        phys_addr,
        command,
    ))
}

/// SYS17: writes one 4 KiB block from `user_buffer_addr` to
/// `(flash, block)`.
pub fn write<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    flash: u8,
    block: u32,
    user_buffer_addr: u32,
) -> SupportResult<i32> {
    let dma_addr = dma_flash_frame_addr(flash);
    let mut buf = [0u8; PAGE_SIZE];
    ram.copy_from_addr(user_buffer_addr, &mut buf);
    ram.write_frame(dma_addr, &buf);

    let status = transfer(nucleus, bus, flash, block, dma_addr, true)?;
    if (status & 0xFF) != crate::konst::STATUS_READY {
        return Ok(-(status as i32));
    }
    Ok(crate::konst::STATUS_READY as i32)
}

/// SYS16: reads one 4 KiB block from `(flash, block)` into
/// `user_buffer_addr`.
pub fn read<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    flash: u8,
    block: u32,
    user_buffer_addr: u32,
) -> SupportResult<i32> {
    let dma_addr = dma_flash_frame_addr(flash);
    let status = transfer(nucleus, bus, flash, block, dma_addr, false)?;
    if (status & 0xFF) != crate::konst::STATUS_READY {
        return Ok(-(status as i32));
    }
    let mut buf = [0u8; PAGE_SIZE];
    ram.read_frame(dma_addr, &mut buf);
    ram.copy_to_addr(user_buffer_addr, &buf);
    Ok(crate::konst::STATUS_READY as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockBus;
    use crate::memory::mock::MockRam;
    use crate::nucleus::mock::MockNucleus;

    #[test]
    fn block_out_of_range_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        bus.set_geometry(InterruptLine::Flash, 0, 10);
        let err = write(&nucleus, &bus, &ram, 0, 10, 0x8000_0000).unwrap_err();
        assert_eq!(err, SupportError::Terminate(TerminateReason::BlockOutOfRange));
    }

    #[test]
    fn write_then_read_round_trips() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        bus.set_geometry(InterruptLine::Flash, 2, 1000);

        let src = 0x8000_3000u32;
        ram.copy_to_addr(src, &[0x42; PAGE_SIZE]);
        assert_eq!(
            write(&nucleus, &bus, &ram, 2, 7, src).unwrap(),
            crate::konst::STATUS_READY as i32
        );

        let dst = 0x8000_4000u32;
        assert_eq!(
            read(&nucleus, &bus, &ram, 2, 7, dst).unwrap(),
            crate::konst::STATUS_READY as i32
        );
        let mut out = [0u8; PAGE_SIZE];
        ram.copy_from_addr(dst, &mut out);
        assert_eq!(out, [0x42; PAGE_SIZE]);
    }

    #[test]
    fn command_encodes_block_in_upper_bits() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        bus.set_geometry(InterruptLine::Flash, 0, 1000);
        transfer(&nucleus, &bus, 0, 9, 0x2001_0000, true).unwrap();
        assert_eq!(
            bus.last_command(InterruptLine::Flash, 0),
            Some(CMD_FLASH_WRITEBLK | (9 << 8))
        );
    }
}
