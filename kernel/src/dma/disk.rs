//! Disk DMA block I/O (§4.3): `(disk, block)` addressing translated to
//! `(cylinder, head, sector)` via the device's reported geometry.

use super::{check_device_index, issue_and_wait, require_ready};
use crate::device::DeviceBus;
use crate::error::{SupportError, SupportResult, TerminateReason};
use crate::konst::{CMD_DISK_READBLK, CMD_DISK_WRITEBLK, CMD_SEEKCYL, PAGE_SIZE};
use crate::memory::{dma_disk_frame_addr, Ram};
use crate::nucleus::{InterruptLine, Nucleus};

struct Geometry {
    cyl: u32,
    head: u32,
    sect: u32,
}

/// Decodes `data1` (`(max_cyl << 16) | (max_head << 8) | max_sect`) and
/// translates `block` into `(cyl, head, sect)`, terminating the caller if
/// it falls outside the reported geometry.
fn translate(data1: u32, block: u32) -> SupportResult<Geometry> {
    let max_cyl = (data1 >> 16) & 0xFFFF;
    let max_head = (data1 >> 8) & 0xFF;
    let max_sect = data1 & 0xFF;
    if max_head == 0 || max_sect == 0 {
        return Err(SupportError::Terminate(TerminateReason::BlockOutOfRange));
    }
    let per_cyl = max_head * max_sect;
    let cyl = block / per_cyl;
    let rem = block % per_cyl;
    let head = rem / max_sect;
    let sect = rem % max_sect;
    if cyl >= max_cyl || head >= max_head || sect >= max_sect {
        return Err(SupportError::Terminate(TerminateReason::BlockOutOfRange));
    }
    Ok(Geometry { cyl, head, sect })
}

fn seek<N: Nucleus + ?Sized, B: DeviceBus + ?Sized>(
    nucleus: &N,
    bus: &B,
    disk: u8,
    dma_addr: u32,
    cyl: u32,
) -> SupportResult<()> {
    let status = issue_and_wait(
        nucleus,
        bus,
        InterruptLine::Disk,
        disk,
        dma_addr,
        CMD_SEEKCYL | (cyl << 8),
    );
    require_ready(status)
}

/// SYS14: writes one 4 KiB block from `user_buffer_addr` to `(disk,
/// block)`. Returns the syscall result register: `READY` on success, the
/// negated device status on a transfer failure (not a `Terminate` — the
/// caller stays alive, per §4.3/§7).
pub fn write<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    disk: u8,
    block: u32,
    user_buffer_addr: u32,
) -> SupportResult<i32> {
    check_device_index(disk)?;
    let dma_addr = dma_disk_frame_addr(disk);

    let mut buf = [0u8; PAGE_SIZE];
    ram.copy_from_addr(user_buffer_addr, &mut buf);
    ram.write_frame(dma_addr, &buf);

    let geometry = translate(bus.data1(InterruptLine::Disk, disk), block)?;
    seek(nucleus, bus, disk, dma_addr, geometry.cyl)?;

    let command = CMD_DISK_WRITEBLK | (geometry.head << 24) | (geometry.sect << 16);
    let status = issue_and_wait(nucleus, bus, InterruptLine::Disk, disk, dma_addr, command);
    if (status & 0xFF) != crate::konst::STATUS_READY {
        return Ok(-(status as i32));
    }
    Ok(crate::konst::STATUS_READY as i32)
}

/// SYS15: reads one 4 KiB block from `(disk, block)` into
/// `user_buffer_addr`. Same success/failure result convention as
/// [`write`].
pub fn read<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    disk: u8,
    block: u32,
    user_buffer_addr: u32,
) -> SupportResult<i32> {
    check_device_index(disk)?;
    let dma_addr = dma_disk_frame_addr(disk);

    let geometry = translate(bus.data1(InterruptLine::Disk, disk), block)?;
    seek(nucleus, bus, disk, dma_addr, geometry.cyl)?;

    let command = CMD_DISK_READBLK | (geometry.head << 24) | (geometry.sect << 16);
    let status = issue_and_wait(nucleus, bus, InterruptLine::Disk, disk, dma_addr, command);
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

    fn geometry_data1(max_cyl: u32, max_head: u32, max_sect: u32) -> u32 {
        (max_cyl << 16) | (max_head << 8) | max_sect
    }

    #[test]
    fn translate_splits_block_number() {
        let g = translate(geometry_data1(100, 4, 16), 2 * 64 + 1 * 16 + 5).unwrap();
        assert_eq!(g.cyl, 2);
        assert_eq!(g.head, 1);
        assert_eq!(g.sect, 5);
    }

    #[test]
    fn translate_rejects_out_of_range_block() {
        assert!(translate(geometry_data1(10, 4, 16), 10 * 64).is_err());
    }

    #[test]
    fn write_then_read_round_trips() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        bus.set_geometry(InterruptLine::Disk, 0, geometry_data1(100, 4, 16));

        let user_buf = 0x8000_1000u32;
        ram.copy_to_addr(user_buf, &[0xAB; PAGE_SIZE]);

        let w = write(&nucleus, &bus, &ram, 0, 5, user_buf).unwrap();
        assert_eq!(w, crate::konst::STATUS_READY as i32);

        let user_out = 0x8000_2000u32;
        let r = read(&nucleus, &bus, &ram, 0, 5, user_out).unwrap();
        assert_eq!(r, crate::konst::STATUS_READY as i32);

        let mut out = [0u8; PAGE_SIZE];
        ram.copy_from_addr(user_out, &mut out);
        assert_eq!(out, [0xAB; PAGE_SIZE]);
    }

    #[test]
    fn invalid_disk_index_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let err = write(&nucleus, &bus, &ram, 8, 0, 0).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::InvalidDeviceIndex)
        );
    }

    #[test]
    fn write_failure_status_is_returned_not_terminated() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        bus.set_geometry(InterruptLine::Disk, 1, geometry_data1(100, 4, 16));
        nucleus.push_device_status(InterruptLine::Disk, 1, 1); // seek ok
        nucleus.push_device_status(InterruptLine::Disk, 1, 3); // transfer busy

        let result = write(&nucleus, &bus, &ram, 1, 0, 0x8000_0000).unwrap();
        assert_eq!(result, -3);
    }
}
