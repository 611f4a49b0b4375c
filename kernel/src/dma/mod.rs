//! Synchronous DMA block I/O to disk and flash (§4.3/§4.4).
//!
//! Both devices share the same two-register DMA protocol — write the
//! transfer's physical buffer address to `data0`, issue a command, wait —
//! so the cylinder/head/sector geometry translation (disk-only) and the
//! raw command-issue-and-wait step live here, while [`disk`] and [`flash`]
//! each add their own addressing scheme on top.

pub mod disk;
pub mod flash;

use crate::device::DeviceBus;
use crate::error::{SupportError, SupportResult, TerminateReason};
use crate::konst::{DEVICES_PER_LINE, STATUS_READY};
use crate::nucleus::{critical_section, InterruptLine, Nucleus};

/// Validates a disk/flash index against the fixed `0..DEVICES_PER_LINE`
/// range (spec §4.3: "Invalid disk index terminates").
pub fn check_device_index(index: u8) -> SupportResult<()> {
    if (index as usize) < DEVICES_PER_LINE {
        Ok(())
    } else {
        Err(SupportError::Terminate(TerminateReason::InvalidDeviceIndex))
    }
}

/// Points the device at `dma_addr`, issues `command` under an
/// interrupt-disable window (so this thread is the one that observes the
/// matching completion interrupt, per §4.4), and blocks for completion.
/// Returns the raw status register value.
pub fn issue_and_wait<N: Nucleus + ?Sized, B: DeviceBus + ?Sized>(
    nucleus: &N,
    bus: &B,
    line: InterruptLine,
    device: u8,
    dma_addr: u32,
    command: u32,
) -> u32 {
    bus.set_data0(line, device, dma_addr);
    {
        let _critical = critical_section(nucleus);
        bus.issue_command(line, device, command);
    }
    nucleus.wait_io(line, device)
}

/// `status & 0xFF == STATUS_READY`, as used to gate a seek/geometry step
/// that must terminate the caller on any non-ready result.
pub fn require_ready(status: u32) -> SupportResult<()> {
    if (status & 0xFF) == STATUS_READY {
        Ok(())
    } else {
        Err(SupportError::Terminate(TerminateReason::DeviceNotReady))
    }
}
