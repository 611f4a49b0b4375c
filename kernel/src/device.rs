//! Typed access to memory-mapped device registers.
//!
//! Per the design notes, all device-register reads/writes are volatile
//! hardware operations; they are confined to this module behind typed
//! methods (`status`, `issue_command`, `set_data0`, `data1`) so handler
//! code in `dma` and `chario` never does bare pointer arithmetic.
//!
//! Follows the narrow-hardware-trait pattern used elsewhere for port I/O
//! (confine raw register access behind a handful of typed methods),
//! applied to this machine's MMIO bus instead of port I/O.

use crate::nucleus::InterruptLine;

/// Base physical address of the device register area
/// (`base + (int_line - 3) * 0x80 + dev * 0x10`, per the bus layout in
/// §6 of the specification).
pub const DEVICE_REG_BASE: u32 = 0x1000_0054;

fn line_number(line: InterruptLine) -> u32 {
    match line {
        InterruptLine::Disk => 3,
        InterruptLine::Flash => 4,
        InterruptLine::Printer => 6,
        InterruptLine::Terminal => 7,
    }
}

/// Physical address of the first register (status) of `device` on `line`.
pub fn device_reg_addr(line: InterruptLine, device: u8) -> u32 {
    DEVICE_REG_BASE + (line_number(line) - 3) * 0x80 + (device as u32) * 0x10
}

/// Abstracts the four-register device view so that production code (real
/// volatile MMIO) and tests (an in-memory double) share one call surface.
pub trait DeviceBus {
    fn status(&self, line: InterruptLine, device: u8) -> u32;
    fn issue_command(&self, line: InterruptLine, device: u8, command: u32);
    fn set_data0(&self, line: InterruptLine, device: u8, value: u32);
    fn data1(&self, line: InterruptLine, device: u8) -> u32;
}

/// Production [`DeviceBus`] backed by real volatile memory-mapped I/O.
///
/// # Safety
/// Correct only when `DEVICE_REG_BASE` and the per-line/per-device stride
/// actually describe the target machine's bus layout, and when no other
/// code concurrently mutates the same registers outside of an
/// interrupt-disable window.
pub struct Mmio;

impl DeviceBus for Mmio {
    fn status(&self, line: InterruptLine, device: u8) -> u32 {
        let addr = device_reg_addr(line, device) as *const u32;
        unsafe { addr.read_volatile() }
    }

    fn issue_command(&self, line: InterruptLine, device: u8, command: u32) {
        let addr = (device_reg_addr(line, device) + 4) as *mut u32;
        unsafe { addr.write_volatile(command) }
    }

    fn set_data0(&self, line: InterruptLine, device: u8, value: u32) {
        let addr = (device_reg_addr(line, device) + 8) as *mut u32;
        unsafe { addr.write_volatile(value) }
    }

    fn data1(&self, line: InterruptLine, device: u8) -> u32 {
        let addr = (device_reg_addr(line, device) + 12) as *const u32;
        unsafe { addr.read_volatile() }
    }
}
