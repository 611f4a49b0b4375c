//! Printer and terminal character I/O (§4.5): SYS11/SYS12 writes and
//! SYS13 reads, each one character at a time under an interrupt-disable
//! window so the issuing process is the one that observes its own
//! completion interrupt.

use crate::device::DeviceBus;
use crate::error::{SupportError, SupportResult, TerminateReason};
use crate::konst::{
    CMD_PRINTCHR, CMD_RECEIVECHAR, CMD_TRANSMITCHAR, KUSEG_TOP, MAX_CHARIO_LEN, STATUS_READY,
    VPN_BASE,
};
use crate::memory::Ram;
use crate::nucleus::{critical_section, InterruptLine, Nucleus, Semaphore};

fn check_length(len: usize) -> SupportResult<()> {
    if (1..=MAX_CHARIO_LEN).contains(&len) {
        Ok(())
    } else {
        Err(SupportError::Terminate(TerminateReason::InvalidCharIoRequest))
    }
}

/// Rejects a buffer that doesn't lie entirely within the user segment
/// (`VPN_BASE..KUSEG_TOP`), per §4.5 ("invalid length or non-user-segment
/// address terminates").
fn check_user_segment(addr: u32, len: usize) -> SupportResult<()> {
    let end = addr.checked_add(len as u32);
    match end {
        Some(end) if addr >= VPN_BASE && end <= KUSEG_TOP => Ok(()),
        _ => Err(SupportError::Terminate(TerminateReason::InvalidCharIoRequest)),
    }
}

/// Transmits one character and blocks for its completion, returning the
/// raw status register.
fn transmit_char<N: Nucleus + ?Sized, B: DeviceBus + ?Sized>(
    nucleus: &N,
    bus: &B,
    line: InterruptLine,
    device: u8,
    command_base: u32,
    byte: u8,
) -> u32 {
    let command = command_base | ((byte as u32) << 8);
    {
        let _critical = critical_section(nucleus);
        bus.issue_command(line, device, command);
    }
    nucleus.wait_io(line, device)
}

/// Shared printer/terminal-transmit write loop: copies `len` bytes out of
/// `buffer_addr`, holds the per-line mutex for the whole transfer, and
/// stops at the first non-ready status.
fn write_line<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    line: InterruptLine,
    device: u8,
    mutex: Semaphore,
    command_base: u32,
    buffer_addr: u32,
    len: usize,
) -> SupportResult<i32> {
    check_length(len)?;
    check_user_segment(buffer_addr, len)?;
    let mut buf = [0u8; MAX_CHARIO_LEN];
    ram.copy_from_addr(buffer_addr, &mut buf[..len]);

    nucleus.p(mutex);
    let mut sent = 0usize;
    let mut failure_status = None;
    for &byte in &buf[..len] {
        let status = transmit_char(nucleus, bus, line, device, command_base, byte);
        if (status & 0xFF) != STATUS_READY {
            failure_status = Some(status);
            break;
        }
        sent += 1;
    }
    nucleus.v(mutex);

    match failure_status {
        Some(status) => Ok(-(status as i32)),
        None => Ok(sent as i32),
    }
}

/// SYS11: writes `len` characters from `buffer_addr` to printer `device`.
pub fn write_printer<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    device: u8,
    buffer_addr: u32,
    len: usize,
) -> SupportResult<i32> {
    write_line(
        nucleus,
        bus,
        ram,
        InterruptLine::Printer,
        device,
        Semaphore::Printer(device),
        CMD_PRINTCHR,
        buffer_addr,
        len,
    )
}

/// SYS12: writes `len` characters from `buffer_addr` to terminal `device`'s
/// transmit line.
pub fn write_terminal<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    device: u8,
    buffer_addr: u32,
    len: usize,
) -> SupportResult<i32> {
    write_line(
        nucleus,
        bus,
        ram,
        InterruptLine::Terminal,
        device,
        Semaphore::TerminalTransmit(device),
        CMD_TRANSMITCHAR,
        buffer_addr,
        len,
    )
}

/// SYS13: reads from terminal `device`'s receive line into `buffer_addr`,
/// stopping at a newline (inclusive) or after `MAX_CHARIO_LEN` characters,
/// whichever comes first. Returns the number of characters placed in the
/// buffer, or a negated status on device failure.
pub fn read_terminal<N: Nucleus + ?Sized, B: DeviceBus + ?Sized, R: Ram + ?Sized>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    device: u8,
    buffer_addr: u32,
) -> SupportResult<i32> {
    check_user_segment(buffer_addr, MAX_CHARIO_LEN)?;
    nucleus.p(Semaphore::TerminalReceive(device));
    let mut buf = [0u8; MAX_CHARIO_LEN];
    let mut received = 0usize;
    let mut failure_status = None;
    loop {
        let status = {
            {
                let _critical = critical_section(nucleus);
                bus.issue_command(InterruptLine::Terminal, device, CMD_RECEIVECHAR);
            }
            nucleus.wait_io(InterruptLine::Terminal, device)
        };
        if (status & 0xFF) != STATUS_READY {
            failure_status = Some(status);
            break;
        }
        let byte = (status >> 8) as u8;
        buf[received] = byte;
        received += 1;
        if byte == b'\n' || received == MAX_CHARIO_LEN {
            break;
        }
    }
    nucleus.v(Semaphore::TerminalReceive(device));

    match failure_status {
        Some(status) => Ok(-(status as i32)),
        None => {
            ram.copy_to_addr(buffer_addr, &buf[..received]);
            Ok(received as i32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockBus;
    use crate::memory::mock::MockRam;
    use crate::nucleus::mock::MockNucleus;

    #[test]
    fn zero_length_write_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let err = write_printer(&nucleus, &bus, &ram, 0, 0x8000_0000, 0).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::InvalidCharIoRequest)
        );
    }

    #[test]
    fn oversized_write_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let err =
            write_printer(&nucleus, &bus, &ram, 0, 0x8000_0000, MAX_CHARIO_LEN + 1).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::InvalidCharIoRequest)
        );
    }

    #[test]
    fn write_outside_user_segment_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let err = write_printer(&nucleus, &bus, &ram, 0, 0x2000_0000, 2).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::InvalidCharIoRequest)
        );
    }

    #[test]
    fn write_straddling_kuseg_top_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let err = write_printer(&nucleus, &bus, &ram, 0, 0xBFFF_FFFE, 4).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::InvalidCharIoRequest)
        );
    }

    #[test]
    fn terminal_read_outside_user_segment_terminates() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let err = read_terminal(&nucleus, &bus, &ram, 1, 0x1000_0000).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::InvalidCharIoRequest)
        );
    }

    #[test]
    fn printer_write_transmits_every_byte_and_restores_mutex() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let addr = 0x8000_1000u32;
        ram.copy_to_addr(addr, b"hi");

        let result = write_printer(&nucleus, &bus, &ram, 2, addr, 2).unwrap();
        assert_eq!(result, 2);
        assert_eq!(nucleus.sem_value(Semaphore::Printer(2)), 1);
        assert_eq!(
            bus.last_command(InterruptLine::Printer, 2),
            Some(CMD_PRINTCHR | ((b'i' as u32) << 8))
        );
    }

    #[test]
    fn write_failure_reports_negated_status_and_releases_mutex() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        let addr = 0x8000_1000u32;
        ram.copy_to_addr(addr, b"abcde");
        nucleus.push_device_status(InterruptLine::Printer, 0, 1);
        nucleus.push_device_status(InterruptLine::Printer, 0, 1);
        nucleus.push_device_status(InterruptLine::Printer, 0, 5); // device-busy flush

        let result = write_printer(&nucleus, &bus, &ram, 0, addr, 5).unwrap();
        assert_eq!(result, -5);
        assert_eq!(nucleus.sem_value(Semaphore::Printer(0)), 1);
    }

    #[test]
    fn terminal_read_stops_at_newline_inclusive() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        for &byte in b"ok\n" {
            nucleus.push_device_status(InterruptLine::Terminal, 1, 1 | ((byte as u32) << 8));
        }

        let n = read_terminal(&nucleus, &bus, &ram, 1, 0x8000_2000).unwrap();
        assert_eq!(n, 3);
        let mut out = [0u8; 3];
        ram.copy_from_addr(0x8000_2000, &mut out);
        assert_eq!(&out, b"ok\n");
        assert_eq!(nucleus.sem_value(Semaphore::TerminalReceive(1)), 1);
    }

    #[test]
    fn terminal_read_caps_at_max_length_without_newline() {
        let nucleus = MockNucleus::new();
        let bus = MockBus::new();
        let ram = MockRam::new();
        for _ in 0..MAX_CHARIO_LEN {
            nucleus.push_device_status(InterruptLine::Terminal, 2, 1 | ((b'x' as u32) << 8));
        }

        let n = read_terminal(&nucleus, &bus, &ram, 2, 0x8000_3000).unwrap();
        assert_eq!(n, MAX_CHARIO_LEN as i32);
    }
}
