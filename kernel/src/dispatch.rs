//! The support-level exception dispatcher (§4.6): classifies a pass-up
//! exception into a program trap or a syscall, routes syscalls 9..18 to
//! their handlers, and runs orderly termination.
//!
//! Grounded on `original_source/phase3/sysSupport.c`'s
//! `supportGenExceptionHandler`/`supportSyscallHandler` switch structure,
//! generalized into a tagged [`Exception`] decoded once instead of a
//! `switch` on the raw cause code at every call site.

use log::{debug, warn};

use crate::chario;
use crate::delay::{self, ActiveDelayList};
use crate::device::DeviceBus;
use crate::dma::{disk, flash};
use crate::error::{SupportError, SupportResult, TerminateReason};
use crate::konst::{syscall, EXC_MOD, EXC_SYSCALL, PROGRAM_TRAP_CODES};
use crate::memory::Ram;
use crate::nucleus::{Nucleus, Semaphore};
use crate::pager::SwapPool;
use crate::process::SupportTable;
use crate::types::{Asid, ExceptionSlot, ExceptionState};

/// A decoded pass-up exception, classified once from the raw saved state.
#[derive(Debug, Clone, Copy)]
pub enum Exception {
    ProgramTrap,
    Syscall { number: i32, a1: i32, a2: i32, a3: i32 },
}

fn classify(state: &ExceptionState) -> Option<Exception> {
    let code = state.exc_code();
    if code == EXC_SYSCALL {
        return Some(Exception::Syscall {
            number: state.a0,
            a1: state.a1,
            a2: state.a2,
            a3: state.a3,
        });
    }
    if code == EXC_MOD || PROGRAM_TRAP_CODES.contains(&code) {
        return Some(Exception::ProgramTrap);
    }
    None
}

/// Releases everything this process's support level owns: every swap-pool
/// frame tagged with its ASID, the swap-pool mutex itself (the caller may
/// be a program-trap handler that cannot know whether it was held), then
/// signals the master semaphore and returns the support structure to the
/// free list. Does not itself call `nucleus.terminate_process()` — the
/// caller does that once this returns, per §7.
pub(crate) fn release_process_resources<N: Nucleus + ?Sized>(
    nucleus: &N,
    swap_pool: &SwapPool,
    processes: &SupportTable,
    asid: Asid,
) {
    swap_pool.release_owned_by(asid);
    nucleus.v(Semaphore::SwapPool);
    processes.release(asid);
    nucleus.v(Semaphore::Master);
}

/// Runs the syscall dispatch table (SYS9..SYS18). The caller has already
/// advanced the saved PC past the `SYSCALL` instruction before this runs.
#[allow(clippy::too_many_arguments)]
fn dispatch_syscall<N, B, R>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    adl: &ActiveDelayList,
    asid: Asid,
    exc: Exception,
) -> SupportResult<i32>
where
    N: Nucleus + ?Sized,
    B: DeviceBus + ?Sized,
    R: Ram + ?Sized,
{
    let Exception::Syscall { number, a1, a2, a3 } = exc else {
        unreachable!("dispatch_syscall called with a non-syscall exception")
    };

    match number {
        syscall::TERMINATE => Err(SupportError::Terminate(TerminateReason::Requested)),
        syscall::GET_TOD => Ok(nucleus.get_tod_micros() as i32),
        syscall::WRITE_PRINTER => {
            chario::write_printer(nucleus, bus, ram, a2 as u8, a1 as u32, a3 as usize)
        }
        syscall::WRITE_TERMINAL => {
            chario::write_terminal(nucleus, bus, ram, a2 as u8, a1 as u32, a3 as usize)
        }
        syscall::READ_TERMINAL => chario::read_terminal(nucleus, bus, ram, a2 as u8, a1 as u32),
        syscall::DISK_WRITE => disk::write(nucleus, bus, ram, a2 as u8, a3 as u32, a1 as u32),
        syscall::DISK_READ => disk::read(nucleus, bus, ram, a2 as u8, a3 as u32, a1 as u32),
        syscall::FLASH_READ => flash::read(nucleus, bus, ram, a2 as u8, a3 as u32, a1 as u32),
        syscall::FLASH_WRITE => flash::write(nucleus, bus, ram, a2 as u8, a3 as u32, a1 as u32),
        syscall::DELAY => delay::delay(nucleus, adl, asid, a1).map(|()| 0),
        _ => Err(SupportError::Terminate(TerminateReason::UnknownSyscall)),
    }
}

/// Handles a general-exception pass-up for `asid`: classifies it, runs the
/// syscall or program-trap path, and on any [`SupportError::Terminate`]
/// performs orderly termination before propagating the error to the
/// caller (who drives `nucleus.terminate_process()`).
pub fn handle_general_exception<N, B, R>(
    nucleus: &N,
    bus: &B,
    ram: &R,
    swap_pool: &SwapPool,
    adl: &ActiveDelayList,
    processes: &SupportTable,
    asid: Asid,
) -> SupportResult<i32>
where
    N: Nucleus + ?Sized,
    B: DeviceBus + ?Sized,
    R: Ram + ?Sized,
{
    let mut state = processes.exception_state(asid, ExceptionSlot::General);
    let exc = classify(&state).ok_or(SupportError::Terminate(TerminateReason::ProgramTrap))?;

    if matches!(exc, Exception::Syscall { .. }) {
        // Advance past the SYSCALL instruction so a process that survives
        // (e.g. GET_TOD) resumes at the next instruction, not re-traps.
        state.pc = state.pc.wrapping_add(4);
        processes.set_exception_state(asid, ExceptionSlot::General, state);
    }

    let result = match exc {
        Exception::ProgramTrap => {
            warn!("program trap, asid={asid}, cause={:#x}", state.cause);
            Err(SupportError::Terminate(TerminateReason::ProgramTrap))
        }
        Exception::Syscall { number, .. } => {
            debug!("syscall {number}, asid={asid}");
            dispatch_syscall(nucleus, bus, ram, adl, asid, exc)
        }
    };

    if let Ok(value) = result {
        state.v0 = value;
        processes.set_exception_state(asid, ExceptionSlot::General, state);
    }

    if let Err(SupportError::Terminate(_)) = &result {
        release_process_resources(nucleus, swap_pool, processes, asid);
    }
    result
}
