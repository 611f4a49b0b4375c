//! The aggregate support-level kernel: one value holding everything a
//! pass-up handler needs, generic over the four hardware/nucleus traits so
//! the same code runs against real hardware or the `#[cfg(test)]` mocks.
//!
//! Supplements the distilled module list with the bootstrap wiring
//! `original_source/phase3/initProc.c` and `delayDaemon.c::initADL` do at
//! boot: building the swap pool and ADL, handing out support structures,
//! and launching the delay daemon.

use log::info;

use crate::delay::{self, ActiveDelayList};
use crate::device::DeviceBus;
use crate::dispatch;
use crate::error::{SupportError, SupportResult};
use crate::konst::UPROCMAX;
use crate::memory::Ram;
use crate::nucleus::Nucleus;
use crate::pager::{self, SwapPool};
use crate::process::SupportTable;
use crate::tlb::Tlb;
use crate::types::{Asid, ExceptionSlot, ExceptionState};

/// Tunables that vary across deployments but never change the support
/// level's data-structure layout or algorithms.
#[derive(Debug, Clone, Copy)]
pub struct SupportConfig {
    /// Number of user processes to bootstrap at startup, `1..=UPROCMAX`.
    pub process_count: usize,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            process_count: UPROCMAX,
        }
    }
}

/// Everything the support level owns: the swap pool, the ADL, the
/// per-process support structures, and the four hardware/nucleus
/// abstractions handler code calls through.
pub struct Kernel<N, B, T, R> {
    pub nucleus: N,
    pub bus: B,
    pub tlb: T,
    pub ram: R,
    swap_pool: SwapPool,
    adl: ActiveDelayList,
    processes: SupportTable,
}

impl<N, B, T, R> Kernel<N, B, T, R>
where
    N: Nucleus,
    B: DeviceBus,
    T: Tlb,
    R: Ram,
{
    pub fn new(nucleus: N, bus: B, tlb: T, ram: R) -> Self {
        Self {
            nucleus,
            bus,
            tlb,
            ram,
            swap_pool: SwapPool::new(),
            adl: ActiveDelayList::new(),
            processes: SupportTable::new(),
        }
    }

    /// Bootstraps `config.process_count` user processes (ASIDs
    /// `1..=process_count`) and initializes the master semaphore to 0, per
    /// `initProc.c`. The nucleus is responsible for actually scheduling
    /// the resulting processes; this only prepares their support-level
    /// state.
    pub fn bootstrap(&self, config: SupportConfig) {
        for asid in 1..=config.process_count as Asid {
            self.processes.bootstrap(asid);
        }
        info!("bootstrapped {} user processes", config.process_count);
    }

    /// Runs one iteration of the delay daemon's loop body. The caller
    /// drives this from a dedicated kernel-ASID-0 process in
    /// `loop { kernel.delay_daemon_tick() }`.
    pub fn delay_daemon_tick(&self) {
        delay::daemon_tick(&self.nucleus, &self.adl);
    }

    /// Hands `launch` the ASID (0, the kernel/daemon ASID) the delay
    /// daemon's process should run under. This crate cannot itself enqueue
    /// a PCB — scheduling is the nucleus's job — so `launch` is expected to
    /// create a kernel-mode process at ASID 0 whose body is
    /// `loop { kernel.delay_daemon_tick() }`, per `delayDaemon.c::initADL`'s
    /// daemon-creation tail.
    pub fn spawn_delay_daemon<F: FnOnce(Asid)>(&self, launch: F) {
        launch(0);
    }

    /// Handles a TLB-invalid pass-up for `asid`. TLB-Mod and bad-VPN faults
    /// terminate the process (§4.1), so this runs the same orderly release
    /// as a general-exception termination before propagating the error.
    pub fn handle_page_fault(&self, asid: Asid) -> SupportResult<()> {
        let result = pager::handle_page_fault(
            &self.nucleus,
            &self.bus,
            &self.tlb,
            &self.swap_pool,
            &self.processes,
            asid,
        );
        if let Err(SupportError::Terminate(_)) = &result {
            dispatch::release_process_resources(
                &self.nucleus,
                &self.swap_pool,
                &self.processes,
                asid,
            );
        }
        result
    }

    /// Handles a TLB-refill exception for `asid`, given the faulting
    /// state the nucleus observed (refill never reaches a pass-up vector
    /// — it is serviced inline).
    pub fn handle_tlb_refill(&self, asid: Asid, state: &ExceptionState) -> SupportResult<()> {
        pager::refill(&self.tlb, &self.processes, asid, state)
    }

    /// Handles a general-exception (program trap / syscall) pass-up for
    /// `asid`.
    pub fn handle_general_exception(&self, asid: Asid) -> SupportResult<i32> {
        dispatch::handle_general_exception(
            &self.nucleus,
            &self.bus,
            &self.ram,
            &self.swap_pool,
            &self.adl,
            &self.processes,
            asid,
        )
    }

    /// Records the exception state the nucleus passed up for `asid`,
    /// before calling [`Kernel::handle_page_fault`] or
    /// [`Kernel::handle_general_exception`]. The nucleus's pass-up
    /// mechanism is expected to call this as part of delivering the
    /// exception.
    pub fn record_exception_state(&self, asid: Asid, slot: ExceptionSlot, state: ExceptionState) {
        self.processes.set_exception_state(asid, slot, state);
    }

    pub fn is_process_occupied(&self, asid: Asid) -> bool {
        self.processes.is_occupied(asid)
    }
}
