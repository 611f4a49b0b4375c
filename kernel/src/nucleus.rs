//! The contract this crate consumes from the nucleus.
//!
//! The nucleus (process queues, the ASL, interrupt dispatch, the interval
//! timer) is out of scope for this crate — §1 of the specification says so
//! explicitly, and it's implemented elsewhere. What *is* in scope is the
//! shape of the interface the support level calls through: P/V on named
//! binary semaphores, blocking device waits, the TOD clock, and
//! terminate-process. [`Nucleus`] is that interface, generalized per the
//! design notes' suggestion to replace ad hoc `SYSCALL(...)` call sites
//! with a typed trait.
//!
//! Follows the same pattern as the other hardware-facing traits in this
//! crate: a typed view behind the trait rather than bare syscall numbers
//! scattered through handler code.

use crate::types::Asid;

/// The named binary (or counting, for [`Semaphore::Master`]) semaphores the
/// support level mutually excludes on. One value per semaphore in the data
/// model (§3/§5): the swap pool, the ADL, one per printer/terminal line,
/// the master completion counter, and one private semaphore per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semaphore {
    SwapPool,
    ActiveDelayList,
    Printer(u8),
    TerminalTransmit(u8),
    TerminalReceive(u8),
    /// Counts terminated user processes; initialized to 0.
    Master,
    /// A user process's private semaphore, used to block it for SYS18.
    Private(Asid),
}

/// Device interrupt lines the support level waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptLine {
    Disk,
    Flash,
    Printer,
    Terminal,
}

/// Everything the support level needs from the nucleus.
///
/// Implementations must provide FIFO-fair blocking P/V and device waits
/// (the nucleus's blocked-process-list discipline, per §5) — this trait
/// only describes *what* is called, not how blocking is scheduled.
pub trait Nucleus {
    /// SYS3: P (wait) on a semaphore. Blocks until available.
    fn p(&self, sem: Semaphore);

    /// SYS4: V (signal) on a semaphore.
    fn v(&self, sem: Semaphore);

    /// SYS5: block until the named device completes, returning its status
    /// register.
    fn wait_io(&self, line: InterruptLine, device: u8) -> u32;

    /// SYS7: block until the next pseudo-clock tick.
    fn wait_clock(&self);

    /// SYS10 / `STCK`: microseconds since boot, scaled by the timescale
    /// register.
    fn get_tod_micros(&self) -> i64;

    /// SYS2-adjacent: ends the current process. Releases whatever the
    /// nucleus itself owns (its PCB, queue membership); the support level
    /// has already released its own resources before calling this.
    fn terminate_process(&self) -> !;

    /// Masks all interrupts. Paired with [`Nucleus::enable_interrupts`];
    /// prefer [`critical_section`] over calling these directly.
    fn disable_interrupts(&self);

    /// Unmasks interrupts previously disabled by
    /// [`Nucleus::disable_interrupts`].
    fn enable_interrupts(&self);
}

/// RAII guard for an interrupt-disable window. Disables interrupts on
/// construction (via [`critical_section`]), re-enables them on drop — this
/// is the scoped critical section the design notes call for in place of
/// the reference implementation's bare disable/enable pairs, so a handler
/// that returns early (or panics) can never leave interrupts masked.
pub struct CriticalSection<'a, N: Nucleus + ?Sized> {
    nucleus: &'a N,
}

impl<'a, N: Nucleus + ?Sized> Drop for CriticalSection<'a, N> {
    fn drop(&mut self) {
        self.nucleus.enable_interrupts();
    }
}

/// Enters an interrupt-disable window, returning a guard that re-enables
/// interrupts when dropped.
pub fn critical_section<N: Nucleus + ?Sized>(nucleus: &N) -> CriticalSection<'_, N> {
    nucleus.disable_interrupts();
    CriticalSection { nucleus }
}

#[cfg(test)]
pub mod mock {
    //! A deterministic, single-threaded [`Nucleus`] for unit tests.
    //!
    //! This does not model real blocking — tests call `p`/`v` in the same
    //! thread they're asserting against, so the only thing it needs to get
    //! right is bookkeeping: semaphore values, a scripted queue of device
    //! statuses, a manually-advanced clock, and interrupt-disable nesting.

    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    #[derive(Default)]
    pub struct MockNucleus {
        sems: RefCell<BTreeMap<SemKey, i32>>,
        /// Scripted device statuses, consumed in order per (line, device).
        device_statuses: RefCell<BTreeMap<(u8, u8), Vec<u32>>>,
        clock_micros: RefCell<i64>,
        interrupts_disabled: RefCell<u32>,
        pub terminated: RefCell<bool>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum SemKey {
        SwapPool,
        Adl,
        Printer(u8),
        TermTx(u8),
        TermRx(u8),
        Master,
        Private(u8),
    }

    fn key(sem: Semaphore) -> SemKey {
        match sem {
            Semaphore::SwapPool => SemKey::SwapPool,
            Semaphore::ActiveDelayList => SemKey::Adl,
            Semaphore::Printer(d) => SemKey::Printer(d),
            Semaphore::TerminalTransmit(d) => SemKey::TermTx(d),
            Semaphore::TerminalReceive(d) => SemKey::TermRx(d),
            Semaphore::Master => SemKey::Master,
            Semaphore::Private(asid) => SemKey::Private(asid),
        }
    }

    fn line_code(line: InterruptLine) -> u8 {
        match line {
            InterruptLine::Disk => 3,
            InterruptLine::Flash => 4,
            InterruptLine::Printer => 6,
            InterruptLine::Terminal => 7,
        }
    }

    impl MockNucleus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sem_value(&self, sem: Semaphore) -> i32 {
            *self.sems.borrow().get(&key(sem)).unwrap_or(&1)
        }

        pub fn set_sem(&self, sem: Semaphore, value: i32) {
            self.sems.borrow_mut().insert(key(sem), value);
        }

        /// Queues a status to be returned by the next `wait_io` on
        /// `(line, device)`.
        pub fn push_device_status(&self, line: InterruptLine, device: u8, status: u32) {
            self.device_statuses
                .borrow_mut()
                .entry((line_code(line), device))
                .or_default()
                .push(status);
        }

        pub fn advance_clock(&self, micros: i64) {
            *self.clock_micros.borrow_mut() += micros;
        }

        pub fn interrupts_masked(&self) -> bool {
            *self.interrupts_disabled.borrow() > 0
        }
    }

    impl Nucleus for MockNucleus {
        fn p(&self, sem: Semaphore) {
            let mut sems = self.sems.borrow_mut();
            let v = sems.entry(key(sem)).or_insert(1);
            *v -= 1;
        }

        fn v(&self, sem: Semaphore) {
            let mut sems = self.sems.borrow_mut();
            let v = sems.entry(key(sem)).or_insert(1);
            *v += 1;
        }

        fn wait_io(&self, line: InterruptLine, device: u8) -> u32 {
            let mut statuses = self.device_statuses.borrow_mut();
            let queue = statuses.entry((line_code(line), device)).or_default();
            if queue.is_empty() {
                1 // READY by default when nothing was scripted
            } else {
                queue.remove(0)
            }
        }

        fn wait_clock(&self) {
            *self.clock_micros.borrow_mut() += 100_000;
        }

        fn get_tod_micros(&self) -> i64 {
            *self.clock_micros.borrow()
        }

        fn terminate_process(&self) -> ! {
            *self.terminated.borrow_mut() = true;
            panic!("mock terminate_process called");
        }

        fn disable_interrupts(&self) {
            *self.interrupts_disabled.borrow_mut() += 1;
        }

        fn enable_interrupts(&self) {
            let mut n = self.interrupts_disabled.borrow_mut();
            *n = n.saturating_sub(1);
        }
    }
}
