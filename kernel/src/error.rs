//! Error dispositions for the support level.
//!
//! Three outcomes exist for any fallible operation here, matching the
//! design's error-handling model: a fatal [`SupportError::Panic`] (backing
//! store or nucleus invariant violation), a [`SupportError::Terminate`]
//! (the default for user-caused faults), and a negated device status that
//! is *not* an error at all from this crate's point of view — it's a
//! successful syscall that reports failure to the caller in `v0`, so it is
//! represented as `Ok(i32)` carrying a negative value rather than an `Err`.

/// A fatal or process-ending condition raised by a support-level handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportError {
    /// Backing-store or device reported a status the design treats as
    /// impossible in normal operation. Stops the system.
    Panic(PanicReason),
    /// The faulting/calling process must be terminated, but the rest of
    /// the system keeps running.
    Terminate(TerminateReason),
}

/// Why the whole system is being halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicReason {
    /// A flash read/write came back with a status other than ready.
    BackingStoreFailure,
    /// A nucleus invariant the support level relies on did not hold
    /// (e.g. no free support structure at boot).
    NucleusInvariantViolated,
}

/// Why a process is being terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// TLB-Modification exception: page tables are corrupt.
    TlbModification,
    /// Faulting or refill VPN fell outside the process's page table.
    BadVirtualAddress,
    /// A program trap (exception codes 4..7, 9..12) other than TLB-Mod.
    ProgramTrap,
    /// Unrecognized syscall number.
    UnknownSyscall,
    /// `delay()` called with a negative second count.
    NegativeDelay,
    /// The delay descriptor free list was empty.
    DelayPoolExhausted,
    /// Disk/flash index outside `0..DEVICES_PER_LINE`.
    InvalidDeviceIndex,
    /// Disk (cyl, head, sect) or flash block fell outside device geometry.
    BlockOutOfRange,
    /// A device wait returned non-ready status for a seek or geometry
    /// command (as opposed to a data transfer, whose failure is reported
    /// to the caller instead of terminating it).
    DeviceNotReady,
    /// printer/terminal write length outside `1..=MAX_CHARIO_LEN`, or a
    /// buffer address outside the user segment.
    InvalidCharIoRequest,
    /// Explicit SYS9 termination.
    Requested,
}

pub type SupportResult<T> = Result<T, SupportError>;
