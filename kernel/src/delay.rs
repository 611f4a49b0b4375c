//! The delay facility (§4.2): SYS18's handler and the kernel-ASID-0 daemon
//! that wakes sleepers off the pseudo-clock tick.
//!
//! Grounded on `original_source/phase3/delayDaemon.c`: a fixed arena of
//! descriptors split between a free list and the Active Delay List (ADL,
//! ascending wake time), with a dummy tail sentinel at `i64::MAX` so the
//! daemon and `delay()` never need to special-case an empty list when
//! inserting or scanning.

use spin::Mutex;

use crate::error::{SupportError, SupportResult, TerminateReason};
use crate::konst::SECOND_IN_MICROS;
use crate::nucleus::{Nucleus, Semaphore};
use crate::types::Asid;

/// One descriptor per user process plus one for the dummy tail sentinel.
const DESCRIPTOR_COUNT: usize = crate::konst::UPROCMAX + 1;

const NONE: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    wake_time: i64,
    asid: Asid,
    next: usize,
}

struct Inner {
    descriptors: [Descriptor; DESCRIPTOR_COUNT],
    free_head: usize,
    adl_head: usize,
}

/// The Active Delay List plus its backing free list of descriptors.
pub struct ActiveDelayList {
    inner: Mutex<Inner>,
}

impl ActiveDelayList {
    /// Partitions the arena into a free list of `UPROCMAX` descriptors and
    /// an ADL containing only the dummy tail sentinel, per
    /// `delayDaemon.c::initADL`.
    pub fn new() -> Self {
        let tail = DESCRIPTOR_COUNT - 1;
        let mut descriptors = [Descriptor {
            wake_time: 0,
            asid: 0,
            next: NONE,
        }; DESCRIPTOR_COUNT];
        descriptors[tail] = Descriptor {
            wake_time: i64::MAX,
            asid: 0,
            next: NONE,
        };
        for i in 0..tail {
            descriptors[i].next = if i + 1 == tail { NONE } else { i + 1 };
        }
        Self {
            inner: Mutex::new(Inner {
                descriptors,
                free_head: if tail == 0 { NONE } else { 0 },
                adl_head: tail,
            }),
        }
    }

    /// Inserts `asid` into the list, ascending by `wake_time`. Returns
    /// `false` if the free list was exhausted.
    fn insert(&self, asid: Asid, wake_time: i64) -> bool {
        let mut inner = self.inner.lock();
        let slot = inner.free_head;
        if slot == NONE {
            return false;
        }
        inner.free_head = inner.descriptors[slot].next;

        inner.descriptors[slot] = Descriptor {
            wake_time,
            asid,
            next: NONE,
        };

        let mut prev = None;
        let mut cur = inner.adl_head;
        while inner.descriptors[cur].wake_time < wake_time {
            prev = Some(cur);
            cur = inner.descriptors[cur].next;
        }
        inner.descriptors[slot].next = cur;
        match prev {
            Some(p) => inner.descriptors[p].next = slot,
            None => inner.adl_head = slot,
        }
        true
    }

    /// Removes and returns every descriptor whose `wake_time` has passed,
    /// in ascending order, returning their descriptors to the free list.
    fn drain_expired(&self, now: i64) -> alloc::vec::Vec<Asid> {
        let mut inner = self.inner.lock();
        let mut woken = alloc::vec::Vec::new();
        loop {
            let head = inner.adl_head;
            if inner.descriptors[head].wake_time > now {
                break;
            }
            // The dummy tail sentinel (wake_time == i64::MAX) is never
            // popped: `now` can never exceed it.
            woken.push(inner.descriptors[head].asid);
            let next = inner.descriptors[head].next;
            inner.adl_head = next;
            inner.descriptors[head].next = inner.free_head;
            inner.free_head = head;
        }
        woken
    }
}

impl Default for ActiveDelayList {
    fn default() -> Self {
        Self::new()
    }
}

/// SYS18 handler: blocks the calling process for at least `seconds`.
/// Negative `seconds` terminates the caller; an exhausted descriptor pool
/// also terminates the caller, after releasing the ADL mutex.
pub fn delay<N: Nucleus + ?Sized>(
    nucleus: &N,
    adl: &ActiveDelayList,
    asid: Asid,
    seconds: i32,
) -> SupportResult<()> {
    if seconds < 0 {
        return Err(SupportError::Terminate(TerminateReason::NegativeDelay));
    }

    nucleus.p(Semaphore::ActiveDelayList);
    let wake_time = nucleus.get_tod_micros() + seconds as i64 * SECOND_IN_MICROS;
    let inserted = adl.insert(asid, wake_time);
    if !inserted {
        nucleus.v(Semaphore::ActiveDelayList);
        return Err(SupportError::Terminate(TerminateReason::DelayPoolExhausted));
    }
    nucleus.v(Semaphore::ActiveDelayList);

    nucleus.p(Semaphore::Private(asid));
    Ok(())
}

/// The kernel-ASID-0 daemon's main loop body: wait for the next clock
/// tick, then wake every process whose delay has expired. Callers drive
/// this in a `loop { ... }` paired with `nucleus.wait_clock()` outside of
/// unit tests, where a single call is enough to assert on.
pub fn daemon_tick<N: Nucleus + ?Sized>(nucleus: &N, adl: &ActiveDelayList) {
    nucleus.wait_clock();
    nucleus.p(Semaphore::ActiveDelayList);
    let woken = adl.drain_expired(nucleus.get_tod_micros());
    nucleus.v(Semaphore::ActiveDelayList);
    for asid in woken {
        nucleus.v(Semaphore::Private(asid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nucleus::mock::MockNucleus;

    #[test]
    fn negative_delay_terminates() {
        let nucleus = MockNucleus::new();
        let adl = ActiveDelayList::new();
        let err = delay(&nucleus, &adl, 1, -1).unwrap_err();
        assert_eq!(err, SupportError::Terminate(TerminateReason::NegativeDelay));
    }

    #[test]
    fn zero_delay_is_accepted_and_wakes_on_next_tick() {
        let nucleus = MockNucleus::new();
        nucleus.set_sem(Semaphore::Private(1), 0);
        let adl = ActiveDelayList::new();

        delay(&nucleus, &adl, 1, 0).unwrap();
        assert_eq!(nucleus.sem_value(Semaphore::Private(1)), -1);

        daemon_tick(&nucleus, &adl);
        assert_eq!(nucleus.sem_value(Semaphore::Private(1)), 0);
    }

    #[test]
    fn wakes_are_ordered_by_delay_length() {
        let nucleus = MockNucleus::new();
        for asid in 1..=3u8 {
            nucleus.set_sem(Semaphore::Private(asid), 0);
        }
        let adl = ActiveDelayList::new();

        delay(&nucleus, &adl, 3, 5).unwrap();
        delay(&nucleus, &adl, 1, 1).unwrap();
        delay(&nucleus, &adl, 2, 3).unwrap();

        // Advance past the 1-second delay only.
        nucleus.advance_clock(SECOND_IN_MICROS);
        daemon_tick(&nucleus, &adl);
        assert_eq!(nucleus.sem_value(Semaphore::Private(1)), 0);
        assert_eq!(nucleus.sem_value(Semaphore::Private(2)), -1);
        assert_eq!(nucleus.sem_value(Semaphore::Private(3)), -1);

        nucleus.advance_clock(4 * SECOND_IN_MICROS);
        daemon_tick(&nucleus, &adl);
        assert_eq!(nucleus.sem_value(Semaphore::Private(2)), 0);
        assert_eq!(nucleus.sem_value(Semaphore::Private(3)), 0);
    }

    #[test]
    fn descriptor_pool_exhaustion_terminates_and_releases_mutex() {
        let nucleus = MockNucleus::new();
        let adl = ActiveDelayList::new();
        for asid in 1..=crate::konst::UPROCMAX as Asid {
            delay(&nucleus, &adl, asid, 100).unwrap();
        }
        let err = delay(&nucleus, &adl, 1, 100).unwrap_err();
        assert_eq!(
            err,
            SupportError::Terminate(TerminateReason::DelayPoolExhausted)
        );
        assert_eq!(nucleus.sem_value(Semaphore::ActiveDelayList), 1);
    }
}
