//! Deferred work queue.
//!
//! Interrupt handlers post work here; the run loop drains it. Items are slots
//! in a fixed table, identified by [`WorkId`]. Queued slots form a singly
//! linked ring with one anchor:
//!
//! ```text
//!   anchor ──▶ newest ──▶ oldest ──▶ … ──▶ newest
//! ```
//!
//! The anchor is the most recently queued slot, so `anchor.next` is the oldest
//! and draining is FIFO. A slot is queued exactly when its link is `Some`, which
//! makes a second enqueue of the same slot a no-op.

use core::cell::RefCell;

use critical_section::Mutex;

/// Identifies one deferred action in the work table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WorkId(u8);

impl WorkId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Something that can defer work to the run loop.
///
/// Producers (the channel proxies and the clock group) only need this, not the
/// queue's capacity.
pub trait Schedule {
    /// Queues `work`; returns false if it was already queued.
    fn schedule(&self, work: WorkId) -> bool;
}

struct Ring<const N: usize> {
    next: [Option<u8>; N],
    anchor: Option<u8>,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        Self {
            next: [None; N],
            anchor: None,
        }
    }

    fn insert(&mut self, work: WorkId) -> bool {
        let slot = work.index();
        match self.next.get(slot) {
            Some(None) => {}
            // already queued, or not a slot of this table
            _ => return false,
        }

        match self.anchor {
            Some(anchor) => {
                let anchor = anchor as usize;
                self.next[slot] = self.next[anchor];
                self.next[anchor] = Some(work.0);
            }
            None => self.next[slot] = Some(work.0),
        }
        self.anchor = Some(work.0);
        true
    }

    fn remove_oldest(&mut self) -> Option<WorkId> {
        let anchor = self.anchor? as usize;
        let oldest = self.next[anchor]?;
        let oldest_slot = oldest as usize;

        if oldest_slot == anchor {
            self.anchor = None;
        } else {
            self.next[anchor] = self.next[oldest_slot];
        }
        self.next[oldest_slot] = None;
        Some(WorkId(oldest))
    }
}

/// FIFO of deferred actions, safe to post to from any interrupt priority.
///
/// `N` is the number of work slots; it must be below 255.
pub struct DeferredQueue<const N: usize> {
    ring: Mutex<RefCell<Ring<N>>>,
}

impl<const N: usize> DeferredQueue<N> {
    pub const fn new() -> Self {
        assert!(N < u8::MAX as usize, "work table is indexed by u8");

        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
        }
    }

    /// Queues `work` behind everything already queued.
    ///
    /// Returns false, leaving the queue untouched, if `work` is already queued
    /// or is not a slot of this queue.
    pub fn enqueue(&self, work: WorkId) -> bool {
        let queued = critical_section::with(|cs| self.ring.borrow_ref_mut(cs).insert(work));
        if queued {
            trace!("deferred: queued {=u8}", work.0);
        }
        queued
    }

    /// Removes the oldest queued item and runs `act` on it.
    ///
    /// The item is marked not-queued before `act` runs, so the action may
    /// re-queue itself. `act` runs outside the critical section.
    pub fn drain_one(&self, act: impl FnOnce(WorkId)) -> bool {
        let oldest = critical_section::with(|cs| self.ring.borrow_ref_mut(cs).remove_oldest());
        match oldest {
            Some(work) => {
                act(work);
                true
            }
            None => false,
        }
    }

    /// Drains until empty; returns the number of actions run.
    pub fn drain_all(&self, mut act: impl FnMut(WorkId)) -> usize {
        let mut count = 0;
        while self.drain_one(&mut act) {
            count += 1;
        }
        count
    }

    /// Drains forever, calling `wait` whenever a pass found nothing to do.
    ///
    /// `wait` must return on the next interrupt even if that interrupt fired
    /// between the empty check and the call, which WFE guarantees on Cortex-M.
    pub fn run_forever(&self, mut act: impl FnMut(WorkId), mut wait: impl FnMut()) -> ! {
        loop {
            if self.drain_all(&mut act) == 0 {
                wait();
            }
        }
    }

    pub fn is_queued(&self, work: WorkId) -> bool {
        critical_section::with(|cs| {
            matches!(self.ring.borrow_ref(cs).next.get(work.index()), Some(Some(_)))
        })
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.ring.borrow_ref(cs).anchor.is_none())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| {
            self.ring
                .borrow_ref(cs)
                .next
                .iter()
                .filter(|link| link.is_some())
                .count()
        })
    }

    /// Visits the queued items oldest first, inside one critical section.
    pub fn for_each_pending(&self, mut f: impl FnMut(WorkId)) {
        critical_section::with(|cs| {
            let ring = self.ring.borrow_ref(cs);
            let Some(anchor) = ring.anchor else {
                return;
            };
            let mut cursor = anchor;
            loop {
                let Some(next) = ring.next[cursor as usize] else {
                    return;
                };
                f(WorkId(next));
                if next == anchor {
                    return;
                }
                cursor = next;
            }
        })
    }
}

impl<const N: usize> Default for DeferredQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Schedule for DeferredQueue<N> {
    fn schedule(&self, work: WorkId) -> bool {
        self.enqueue(work)
    }
}

impl<const N: usize> core::fmt::Debug for DeferredQueue<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
