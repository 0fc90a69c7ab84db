//! Per-channel register proxy.
//!
//! A [`ChannelProxy`] answers the host on the I2C target bus as if it were the
//! SRC4392 of its channel, serving reads and taking writes from its
//! [`RegisterShadow`]. Everything it does in interrupt context is a handful of
//! loads and stores on the shadow; talking to the real chip is left to the
//! reconciliation pass in [`sync`], which runs from the deferred queue.
//!
//! Protocol, per transaction:
//!
//! ```text
//!  Idle ──select(addr)──▶ AddressExpected ──put_rx_byte(reg)──▶ DataPhase
//!    ▲                          │                                  │
//!    │                          └──────get_tx_byte()───────────────┤
//!    └────────────────────────deselect()───────────────────────────┘
//! ```

mod cursor;
pub mod sync;

use core::cell::RefCell;

use critical_section::Mutex;

pub use cursor::Cursor;
pub use sync::{RX_STATUS, StatusBlock, StatusChanges, TX_STATUS};

use crate::{
    bus::Direction,
    deferred::{Schedule, WorkId},
    shadow::{KernelView, RegisterShadow},
};

/// Where the proxy is within a host transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Not addressed by the host.
    Idle,
    /// Selected; the next received byte is the register address.
    AddressExpected,
    /// Further bytes are register data.
    DataPhase,
}

struct ProxyState {
    phase: Phase,
    direction: Direction,
    cursor: Cursor,
    shadow: RegisterShadow,
    delta: i16,
    /// Page the chip is known to have selected; `None` after a bus error.
    remote_page: Option<u8>,
    changes: StatusChanges,
}

/// Shadow of one SRC4392 as seen from the host bus.
pub struct ChannelProxy {
    channel: u8,
    address: u8,
    sync: WorkId,
    state: Mutex<RefCell<ProxyState>>,
}

impl ChannelProxy {
    /// Creates the proxy of `channel`, answering to 7-bit `address`.
    ///
    /// The shadow starts with the chip's power-on image, with page 0 marked
    /// dirty so that the first reconciliation pushes it. `sync` is the work
    /// item that runs [`push_dirty`](Self::push_dirty) for this proxy.
    pub fn new(channel: u8, address: u8, sync: WorkId) -> Self {
        let mut shadow = RegisterShadow::with_defaults();
        shadow.kernel_view().mark_page_dirty(0);

        Self {
            channel,
            address: address & 0x7F,
            sync,
            state: Mutex::new(RefCell::new(ProxyState {
                phase: Phase::Idle,
                direction: Direction::Write,
                cursor: Cursor::new(0),
                shadow,
                delta: 0,
                remote_page: None,
                changes: StatusChanges::new(),
            })),
        }
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// 7-bit target address on the host bus.
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Work item that reconciles this proxy.
    #[inline]
    pub fn sync_work(&self) -> WorkId {
        self.sync
    }

    /// Claims the transaction if the top seven bits of `target` match.
    ///
    /// On a match the proxy expects a register address next and remembers the
    /// direction bit. Otherwise nothing changes.
    pub fn select(&self, target: u8) -> bool {
        if target >> 1 != self.address {
            return false;
        }
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.phase = Phase::AddressExpected;
            state.direction = Direction::from_rw_bit(target);
        });
        true
    }

    /// Ends the transaction and schedules reconciliation if anything is dirty.
    ///
    /// Returns whether the proxy has pending host writes.
    pub fn deselect<S: Schedule + ?Sized>(&self, schedule: &S) -> bool {
        let dirty = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.phase = Phase::Idle;
            state.shadow.any_dirty()
        });
        if dirty {
            schedule.schedule(self.sync);
        }
        dirty
    }

    /// Next byte for the host to read.
    ///
    /// Serves the register under the cursor (0 if unmapped) and advances the
    /// cursor when auto-increment is set. A read that starts without an
    /// address byte continues from the retained cursor.
    pub fn get_tx_byte(&self) -> u8 {
        critical_section::with(|cs| {
            let mut guard = self.state.borrow_ref_mut(cs);
            let state = &mut *guard;
            match state.phase {
                Phase::Idle => return 0,
                Phase::AddressExpected => state.phase = Phase::DataPhase,
                Phase::DataPhase => {}
            }
            let value = state
                .shadow
                .read(state.shadow.selector(), state.cursor.address());
            state.cursor = state.cursor.advance();
            value
        })
    }

    /// Byte received from the host.
    ///
    /// The first byte after selection loads the cursor; later bytes are
    /// written through the shadow at the cursor, which then advances.
    pub fn put_rx_byte(&self, value: u8) {
        critical_section::with(|cs| {
            let mut guard = self.state.borrow_ref_mut(cs);
            let state = &mut *guard;
            match state.phase {
                Phase::Idle => {}
                Phase::AddressExpected => {
                    state.cursor = Cursor::new(value);
                    state.phase = Phase::DataPhase;
                }
                Phase::DataPhase => {
                    let page = state.shadow.selector();
                    state.shadow.write(page, state.cursor.address(), value);
                    state.cursor = state.cursor.advance();
                }
            }
        })
    }

    pub fn phase(&self) -> Phase {
        critical_section::with(|cs| self.state.borrow_ref(cs).phase)
    }

    pub fn cursor(&self) -> Cursor {
        critical_section::with(|cs| self.state.borrow_ref(cs).cursor)
    }

    /// Direction bit of the last selection.
    pub fn direction(&self) -> Direction {
        critical_section::with(|cs| self.state.borrow_ref(cs).direction)
    }

    /// Phase delta of the last block boundary, in timer counts.
    pub fn delta(&self) -> i16 {
        critical_section::with(|cs| self.state.borrow_ref(cs).delta)
    }

    pub fn set_delta(&self, delta: i16) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).delta = delta);
    }

    /// Runs `f` on the shadow inside a critical section.
    ///
    /// Writes made here count as host writes and mark bytes dirty.
    pub fn with_shadow<R>(&self, f: impl FnOnce(&mut RegisterShadow) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs).shadow))
    }

    /// Runs `f` on the reconciliation view inside a critical section.
    pub fn with_kernel_view<R>(&self, f: impl FnOnce(&mut KernelView<'_>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs).shadow.kernel_view()))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ProxyState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }
}

impl core::fmt::Debug for ChannelProxy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelProxy")
            .field("channel", &self.channel)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
