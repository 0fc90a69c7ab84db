//! Host-facing bus target.
//!
//! The peripheral driver behind [`TargetPort`] turns hardware state into
//! [`TargetEvent`]s; [`TargetRouter`] hands each one to the proxy that claimed
//! the transaction and tells the driver how to continue.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{bus::Direction, deferred::Schedule, proxy::ChannelProxy};

/// Something the host did on the target bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetEvent {
    /// Address byte (7-bit address and R/W bit) matched the target filter.
    Address(u8),
    /// Data byte written by the host.
    Received(u8),
    /// The host clocks in the next byte of a read.
    TransmitRequested,
    /// Stop condition, or the target was deselected otherwise.
    Deselected,
}

/// How the driver continues after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetReply {
    Ack,
    Nack,
    /// Continue, sending this byte to the host.
    Transmit(u8),
}

/// Driver of the bus target peripheral.
pub trait TargetPort {
    /// Feeds every pending event to `handler` and applies its replies.
    ///
    /// Called from the target interrupt.
    fn service(&self, handler: &mut dyn FnMut(TargetEvent) -> TargetReply);

    /// Turns the target interrupt on or off.
    fn set_notifications(&self, enabled: bool);
}

/// Routes target events to the channel proxy that claimed the transaction.
pub struct TargetRouter {
    selected: Mutex<Cell<Option<u8>>>,
}

impl TargetRouter {
    pub const fn new() -> Self {
        Self {
            selected: Mutex::new(Cell::new(None)),
        }
    }

    /// Index into the proxy table of the current transaction's owner.
    pub fn selected(&self) -> Option<usize> {
        critical_section::with(|cs| self.selected.borrow(cs).get()).map(usize::from)
    }

    /// Handles one event; interrupt context.
    ///
    /// The first proxy whose address matches claims the transaction. An
    /// address nobody claims is not acknowledged. A new address byte that
    /// moves the transaction elsewhere deselects the previous owner.
    pub fn handle<S: Schedule + ?Sized>(
        &self,
        event: TargetEvent,
        proxies: &[ChannelProxy],
        schedule: &S,
    ) -> TargetReply {
        match event {
            TargetEvent::Address(byte) => {
                let previous = self.selected();
                let claimed = proxies.iter().position(|proxy| proxy.select(byte));
                // a repeated start to another address ends the previous transaction
                if previous != claimed {
                    if let Some(proxy) = previous.and_then(|i| proxies.get(i)) {
                        proxy.deselect(schedule);
                    }
                }
                self.set_selected(claimed);
                match claimed.and_then(|i| proxies.get(i)) {
                    Some(proxy) => match Direction::from_rw_bit(byte) {
                        Direction::Read => TargetReply::Transmit(proxy.get_tx_byte()),
                        Direction::Write => TargetReply::Ack,
                    },
                    None => {
                        trace!("target: {=u8:#x} not claimed", byte >> 1);
                        TargetReply::Nack
                    }
                }
            }
            TargetEvent::Received(value) => match self.owner(proxies) {
                Some(proxy) => {
                    proxy.put_rx_byte(value);
                    TargetReply::Ack
                }
                None => TargetReply::Nack,
            },
            TargetEvent::TransmitRequested => match self.owner(proxies) {
                Some(proxy) => TargetReply::Transmit(proxy.get_tx_byte()),
                None => TargetReply::Nack,
            },
            TargetEvent::Deselected => {
                if let Some(proxy) = self.owner(proxies) {
                    proxy.deselect(schedule);
                }
                self.set_selected(None);
                TargetReply::Ack
            }
        }
    }

    fn owner<'p>(&self, proxies: &'p [ChannelProxy]) -> Option<&'p ChannelProxy> {
        self.selected().and_then(|i| proxies.get(i))
    }

    fn set_selected(&self, index: Option<usize>) {
        let index = index.and_then(|i| u8::try_from(i).ok());
        critical_section::with(|cs| self.selected.borrow(cs).set(index));
    }
}

impl Default for TargetRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for TargetRouter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TargetRouter")
            .field("selected", &self.selected())
            .finish()
    }
}
