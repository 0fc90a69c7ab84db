//! Block clock correlation.
//!
//! Every SRC4392 raises its interrupt pin once per received block. The same
//! edge latches a capture channel of a free-running timer, so the timer holds
//! the exact block boundary even if the interrupt is served late. A separate
//! reference line marks the transmit-side block boundary. The phase delta of a
//! channel is its capture minus the last reference capture.
//!
//! Interrupt handlers only disarm their line, latch what they need, and post
//! work; the bus traffic happens in [`ChannelGroup::refresh_rx`] and
//! [`ChannelGroup::refresh_tx`], which re-arm the line when done.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{
    bus::ControlBus,
    config::{CHANNELS, HatConfig, LineConfig, Work},
    deferred::Schedule,
    error::BusError,
    proxy::{ChannelProxy, RX_STATUS, StatusBlock, TX_STATUS},
};

/// Free-running timer with capture channels.
pub trait CaptureTimer {
    fn current_count(&self) -> u16;
    /// Count latched by the last edge on `channel`.
    fn last_capture(&self, channel: u8) -> u16;
}

/// Trigger of a pin interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    RisingEdge,
    FallingEdge,
    BothEdges,
    LowLevel,
    HighLevel,
}

/// Pin interrupt controller.
pub trait PinInterrupts {
    /// Arms `line` with `mode`.
    fn enable(&self, line: u8, mode: PinMode);
    /// Disarms `line`; pending edges are dropped.
    fn disable(&self, line: u8);
}

/// The four channel proxies together with the timing hardware they share.
pub struct ChannelGroup<T, P> {
    proxies: [ChannelProxy; CHANNELS],
    timer: T,
    pins: P,
    blocks: [LineConfig; CHANNELS],
    reference: LineConfig,
    reference_capture: Mutex<Cell<u16>>,
}

impl<T: CaptureTimer, P: PinInterrupts> ChannelGroup<T, P> {
    pub fn new(config: &HatConfig, timer: T, pins: P) -> Self {
        let proxies = core::array::from_fn(|ch| {
            let ch = ch as u8;
            ChannelProxy::new(ch, config.address_of(ch), Work::Sync(ch).id())
        });

        Self {
            proxies,
            timer,
            pins,
            blocks: config.blocks,
            reference: config.reference,
            reference_capture: Mutex::new(Cell::new(0)),
        }
    }

    pub fn proxies(&self) -> &[ChannelProxy; CHANNELS] {
        &self.proxies
    }

    pub fn proxy(&self, channel: u8) -> Option<&ChannelProxy> {
        self.proxies.get(channel as usize)
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Arms every block line and the reference line.
    pub fn arm(&self) {
        for line in self.blocks.iter().chain(core::iter::once(&self.reference)) {
            self.pins.enable(line.line, line.mode);
        }
    }

    /// Block boundary on `channel`; interrupt context.
    ///
    /// Disarms the line until the block has been processed, stores the phase
    /// delta in the proxy, and posts the receive-block work. Returns the
    /// delta, or `None` for an unknown channel.
    pub fn on_block_boundary<S: Schedule + ?Sized>(
        &self,
        channel: u8,
        schedule: &S,
    ) -> Option<i16> {
        let line = self.blocks.get(channel as usize)?;
        let proxy = self.proxies.get(channel as usize)?;

        self.pins.disable(line.line);
        let capture = self.timer.last_capture(line.capture);
        let delta = capture.wrapping_sub(self.reference_capture()) as i16;
        proxy.set_delta(delta);
        schedule.schedule(Work::RxBlock(channel).id());
        trace!("ch{=u8}: block, delta {=i16}", channel, delta);
        Some(delta)
    }

    /// Reference block boundary; interrupt context.
    pub fn on_reference<S: Schedule + ?Sized>(&self, schedule: &S) {
        self.pins.disable(self.reference.line);
        let capture = self.timer.last_capture(self.reference.capture);
        critical_section::with(|cs| self.reference_capture.borrow(cs).set(capture));
        schedule.schedule(Work::TxBlock.id());
    }

    /// Timer count latched by the last reference edge.
    pub fn reference_capture(&self) -> u16 {
        critical_section::with(|cs| self.reference_capture.borrow(cs).get())
    }

    /// Timer counts elapsed since the last reference edge.
    pub fn since_reference(&self) -> u16 {
        self.timer.current_count().wrapping_sub(self.reference_capture())
    }

    /// Receive-block work of `channel`: push host writes, pull receive status,
    /// then re-arm the block line whatever the outcome.
    ///
    /// The status pull runs even when the push fails. Returns the number of
    /// status bytes that changed, or the first error.
    pub fn refresh_rx<B: ControlBus + ?Sized>(
        &self,
        channel: u8,
        bus: &mut B,
    ) -> Result<u32, BusError> {
        let (Some(proxy), Some(line)) = (self.proxy(channel), self.blocks.get(channel as usize))
        else {
            return Ok(0);
        };

        let result = Self::refresh(proxy, bus, &RX_STATUS);
        self.pins.enable(line.line, line.mode);
        result
    }

    /// Transmit-block work: for each channel push host writes and pull
    /// transmit status, then re-arm the reference line.
    ///
    /// A failing channel does not stop the others; the first error is returned.
    pub fn refresh_tx<B: ControlBus>(&self, buses: &mut [B; CHANNELS]) -> Result<(), BusError> {
        let mut first_error = None;
        for (proxy, bus) in self.proxies.iter().zip(buses.iter_mut()) {
            if let Err(err) = Self::refresh(proxy, bus, &TX_STATUS) {
                first_error.get_or_insert(err);
            }
        }
        self.pins.enable(self.reference.line, self.reference.mode);
        first_error.map_or(Ok(()), Err)
    }

    fn refresh<B: ControlBus + ?Sized>(
        proxy: &ChannelProxy,
        bus: &mut B,
        blocks: &[StatusBlock],
    ) -> Result<u32, BusError> {
        let pushed = proxy.push_dirty(bus);
        let pulled = proxy.pull_status(bus, blocks);
        pushed.and(pulled)
    }
}

impl<T, P> core::fmt::Debug for ChannelGroup<T, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelGroup")
            .field("proxies", &self.proxies)
            .finish_non_exhaustive()
    }
}
