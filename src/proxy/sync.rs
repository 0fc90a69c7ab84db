//! Reconciliation between a proxy's shadow and the real chip.
//!
//! Runs from the deferred queue only. Each step copies what it needs inside
//! the proxy's critical section and does the bus transfer outside it, so the
//! host side keeps running while the chip is being updated.

use heapless::Vec;

use super::{ChannelProxy, ProxyState};
use crate::{
    bus::{ControlBus, Direction},
    error::BusError,
    shadow::{DirtyMask, PAGE_SELECT, PAGES, Region},
};

/// Largest page image: two 48 byte buffers.
const PAGE_BYTES: usize = 96;

/// A run of status registers read back from the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusBlock {
    pub region: Region,
    /// Byte offset within `region`.
    pub offset: usize,
    pub len: usize,
}

impl StatusBlock {
    pub const fn new(region: Region, offset: usize, len: usize) -> Self {
        Self { region, offset, len }
    }

    /// A whole region.
    pub const fn region(region: Region) -> Self {
        Self::new(region, 0, region.len())
    }

    /// Chip address of the first register.
    pub const fn address(&self) -> u8 {
        self.region.first() + self.offset as u8
    }
}

/// Status pulled after a received block: receiver status, Q sub-code and
/// burst preambles, then the received channel status and user data.
pub const RX_STATUS: [StatusBlock; 4] = [
    StatusBlock::new(Region::Control, 0x12 - 0x01, 4),
    StatusBlock::new(Region::Control, 0x1F - 0x01, 14),
    StatusBlock::region(Region::RxChannelStatus),
    StatusBlock::region(Region::RxUserData),
];

/// Status pulled on a transmit block: SRC/DIT status and the ratio readback.
pub const TX_STATUS: [StatusBlock; 2] = [
    StatusBlock::new(Region::Control, 0x0A - 0x01, 1),
    StatusBlock::new(Region::Control, 0x32 - 0x01, 2),
];

/// Bytes changed by status pulls since the last [`ChannelProxy::take_changes`].
///
/// One mask per region, bit `i` standing for byte offset `i`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusChanges {
    masks: [u64; Region::ALL.len()],
}

impl StatusChanges {
    pub const fn new() -> Self {
        Self {
            masks: [0; Region::ALL.len()],
        }
    }

    pub fn get(&self, region: Region) -> u64 {
        self.masks[region.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.masks.iter().all(|&mask| mask == 0)
    }

    /// Number of changed bytes over all regions.
    pub fn count(&self) -> u32 {
        self.masks.iter().map(|mask| mask.count_ones()).sum()
    }

    fn record(&mut self, region: Region, offset: usize, changed: u64) {
        let shifted = u32::try_from(offset)
            .ok()
            .and_then(|offset| changed.checked_shl(offset))
            .unwrap_or(0);
        self.masks[region.index()] |= shifted;
    }
}

/// Dirty bits of one page together with the bytes they cover.
struct PageSnapshot {
    page: u8,
    mask: DirtyMask,
    bytes: Vec<u8, PAGE_BYTES>,
}

impl PageSnapshot {
    fn take(state: &mut ProxyState, page: u8) -> Option<Self> {
        let view = state.shadow.kernel_view();
        let mask = view.dirty(page);
        if mask.is_empty() {
            return None;
        }
        let mut bytes = Vec::new();
        for &region in Region::of_page(page) {
            // a page never holds more than PAGE_BYTES
            bytes.extend_from_slice(view.region(region)).ok()?;
        }
        Some(Self { page, mask, bytes })
    }

    /// Snapshotted bits whose byte still holds the value that was pushed.
    fn settled(&self, state: &mut ProxyState) -> DirtyMask {
        let view = state.shadow.kernel_view();
        let mut settled = self.mask;
        let mut start = 0;
        for &region in Region::of_page(self.page) {
            let pushed = &self.bytes[start..start + region.len()];
            let current = view.region(region);
            for (offset, (old, new)) in pushed.iter().zip(current).enumerate() {
                if old != new {
                    settled.set(region.first() as usize + offset, false);
                }
            }
            start += region.len();
        }
        settled
    }
}

impl ChannelProxy {
    /// Writes every dirty page to the chip.
    ///
    /// Returns the number of pages written. Bits are cleared only for bytes
    /// that were pushed and not rewritten by the host in the meantime. On a
    /// bus error the failing page stays dirty for the next pass.
    pub fn push_dirty<B: ControlBus + ?Sized>(&self, bus: &mut B) -> Result<usize, BusError> {
        let mut pushed = 0;
        for page in 0..PAGES as u8 {
            let Some(mut snapshot) = self.with_state(|state| PageSnapshot::take(state, page)) else {
                continue;
            };

            if let Err(err) = self.write_page(bus, &mut snapshot) {
                warn!("ch{=u8}: push of page {=u8} failed: {}", self.channel, page, err);
                self.with_state(|state| state.remote_page = None);
                return Err(err);
            }

            self.with_state(|state| {
                let settled = snapshot.settled(state);
                state.shadow.kernel_view().clear_dirty(page, settled);
            });
            pushed += 1;
        }
        if pushed > 0 {
            debug!("ch{=u8}: pushed {=usize} page(s)", self.channel, pushed);
        }
        Ok(pushed)
    }

    /// Reads `blocks` from the chip and merges them into the shadow.
    ///
    /// Merged bytes are never marked dirty. Returns how many bytes changed;
    /// the per-region masks accumulate until [`take_changes`](Self::take_changes).
    pub fn pull_status<B: ControlBus + ?Sized>(
        &self,
        bus: &mut B,
        blocks: &[StatusBlock],
    ) -> Result<u32, BusError> {
        let mut changed = 0;
        for block in blocks {
            let mut buf = [0u8; PAGE_BYTES];
            let Some(buf) = buf.get_mut(..block.len) else {
                continue;
            };

            let result = self
                .select_remote_page(bus, block.region.page())
                .and_then(|()| bus.transfer(Direction::Read, block.address(), buf));
            if let Err(err) = result {
                warn!(
                    "ch{=u8}: status read at {=u8:#x} failed: {}",
                    self.channel,
                    block.address(),
                    err
                );
                self.with_state(|state| state.remote_page = None);
                return Err(err);
            }

            let mask = self.with_state(|state| {
                let mask = state.shadow.kernel_view().merge(block.region, block.offset, buf);
                state.changes.record(block.region, block.offset, mask);
                mask
            });
            changed += mask.count_ones();
        }
        Ok(changed)
    }

    /// Returns and clears the accumulated status change masks.
    pub fn take_changes(&self) -> StatusChanges {
        self.with_state(|state| core::mem::take(&mut state.changes))
    }

    /// Page the chip is known to have selected.
    pub fn remote_page(&self) -> Option<u8> {
        self.with_state(|state| state.remote_page)
    }

    fn write_page<B: ControlBus + ?Sized>(
        &self,
        bus: &mut B,
        snapshot: &mut PageSnapshot,
    ) -> Result<(), BusError> {
        self.select_remote_page(bus, snapshot.page)?;

        let mut rest = snapshot.bytes.as_mut_slice();
        for &region in Region::of_page(snapshot.page) {
            let (chunk, tail) = rest.split_at_mut(region.len());
            bus.transfer(Direction::Write, region.first(), chunk)?;
            rest = tail;
        }
        Ok(())
    }

    fn select_remote_page<B: ControlBus + ?Sized>(
        &self,
        bus: &mut B,
        page: u8,
    ) -> Result<(), BusError> {
        if self.remote_page() == Some(page) {
            return Ok(());
        }
        bus.transfer(Direction::Write, PAGE_SELECT, &mut [page])?;
        self.with_state(|state| state.remote_page = Some(page));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deferred::WorkId, error::BusError, test_support::MockChip};

    fn clean_proxy() -> ChannelProxy {
        let proxy = ChannelProxy::new(0, 0x70, WorkId::new(0));
        proxy.with_kernel_view(|view| {
            view.take_dirty(0);
        });
        proxy
    }

    #[test]
    fn status_blocks_cover_the_firmware_sets() {
        assert_eq!(RX_STATUS[0].address(), 0x12);
        assert_eq!(RX_STATUS[1].address(), 0x1F);
        assert_eq!(RX_STATUS[1].address() as usize + RX_STATUS[1].len - 1, 0x2C);
        assert_eq!(RX_STATUS[3].address(), 0x40);
        assert_eq!(TX_STATUS[0].address(), 0x0A);
        assert_eq!(TX_STATUS[1].address(), 0x32);
    }

    #[test]
    fn initial_image_is_pushed_on_first_pass() {
        let proxy = ChannelProxy::new(0, 0x70, WorkId::new(0));
        let mut chip = MockChip::new();

        assert_eq!(proxy.push_dirty(&mut chip), Ok(1));
        assert_eq!(chip.register(0, 0x01), 0x3F);
        assert_eq!(chip.register(0, 0x2D), 0x02);
        assert!(!proxy.with_shadow(|s| s.any_dirty()));
        assert_eq!(proxy.remote_page(), Some(0));
    }

    #[test]
    fn push_selects_page_once_and_writes_whole_regions() {
        let proxy = clean_proxy();
        proxy.with_shadow(|s| {
            s.write(1, 0x05, 0xAB);
            s.write(1, 0x41, 0xCD);
        });
        let mut chip = MockChip::new();

        assert_eq!(proxy.push_dirty(&mut chip), Ok(1));
        assert_eq!(chip.register(1, 0x05), 0xAB);
        assert_eq!(chip.register(1, 0x41), 0xCD);
        assert_eq!(chip.page_selects(), 1);
        assert_eq!(chip.writes(), 3);

        proxy.with_shadow(|s| s.write(1, 0x06, 0x01));
        proxy.push_dirty(&mut chip).unwrap();
        // chip already on page 1
        assert_eq!(chip.page_selects(), 1);
    }

    #[test]
    fn clean_shadow_pushes_nothing() {
        let proxy = clean_proxy();
        let mut chip = MockChip::new();
        assert_eq!(proxy.push_dirty(&mut chip), Ok(0));
        assert_eq!(chip.transfers(), 0);
    }

    #[test]
    fn failed_push_keeps_page_dirty_and_forgets_remote_page() {
        let proxy = clean_proxy();
        proxy.with_shadow(|s| s.write(0, 0x03, 0x21));
        let mut chip = MockChip::new();
        chip.fail_with(Some(BusError::Nack));

        assert_eq!(proxy.push_dirty(&mut chip), Err(BusError::Nack));
        assert!(proxy.with_shadow(|s| s.is_dirty(0)));
        assert_eq!(proxy.remote_page(), None);

        chip.fail_with(None);
        assert_eq!(proxy.push_dirty(&mut chip), Ok(1));
        assert_eq!(chip.register(0, 0x03), 0x21);
        assert!(!proxy.with_shadow(|s| s.any_dirty()));
    }

    #[test]
    fn host_rewrite_during_push_stays_dirty() {
        let proxy = clean_proxy();
        proxy.with_shadow(|s| {
            s.write(0, 0x03, 0x10);
            s.write(0, 0x04, 0x20);
        });
        let mut chip = MockChip::new();
        let mut snapshot = proxy.with_state(|state| PageSnapshot::take(state, 0)).unwrap();

        // host writes while the transfer is in flight
        proxy.with_shadow(|s| s.write(0, 0x03, 0x11));
        proxy.write_page(&mut chip, &mut snapshot).unwrap();
        proxy.with_state(|state| {
            let settled = snapshot.settled(state);
            state.shadow.kernel_view().clear_dirty(0, settled);
        });

        let remaining = proxy.with_shadow(|s| s.take_dirty(0));
        assert!(remaining.get(0x03));
        assert!(!remaining.get(0x04));
        assert_eq!(chip.register(0, 0x03), 0x10);
    }

    #[test]
    fn pull_merges_without_dirtying_and_accumulates_changes() {
        let proxy = clean_proxy();
        let mut chip = MockChip::new();
        chip.set_register(0, 0x13, 0x04);
        chip.set_register(1, 0x00, 0x01);
        chip.set_register(1, 0x41, 0x80);

        assert_eq!(proxy.pull_status(&mut chip, &RX_STATUS), Ok(3));
        proxy.with_shadow(|s| {
            assert_eq!(s.read(0, 0x13), 0x04);
            assert_eq!(s.read(1, 0x00), 0x01);
            assert_eq!(s.read(1, 0x41), 0x80);
            assert!(!s.any_dirty());
        });

        let changes = proxy.take_changes();
        assert_eq!(changes.get(Region::Control), 1 << (0x13 - 0x01));
        assert_eq!(changes.get(Region::RxChannelStatus), 1);
        assert_eq!(changes.get(Region::RxUserData), 1 << 1);
        assert_eq!(changes.count(), 3);
        assert!(proxy.take_changes().is_empty());

        // same values again: nothing new
        assert_eq!(proxy.pull_status(&mut chip, &RX_STATUS), Ok(0));
    }

    #[test]
    fn pull_switches_pages_as_needed() {
        let proxy = clean_proxy();
        let mut chip = MockChip::new();

        proxy.pull_status(&mut chip, &RX_STATUS).unwrap();
        assert_eq!(proxy.remote_page(), Some(1));
        proxy.pull_status(&mut chip, &TX_STATUS).unwrap();
        assert_eq!(proxy.remote_page(), Some(0));
        // 0 for the first rx block, 1 for the buffers, 0 again for tx
        assert_eq!(chip.page_selects(), 3);
    }

    #[test]
    fn failed_pull_reports_error() {
        let proxy = clean_proxy();
        let mut chip = MockChip::new();
        chip.fail_with(Some(BusError::Timeout));

        assert_eq!(proxy.pull_status(&mut chip, &TX_STATUS), Err(BusError::Timeout));
        assert_eq!(proxy.remote_page(), None);
        assert!(proxy.take_changes().is_empty());
    }
}
