use bitmaps::Bitmap;

use crate::shadow::{
    defaults::CONTROL_DEFAULTS,
    map::{self, PAGES, Region, SHADOW_SIZE, Slot},
    view::KernelView,
};

/// Dirty bits of one page, indexed by chip register address.
pub type DirtyMask = Bitmap<128>;

/// In-memory image of one chip's paged register file.
///
/// Host-side writes go through [`write`](Self::write) and mark the written
/// byte dirty in the page that was active at the time. The reconciliation side
/// uses [`KernelView`], which never marks anything dirty.
pub struct RegisterShadow {
    selector: u8,
    bytes: [u8; SHADOW_SIZE],
    dirty: [DirtyMask; PAGES],
}

impl RegisterShadow {
    /// A zeroed shadow with page 0 selected and nothing dirty.
    pub fn new() -> Self {
        Self {
            selector: 0,
            bytes: [0; SHADOW_SIZE],
            dirty: [Bitmap::new(); PAGES],
        }
    }

    /// A shadow holding the chip's power-on control image, not yet dirty.
    pub fn with_defaults() -> Self {
        let mut shadow = Self::new();
        shadow.kernel_view().load(Region::Control, &CONTROL_DEFAULTS);
        shadow
    }

    /// Current value of the page selector.
    #[inline]
    pub fn selector(&self) -> u8 {
        self.selector
    }

    /// Pure address lookup; see [`map::resolve`].
    #[inline]
    pub fn resolve(&self, page: u8, address: u8) -> Option<Slot> {
        map::resolve(page, address)
    }

    /// Reads the register at (`page`, `address`), or 0 if unmapped.
    pub fn read(&self, page: u8, address: u8) -> u8 {
        match self.resolve(page, address) {
            Some(Slot::PageSelect) => self.selector,
            Some(Slot::Register { region, offset, .. }) => self.bytes[region.base() + offset],
            None => 0,
        }
    }

    /// Writes the register at (`page`, `address`) and marks it dirty.
    ///
    /// Unmapped addresses discard the write. The page selector is local
    /// state: reconciliation selects chip pages on its own, so changing it
    /// marks nothing dirty.
    pub fn write(&mut self, page: u8, address: u8, value: u8) {
        match self.resolve(page, address) {
            Some(Slot::PageSelect) => self.selector = value,
            Some(Slot::Register {
                page,
                region,
                offset,
            }) => {
                self.bytes[region.base() + offset] = value;
                self.dirty[page as usize].set(address as usize, true);
            }
            None => {}
        }
    }

    /// Returns the dirty bits of `page` and clears them.
    ///
    /// Callers must hold the same critical section the writers use.
    pub fn take_dirty(&mut self, page: u8) -> DirtyMask {
        match self.dirty.get_mut(page as usize) {
            Some(mask) => core::mem::replace(mask, Bitmap::new()),
            None => Bitmap::new(),
        }
    }

    pub fn is_dirty(&self, page: u8) -> bool {
        self.dirty
            .get(page as usize)
            .is_some_and(|mask| !mask.is_empty())
    }

    pub fn any_dirty(&self) -> bool {
        self.dirty.iter().any(|mask| !mask.is_empty())
    }

    /// Reconciliation-side access that never marks bytes dirty.
    pub fn kernel_view(&mut self) -> KernelView<'_> {
        KernelView::new(self)
    }

    pub(crate) fn region_bytes(&self, region: Region) -> &[u8] {
        &self.bytes[region.base()..region.base() + region.len()]
    }

    pub(crate) fn region_bytes_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.bytes[region.base()..region.base() + region.len()]
    }

    pub(crate) fn dirty_mask(&self, page: u8) -> DirtyMask {
        self.dirty.get(page as usize).copied().unwrap_or_else(Bitmap::new)
    }

    pub(crate) fn dirty_mask_mut(&mut self, page: u8) -> Option<&mut DirtyMask> {
        self.dirty.get_mut(page as usize)
    }
}

impl Default for RegisterShadow {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RegisterShadow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterShadow")
            .field("selector", &self.selector)
            .field("dirty", &self.any_dirty())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::map::PAGE_SELECT;

    #[test]
    fn write_then_read_round_trips_on_mapped_registers() {
        let mut shadow = RegisterShadow::new();
        shadow.write(0, 0x2D, 0xA5);
        shadow.write(1, 0x40, 0x11);
        shadow.write(2, 0x2F, 0x22);

        assert_eq!(shadow.read(0, 0x2D), 0xA5);
        assert_eq!(shadow.read(1, 0x40), 0x11);
        assert_eq!(shadow.read(2, 0x2F), 0x22);
        // Same address on another page is another register.
        assert_eq!(shadow.read(2, 0x40), 0x00);
    }

    #[test]
    fn unmapped_write_is_discarded_and_not_dirty() {
        let mut shadow = RegisterShadow::new();
        shadow.write(0, 0x00, 0xFF);
        shadow.write(1, 0x35, 0xFF);
        shadow.write(3, 0x10, 0xFF);

        assert_eq!(shadow.read(0, 0x00), 0);
        assert_eq!(shadow.read(1, 0x35), 0);
        assert_eq!(shadow.read(3, 0x10), 0);
        assert!(!shadow.any_dirty());
    }

    #[test]
    fn write_marks_byte_dirty_in_its_page() {
        let mut shadow = RegisterShadow::new();
        shadow.write(1, 0x42, 0x01);

        assert!(shadow.is_dirty(1));
        assert!(!shadow.is_dirty(0));
        assert!(!shadow.is_dirty(2));

        let mask = shadow.take_dirty(1);
        assert!(mask.get(0x42));
        assert_eq!(mask.len(), 1);
    }

    #[test]
    fn take_dirty_twice_returns_empty_mask() {
        let mut shadow = RegisterShadow::new();
        shadow.write(0, 0x03, 0x31);
        shadow.write(0, 0x04, 0x01);

        assert_eq!(shadow.take_dirty(0).len(), 2);
        assert!(shadow.take_dirty(0).is_empty());
        assert!(!shadow.any_dirty());
    }

    #[test]
    fn page_select_is_readable_everywhere_and_never_dirty() {
        let mut shadow = RegisterShadow::new();
        shadow.write(0, PAGE_SELECT, 2);

        assert_eq!(shadow.selector(), 2);
        assert_eq!(shadow.read(1, PAGE_SELECT), 2);
        assert!(!shadow.any_dirty());
    }

    #[test]
    fn defaults_are_loaded_clean() {
        let shadow = RegisterShadow::with_defaults();
        assert_eq!(shadow.read(0, 0x01), 0x3F);
        assert_eq!(shadow.read(0, 0x2D), 0x02);
        assert!(!shadow.any_dirty());
    }

    #[test]
    fn take_dirty_on_page_without_storage() {
        let mut shadow = RegisterShadow::new();
        assert!(shadow.take_dirty(3).is_empty());
        assert!(!shadow.is_dirty(7));
    }
}
