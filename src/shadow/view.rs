use crate::shadow::{
    map::Region,
    table::{DirtyMask, RegisterShadow},
};

/// Reconciliation-side view of a register shadow.
///
/// Reads and writes through this view never mark bytes dirty. It is used to
/// push dirty pages to the chip, to clear what was pushed, and to merge status
/// read back from the chip.
pub struct KernelView<'a> {
    shadow: &'a mut RegisterShadow,
}

impl<'a> core::fmt::Debug for KernelView<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KernelView").finish_non_exhaustive()
    }
}

impl<'a> KernelView<'a> {
    pub(crate) fn new(shadow: &'a mut RegisterShadow) -> Self {
        Self { shadow }
    }

    /// Bytes of a whole region.
    pub fn region(&self, region: Region) -> &[u8] {
        self.shadow.region_bytes(region)
    }

    /// Copies `data` into the start of `region` without marking dirty.
    ///
    /// Excess bytes on either side are ignored.
    pub fn load(&mut self, region: Region, data: &[u8]) {
        let dst = self.shadow.region_bytes_mut(region);
        let len = dst.len().min(data.len());
        dst[..len].copy_from_slice(&data[..len]);
    }

    /// Merges `data` into `region` at `offset` without marking dirty.
    ///
    /// Returns a mask with bit `i` set when byte `offset + i` changed. At most
    /// 64 bytes are merged; anything past the region end is ignored.
    pub fn merge(&mut self, region: Region, offset: usize, data: &[u8]) -> u64 {
        let Some(dst) = self.shadow.region_bytes_mut(region).get_mut(offset..) else {
            return 0;
        };

        let mut changed = 0u64;
        for (i, (old, new)) in dst.iter_mut().zip(data).take(64).enumerate() {
            if *old != *new {
                changed |= 1 << i;
                *old = *new;
            }
        }
        changed
    }

    /// Dirty bits of `page` without clearing them.
    pub fn dirty(&self, page: u8) -> DirtyMask {
        self.shadow.dirty_mask(page)
    }

    pub fn is_dirty(&self, page: u8) -> bool {
        self.shadow.is_dirty(page)
    }

    pub fn any_dirty(&self) -> bool {
        self.shadow.any_dirty()
    }

    /// Clears the bits of `mask` in `page`, keeping any set since it was taken.
    pub fn clear_dirty(&mut self, page: u8, mask: DirtyMask) {
        let Some(dirty) = self.shadow.dirty_mask_mut(page) else {
            return;
        };
        let mut idx = mask.first_index();
        while let Some(bit) = idx {
            dirty.set(bit, false);
            idx = mask.next_index(bit);
        }
    }

    /// Marks every backed register of `page` dirty, forcing a full push.
    pub fn mark_page_dirty(&mut self, page: u8) {
        let Some(dirty) = self.shadow.dirty_mask_mut(page) else {
            return;
        };
        for region in Region::of_page(page) {
            let first = region.first() as usize;
            for address in first..first + region.len() {
                dirty.set(address, true);
            }
        }
    }

    /// See [`RegisterShadow::take_dirty`].
    pub fn take_dirty(&mut self, page: u8) -> DirtyMask {
        self.shadow.take_dirty(page)
    }
}
