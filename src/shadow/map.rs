//! Page map of the SRC4392 register file.
//!
//! The chip exposes 7-bit register addresses. Address `0x7F` selects the page
//! and is reachable from every page; all other addresses resolve through the
//! low two bits of the page selector:
//!
//! | page | addresses      | region                      |
//! |------|----------------|-----------------------------|
//! | 0    | `0x01..=0x33`  | control and status          |
//! | 1    | `0x00..=0x2F`  | receiver channel status     |
//! | 1    | `0x40..=0x6F`  | receiver user data          |
//! | 2    | `0x00..=0x2F`  | transmitter channel status  |
//! | 2    | `0x40..=0x6F`  | transmitter user data       |
//!
//! Page 3 and every gap is unmapped.

/// Meta address of the page selector.
pub const PAGE_SELECT: u8 = 0x7F;

/// Number of pages with backing registers.
pub const PAGES: usize = 3;

/// Bytes of backing storage for all regions.
pub const SHADOW_SIZE: usize = Region::TxUserData.base() + Region::TxUserData.len();

const CONTROL_LEN: usize = 0x33;
const BUFFER_LEN: usize = 0x30;

/// A contiguous block of registers within one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Region {
    /// Page 0: control and status registers.
    Control,
    /// Page 1: received channel status buffer.
    RxChannelStatus,
    /// Page 1: received user data buffer.
    RxUserData,
    /// Page 2: channel status buffer to transmit.
    TxChannelStatus,
    /// Page 2: user data buffer to transmit.
    TxUserData,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Control,
        Region::RxChannelStatus,
        Region::RxUserData,
        Region::TxChannelStatus,
        Region::TxUserData,
    ];

    /// Regions backing `page` (already reduced to 0..=3).
    pub const fn of_page(page: u8) -> &'static [Region] {
        match page {
            0 => &[Region::Control],
            1 => &[Region::RxChannelStatus, Region::RxUserData],
            2 => &[Region::TxChannelStatus, Region::TxUserData],
            _ => &[],
        }
    }

    /// Position in [`Region::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn page(self) -> u8 {
        match self {
            Region::Control => 0,
            Region::RxChannelStatus | Region::RxUserData => 1,
            Region::TxChannelStatus | Region::TxUserData => 2,
        }
    }

    /// Chip address of the first register.
    pub const fn first(self) -> u8 {
        match self {
            Region::Control => 0x01,
            Region::RxChannelStatus | Region::TxChannelStatus => 0x00,
            Region::RxUserData | Region::TxUserData => 0x40,
        }
    }

    pub const fn len(self) -> usize {
        match self {
            Region::Control => CONTROL_LEN,
            _ => BUFFER_LEN,
        }
    }

    /// Offset of the region within the shadow's backing bytes.
    pub(crate) const fn base(self) -> usize {
        match self {
            Region::Control => 0,
            Region::RxChannelStatus => CONTROL_LEN,
            Region::RxUserData => CONTROL_LEN + BUFFER_LEN,
            Region::TxChannelStatus => CONTROL_LEN + 2 * BUFFER_LEN,
            Region::TxUserData => CONTROL_LEN + 3 * BUFFER_LEN,
        }
    }

    pub const fn contains(self, address: u8) -> bool {
        let first = self.first() as usize;
        let address = address as usize;
        address >= first && address < first + self.len()
    }
}

/// Where a (page, address) pair lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    /// The page selector meta register.
    PageSelect,
    /// A backed register.
    Register {
        page: u8,
        region: Region,
        offset: usize,
    },
}

/// Resolves `address` against the page chosen by `selector`.
pub fn resolve(selector: u8, address: u8) -> Option<Slot> {
    if address == PAGE_SELECT {
        return Some(Slot::PageSelect);
    }
    let page = selector & 0x03;
    Region::of_page(page)
        .iter()
        .find(|region| region.contains(address))
        .map(|&region| Slot::Register {
            page,
            region,
            offset: (address - region.first()) as usize,
        })
}
