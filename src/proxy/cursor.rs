/// Register cursor of a host transaction.
///
/// Bits 0..=6 are the register address. Bit 7 requests auto-increment: after
/// each data byte the address moves to the next register, wrapping within the
/// low seven bits, and the flag is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cursor(u8);

impl Cursor {
    const AUTO_INCREMENT: u8 = 0x80;
    const ADDRESS: u8 = 0x7F;

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn address(self) -> u8 {
        self.0 & Self::ADDRESS
    }

    #[inline]
    pub const fn auto_increment(self) -> bool {
        self.0 & Self::AUTO_INCREMENT != 0
    }

    /// Cursor for the byte after this one.
    pub const fn advance(self) -> Self {
        if self.auto_increment() {
            Self((self.0.wrapping_add(1) & Self::ADDRESS) | Self::AUTO_INCREMENT)
        } else {
            self
        }
    }
}
