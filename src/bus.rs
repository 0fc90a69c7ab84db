//! Control bus used to reach the real chip.
//!
//! The proxy only needs "move N bytes to or from register address A". The
//! SRC4392 SPI framing lives in [`SpiControlBus`]; anything else (a DMA driven
//! port, a test double) can implement [`ControlBus`] directly.

use embedded_hal::spi::{Error as _, ErrorKind, Operation, SpiDevice};

use crate::error::BusError;

/// Direction of a transfer, seen from the bus controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Write,
    Read,
}

impl Direction {
    /// Decodes the R/W bit of an I2C address byte (1 = read).
    #[inline]
    pub const fn from_rw_bit(address_byte: u8) -> Self {
        if address_byte & 1 == 0 {
            Direction::Write
        } else {
            Direction::Read
        }
    }
}

/// Block transfers to one chip.
pub trait ControlBus {
    /// Writes `buf` to, or fills `buf` from, consecutive registers starting at
    /// `address`. Returns the number of bytes moved.
    ///
    /// An asynchronous implementation that cannot finish right away reports
    /// [`BusError::Busy`]; the caller retries on its next pass. Its completion
    /// interrupt should call [`Hat::on_transfer_complete`](crate::hat::Hat::on_transfer_complete)
    /// so the retry does not wait for the next block.
    fn transfer(
        &mut self,
        direction: Direction,
        address: u8,
        buf: &mut [u8],
    ) -> Result<usize, BusError>;
}

impl<T: ControlBus + ?Sized> ControlBus for &mut T {
    fn transfer(
        &mut self,
        direction: Direction,
        address: u8,
        buf: &mut [u8],
    ) -> Result<usize, BusError> {
        T::transfer(self, direction, address, buf)
    }
}

/// Read flag in the first byte of an SRC4392 SPI frame.
const READ_FLAG: u8 = 0x80;

/// [`ControlBus`] over an `embedded-hal` SPI device wired to one SRC4392.
///
/// Each frame is `[address | R, 0x00, data...]`: the register address with bit 7
/// set for reads, one don't-care byte, then the data with the chip
/// auto-incrementing the address.
#[derive(Debug)]
pub struct SpiControlBus<D> {
    device: D,
}

impl<D: SpiDevice> SpiControlBus<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub fn release(self) -> D {
        self.device
    }
}

impl<D: SpiDevice> ControlBus for SpiControlBus<D> {
    fn transfer(
        &mut self,
        direction: Direction,
        address: u8,
        buf: &mut [u8],
    ) -> Result<usize, BusError> {
        let address = address & !READ_FLAG;
        let result = match direction {
            Direction::Write => self.device.transaction(&mut [
                Operation::Write(&[address, 0x00]),
                Operation::Write(&*buf),
            ]),
            Direction::Read => self.device.transaction(&mut [
                Operation::Write(&[address | READ_FLAG, 0x00]),
                Operation::Read(&mut *buf),
            ]),
        };
        result.map_err(|err| map_spi_error(err.kind()))?;
        Ok(buf.len())
    }
}

fn map_spi_error(kind: ErrorKind) -> BusError {
    match kind {
        ErrorKind::ChipSelectFault => BusError::Nack,
        _ => BusError::Transfer,
    }
}
