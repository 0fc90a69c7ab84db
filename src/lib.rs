//! Interrupt-driven register proxy for an AES42 HAT.
//!
//! The HAT carries four SRC4392 sample rate converters. The host talks to them
//! over I2C as if each chip sat on the bus itself; in reality the
//! microcontroller answers from a shadow of each chip's paged register file and
//! keeps the real chips in sync over SPI.
//!
//! # Features
//!
//! - **Zero heap allocation** - all tables are fixed size
//! - **Non-blocking interrupts** - handlers touch the shadows and post work
//! - **Per-byte dirty tracking** - only what the host wrote goes to the chip
//! - **Status read-back** - block interrupts pull chip status into the shadows
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────────────┐
//! │  Host (I2C ISR)  │         │  Run loop (deferred)     │
//! │                  │         │                          │
//! │  put_rx_byte()   │────────▶│  push_dirty()            │
//! │  (marks dirty)   │  dirty  │  (SPI writes)            │
//! │                  │  bits   │                          │
//! │  get_tx_byte()   │◀────────│  pull_status()           │
//! │                  │  status │  (SPI reads, never dirty)│
//! └──────────────────┘         └──────────────────────────┘
//! ```
//!
//! - **Host writes** mark bytes dirty and queue the channel's sync work
//! - **Block interrupts** disarm their line, latch the phase, and queue work
//! - **Deferred work** pushes dirty pages, pulls status, and re-arms the line
//!
//! # Example
//!
//! ```rust,ignore
//! use aes42_hat::prelude::*;
//!
//! let hat: &'static Hat<_, _, _, _> = HAT.init(Hat::new(
//!     HatConfig::new(),
//!     Nvic,
//!     timer,
//!     pins,
//!     i2c_target,
//! ));
//! hat.start()?;
//!
//! // every registered vector points here
//! #[interrupt]
//! fn PIN_INT0() {
//!     HAT.get().on_interrupt();
//! }
//!
//! let mut buses = spi_devices.map(SpiControlBus::new);
//! hat.run(&mut buses, wait_for_event);
//! ```

#![deny(unsafe_code)]
#![no_std]

#[macro_use]
mod fmt;

pub mod bus;
pub mod clock;
pub mod config;
pub mod deferred;
pub mod error;
pub mod hat;
pub mod proxy;
pub mod shadow;
pub mod target;
pub mod vector;

#[cfg(feature = "cortex-m")]
pub mod arch;

#[cfg(test)]
mod test_support;

pub mod prelude {
    pub use crate::{
        bus::{ControlBus, Direction, SpiControlBus},
        clock::{CaptureTimer, ChannelGroup, PinInterrupts, PinMode},
        config::{CHANNELS, HatConfig, LineConfig, Source, Work},
        deferred::{DeferredQueue, Schedule, WorkId},
        error::{BusError, DispatchError},
        hat::Hat,
        proxy::{ChannelProxy, Cursor, Phase, StatusChanges},
        shadow::{KernelView, Region, RegisterShadow},
        target::{TargetEvent, TargetPort, TargetReply, TargetRouter},
        vector::{Dispatcher, SourceId, Vector, VectorControl},
    };

    #[cfg(feature = "cortex-m")]
    pub use crate::arch::{Nvic, wait_for_event};
}
