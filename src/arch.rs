//! Cortex-M glue: NVIC-backed [`VectorControl`] and the run loop idle.

#![allow(unsafe_code)]

use cortex_m::{
    interrupt::InterruptNumber,
    peripheral::{NVIC, SCB, scb::VectActive},
};

use crate::vector::{Vector, VectorControl};

/// Device interrupt number as the NVIC sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Irq(pub u16);

// SAFETY: `number` returns the value the caller constructed the `Irq` with;
// `Nvic` only builds it from a `Vector`, which is a device interrupt number.
unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self.0
    }
}

/// [`VectorControl`] over the core's NVIC.
#[derive(Debug, Default, Clone, Copy)]
pub struct Nvic;

impl VectorControl for Nvic {
    fn enable(&self, vector: Vector) {
        // SAFETY: vectors are unmasked only once their first source is
        // registered, so the handler finds a non-empty ring.
        unsafe { NVIC::unmask(Irq(vector.number().into())) }
    }

    fn disable(&self, vector: Vector) {
        NVIC::mask(Irq(vector.number().into()));
    }

    fn active(&self) -> Option<Vector> {
        match SCB::vect_active() {
            VectActive::Interrupt { irqn } => u8::try_from(irqn).ok().map(Vector::new),
            _ => None,
        }
    }
}

/// Sleeps until the next event; the `wait` argument of the run loop.
#[inline]
pub fn wait_for_event() {
    cortex_m::asm::wfe();
}
