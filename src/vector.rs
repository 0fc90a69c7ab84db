//! Shared-vector interrupt dispatch.
//!
//! Several logical interrupt sources may share one hardware vector. Each vector
//! owns a ring of [`SourceId`]s with the vector head acting as sentinel:
//!
//! ```text
//!   head[v] ──▶ first ──▶ second ──▶ … ──▶ last ──▶ (head[v])
//! ```
//!
//! Rings only ever grow, and only from thread mode. Appending writes the new
//! node's link first and then publishes it with a single store, so an interrupt
//! walking the ring mid-insert sees the ring either with or without the new
//! source, never half-linked. Only plain atomic loads and stores are used, which
//! ARMv6-M supports.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::error::DispatchError;

/// Marks the end of a ring (the link back to the sentinel head).
const END: u8 = u8::MAX;
/// Link value of a source that is not on any ring.
const UNLINKED: u8 = u8::MAX - 1;

/// A hardware interrupt vector (IRQ number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector(u8);

impl Vector {
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    #[inline]
    pub const fn number(self) -> u8 {
        self.0
    }
}

/// One logical interrupt source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SourceId(u8);

impl SourceId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Hardware side of the interrupt controller.
pub trait VectorControl {
    /// Unmasks `vector`.
    fn enable(&self, vector: Vector);
    /// Masks `vector`.
    fn disable(&self, vector: Vector);
    /// The vector currently being serviced, read from processor state.
    fn active(&self) -> Option<Vector>;
}

/// Multiplexes `S` sources onto `V` hardware vectors.
pub struct Dispatcher<const V: usize, const S: usize, C> {
    heads: [AtomicU8; V],
    tails: [AtomicU8; V],
    links: [AtomicU8; S],
    control: C,
}

impl<const V: usize, const S: usize, C: VectorControl> Dispatcher<V, S, C> {
    pub const fn new(control: C) -> Self {
        assert!(V <= 256, "vectors are numbered by u8");
        assert!(S < UNLINKED as usize, "sources are indexed by u8");

        Self {
            heads: [const { AtomicU8::new(END) }; V],
            tails: [const { AtomicU8::new(END) }; V],
            links: [const { AtomicU8::new(UNLINKED) }; S],
            control,
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Appends `source` to the ring of `vector`.
    ///
    /// Thread mode only: interrupts never modify rings, so the tail needs no
    /// protection, but `vector` itself may fire at any point during the call.
    /// Registering the first source unmasks the vector as the last step.
    pub fn register(&self, vector: Vector, source: SourceId) -> Result<(), DispatchError> {
        let v = vector.number() as usize;
        let head = self.heads.get(v).ok_or(DispatchError::NoSuchVector(vector))?;
        let tail = &self.tails[v];
        let link = self
            .links
            .get(source.index())
            .ok_or(DispatchError::NoSuchSource(source))?;

        if link.load(Ordering::Acquire) != UNLINKED {
            return Err(DispatchError::AlreadyRegistered(source));
        }

        // New node is complete before anything can reach it.
        link.store(END, Ordering::Relaxed);

        let last = tail.load(Ordering::Relaxed);
        let first = last == END;
        if first {
            head.store(source.0, Ordering::Release);
        } else {
            self.links[last as usize].store(source.0, Ordering::Release);
        }
        tail.store(source.0, Ordering::Relaxed);

        debug!(
            "vector {=u8}: registered source {=u8}",
            vector.number(),
            source.0
        );

        if first {
            self.control.enable(vector);
        }
        Ok(())
    }

    pub fn enable(&self, vector: Vector) {
        self.control.enable(vector);
    }

    pub fn disable(&self, vector: Vector) {
        self.control.disable(vector);
    }

    /// Number of sources registered on `vector`.
    pub fn sources(&self, vector: Vector) -> usize {
        let mut count = 0;
        let _ = self.walk(vector, |_| count += 1);
        count
    }

    /// Calls `isr` for every source on `vector`, in registration order.
    ///
    /// Returns the number of sources called, or
    /// [`DispatchError::Unhandled`] if the ring is empty.
    pub fn dispatch(
        &self,
        vector: Vector,
        isr: impl FnMut(SourceId),
    ) -> Result<usize, DispatchError> {
        match self.walk(vector, isr)? {
            0 => Err(DispatchError::Unhandled(vector)),
            n => Ok(n),
        }
    }

    /// Entry point for the hardware vector table.
    ///
    /// Reads the active vector from processor state and dispatches it. A vector
    /// without sources means the vector table and the registrations disagree;
    /// continuing would silently drop interrupts, so this is fatal.
    pub fn trampoline(&self, isr: impl FnMut(SourceId)) {
        let Some(vector) = self.control.active() else {
            error!("trampoline entered outside an interrupt");
            panic!("trampoline entered outside an interrupt");
        };
        if let Err(err) = self.dispatch(vector, isr) {
            error!("fatal interrupt configuration: {}", err);
            panic!("fatal interrupt configuration: {}", err);
        }
    }

    fn walk(&self, vector: Vector, mut isr: impl FnMut(SourceId)) -> Result<usize, DispatchError> {
        let head = self
            .heads
            .get(vector.number() as usize)
            .ok_or(DispatchError::NoSuchVector(vector))?;

        let mut count = 0;
        let mut cursor = head.load(Ordering::Acquire);
        while let Some(link) = self.links.get(cursor as usize) {
            isr(SourceId(cursor));
            count += 1;
            cursor = link.load(Ordering::Acquire);
        }
        Ok(count)
    }
}

impl<const V: usize, const S: usize, C> core::fmt::Debug for Dispatcher<V, S, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("vectors", &V)
            .field("sources", &S)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockVectors;

    type TestDispatcher = Dispatcher<8, 6, MockVectors>;

    fn dispatched(d: &TestDispatcher, vector: Vector) -> heapless::Vec<u8, 8> {
        let mut out = heapless::Vec::new();
        d.dispatch(vector, |s| out.push(s.0).unwrap()).unwrap();
        out
    }

    #[test]
    fn empty_vector_is_unhandled() {
        let d = TestDispatcher::new(MockVectors::default());
        let v = Vector::new(3);
        assert_eq!(d.dispatch(v, |_| {}), Err(DispatchError::Unhandled(v)));
        assert!(!d.control().is_enabled(v));
    }

    #[test]
    fn first_registration_enables_vector() {
        let d = TestDispatcher::new(MockVectors::default());
        let v = Vector::new(2);
        d.register(v, SourceId::new(4)).unwrap();
        assert!(d.control().is_enabled(v));
        assert_eq!(d.control().enable_calls(), 1);

        // Later registrations leave the mask alone.
        d.register(v, SourceId::new(1)).unwrap();
        assert_eq!(d.control().enable_calls(), 1);
    }

    #[test]
    fn sources_run_in_registration_order() {
        let d = TestDispatcher::new(MockVectors::default());
        let v = Vector::new(5);
        d.register(v, SourceId::new(3)).unwrap();
        d.register(v, SourceId::new(0)).unwrap();
        d.register(v, SourceId::new(5)).unwrap();

        assert_eq!(dispatched(&d, v).as_slice(), &[3, 0, 5]);
        // Same order on every firing.
        assert_eq!(dispatched(&d, v).as_slice(), &[3, 0, 5]);
        assert_eq!(d.sources(v), 3);
    }

    #[test]
    fn vectors_keep_separate_rings() {
        let d = TestDispatcher::new(MockVectors::default());
        d.register(Vector::new(0), SourceId::new(0)).unwrap();
        d.register(Vector::new(1), SourceId::new(1)).unwrap();
        d.register(Vector::new(0), SourceId::new(2)).unwrap();

        assert_eq!(dispatched(&d, Vector::new(0)).as_slice(), &[0, 2]);
        assert_eq!(dispatched(&d, Vector::new(1)).as_slice(), &[1]);
    }

    #[test]
    fn registration_errors() {
        let d = TestDispatcher::new(MockVectors::default());
        assert_eq!(
            d.register(Vector::new(8), SourceId::new(0)),
            Err(DispatchError::NoSuchVector(Vector::new(8)))
        );
        assert_eq!(
            d.register(Vector::new(0), SourceId::new(6)),
            Err(DispatchError::NoSuchSource(SourceId::new(6)))
        );

        d.register(Vector::new(0), SourceId::new(1)).unwrap();
        assert_eq!(
            d.register(Vector::new(4), SourceId::new(1)),
            Err(DispatchError::AlreadyRegistered(SourceId::new(1)))
        );
        // The failed attempt did not touch the other ring.
        assert_eq!(d.sources(Vector::new(4)), 0);
        assert!(!d.control().is_enabled(Vector::new(4)));
    }

    #[test]
    fn enable_and_disable_are_independent_of_registration() {
        let d = TestDispatcher::new(MockVectors::default());
        let v = Vector::new(6);
        d.enable(v);
        assert!(d.control().is_enabled(v));
        d.disable(v);
        assert!(!d.control().is_enabled(v));
        assert_eq!(d.sources(v), 0);
    }

    #[test]
    fn trampoline_dispatches_active_vector() {
        let d = TestDispatcher::new(MockVectors::default());
        d.register(Vector::new(7), SourceId::new(2)).unwrap();
        d.control().set_active(Some(Vector::new(7)));

        let mut seen = None;
        d.trampoline(|s| seen = Some(s));
        assert_eq!(seen, Some(SourceId::new(2)));
    }

    #[test]
    #[should_panic]
    fn trampoline_halts_on_unhandled_vector() {
        let d = TestDispatcher::new(MockVectors::default());
        d.control().set_active(Some(Vector::new(1)));
        d.trampoline(|_| {});
    }
}
