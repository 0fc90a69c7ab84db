use crate::vector::{SourceId, Vector};

/// Errors reported by a [`ControlBus`](crate::bus::ControlBus) transfer.
///
/// None of these are fatal: reconciliation logs them and retries on the next
/// scheduled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The device did not acknowledge.
    Nack,
    /// The transfer did not complete in time.
    Timeout,
    /// An asynchronous transfer is still in flight.
    Busy,
    /// The underlying peripheral reported an error.
    Transfer,
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::Nack => write!(f, "device did not acknowledge"),
            BusError::Timeout => write!(f, "transfer timed out"),
            BusError::Busy => write!(f, "previous transfer still in flight"),
            BusError::Transfer => write!(f, "peripheral transfer error"),
        }
    }
}

/// Errors raised while registering or dispatching interrupt sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchError {
    /// A vector fired with no source registered on it.
    Unhandled(Vector),
    /// Vector number exceeds the dispatch table.
    NoSuchVector(Vector),
    /// Source id exceeds the source table.
    NoSuchSource(SourceId),
    /// The source already sits on a vector ring.
    AlreadyRegistered(SourceId),
}

impl core::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DispatchError::Unhandled(v) => write!(f, "vector {} fired with no source", v.number()),
            DispatchError::NoSuchVector(v) => write!(f, "vector {} out of range", v.number()),
            DispatchError::NoSuchSource(s) => write!(f, "source {} out of range", s.index()),
            DispatchError::AlreadyRegistered(s) => {
                write!(f, "source {} already registered", s.index())
            }
        }
    }
}
