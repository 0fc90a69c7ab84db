//! Board configuration and the fixed work and source tables.

use crate::{
    clock::PinMode,
    deferred::WorkId,
    vector::{SourceId, Vector},
};

/// Number of SRC4392 channels on the board.
pub const CHANNELS: usize = 4;

/// Slots in the deferred work table: one sync and one receive-block item per
/// channel, plus the transmit-block item.
pub const WORK_SLOTS: usize = 2 * CHANNELS + 1;

/// Interrupt sources: the bus target, one block line per channel, and the
/// reference line.
pub const SOURCES: usize = CHANNELS + 2;

/// Deferred actions of the process context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Work {
    /// Push a channel's dirty pages to its chip.
    Sync(u8),
    /// A channel received a block: reconcile and pull receive status.
    RxBlock(u8),
    /// Reference block boundary: reconcile all channels, pull transmit status.
    TxBlock,
}

impl Work {
    pub const fn id(self) -> WorkId {
        match self {
            Work::Sync(ch) => WorkId::new(ch),
            Work::RxBlock(ch) => WorkId::new(CHANNELS as u8 + ch),
            Work::TxBlock => WorkId::new(2 * CHANNELS as u8),
        }
    }

    pub const fn from_id(id: WorkId) -> Option<Self> {
        let index = id.index();
        if index < CHANNELS {
            Some(Work::Sync(index as u8))
        } else if index < 2 * CHANNELS {
            Some(Work::RxBlock((index - CHANNELS) as u8))
        } else if index == 2 * CHANNELS {
            Some(Work::TxBlock)
        } else {
            None
        }
    }
}

/// Logical interrupt sources of the process context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    Target,
    Block(u8),
    Reference,
}

impl Source {
    pub const fn id(self) -> SourceId {
        match self {
            Source::Target => SourceId::new(0),
            Source::Block(ch) => SourceId::new(1 + ch),
            Source::Reference => SourceId::new(CHANNELS as u8 + 1),
        }
    }

    pub const fn from_id(id: SourceId) -> Option<Self> {
        match id.index() {
            0 => Some(Source::Target),
            i if i <= CHANNELS => Some(Source::Block((i - 1) as u8)),
            i if i == CHANNELS + 1 => Some(Source::Reference),
            _ => None,
        }
    }
}

/// One pin interrupt line that also triggers a timer capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineConfig {
    /// Pin interrupt line number.
    pub line: u8,
    /// Vector the line raises.
    pub vector: Vector,
    /// Capture channel latched by the same edge.
    pub capture: u8,
    pub mode: PinMode,
}

impl LineConfig {
    pub const fn new(line: u8, vector: Vector, capture: u8) -> Self {
        Self {
            line,
            vector,
            capture,
            mode: PinMode::RisingEdge,
        }
    }

    pub const fn with_mode(mut self, mode: PinMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Static configuration of the HAT.
///
/// ```
/// use aes42_hat::config::{HatConfig, LineConfig};
/// use aes42_hat::vector::Vector;
///
/// const CONFIG: HatConfig = HatConfig::new()
///     .base_address(0x60)
///     .reference(LineConfig::new(7, Vector::new(31), 5));
///
/// assert_eq!(CONFIG.address_of(1), 0x61);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HatConfig {
    /// 7-bit target address of channel 0; channel `n` answers at base + n.
    pub base_address: u8,
    /// Vector of the bus target peripheral.
    pub target_vector: Vector,
    /// Block boundary line of each channel.
    pub blocks: [LineConfig; CHANNELS],
    /// Reference clock line.
    pub reference: LineConfig,
}

impl HatConfig {
    /// The AES42 HAT board layout.
    pub const fn new() -> Self {
        Self {
            base_address: 0x70,
            target_vector: Vector::new(8),
            blocks: [
                LineConfig::new(0, Vector::new(24), 0),
                LineConfig::new(1, Vector::new(25), 1),
                LineConfig::new(2, Vector::new(26), 2),
                LineConfig::new(3, Vector::new(27), 3),
            ],
            reference: LineConfig::new(4, Vector::new(28), 4),
        }
    }

    pub const fn base_address(mut self, address: u8) -> Self {
        self.base_address = address;
        self
    }

    pub const fn target_vector(mut self, vector: Vector) -> Self {
        self.target_vector = vector;
        self
    }

    /// Replaces the block line of `channel`; other channels are ignored.
    pub const fn block(mut self, channel: usize, line: LineConfig) -> Self {
        if channel < CHANNELS {
            self.blocks[channel] = line;
        }
        self
    }

    pub const fn reference(mut self, line: LineConfig) -> Self {
        self.reference = line;
        self
    }

    /// 7-bit target address of `channel`.
    pub const fn address_of(&self, channel: u8) -> u8 {
        self.base_address.wrapping_add(channel) & 0x7F
    }
}

impl Default for HatConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_ids_are_dense_and_round_trip() {
        let mut seen = [false; WORK_SLOTS];
        for ch in 0..CHANNELS as u8 {
            for work in [Work::Sync(ch), Work::RxBlock(ch)] {
                assert_eq!(Work::from_id(work.id()), Some(work));
                seen[work.id().index()] = true;
            }
        }
        assert_eq!(Work::from_id(Work::TxBlock.id()), Some(Work::TxBlock));
        seen[Work::TxBlock.id().index()] = true;

        assert!(seen.iter().all(|&s| s));
        assert_eq!(Work::from_id(WorkId::new(WORK_SLOTS as u8)), None);
    }

    #[test]
    fn source_ids_round_trip() {
        assert_eq!(Source::from_id(Source::Target.id()), Some(Source::Target));
        assert_eq!(Source::from_id(Source::Block(3).id()), Some(Source::Block(3)));
        assert_eq!(Source::from_id(Source::Reference.id()), Some(Source::Reference));
        assert_eq!(Source::Reference.id().index(), SOURCES - 1);
        assert_eq!(Source::from_id(SourceId::new(SOURCES as u8)), None);
    }

    #[test]
    fn builder_overrides_defaults() {
        const CONFIG: HatConfig = HatConfig::new()
            .base_address(0x20)
            .target_vector(Vector::new(9))
            .block(2, LineConfig::new(6, Vector::new(30), 6).with_mode(PinMode::BothEdges))
            .block(9, LineConfig::new(0, Vector::new(0), 0));

        assert_eq!(CONFIG.address_of(3), 0x23);
        assert_eq!(CONFIG.target_vector, Vector::new(9));
        assert_eq!(CONFIG.blocks[2].line, 6);
        assert_eq!(CONFIG.blocks[2].mode, PinMode::BothEdges);
        assert_eq!(CONFIG.blocks[1], HatConfig::new().blocks[1]);
    }

    #[test]
    fn default_board_layout() {
        let config = HatConfig::default();
        assert_eq!(config.address_of(0), 0x70);
        assert_eq!(config.address_of(3), 0x73);
        assert_eq!(config.reference.capture, 4);
    }
}
