//! Instruments and their runtime playback.
//!
//! - [`sequence`]: sequence data (items, loop/release points, modes)
//! - [`handler`]: per-channel instrument handlers, including the sequence engine
//!
//! Instruments are immutable once built and shared through `Arc`; the
//! [`InstrumentManager`] resolves the pattern's instrument column to them.

pub mod handler;
pub mod sequence;

use std::fmt;
use std::sync::Arc;

use crate::{EngineError, Result};

pub use handler::{InstrumentHandler, SeqInstHandler, SeqPlayState};
pub use sequence::{
    ArpeggioMode, PitchMode, Sequence, SequenceKind, SequenceSetting, SEQUENCE_KIND_COUNT,
};

/// Number of instrument slots; also the "no instrument" sentinel in raw data
pub const MAX_INSTRUMENTS: usize = 64;

/// Instrument family, named after the chip it was designed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstrumentType {
    /// No instrument loaded
    #[default]
    None,
    /// 2A03 sequence instrument
    Apu2A03,
    /// VRC6 sequence instrument
    Vrc6,
    /// VRC7 FM patch instrument
    Vrc7,
    /// FDS wavetable instrument
    Fds,
    /// Namco 163 wavetable instrument
    N163,
    /// Sunsoft 5B sequence instrument
    S5b,
}

impl InstrumentType {
    /// True for families whose envelopes are driven by volume/arpeggio/pitch/hi-pitch/duty sequences
    pub fn is_sequence_driven(self) -> bool {
        matches!(
            self,
            InstrumentType::Apu2A03
                | InstrumentType::Vrc6
                | InstrumentType::Fds
                | InstrumentType::N163
                | InstrumentType::S5b
        )
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentType::None => "none",
            InstrumentType::Apu2A03 => "2A03",
            InstrumentType::Vrc6 => "VRC6",
            InstrumentType::Vrc7 => "VRC7",
            InstrumentType::Fds => "FDS",
            InstrumentType::N163 => "N163",
            InstrumentType::S5b => "5B",
        };
        f.write_str(name)
    }
}

/// An instrument: type tag plus one optional sequence per kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    name: String,
    inst_type: InstrumentType,
    sequences: [Option<Arc<Sequence>>; SEQUENCE_KIND_COUNT],
}

impl Instrument {
    /// Create an instrument with every sequence disabled
    pub fn new(name: impl Into<String>, inst_type: InstrumentType) -> Self {
        Self {
            name: name.into(),
            inst_type,
            sequences: Default::default(),
        }
    }

    /// Enable a sequence; it occupies the slot of its own kind
    pub fn with_sequence(mut self, sequence: impl Into<Arc<Sequence>>) -> Self {
        let sequence = sequence.into();
        let slot = sequence.kind().index();
        self.sequences[slot] = Some(sequence);
        self
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instrument family
    pub fn inst_type(&self) -> InstrumentType {
        self.inst_type
    }

    /// Enabled sequence of `kind`
    pub fn sequence(&self, kind: SequenceKind) -> Option<&Arc<Sequence>> {
        self.sequences[kind.index()].as_ref()
    }
}

/// Resolves instrument indices from the pattern
pub trait InstrumentSource {
    /// Instrument in slot `index`, if any
    fn instrument(&self, index: u8) -> Option<Arc<Instrument>>;
}

/// Fixed bank of [`MAX_INSTRUMENTS`] instrument slots
#[derive(Debug, Clone)]
pub struct InstrumentManager {
    slots: Vec<Option<Arc<Instrument>>>,
}

impl Default for InstrumentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentManager {
    /// Create an empty bank
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_INSTRUMENTS],
        }
    }

    /// Store an instrument, replacing whatever the slot held
    pub fn insert(&mut self, index: u8, instrument: impl Into<Arc<Instrument>>) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(EngineError::InstrumentIndex {
                index,
                max: MAX_INSTRUMENTS,
            })?;
        *slot = Some(instrument.into());
        Ok(())
    }

    /// Clear a slot, returning its instrument
    pub fn remove(&mut self, index: u8) -> Option<Arc<Instrument>> {
        self.slots.get_mut(index as usize).and_then(Option::take)
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True when no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InstrumentSource for InstrumentManager {
    fn instrument(&self, index: u8) -> Option<Arc<Instrument>> {
        self.slots.get(index as usize).cloned().flatten()
    }
}
