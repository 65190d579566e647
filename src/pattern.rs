//! Pattern-note events as delivered by the row dispatcher.
//!
//! A [`PatternNote`] is one channel's cell in a row: note, volume column,
//! instrument reference and a fixed number of effect columns.

use std::fmt;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Effect columns per cell
pub const MAX_EFFECT_COLUMNS: usize = 4;

/// Volume column upper bound (exclusive); values at or above mean "no volume"
pub const MAX_VOLUME: u8 = 0x10;

/// Semitones per octave
pub const NOTE_RANGE: u8 = 12;

/// Semantic class of a pattern note
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Note {
    /// Empty note column
    #[default]
    None,
    /// Pitched note, MIDI-like number (`octave * 12 + semitone`, 0 = C-0)
    On(u8),
    /// Note cut (`---`)
    Halt,
    /// Note release (`===`)
    Release,
    /// Replay the note `n` steps back in the echo buffer (`^n`)
    Echo(u8),
}

impl Note {
    /// Create a note from octave and semitone (0-11)
    pub const fn from_octave_semitone(octave: u8, semitone: u8) -> Self {
        Note::On(octave * NOTE_RANGE + semitone)
    }

    /// MIDI-like note number if this is a pitched note
    pub const fn midi(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n),
            _ => None,
        }
    }
}

/// Instrument column of a cell
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstrumentRef {
    /// Column empty
    #[default]
    None,
    /// Keep the current instrument and do not retrigger it
    Hold,
    /// Instrument slot
    Index(u8),
}

/// Effect kinds understood by the channel layer
///
/// The discriminants are stable and double as the raw effect codes used by
/// [`EffectCommand::from_raw`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum EffectType {
    /// Empty effect column
    #[default]
    None = 0,
    /// Song speed (row dispatcher)
    Speed = 1,
    /// Jump to frame (row dispatcher)
    Jump = 2,
    /// Skip to next frame (row dispatcher)
    Skip = 3,
    /// Halt song (row dispatcher)
    Halt = 4,
    /// Hardware volume envelope / length counter (`Exx`)
    Volume = 5,
    /// Automatic portamento toward each new note (`3xx`)
    Portamento = 6,
    /// Arpeggio (`0xy`)
    Arpeggio = 7,
    /// Vibrato (`4xy`)
    Vibrato = 8,
    /// Tremolo (`7xy`)
    Tremolo = 9,
    /// Fine pitch (`Pxx`, 0x80 = centered)
    Pitch = 10,
    /// Note delay (`Gxx`)
    Delay = 11,
    /// Continuous pitch slide up (`1xx`)
    PortaUp = 12,
    /// Continuous pitch slide down (`2xx`)
    PortaDown = 13,
    /// Duty / waveform selector (`Vxx`)
    DutyCycle = 14,
    /// Semitone slide up (`Qxy`)
    SlideUp = 15,
    /// Semitone slide down (`Rxy`)
    SlideDown = 16,
    /// Volume slide (`Axy`)
    VolumeSlide = 17,
    /// Delayed note cut (`Sxx`)
    NoteCut = 18,
    /// Delayed note release (`Lxx`)
    NoteRelease = 19,
    /// Delayed volume change (`Mxy`)
    DelayedVolume = 20,
    /// Delayed transpose (`Txy`)
    Transpose = 21,
    /// Sunsoft 5B envelope period low byte (`Jxx`)
    SunsoftEnvLo = 22,
    /// Sunsoft 5B envelope period high byte (`Ixx`)
    SunsoftEnvHi = 23,
    /// Sunsoft 5B envelope shape and auto-envelope shift (`Hxy`)
    SunsoftEnvType = 24,
    /// Sunsoft 5B noise period (`Wxx`)
    SunsoftNoise = 25,
}

impl EffectType {
    /// Tracker column letter
    pub fn letter(self) -> char {
        match self {
            EffectType::None => '-',
            EffectType::Speed => 'F',
            EffectType::Jump => 'B',
            EffectType::Skip => 'D',
            EffectType::Halt => 'C',
            EffectType::Volume => 'E',
            EffectType::Portamento => '3',
            EffectType::Arpeggio => '0',
            EffectType::Vibrato => '4',
            EffectType::Tremolo => '7',
            EffectType::Pitch => 'P',
            EffectType::Delay => 'G',
            EffectType::PortaUp => '1',
            EffectType::PortaDown => '2',
            EffectType::DutyCycle => 'V',
            EffectType::SlideUp => 'Q',
            EffectType::SlideDown => 'R',
            EffectType::VolumeSlide => 'A',
            EffectType::NoteCut => 'S',
            EffectType::NoteRelease => 'L',
            EffectType::DelayedVolume => 'M',
            EffectType::Transpose => 'T',
            EffectType::SunsoftEnvLo => 'J',
            EffectType::SunsoftEnvHi => 'I',
            EffectType::SunsoftEnvType => 'H',
            EffectType::SunsoftNoise => 'W',
        }
    }
}

/// One effect column: kind plus parameter byte
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EffectCommand {
    /// Effect kind
    pub kind: EffectType,
    /// Parameter byte
    pub param: u8,
}

impl EffectCommand {
    /// Empty effect column
    pub const NONE: EffectCommand = EffectCommand {
        kind: EffectType::None,
        param: 0,
    };

    /// Build a command
    pub const fn new(kind: EffectType, param: u8) -> Self {
        Self { kind, param }
    }

    /// Decode a raw `(code, param)` pair; unknown codes yield an empty column
    pub fn from_raw(code: u8, param: u8) -> Self {
        match EffectType::from_u8(code) {
            Some(kind) => Self { kind, param },
            None => Self::NONE,
        }
    }

    /// True for an empty column
    pub fn is_none(&self) -> bool {
        self.kind == EffectType::None
    }
}

impl fmt::Display for EffectCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02X}", self.kind.letter(), self.param)
    }
}

/// One channel's cell in a pattern row
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternNote {
    /// Note column
    pub note: Note,
    /// Volume column (0-15, [`MAX_VOLUME`] = empty)
    pub volume: u8,
    /// Instrument column
    pub instrument: InstrumentRef,
    /// Effect columns in display order
    pub effects: [EffectCommand; MAX_EFFECT_COLUMNS],
}

impl Default for PatternNote {
    fn default() -> Self {
        Self {
            note: Note::None,
            volume: MAX_VOLUME,
            instrument: InstrumentRef::None,
            effects: [EffectCommand::NONE; MAX_EFFECT_COLUMNS],
        }
    }
}

impl PatternNote {
    /// Cell holding only a note
    pub fn note(note: Note) -> Self {
        Self {
            note,
            ..Self::default()
        }
    }

    /// Cell holding a note played with an instrument
    pub fn with_instrument(note: Note, instrument: u8) -> Self {
        Self {
            note,
            instrument: InstrumentRef::Index(instrument),
            ..Self::default()
        }
    }

    /// Set the volume column
    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    /// Put `effect` in the first free effect column (ignored when all are used)
    pub fn effect(mut self, kind: EffectType, param: u8) -> Self {
        if let Some(slot) = self.effects.iter_mut().find(|e| e.is_none()) {
            *slot = EffectCommand::new(kind, param);
        }
        self
    }

    /// True when the volume column carries a value
    pub fn has_volume(&self) -> bool {
        self.volume < MAX_VOLUME
    }
}
