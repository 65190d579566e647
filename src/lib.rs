//! Tracker Channel Playback Engine
//!
//! The per-channel half of a chiptune tracker: it turns pattern rows and
//! instrument sequences into per-tick chip register writes for the Ricoh
//! 2A03 pulse channels and the Sunsoft 5B (a YM2149 clone).
//!
//! # Features
//! - Sequence engine for volume, arpeggio, pitch, hi-pitch and duty envelopes
//!   with loop and release points
//! - Channel state machine with the full tracker effect set: portamento,
//!   slides, arpeggio, vibrato, tremolo, volume slides, note delay, note cut,
//!   note release, delayed volume, delayed transpose and the echo buffer
//! - Chip specialization protocol; Sunsoft 5B channels share one envelope
//!   and one noise generator
//! - Linear pitch mode, pitch wheel and two vibrato styles
//!
//! # Layers
//! - [`instrument`]: sequences, instruments and the sequence engine
//! - [`channel`]: the channel state machine
//! - [`chips`]: chip-specific behaviour and register emission
//! - [`engine`]: a driver owning every chip plus the instrument bank
//! - [`registers`]: register write sinks
//!
//! # Quick start
//! ```
//! use chiptrack::instrument::{Instrument, InstrumentType, Sequence, SequenceKind};
//! use chiptrack::pattern::{Note, PatternNote};
//! use chiptrack::registers::S5bRegisterFile;
//! use chiptrack::{ChannelId, SoundChip, TrackerEngine};
//!
//! let mut engine = TrackerEngine::new();
//! let fade = Sequence::new(SequenceKind::Volume, vec![15, 12, 9, 6]);
//! engine
//!     .instruments_mut()
//!     .insert(0, Instrument::new("fade", InstrumentType::S5b).with_sequence(fade))
//!     .unwrap();
//!
//! let mut chip = S5bRegisterFile::new();
//! let channel = ChannelId::new(SoundChip::S5b, 0);
//! engine
//!     .play_note(channel, PatternNote::with_instrument(Note::On(57), 0))
//!     .unwrap();
//! engine.tick(&mut chip);
//! assert_eq!(chip.tone_period(0), 254);
//! assert_eq!(chip.volume(0), 15);
//! ```

#![warn(missing_docs)]

pub mod channel; // Channel State Machine
pub mod chips; // Chip Specializations
pub mod engine; // Multi-chip Driver
pub mod error;
pub mod instrument; // Sequences & Sequence Engine
pub mod pattern; // Pattern Events
pub mod registers; // Register Sinks
pub mod settings;
pub mod tables; // Note & Vibrato Tables

pub use error::{EngineError, Result};

// Public API exports
pub use channel::{Channel, ChannelCore, ChannelInterface, ChannelState, EchoBuffer};
pub use chips::{ApuPulse, ChannelId, ChipChannel, ChipHandler, S5bChannel, S5bShared, SoundChip};
pub use engine::TrackerEngine;
pub use instrument::{Instrument, InstrumentManager, InstrumentType, Sequence, SequenceKind};
pub use pattern::{EffectCommand, EffectType, Note, PatternNote};
pub use registers::{RegisterLog, RegisterWriter, S5bRegisterFile};
pub use settings::{PlaybackSettings, VibratoStyle};
