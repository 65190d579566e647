//! Chip specialization protocol.
//!
//! A sound chip plugs into the channel state machine by implementing
//! [`ChipChannel`] for its channel type. The trait's hooks default to the
//! behaviour shared by every chip, so an implementation only overrides what
//! its hardware does differently: extra effect commands, duty translation,
//! volume law and register emission.
//!
//! Resources shared by all channels of one chip (the Sunsoft 5B envelope and
//! noise generators) live in [`ChipChannel::Shared`], owned by the
//! [`ChipHandler`] and lent to each channel for the duration of a call.
//!
//! Available chips:
//! - [`s5b`]: Sunsoft 5B, three channels, shared envelope and noise
//! - [`apu`]: 2A03 pulse channels

pub mod apu;
pub mod s5b;

use std::fmt;

use crate::channel::{Channel, ChannelCore, ChannelState};
use crate::instrument::{InstrumentHandler, InstrumentSource, InstrumentType};
use crate::pattern::{EffectCommand, PatternNote};
use crate::registers::RegisterWriter;
use crate::settings::PlaybackSettings;

pub use apu::ApuPulse;
pub use s5b::{S5bChannel, S5bMode, S5bShared};

/// Sound chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoundChip {
    /// Ricoh 2A03 internal APU
    Apu,
    /// Sunsoft 5B (YM2149 compatible)
    S5b,
}

impl fmt::Display for SoundChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundChip::Apu => f.write_str("2A03"),
            SoundChip::S5b => f.write_str("5B"),
        }
    }
}

/// Chip plus channel sub-index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    /// Owning chip
    pub chip: SoundChip,
    /// Channel index within the chip, from 0
    pub index: u8,
}

impl ChannelId {
    /// Create an identifier
    pub const fn new(chip: SoundChip, index: u8) -> Self {
        Self { chip, index }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} channel {}", self.chip, self.index + 1)
    }
}

/// Outcome of asking a chip for an instrument handler
#[derive(Debug)]
pub enum InstHandlerRequest {
    /// The current handler can already play the instrument
    Keep,
    /// Replace the handler
    Create(Box<dyn InstrumentHandler>),
    /// The chip cannot play this instrument family
    Unsupported,
}

/// Hardware state shared by every channel of one chip
pub trait ChipShared: fmt::Debug + Default {
    /// Return to power-on state
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Emit chip-wide registers after every channel has refreshed
    fn refresh_after(&mut self, _writer: &mut dyn RegisterWriter) {}
}

impl ChipShared for () {}

/// Chip-specific behaviour of one channel
///
/// Hooks receive the channel's [`ChannelCore`] and the chip's shared state;
/// the base behaviour runs around them as documented on each hook.
pub trait ChipChannel: fmt::Debug {
    /// Chip-wide state shared between this chip's channels
    type Shared: ChipShared;

    /// Chip family
    const CHIP: SoundChip;
    /// Highest raw period
    const MAX_PERIOD: i32;
    /// Highest volume
    const MAX_VOLUME: i32;
    /// Period grows with pitch
    const INVERTED: bool = false;
    /// Duty selected by a reset
    const DEFAULT_DUTY: i32 = 0;

    /// Chip-specific effects; tried before the shared effect table
    fn handle_effect(
        &mut self,
        _core: &mut ChannelCore,
        _shared: &mut Self::Shared,
        _cmd: EffectCommand,
    ) -> bool {
        false
    }

    /// Called after a pitched note has been started
    fn handle_note(&mut self, _core: &mut ChannelCore, _shared: &mut Self::Shared) {}

    /// Called for rows without a note
    fn handle_empty_note(&mut self, _core: &mut ChannelCore, _shared: &mut Self::Shared) {}

    /// Called after the note has been cut
    fn handle_cut(&mut self, _core: &mut ChannelCore, _shared: &mut Self::Shared) {}

    /// Called after the shared state has been reset
    fn reset(&mut self, _core: &mut ChannelCore) {}

    /// Decide how to play an instrument of family `requested` while the
    /// channel currently holds one of family `current`
    fn create_inst_handler(
        &self,
        current: InstrumentType,
        requested: InstrumentType,
    ) -> InstHandlerRequest;

    /// Translate a duty value written by an instrument of `inst_type`
    fn convert_duty(&self, _inst_type: InstrumentType, duty: i32) -> i32 {
        duty
    }

    /// Noise period requested by an instrument
    fn set_noise_period(&mut self, _shared: &mut Self::Shared, _period: i32) {}

    /// Output volume for this tick
    fn calculate_volume(&self, core: &ChannelCore) -> i32 {
        core.calculate_volume()
    }

    /// Emit this channel's registers for the tick
    fn refresh_channel(
        &mut self,
        core: &ChannelCore,
        shared: &mut Self::Shared,
        writer: &mut dyn RegisterWriter,
    );

    /// Silence this channel's registers
    fn clear_registers(&mut self, core: &ChannelCore, writer: &mut dyn RegisterWriter);
}

/// All channels of one chip plus their shared hardware state
#[derive(Debug)]
pub struct ChipHandler<C: ChipChannel> {
    channels: Vec<Channel<C>>,
    shared: C::Shared,
}

impl<C: ChipChannel> ChipHandler<C> {
    /// Build a handler around ready-made channels
    pub fn new(channels: Vec<Channel<C>>) -> Self {
        Self {
            channels,
            shared: C::Shared::default(),
        }
    }

    /// Chip family
    pub fn chip(&self) -> SoundChip {
        C::CHIP
    }

    /// Channel `index`
    pub fn channel(&self, index: u8) -> Option<&Channel<C>> {
        self.channels.get(index as usize)
    }

    /// Channel `index`, mutably
    pub fn channel_mut(&mut self, index: u8) -> Option<&mut Channel<C>> {
        self.channels.get_mut(index as usize)
    }

    /// Every channel
    pub fn channels(&self) -> &[Channel<C>] {
        &self.channels
    }

    /// Chip-wide state
    pub fn shared(&self) -> &C::Shared {
        &self.shared
    }

    /// Reset every channel and the shared state, clearing registers
    pub fn reset(&mut self, writer: &mut dyn RegisterWriter) {
        self.shared.reset();
        for channel in &mut self.channels {
            channel.reset(writer);
        }
    }

    /// Push settings to every channel
    pub fn configure(&mut self, settings: PlaybackSettings) {
        for channel in &mut self.channels {
            channel.configure(settings);
        }
    }

    /// Feed a pattern row to channel `index`; false when no such channel exists
    pub fn play_note(
        &mut self,
        index: u8,
        note: PatternNote,
        instruments: &dyn InstrumentSource,
    ) -> bool {
        match self.channels.get_mut(index as usize) {
            Some(channel) => {
                channel.play_note(note, &mut self.shared, instruments);
                true
            }
            None => false,
        }
    }

    /// Rebuild channel `index` from a snapshot; false when no such channel exists
    pub fn apply_channel_state(
        &mut self,
        index: u8,
        state: &ChannelState,
        instruments: &dyn InstrumentSource,
    ) -> bool {
        match self.channels.get_mut(index as usize) {
            Some(channel) => {
                channel.apply_channel_state(state, &mut self.shared, instruments);
                true
            }
            None => false,
        }
    }

    /// Per-tick update of every channel
    pub fn process(&mut self, instruments: &dyn InstrumentSource) {
        for channel in &mut self.channels {
            channel.process_channel(&mut self.shared, instruments);
        }
    }

    /// Emit registers for every channel, then the chip-wide registers
    pub fn refresh(&mut self, writer: &mut dyn RegisterWriter) {
        for channel in &mut self.channels {
            channel.refresh(&mut self.shared, writer);
        }
        self.shared.refresh_after(writer);
        for channel in &mut self.channels {
            channel.finish_tick();
        }
    }
}
