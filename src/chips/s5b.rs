//! Sunsoft 5B channels.
//!
//! The 5B is a YM2149 clone with three tone channels. Envelope and noise
//! generators are single resources shared by all three, so they live in
//! [`S5bShared`] and are written once per tick after every channel has
//! refreshed. A channel's duty value is a mode bitmask ([`S5bMode`])
//! selecting square, noise and envelope output independently.

use bitflags::bitflags;
use log::trace;

use super::{ChipChannel, ChipShared, InstHandlerRequest, SoundChip};
use crate::channel::{ChannelCore, VOL_COLUMN_SHIFT};
use crate::instrument::{InstrumentType, SeqInstHandler};
use crate::pattern::{EffectCommand, EffectType};
use crate::registers::{RegisterWriter, S5B_DATA_PORT, S5B_SELECT_PORT};

/// Number of 5B channels
pub const S5B_CHANNEL_COUNT: u8 = 3;

/// Highest tone period (12 bits)
pub const S5B_MAX_PERIOD: i32 = 0xFFF;

/// Highest channel volume
pub const S5B_MAX_VOLUME: i32 = 0x0F;

const ENVELOPE_OUTPUT: u8 = 0x10;

bitflags! {
    /// Output enables carried in a 5B channel's duty value
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct S5bMode: i32 {
        /// Volume follows the envelope generator
        const ENVELOPE = 0x20;
        /// Tone output
        const SQUARE = 0x40;
        /// Noise output
        const NOISE = 0x80;
    }
}

impl S5bMode {
    /// Mode bitmask for a `Vxx` parameter (bit 2 also enables the envelope)
    pub fn from_duty_param(param: u8) -> i32 {
        let param = param as i32;
        (param << 6) | ((param & 0x04) << 3)
    }
}

bitflags! {
    /// Mixer register (R7); a set bit mutes that generator on that channel
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MixerFlags: u8 {
        /// Channel A tone off
        const TONE_A = 0x01;
        /// Channel B tone off
        const TONE_B = 0x02;
        /// Channel C tone off
        const TONE_C = 0x04;
        /// Channel A noise off
        const NOISE_A = 0x08;
        /// Channel B noise off
        const NOISE_B = 0x10;
        /// Channel C noise off
        const NOISE_C = 0x20;
    }
}

impl MixerFlags {
    /// Decode a raw R7 value (I/O port bits are dropped)
    pub fn from_register(value: u8) -> Self {
        MixerFlags::from_bits_truncate(value)
    }

    /// Tone-disable bit of channel `channel`
    pub fn tone(channel: u8) -> Self {
        MixerFlags::from_bits_truncate(0x01 << channel)
    }

    /// Noise-disable bit of channel `channel`
    pub fn noise(channel: u8) -> Self {
        MixerFlags::from_bits_truncate(0x08 << channel)
    }

    /// Check if the tone of channel `channel` is audible
    pub fn is_tone_enabled(&self, channel: u8) -> bool {
        !self.contains(MixerFlags::tone(channel))
    }

    /// Check if the noise of channel `channel` is audible
    pub fn is_noise_enabled(&self, channel: u8) -> bool {
        !self.contains(MixerFlags::noise(channel))
    }
}

/// Envelope and noise state shared by the three 5B channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S5bShared {
    mixer: MixerFlags,
    noise_period: u8,
    default_noise_period: u8,
    envelope_period: u16,
    envelope_shape: u8,
    envelope_trigger: bool,
}

impl Default for S5bShared {
    fn default() -> Self {
        Self {
            mixer: MixerFlags::all(),
            noise_period: 0,
            default_noise_period: 0,
            envelope_period: 0,
            envelope_shape: 0,
            envelope_trigger: false,
        }
    }
}

impl S5bShared {
    /// Current mixer value
    pub fn mixer(&self) -> MixerFlags {
        self.mixer
    }

    /// Noise period for the tick
    pub fn noise_period(&self) -> u8 {
        self.noise_period
    }

    /// Set the noise period for the tick
    pub fn set_noise_period(&mut self, period: u8) {
        self.noise_period = period & 0x1F;
    }

    /// Noise period restored by new notes (`Wxx`)
    pub fn set_default_noise_period(&mut self, period: u8) {
        self.default_noise_period = period & 0x1F;
        self.noise_period = self.default_noise_period;
    }

    /// Return to the `Wxx` noise period
    pub fn restore_noise_period(&mut self) {
        self.noise_period = self.default_noise_period;
    }

    /// Envelope period (R11/R12)
    pub fn envelope_period(&self) -> u16 {
        self.envelope_period
    }

    /// Set the envelope period; the last write in a tick wins
    pub fn set_envelope_period(&mut self, period: u16) {
        self.envelope_period = period;
    }

    /// Envelope shape (R13)
    pub fn envelope_shape(&self) -> u8 {
        self.envelope_shape
    }

    /// Set the envelope shape
    pub fn set_envelope_shape(&mut self, shape: u8) {
        self.envelope_shape = shape & 0x0F;
    }

    /// Restart the envelope when the tick's registers are written
    pub fn trigger_envelope(&mut self) {
        self.envelope_trigger = true;
    }

    /// Envelope restart pending for this tick
    pub fn is_envelope_triggered(&self) -> bool {
        self.envelope_trigger
    }

    /// Record one channel's tone and noise enables
    pub fn set_channel_output(&mut self, channel: u8, square: bool, noise: bool) {
        self.mixer
            .remove(MixerFlags::tone(channel) | MixerFlags::noise(channel));
        if !square {
            self.mixer.insert(MixerFlags::tone(channel));
        }
        if !noise {
            self.mixer.insert(MixerFlags::noise(channel));
        }
    }
}

impl ChipShared for S5bShared {
    fn refresh_after(&mut self, writer: &mut dyn RegisterWriter) {
        write_register(writer, 0x06, self.noise_period ^ 0x1F);
        write_register(writer, 0x07, self.mixer.bits());
        let [lo, hi] = self.envelope_period.to_le_bytes();
        write_register(writer, 0x0B, lo);
        write_register(writer, 0x0C, hi);
        if self.envelope_trigger {
            trace!("5B envelope restart, shape {:X}", self.envelope_shape);
            write_register(writer, 0x0D, self.envelope_shape);
        }
        self.envelope_trigger = false;
    }
}

fn write_register(writer: &mut dyn RegisterWriter, register: u8, value: u8) {
    writer.write(S5B_SELECT_PORT, register);
    writer.write(S5B_DATA_PORT, value);
}

/// Chip-specific state of one 5B channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S5bChannel {
    envelope_enabled: bool,
    auto_envelope_shift: u8,
    update: bool,
}

impl S5bChannel {
    /// Create a channel with the envelope disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// `Hxy` enabled the envelope
    pub fn is_envelope_enabled(&self) -> bool {
        self.envelope_enabled
    }

    /// Octave shift between the tone period and the envelope period
    pub fn auto_envelope_shift(&self) -> u8 {
        self.auto_envelope_shift
    }

    /// Make the envelope period follow the tone period
    fn update_auto_envelope(&self, shared: &mut S5bShared, period: i32) {
        if !self.envelope_enabled || self.auto_envelope_shift == 0 {
            return;
        }
        let shift = self.auto_envelope_shift as i32;
        let mut period = period;
        if shift > 8 {
            period >>= shift - 9;
            if period & 0x01 != 0 {
                period += 1;
            }
            period >>= 1;
        } else if shift < 8 {
            period <<= 8 - shift;
        }
        shared.set_envelope_period((period & 0xFFFF) as u16);
    }
}

impl ChipChannel for S5bChannel {
    type Shared = S5bShared;

    const CHIP: SoundChip = SoundChip::S5b;
    const MAX_PERIOD: i32 = S5B_MAX_PERIOD;
    const MAX_VOLUME: i32 = S5B_MAX_VOLUME;
    const DEFAULT_DUTY: i32 = S5bMode::SQUARE.bits();

    fn handle_effect(
        &mut self,
        core: &mut ChannelCore,
        shared: &mut S5bShared,
        cmd: EffectCommand,
    ) -> bool {
        let param = cmd.param;
        match cmd.kind {
            EffectType::SunsoftNoise => shared.set_default_noise_period(param),
            EffectType::SunsoftEnvHi => {
                let period = ((param as u16) << 8) | (shared.envelope_period() & 0x00FF);
                shared.set_envelope_period(period);
            }
            EffectType::SunsoftEnvLo => {
                let period = (param as u16) | (shared.envelope_period() & 0xFF00);
                shared.set_envelope_period(period);
            }
            EffectType::SunsoftEnvType => {
                shared.set_envelope_shape(param & 0x0F);
                self.update = true;
                self.envelope_enabled = param != 0;
                self.auto_envelope_shift = param >> 4;
            }
            EffectType::DutyCycle => {
                let mode = S5bMode::from_duty_param(param);
                core.default_duty = mode;
                core.duty_period = mode;
            }
            _ => return false,
        }
        true
    }

    fn handle_note(&mut self, _core: &mut ChannelCore, shared: &mut S5bShared) {
        shared.restore_noise_period();
    }

    fn handle_cut(&mut self, core: &mut ChannelCore, _shared: &mut S5bShared) {
        core.duty_period = S5bMode::SQUARE.bits();
        core.note = -1;
    }

    fn reset(&mut self, core: &mut ChannelCore) {
        core.default_duty = S5bMode::SQUARE.bits();
        core.duty_period = S5bMode::SQUARE.bits();
        self.envelope_enabled = false;
        self.auto_envelope_shift = 0;
        self.update = false;
    }

    fn create_inst_handler(
        &self,
        current: InstrumentType,
        requested: InstrumentType,
    ) -> InstHandlerRequest {
        if !requested.is_sequence_driven() {
            return InstHandlerRequest::Unsupported;
        }
        if current.is_sequence_driven() {
            return InstHandlerRequest::Keep;
        }
        let duty = if requested == InstrumentType::S5b {
            S5bMode::SQUARE.bits()
        } else {
            0
        };
        InstHandlerRequest::Create(Box::new(SeqInstHandler::sunsoft(S5B_MAX_VOLUME, duty)))
    }

    fn convert_duty(&self, inst_type: InstrumentType, duty: i32) -> i32 {
        match inst_type {
            InstrumentType::Apu2A03 | InstrumentType::Vrc6 | InstrumentType::N163 => {
                S5bMode::SQUARE.bits()
            }
            _ => duty,
        }
    }

    fn set_noise_period(&mut self, shared: &mut S5bShared, period: i32) {
        shared.set_noise_period((period & 0x1F) as u8);
    }

    fn calculate_volume(&self, core: &ChannelCore) -> i32 {
        core.limit_volume(
            (core.channel_volume() >> VOL_COLUMN_SHIFT) + core.inst_volume() - 15 - core.tremolo(),
        )
    }

    fn refresh_channel(
        &mut self,
        core: &ChannelCore,
        shared: &mut S5bShared,
        writer: &mut dyn RegisterWriter,
    ) {
        let period = core.calculate_period();
        let volume = self.calculate_volume(core);
        let mode = S5bMode::from_bits_truncate(core.duty_period());
        let gate = core.is_active();

        let noise = gate && mode.contains(S5bMode::NOISE);
        let square = gate && mode.contains(S5bMode::SQUARE);
        let envelope = if gate && mode.contains(S5bMode::ENVELOPE) {
            ENVELOPE_OUTPUT
        } else {
            0
        };

        self.update_auto_envelope(shared, period);
        let channel = core.id().index;
        shared.set_channel_output(channel, square, noise);

        write_register(writer, channel * 2, (period & 0xFF) as u8);
        write_register(writer, channel * 2 + 1, ((period >> 8) & 0x0F) as u8);
        write_register(writer, channel + 8, volume as u8 | envelope);

        if envelope != 0 && (core.is_triggered() || self.update) {
            shared.trigger_envelope();
        }
        self.update = false;
    }

    fn clear_registers(&mut self, core: &ChannelCore, writer: &mut dyn RegisterWriter) {
        write_register(writer, 8 + core.id().index, 0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::channel::Channel;
    use crate::chips::ChipHandler;
    use crate::instrument::{Instrument, InstrumentManager, Sequence, SequenceKind};
    use crate::pattern::{Note, PatternNote};
    use crate::registers::S5bRegisterFile;
    use crate::tables::NoteTable;

    fn chip() -> ChipHandler<S5bChannel> {
        let table = Arc::new(NoteTable::sunsoft());
        let channels = (0..S5B_CHANNEL_COUNT)
            .map(|index| {
                let mut channel = Channel::new(index, S5bChannel::new());
                channel.set_note_table(Arc::clone(&table));
                channel
            })
            .collect();
        ChipHandler::new(channels)
    }

    fn bank() -> InstrumentManager {
        let mut bank = InstrumentManager::new();
        bank.insert(
            0,
            Instrument::new("5b", InstrumentType::S5b)
                .with_sequence(Sequence::new(SequenceKind::Volume, vec![15])),
        )
        .unwrap();
        bank.insert(
            1,
            Instrument::new("noise", InstrumentType::S5b)
                .with_sequence(Sequence::new(SequenceKind::Volume, vec![15]))
                .with_sequence(Sequence::new(SequenceKind::Duty, vec![(0x80u8 | 0x0A) as i8])),
        )
        .unwrap();
        bank.insert(
            2,
            Instrument::new("2a03", InstrumentType::Apu2A03)
                .with_sequence(Sequence::new(SequenceKind::Volume, vec![15]))
                .with_sequence(Sequence::new(SequenceKind::Duty, vec![2])),
        )
        .unwrap();
        bank
    }

    fn tick(chip: &mut ChipHandler<S5bChannel>, bank: &InstrumentManager, regs: &mut S5bRegisterFile) {
        chip.process(bank);
        chip.refresh(regs);
    }

    #[test]
    fn duty_param_maps_to_mode_bits() {
        assert_eq!(S5bMode::from_duty_param(1), 0x40);
        assert_eq!(S5bMode::from_duty_param(2), 0x80);
        assert_eq!(S5bMode::from_duty_param(4), 0x120);
        assert_eq!(S5bMode::from_duty_param(5) & 0xE0, 0x60);
    }

    #[test]
    fn mixer_tracks_each_channel() {
        let mut shared = S5bShared::default();
        shared.set_channel_output(1, true, false);
        assert!(shared.mixer().is_tone_enabled(1));
        assert!(!shared.mixer().is_noise_enabled(1));
        assert!(!shared.mixer().is_tone_enabled(0));
        shared.set_channel_output(1, false, true);
        assert!(!shared.mixer().is_tone_enabled(1));
        assert!(shared.mixer().is_noise_enabled(1));
    }

    #[test]
    fn plain_note_emits_tone_registers() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0), &bank);
        tick(&mut chip, &bank, &mut regs);

        assert_eq!(regs.tone_period(0), 254);
        assert_eq!(regs.volume(0), 15);
        assert!(regs.mixer().is_tone_enabled(0));
        assert!(!regs.mixer().is_noise_enabled(0));
        assert!(!regs.mixer().is_tone_enabled(1));
        assert_eq!(regs.register(6), 0x1F);
        assert_eq!(regs.envelope_restarts(), 0);
    }

    #[test]
    fn volume_is_additive() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0).volume(10), &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.volume(0), 10);
    }

    #[test]
    fn duty_sequence_sets_noise() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(1, PatternNote::with_instrument(Note::On(40), 1), &bank);
        tick(&mut chip, &bank, &mut regs);
        assert!(regs.mixer().is_noise_enabled(1));
        assert!(!regs.mixer().is_tone_enabled(1));
        assert_eq!(regs.register(6), 0x0A ^ 0x1F);
    }

    #[test]
    fn foreign_instrument_forces_square() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(40), 2), &bank);
        tick(&mut chip, &bank, &mut regs);
        let channel = chip.channel(0).unwrap();
        assert_eq!(channel.core().duty_period(), S5bMode::SQUARE.bits());
        assert!(regs.mixer().is_tone_enabled(0));
    }

    #[test]
    fn envelope_effects_compose_period() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        let row = PatternNote::note(Note::None)
            .effect(EffectType::SunsoftEnvHi, 0x12)
            .effect(EffectType::SunsoftEnvLo, 0x34);
        chip.play_note(2, row, &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_period(), 0x1234);
    }

    #[test]
    fn envelope_restarts_once_per_tick() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        for channel in 0..2 {
            let row = PatternNote::with_instrument(Note::On(45), 0)
                .effect(EffectType::DutyCycle, 0x04)
                .effect(EffectType::SunsoftEnvType, 0x0E);
            chip.play_note(channel, row, &bank);
        }
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_restarts(), 1);
        assert_eq!(regs.register(13), 0x0E);
        assert_eq!(regs.volume(0) & 0x10, 0x10);

        // held notes keep the envelope running
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_restarts(), 1);

        chip.play_note(0, PatternNote::note(Note::On(47)), &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_restarts(), 2);
    }

    #[test]
    fn envelope_needs_envelope_mode() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        let row = PatternNote::with_instrument(Note::On(45), 0).effect(EffectType::SunsoftEnvType, 0x0E);
        chip.play_note(0, row, &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_restarts(), 0);
        assert_eq!(regs.volume(0) & 0x10, 0);
    }

    #[test]
    fn auto_envelope_follows_tone_period() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        // one octave above the tone: half the period, rounded
        let row = PatternNote::with_instrument(Note::On(57), 0)
            .effect(EffectType::DutyCycle, 0x04)
            .effect(EffectType::SunsoftEnvType, 0x9E);
        chip.play_note(0, row, &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_period(), 127);

        let row = PatternNote::note(Note::None).effect(EffectType::SunsoftEnvType, 0x6E);
        chip.play_note(0, row, &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.envelope_period(), 254 << 2);
    }

    #[test]
    fn new_note_restores_default_noise() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(1, PatternNote::with_instrument(Note::On(40), 1), &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(chip.shared().noise_period(), 0x0A);

        let row = PatternNote::with_instrument(Note::On(40), 0).effect(EffectType::SunsoftNoise, 0x03);
        chip.play_note(1, row, &bank);
        assert_eq!(chip.shared().noise_period(), 0x03);
    }

    #[test]
    fn halt_forgets_note_and_resets_mode() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(40), 1), &bank);
        tick(&mut chip, &bank, &mut regs);
        chip.play_note(0, PatternNote::note(Note::Halt), &bank);
        let channel = chip.channel(0).unwrap();
        assert_eq!(channel.core().note(), -1);
        assert_eq!(channel.core().duty_period(), S5bMode::SQUARE.bits());
        tick(&mut chip, &bank, &mut regs);
        assert_eq!(regs.volume(0), 0);
        assert!(!regs.mixer().is_tone_enabled(0));
    }

    #[test]
    fn reset_clears_volumes() {
        let bank = bank();
        let mut chip = chip();
        let mut regs = S5bRegisterFile::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(40), 0), &bank);
        tick(&mut chip, &bank, &mut regs);
        assert_ne!(regs.volume(0), 0);
        chip.reset(&mut regs);
        assert_eq!(regs.volume(0), 0);
        assert_eq!(chip.shared(), &S5bShared::default());
        assert!(chip.channels().iter().all(|c| !c.chip().is_envelope_enabled()));
    }

    #[test]
    fn default_duty_is_square() {
        let chip = chip();
        let core = chip.channel(0).unwrap().core();
        assert_eq!(core.duty_period(), 0x40);
        assert_eq!(core.effect_string(), " None");
    }
}
