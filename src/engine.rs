//! Multi-chip playback driver.
//!
//! [`TrackerEngine`] wires the 2A03 pulse channels and the Sunsoft 5B
//! channels to one instrument bank and one set of playback settings. A
//! pattern player feeds it rows with [`TrackerEngine::play_note`] and calls
//! [`TrackerEngine::tick`] once per frame.

use std::sync::Arc;

use log::debug;

use crate::channel::{Channel, ChannelState};
use crate::chips::apu::APU_PULSE_COUNT;
use crate::chips::s5b::S5B_CHANNEL_COUNT;
use crate::chips::{ApuPulse, ChannelId, ChipChannel, ChipHandler, S5bChannel, SoundChip};
use crate::instrument::InstrumentManager;
use crate::pattern::PatternNote;
use crate::registers::RegisterWriter;
use crate::settings::PlaybackSettings;
use crate::tables::{NoteTable, VibratoTable};
use crate::{EngineError, Result};

/// Two 2A03 pulse channels and three Sunsoft 5B channels sharing one
/// instrument bank
///
/// # Example
///
/// ```
/// use chiptrack::pattern::{Note, PatternNote};
/// use chiptrack::registers::RegisterLog;
/// use chiptrack::{ChannelId, SoundChip, TrackerEngine};
///
/// let mut engine = TrackerEngine::new();
/// let mut log = RegisterLog::new();
/// engine.reset(&mut log);
/// engine
///     .play_note(ChannelId::new(SoundChip::S5b, 0), PatternNote::note(Note::On(57)))
///     .unwrap();
/// engine.tick(&mut log);
/// assert!(!log.writes().is_empty());
/// ```
#[derive(Debug)]
pub struct TrackerEngine {
    instruments: InstrumentManager,
    settings: PlaybackSettings,
    apu: ChipHandler<ApuPulse>,
    s5b: ChipHandler<S5bChannel>,
}

impl Default for TrackerEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn build_chip<C: ChipChannel>(
    count: u8,
    table: NoteTable,
    vibrato: &Arc<VibratoTable>,
    make: impl Fn() -> C,
) -> ChipHandler<C> {
    let table = Arc::new(table);
    let channels = (0..count)
        .map(|index| {
            let mut channel = Channel::new(index, make());
            channel.set_note_table(Arc::clone(&table));
            channel.set_vibrato_table(Arc::clone(vibrato));
            channel
        })
        .collect();
    ChipHandler::new(channels)
}

impl TrackerEngine {
    /// Create an engine with NTSC note tables and default settings
    pub fn new() -> Self {
        Self::with_settings(PlaybackSettings::default())
    }

    /// Create an engine with NTSC note tables and the given settings
    pub fn with_settings(settings: PlaybackSettings) -> Self {
        let vibrato = Arc::new(VibratoTable::new(settings.vibrato_style));
        let mut engine = Self {
            instruments: InstrumentManager::new(),
            settings,
            apu: build_chip(APU_PULSE_COUNT, NoteTable::ntsc_2a03(), &vibrato, ApuPulse::new),
            s5b: build_chip(S5B_CHANNEL_COUNT, NoteTable::sunsoft(), &vibrato, S5bChannel::new),
        };
        engine.apu.configure(settings);
        engine.s5b.configure(settings);
        engine
    }

    /// Instrument bank
    pub fn instruments(&self) -> &InstrumentManager {
        &self.instruments
    }

    /// Instrument bank, for adding or replacing instruments
    pub fn instruments_mut(&mut self) -> &mut InstrumentManager {
        &mut self.instruments
    }

    /// Settings in effect
    pub fn settings(&self) -> PlaybackSettings {
        self.settings
    }

    /// Push new settings to every channel
    pub fn set_settings(&mut self, settings: PlaybackSettings) {
        self.settings = settings;
        self.apu.configure(settings);
        self.s5b.configure(settings);
    }

    /// 2A03 pulse channels
    pub fn apu(&self) -> &ChipHandler<ApuPulse> {
        &self.apu
    }

    /// Sunsoft 5B channels
    pub fn s5b(&self) -> &ChipHandler<S5bChannel> {
        &self.s5b
    }

    /// Every channel the engine drives, 2A03 first
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.apu
            .channels()
            .iter()
            .map(Channel::id)
            .chain(self.s5b.channels().iter().map(Channel::id))
            .collect()
    }

    /// Silence every channel and return all state to defaults
    pub fn reset(&mut self, writer: &mut dyn RegisterWriter) {
        self.apu.reset(writer);
        self.s5b.reset(writer);
    }

    /// Feed a pattern row to one channel
    pub fn play_note(&mut self, id: ChannelId, note: PatternNote) -> Result<()> {
        let played = match id.chip {
            SoundChip::Apu => self.apu.play_note(id.index, note, &self.instruments),
            SoundChip::S5b => self.s5b.play_note(id.index, note, &self.instruments),
        };
        if !played {
            debug!("dropping row for {}", id);
            return Err(EngineError::UnknownChannel(id));
        }
        Ok(())
    }

    /// Rebuild one channel from a snapshot when playback starts mid-song
    pub fn apply_channel_state(&mut self, id: ChannelId, state: &ChannelState) -> Result<()> {
        let applied = match id.chip {
            SoundChip::Apu => self.apu.apply_channel_state(id.index, state, &self.instruments),
            SoundChip::S5b => self.s5b.apply_channel_state(id.index, state, &self.instruments),
        };
        if !applied {
            return Err(EngineError::UnknownChannel(id));
        }
        Ok(())
    }

    /// Set one channel's pitch wheel (-511..=511)
    pub fn set_pitch(&mut self, id: ChannelId, pitch: i32) -> Result<()> {
        match id.chip {
            SoundChip::Apu => self.apu.channel_mut(id.index).map(|c| c.set_pitch(pitch)),
            SoundChip::S5b => self.s5b.channel_mut(id.index).map(|c| c.set_pitch(pitch)),
        }
        .ok_or(EngineError::UnknownChannel(id))
    }

    /// Active effects of one channel in tracker notation
    pub fn effect_string(&self, id: ChannelId) -> Result<String> {
        match id.chip {
            SoundChip::Apu => self.apu.channel(id.index).map(Channel::effect_string),
            SoundChip::S5b => self.s5b.channel(id.index).map(Channel::effect_string),
        }
        .ok_or(EngineError::UnknownChannel(id))
    }

    /// One frame: update every channel, then emit every chip's registers
    pub fn tick(&mut self, writer: &mut dyn RegisterWriter) {
        self.apu.process(&self.instruments);
        self.s5b.process(&self.instruments);
        self.apu.refresh(writer);
        self.s5b.refresh(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{Instrument, InstrumentType, Sequence, SequenceKind};
    use crate::pattern::{EffectCommand, EffectType, Note};
    use crate::registers::{RegisterLog, S5bRegisterFile};

    const PULSE_1: ChannelId = ChannelId::new(SoundChip::Apu, 0);
    const SUNSOFT_2: ChannelId = ChannelId::new(SoundChip::S5b, 1);

    fn engine() -> TrackerEngine {
        let mut engine = TrackerEngine::new();
        engine
            .instruments_mut()
            .insert(
                0,
                Instrument::new("lead", InstrumentType::Apu2A03)
                    .with_sequence(Sequence::new(SequenceKind::Volume, vec![15])),
            )
            .unwrap();
        engine
    }

    #[test]
    fn lists_five_channels() {
        let ids = engine().channel_ids();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[0], PULSE_1);
        assert_eq!(ids[4], ChannelId::new(SoundChip::S5b, 2));
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let mut engine = engine();
        let id = ChannelId::new(SoundChip::Apu, 4);
        let err = engine.play_note(id, PatternNote::note(Note::On(40))).unwrap_err();
        assert!(matches!(err, EngineError::UnknownChannel(c) if c == id));
        assert_eq!(err.to_string(), "no channel 2A03 channel 5");
        assert!(engine.set_pitch(id, 10).is_err());
        assert!(engine.effect_string(id).is_err());
        assert!(engine.apply_channel_state(id, &ChannelState::default()).is_err());
    }

    #[test]
    fn rows_reach_both_chips() {
        let mut engine = engine();
        let mut log = RegisterLog::new();
        engine.play_note(PULSE_1, PatternNote::with_instrument(Note::On(57), 0)).unwrap();
        engine.play_note(SUNSOFT_2, PatternNote::with_instrument(Note::On(57), 0)).unwrap();
        engine.tick(&mut log);

        assert_eq!(log.last_write_to(0x4000).map(|v| v & 0x0F), Some(15));
        let mut regs = S5bRegisterFile::new();
        for &(address, value) in log.writes() {
            regs.write(address, value);
        }
        assert_eq!(regs.tone_period(1), 254);
        assert_eq!(regs.volume(1), 15);
    }

    #[test]
    fn settings_reach_every_channel() {
        let mut engine = engine();
        let settings = PlaybackSettings {
            linear_pitch: true,
            ..PlaybackSettings::default()
        };
        engine.set_settings(settings);
        assert_eq!(engine.settings(), settings);
        assert!(engine.apu().channels().iter().all(|c| c.core().settings().linear_pitch));
        assert!(engine.s5b().channels().iter().all(|c| c.core().settings().linear_pitch));
    }

    #[test]
    fn channel_state_restores_effects() {
        let mut engine = engine();
        let state = ChannelState {
            instrument: Some(0),
            volume: 8,
            effects: vec![EffectCommand::new(EffectType::Vibrato, 0x45)],
            ..ChannelState::default()
        };
        engine.apply_channel_state(SUNSOFT_2, &state).unwrap();
        assert_eq!(engine.effect_string(SUNSOFT_2).unwrap(), " 445");
        let core = engine.s5b().channel(1).unwrap().core();
        assert_eq!(core.channel_volume(), 8 << 3);
        assert_eq!(core.instrument(), Some(0));
    }
}
