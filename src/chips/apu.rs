//! 2A03 pulse channels.
//!
//! Each pulse channel owns four registers at `$4000 + 4n`. The high period
//! register also reloads the length counter and restarts the hardware
//! envelope, so it is only rewritten when the period's high bits change or
//! an `Exx` command asked for an envelope reset.

use super::{ChipChannel, InstHandlerRequest, SoundChip};
use crate::channel::ChannelCore;
use crate::instrument::{InstrumentType, SeqInstHandler};
use crate::pattern::{EffectCommand, EffectType};
use crate::registers::RegisterWriter;

/// Number of pulse channels
pub const APU_PULSE_COUNT: u8 = 2;

/// Highest pulse period (11 bits)
pub const APU_MAX_PERIOD: i32 = 0x7FF;

/// Highest pulse volume
pub const APU_MAX_VOLUME: i32 = 0x0F;

/// First pulse register
pub const APU_PULSE_BASE: u16 = 0x4000;

const NO_PERIOD: i32 = 0xFFFF;

/// Sweep disabled, negate flag set
const SWEEP_OFF: u8 = 0x08;

/// Constant volume 0 with the length counter halted
const SILENT_CONTROL: u8 = 0x30;

const VRC6_DUTY: [i32; 8] = [0, 0, 1, 1, 1, 1, 2, 2];

/// Chip-specific state of one pulse channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApuPulse {
    envelope_loop: bool,
    hardware_envelope: bool,
    reset_envelope: bool,
    length_counter: i32,
    last_period: i32,
}

impl Default for ApuPulse {
    fn default() -> Self {
        Self {
            envelope_loop: true,
            hardware_envelope: false,
            reset_envelope: false,
            length_counter: 1,
            last_period: NO_PERIOD,
        }
    }
}

impl ApuPulse {
    /// Create a channel with the length counter halted and volume constant
    pub fn new() -> Self {
        Self::default()
    }

    /// Length counter reload value (`E00`-`E1F`)
    pub fn length_counter(&self) -> i32 {
        self.length_counter
    }

    /// Hardware volume envelope in use (`EE1`/`EE3`)
    pub fn is_hardware_envelope(&self) -> bool {
        self.hardware_envelope
    }

    /// Length counter halted / envelope looping
    pub fn is_envelope_looping(&self) -> bool {
        self.envelope_loop
    }

    fn base_address(core: &ChannelCore) -> u16 {
        APU_PULSE_BASE + 4 * core.id().index as u16
    }
}

impl ChipChannel for ApuPulse {
    type Shared = ();

    const CHIP: SoundChip = SoundChip::Apu;
    const MAX_PERIOD: i32 = APU_MAX_PERIOD;
    const MAX_VOLUME: i32 = APU_MAX_VOLUME;

    fn handle_effect(&mut self, _core: &mut ChannelCore, _shared: &mut (), cmd: EffectCommand) -> bool {
        if cmd.kind != EffectType::Volume {
            return false;
        }
        match cmd.param {
            p @ 0x00..=0x1F => {
                self.length_counter = p as i32;
                self.envelope_loop = false;
                self.reset_envelope = true;
            }
            p @ 0xE0..=0xE3 => {
                if !self.envelope_loop || !self.hardware_envelope {
                    self.reset_envelope = true;
                }
                self.hardware_envelope = p & 0x01 != 0;
                self.envelope_loop = p & 0x02 == 0;
            }
            _ => return false,
        }
        true
    }

    fn handle_note(&mut self, _core: &mut ChannelCore, _shared: &mut ()) {
        if !self.envelope_loop || self.hardware_envelope {
            self.reset_envelope = true;
        }
    }

    fn reset(&mut self, _core: &mut ChannelCore) {
        *self = Self::default();
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
        let duty = if requested == InstrumentType::S5b { 0x40 } else { 0 };
        InstHandlerRequest::Create(Box::new(SeqInstHandler::new(APU_MAX_VOLUME, duty)))
    }

    fn convert_duty(&self, inst_type: InstrumentType, duty: i32) -> i32 {
        match inst_type {
            InstrumentType::Vrc6 => VRC6_DUTY[(duty & 0x07) as usize],
            InstrumentType::S5b => 2,
            _ => duty,
        }
    }

    fn refresh_channel(&mut self, core: &ChannelCore, _shared: &mut (), writer: &mut dyn RegisterWriter) {
        let base = Self::base_address(core);
        if !core.is_active() {
            writer.write(base, SILENT_CONTROL);
            self.last_period = NO_PERIOD;
            return;
        }

        let period = core.calculate_period();
        let volume = self.calculate_volume(core);
        let duty = core.duty_period() & 0x03;

        let control = (duty << 6)
            | ((self.envelope_loop as i32) << 5)
            | ((!self.hardware_envelope as i32) << 4)
            | volume;
        writer.write(base, control as u8);
        writer.write(base + 1, SWEEP_OFF);
        writer.write(base + 2, (period & 0xFF) as u8);

        let hi = (period >> 8) & 0x07;
        if hi != self.last_period >> 8 || self.reset_envelope {
            writer.write(base + 3, (hi + (self.length_counter << 3)) as u8);
        }
        self.last_period = period;
        self.reset_envelope = false;
    }

    fn clear_registers(&mut self, core: &ChannelCore, writer: &mut dyn RegisterWriter) {
        let base = Self::base_address(core);
        writer.write(base, SILENT_CONTROL);
        writer.write(base + 1, SWEEP_OFF);
        writer.write(base + 2, 0);
        writer.write(base + 3, 0);
        self.last_period = NO_PERIOD;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::channel::Channel;
    use crate::chips::{ChannelId, ChipHandler};
    use crate::instrument::{Instrument, InstrumentManager, Sequence, SequenceKind};
    use crate::pattern::{Note, PatternNote};
    use crate::registers::RegisterLog;
    use crate::tables::NoteTable;

    fn pulses() -> ChipHandler<ApuPulse> {
        let table = Arc::new(NoteTable::ntsc_2a03());
        let channels = (0..APU_PULSE_COUNT)
            .map(|index| {
                let mut channel = Channel::new(index, ApuPulse::new());
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
            Instrument::new("lead", InstrumentType::Apu2A03)
                .with_sequence(Sequence::new(SequenceKind::Volume, vec![12]))
                .with_sequence(Sequence::new(SequenceKind::Duty, vec![2])),
        )
        .unwrap();
        bank.insert(
            1,
            Instrument::new("vrc6", InstrumentType::Vrc6)
                .with_sequence(Sequence::new(SequenceKind::Duty, vec![7])),
        )
        .unwrap();
        bank.insert(2, Instrument::new("fm", InstrumentType::Vrc7)).unwrap();
        bank
    }

    fn tick(chip: &mut ChipHandler<ApuPulse>, bank: &InstrumentManager, log: &mut RegisterLog) {
        chip.process(bank);
        chip.refresh(log);
    }

    #[test]
    fn note_writes_all_four_registers() {
        let bank = bank();
        let mut chip = pulses();
        let mut log = RegisterLog::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0), &bank);
        tick(&mut chip, &bank, &mut log);

        let period = NoteTable::ntsc_2a03().period(57);
        assert_eq!(log.last_write_to(0x4000), Some(0x80 | 0x20 | 0x10 | 12));
        assert_eq!(log.last_write_to(0x4001), Some(SWEEP_OFF));
        assert_eq!(log.last_write_to(0x4002), Some((period & 0xFF) as u8));
        assert_eq!(log.last_write_to(0x4003), Some(((period >> 8) + 8) as u8));
        // second channel is silent
        assert_eq!(log.last_write_to(0x4004), Some(SILENT_CONTROL));
    }

    #[test]
    fn high_period_written_only_on_change() {
        let bank = bank();
        let mut chip = pulses();
        let mut log = RegisterLog::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0), &bank);
        tick(&mut chip, &bank, &mut log);
        tick(&mut chip, &bank, &mut log);
        assert_eq!(log.count_writes_to(0x4003), 1);

        // an octave down crosses into the next high byte
        chip.play_note(0, PatternNote::note(Note::On(45)), &bank);
        tick(&mut chip, &bank, &mut log);
        assert_eq!(log.count_writes_to(0x4003), 2);
    }

    #[test]
    fn length_counter_effect_resets_envelope() {
        let bank = bank();
        let mut chip = pulses();
        let mut log = RegisterLog::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0), &bank);
        tick(&mut chip, &bank, &mut log);

        chip.play_note(0, PatternNote::note(Note::None).effect(EffectType::Volume, 0x05), &bank);
        tick(&mut chip, &bank, &mut log);
        let pulse = chip.channel(0).unwrap().chip();
        assert_eq!(pulse.length_counter(), 5);
        assert!(!pulse.is_envelope_looping());

        let period = NoteTable::ntsc_2a03().period(57);
        assert_eq!(log.count_writes_to(0x4003), 2);
        assert_eq!(log.last_write_to(0x4003), Some(((period >> 8) + (5 << 3)) as u8));
        // loop bit cleared in the control register
        assert_eq!(log.last_write_to(0x4000).map(|v| v & 0x20), Some(0));
    }

    #[test]
    fn hardware_envelope_mode() {
        let mut pulse = ApuPulse::new();
        let mut core = ChannelCore::new(ChannelId::new(SoundChip::Apu, 0), APU_MAX_PERIOD, 15, false, 0);
        let cmd = EffectCommand::new(EffectType::Volume, 0xE1);
        assert!(pulse.handle_effect(&mut core, &mut (), cmd));
        assert!(pulse.is_hardware_envelope());
        assert!(pulse.is_envelope_looping());

        let cmd = EffectCommand::new(EffectType::Volume, 0x40);
        assert!(!pulse.handle_effect(&mut core, &mut (), cmd));
    }

    #[test]
    fn foreign_duties_are_converted() {
        let pulse = ApuPulse::new();
        assert_eq!(pulse.convert_duty(InstrumentType::Vrc6, 7), 2);
        assert_eq!(pulse.convert_duty(InstrumentType::Vrc6, 3), 1);
        assert_eq!(pulse.convert_duty(InstrumentType::S5b, 0x40), 2);
        assert_eq!(pulse.convert_duty(InstrumentType::Apu2A03, 3), 3);

        let bank = bank();
        let mut chip = pulses();
        let mut log = RegisterLog::new();
        chip.play_note(1, PatternNote::with_instrument(Note::On(50), 1), &bank);
        tick(&mut chip, &bank, &mut log);
        assert_eq!(chip.channel(1).unwrap().core().duty_period(), 2);
    }

    #[test]
    fn unsupported_instrument_leaves_channel_without_handler() {
        let bank = bank();
        let mut chip = pulses();
        chip.play_note(0, PatternNote::with_instrument(Note::On(50), 2), &bank);
        let channel = chip.channel(0).unwrap();
        assert!(channel.inst_handler().is_none());
        assert_eq!(channel.core().inst_type(), InstrumentType::None);
    }

    #[test]
    fn reset_silences_and_forgets_period() {
        let bank = bank();
        let mut chip = pulses();
        let mut log = RegisterLog::new();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0), &bank);
        tick(&mut chip, &bank, &mut log);
        log.clear();

        chip.reset(&mut log);
        assert_eq!(
            &log.writes()[..4],
            &[(0x4000, 0x30), (0x4001, 0x08), (0x4002, 0), (0x4003, 0)]
        );
        assert_eq!(log.writes().len(), 8);

        // the high byte is written again after a reset
        log.clear();
        chip.play_note(0, PatternNote::with_instrument(Note::On(57), 0), &bank);
        tick(&mut chip, &bank, &mut log);
        assert_eq!(log.count_writes_to(0x4003), 1);
    }
}
