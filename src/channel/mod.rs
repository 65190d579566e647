//! Channel state machine.
//!
//! A [`Channel`] turns pattern rows into per-tick chip state. It owns:
//! - a [`ChannelCore`] with the note, volume, pitch and effect-timer state
//! - the chip-specific half of the channel (a [`ChipChannel`])
//! - the instrument handler currently bound to the channel
//!
//! Call order per tick: [`Channel::play_note`] when the tick starts a row,
//! then [`Channel::process_channel`], then [`Channel::refresh`] to emit
//! registers, and finally [`Channel::finish_tick`].

pub mod echo;
pub mod interface;
pub mod state;

use std::sync::Arc;

use log::{debug, trace};

use crate::chips::{ChannelId, ChipChannel, InstHandlerRequest};
use crate::instrument::{InstrumentHandler, InstrumentSource, SeqPlayState, SequenceKind};
use crate::pattern::{EffectCommand, EffectType, InstrumentRef, Note, PatternNote, MAX_VOLUME};
use crate::registers::RegisterWriter;
use crate::settings::PlaybackSettings;
use crate::tables::{NoteTable, VibratoTable};

pub use state::{
    ChannelCore, ContinuousEffect, DelayedRow, LINEAR_PITCH_AMOUNT, PITCH_WHEEL_RANGE,
    VOL_COLUMN_MAX, VOL_COLUMN_SHIFT,
};
pub use echo::{EchoBuffer, EchoSlot, ECHO_BUFFER_LENGTH};
pub use interface::ChannelInterface;

/// Snapshot used to rebuild a channel's state when playback starts mid-song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    /// Instrument in effect
    pub instrument: Option<u8>,
    /// Volume column in effect ([`MAX_VOLUME`] = full)
    pub volume: u8,
    /// Notes the echo buffer should remember
    pub echo: EchoBuffer,
    /// Effects still in effect, applied in order
    pub effects: Vec<EffectCommand>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            instrument: None,
            volume: MAX_VOLUME,
            echo: EchoBuffer::new(),
            effects: Vec::new(),
        }
    }
}

/// One playback channel of chip `C`
#[derive(Debug)]
pub struct Channel<C: ChipChannel> {
    core: ChannelCore,
    chip: C,
    inst_handler: Option<Box<dyn InstrumentHandler>>,
}

/// The view of a channel handed to instrument handlers
struct ChannelAccess<'a, C: ChipChannel> {
    core: &'a mut ChannelCore,
    chip: &'a mut C,
    shared: &'a mut C::Shared,
}

impl<C: ChipChannel> ChannelInterface for ChannelAccess<'_, C> {
    fn note(&self) -> i32 {
        self.core.note
    }

    fn set_note(&mut self, note: i32) {
        self.core.note = note;
    }

    fn period(&self) -> i32 {
        self.core.period
    }

    fn set_period(&mut self, period: i32) {
        self.core.set_period(period);
    }

    fn volume(&self) -> i32 {
        self.core.inst_volume
    }

    fn set_volume(&mut self, volume: i32) {
        self.core.inst_volume = volume;
    }

    fn duty_period(&self) -> i32 {
        self.core.duty_period
    }

    fn set_duty_period(&mut self, duty: i32) {
        self.core.duty_period = self.chip.convert_duty(self.core.inst_type, duty);
    }

    fn trigger_note(&mut self, note: i32) -> i32 {
        self.core.trigger_note(note)
    }

    fn is_active(&self) -> bool {
        self.core.gate
    }

    fn is_releasing(&self) -> bool {
        self.core.release
    }

    fn arp_param(&self) -> u8 {
        self.core.arp_param()
    }

    fn set_noise_period(&mut self, period: i32) {
        self.chip.set_noise_period(self.shared, period);
    }
}

impl<C: ChipChannel> Channel<C> {
    /// Create channel `index` of the chip
    pub fn new(index: u8, chip: C) -> Self {
        let id = ChannelId::new(C::CHIP, index);
        Self {
            core: ChannelCore::new(id, C::MAX_PERIOD, C::MAX_VOLUME, C::INVERTED, C::DEFAULT_DUTY),
            chip,
            inst_handler: None,
        }
    }

    /// Chip and sub-index
    pub fn id(&self) -> ChannelId {
        self.core.id()
    }

    /// Chip-independent state
    pub fn core(&self) -> &ChannelCore {
        &self.core
    }

    /// Chip-specific state
    pub fn chip(&self) -> &C {
        &self.chip
    }

    /// Instrument handler currently bound
    pub fn inst_handler(&self) -> Option<&dyn InstrumentHandler> {
        self.inst_handler.as_deref()
    }

    /// Play state and cursor of one of the instrument's sequences
    pub fn sequence_state(&self, kind: SequenceKind) -> Option<(SeqPlayState, usize)> {
        self.inst_handler.as_ref()?.sequence_state(kind)
    }

    /// Apply global settings
    pub fn configure(&mut self, settings: PlaybackSettings) {
        self.core.configure(settings);
    }

    /// Install the note-period table
    pub fn set_note_table(&mut self, table: Arc<NoteTable>) {
        self.core.set_note_table(table);
    }

    /// Share a vibrato table
    pub fn set_vibrato_table(&mut self, table: Arc<VibratoTable>) {
        self.core.set_vibrato_table(table);
    }

    /// Pitch wheel position, -511..=511
    pub fn set_pitch(&mut self, pitch: i32) {
        self.core.set_pitch(pitch);
    }

    /// Reload and retrigger the instrument on the next row
    pub fn force_reload(&mut self) {
        self.core.force_reload = true;
    }

    /// Active effects in tracker notation
    pub fn effect_string(&self) -> String {
        self.core.effect_string()
    }

    /// Return to silence and defaults, clearing the channel's registers
    pub fn reset(&mut self, writer: &mut dyn RegisterWriter) {
        self.core.reset_state();
        self.inst_handler = None;
        self.chip.reset(&mut self.core);
        self.chip.clear_registers(&self.core, writer);
    }

    // ========================================================================
    // ROW HANDLING
    // ========================================================================

    /// Feed a new pattern row, honouring note delays
    pub fn play_note(
        &mut self,
        mut note: PatternNote,
        shared: &mut C::Shared,
        instruments: &dyn InstrumentSource,
    ) {
        if self.handle_delay(&mut note, shared, instruments) {
            return;
        }
        self.handle_note_data(note, shared, instruments);
    }

    /// Flush a pending delayed row, then hold back `note` if it carries `Gxx`
    fn handle_delay(
        &mut self,
        note: &mut PatternNote,
        shared: &mut C::Shared,
        instruments: &dyn InstrumentSource,
    ) -> bool {
        if let Some(pending) = self.core.delayed.take() {
            trace!("{}: flushing delayed row", self.core.id());
            self.handle_note_data(pending.note, shared, instruments);
        }

        let Some(counter) = note
            .effects
            .iter()
            .find(|cmd| cmd.kind == EffectType::Delay && cmd.param > 0)
            .map(|cmd| cmd.param)
        else {
            return false;
        };

        // one delay per row
        for cmd in note.effects.iter_mut() {
            if cmd.kind == EffectType::Delay {
                *cmd = EffectCommand::NONE;
            }
        }
        self.core.delayed = Some(DelayedRow {
            counter,
            note: *note,
        });
        true
    }

    /// Apply a row that is due now
    pub fn handle_note_data(
        &mut self,
        mut note: PatternNote,
        shared: &mut C::Shared,
        instruments: &dyn InstrumentSource,
    ) {
        let last_instrument = self.core.instrument;
        let mut push_empty = false;

        if let Note::Echo(index) = note.note {
            note.note = match self.core.echo.get(index as usize) {
                Some(EchoSlot::Empty) => {
                    push_empty = true;
                    Note::None
                }
                Some(EchoSlot::Halt) => Note::Halt,
                Some(EchoSlot::Note(midi)) => Note::On(midi),
                None => Note::None,
            };
        }

        let trigger = matches!(note.note, Note::On(_)) && note.instrument != InstrumentRef::Hold;

        if !matches!(note.note, Note::None | Note::Release) || push_empty {
            self.core.echo.push_note(&note);
        }

        if note.note != Note::None {
            let core = &mut self.core;
            core.note_cut = 0;
            core.note_release = 0;
            if trigger && core.note_volume == 0 && core.vol_slide == 0 {
                core.volume = core.default_volume;
                core.note_volume = -1;
            }
            core.transpose = 0;
        }

        if trigger && self.core.semitone_slide_active() {
            self.core.effect = ContinuousEffect::None;
        }

        for cmd in note.effects.iter().copied().filter(|cmd| !cmd.is_none()) {
            if !self.handle_effect(cmd, shared) {
                debug!("{}: ignoring effect {}", self.core.id(), cmd);
            }
            let core = &mut self.core;
            if cmd.kind == EffectType::VolumeSlide && cmd.param == 0 && trigger && core.note_volume == 0 {
                core.volume = core.default_volume;
                core.note_volume = -1;
            }
        }

        if note.has_volume() {
            self.core.volume = (note.volume as i32) << VOL_COLUMN_SHIFT;
            self.core.default_volume = self.core.volume;
        }

        // halt and release never change the instrument
        let instrument = match note.note {
            Note::Halt | Note::Release => InstrumentRef::None,
            _ => note.instrument,
        };
        if let InstrumentRef::Index(index) = instrument {
            self.core.instrument = Some(index);
        }
        let new_instrument = self.core.instrument != last_instrument
            || self.core.instrument.is_none()
            || self.core.force_reload;

        match note.note {
            Note::None | Note::Echo(_) => self.chip.handle_empty_note(&mut self.core, shared),
            Note::Halt => {
                self.core.release = false;
                self.handle_cut(shared);
            }
            Note::Release => self.handle_release(shared),
            Note::On(midi) => {
                self.core.note = midi as i32;
                self.core.run_note(midi as i32);
                self.core.note_on();
                self.chip.handle_note(&mut self.core, shared);
            }
        }

        if trigger && self.core.semitone_slide_active() {
            self.core.setup_slide();
        }

        if (new_instrument || trigger) && self.core.instrument.is_some() {
            self.handle_instrument(trigger, new_instrument, shared, instruments);
        }
        self.core.force_reload = false;
    }

    /// Decode one effect: chip extensions first, then the shared table
    pub fn handle_effect(&mut self, cmd: EffectCommand, shared: &mut C::Shared) -> bool {
        self.chip.handle_effect(&mut self.core, shared, cmd) || self.core.handle_effect(cmd)
    }

    /// Resolve the current instrument, swap handlers if needed, then load
    /// and trigger. Returns false when nothing could be loaded.
    fn handle_instrument(
        &mut self,
        trigger: bool,
        new_instrument: bool,
        shared: &mut C::Shared,
        instruments: &dyn InstrumentSource,
    ) -> bool {
        let Self {
            core,
            chip,
            inst_handler,
        } = self;

        let Some(index) = core.instrument else {
            return false;
        };
        let Some(instrument) = instruments.instrument(index) else {
            debug!("{}: no instrument in slot {:02X}", core.id(), index);
            return false;
        };
        let inst_type = instrument.inst_type();

        if new_instrument {
            match chip.create_inst_handler(core.inst_type, inst_type) {
                InstHandlerRequest::Keep => {}
                InstHandlerRequest::Create(handler) => *inst_handler = Some(handler),
                InstHandlerRequest::Unsupported => {
                    debug!("{}: cannot play {} instrument {:02X}", core.id(), inst_type, index);
                    return false;
                }
            }
        } else if inst_type != core.inst_type {
            // the instrument was rejected when it was selected
            return false;
        }
        core.inst_type = inst_type;

        let Some(handler) = inst_handler.as_mut() else {
            return false;
        };
        let reload = core.force_reload;
        let mut access = ChannelAccess { core, chip, shared };
        if new_instrument {
            handler.load_instrument(instrument);
        }
        if trigger || reload {
            handler.trigger_instrument(&mut access);
        }
        true
    }

    fn handle_cut(&mut self, shared: &mut C::Shared) {
        self.core.cut_note();
        self.chip.handle_cut(&mut self.core, shared);
    }

    fn handle_release(&mut self, shared: &mut C::Shared) {
        if !self.core.release {
            self.release_note(shared);
        }
    }

    /// Enter the release phase of the note and the instrument
    pub fn release_note(&mut self, shared: &mut C::Shared) {
        self.core.active_note = -1;
        let Self {
            core,
            chip,
            inst_handler,
        } = self;
        if let Some(handler) = inst_handler.as_mut() {
            handler.release_instrument(&mut ChannelAccess { core, chip, shared });
        }
        self.core.release = true;
    }

    /// Rebuild state from a snapshot: instrument, volume, echo buffer and effects
    pub fn apply_channel_state(
        &mut self,
        state: &ChannelState,
        shared: &mut C::Shared,
        instruments: &dyn InstrumentSource,
    ) {
        self.core.instrument = state.instrument;
        self.core.volume = if state.volume >= MAX_VOLUME {
            VOL_COLUMN_MAX
        } else {
            (state.volume as i32) << VOL_COLUMN_SHIFT
        };
        self.core.default_volume = self.core.volume;
        self.core.echo = state.echo;
        if self.core.instrument.is_some() {
            self.handle_instrument(true, true, shared, instruments);
        }
        for cmd in &state.effects {
            self.handle_effect(*cmd, shared);
        }
    }

    // ========================================================================
    // TICK PROCESSING
    // ========================================================================

    /// Per-tick update; the step order matters
    pub fn process_channel(&mut self, shared: &mut C::Shared, instruments: &dyn InstrumentSource) {
        if let Some(row) = self.core.delayed.as_mut() {
            if row.counter == 0 {
                let note = row.note;
                self.core.delayed = None;
                trace!("{}: delayed row due", self.core.id());
                self.play_note(note, shared, instruments);
            } else {
                row.counter -= 1;
            }
        }

        if self.core.tick_note_cut() {
            self.handle_cut(shared);
        }
        if self.core.tick_note_release() {
            self.handle_release(shared);
            self.release_note(shared);
        }
        self.core.tick_note_volume();
        self.core.tick_transpose();
        self.core.update_volume_slide();
        self.core.update_vibrato_tremolo();
        self.core.update_effects();

        let Self {
            core,
            chip,
            inst_handler,
        } = self;
        if let Some(handler) = inst_handler.as_mut() {
            handler.update_instrument(&mut ChannelAccess { core, chip, shared });
        }
    }

    /// Final period for the tick
    pub fn calculate_period(&self) -> i32 {
        self.core.calculate_period()
    }

    /// Final volume for the tick, using the chip's volume law
    pub fn calculate_volume(&self) -> i32 {
        self.chip.calculate_volume(&self.core)
    }

    /// Emit this channel's registers
    pub fn refresh(&mut self, shared: &mut C::Shared, writer: &mut dyn RegisterWriter) {
        self.chip.refresh_channel(&self.core, shared, writer);
    }

    /// End of tick: the trigger flag only lives for one tick
    pub fn finish_tick(&mut self) {
        self.core.trigger = false;
    }
}
