//! Instrument handlers and the sequence engine.
//!
//! A handler is owned by exactly one channel and replaced wholesale when the
//! channel switches to an instrument family it cannot play. It never touches
//! the channel directly; every read and write goes through the
//! [`ChannelInterface`] passed into each call.

use std::fmt;
use std::sync::Arc;

use super::sequence::{
    ArpeggioMode, PitchMode, Sequence, SequenceKind, SequenceSetting, ARPSCHEME_MAX,
    SEQUENCE_KIND_COUNT,
};
use super::Instrument;
use crate::channel::ChannelInterface;

/// Per-channel runtime behaviour of an instrument family
pub trait InstrumentHandler: fmt::Debug {
    /// Bind an instrument's data without restarting playback
    fn load_instrument(&mut self, instrument: Arc<Instrument>);

    /// Restart the instrument for a new note
    fn trigger_instrument(&mut self, channel: &mut dyn ChannelInterface);

    /// Enter the release part of the instrument
    fn release_instrument(&mut self, channel: &mut dyn ChannelInterface);

    /// Advance one tick
    fn update_instrument(&mut self, channel: &mut dyn ChannelInterface);

    /// Play state and cursor of a sequence slot, for display
    fn sequence_state(&self, _kind: SequenceKind) -> Option<(SeqPlayState, usize)> {
        None
    }
}

/// Play state of one sequence slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeqPlayState {
    /// No sequence bound
    #[default]
    Disabled,
    /// Items are being applied every tick
    Running,
    /// Ran past the last item; finalized on the next tick
    End,
    /// Finished
    Halt,
}

#[derive(Debug, Clone, Default)]
struct SequenceSlot {
    sequence: Option<Arc<Sequence>>,
    state: SeqPlayState,
    pointer: usize,
}

impl SequenceSlot {
    fn running(sequence: Arc<Sequence>) -> Self {
        Self {
            sequence: Some(sequence),
            state: SeqPlayState::Running,
            pointer: 0,
        }
    }

    fn trigger(&mut self) {
        if self.sequence.is_some() {
            self.state = SeqPlayState::Running;
            self.pointer = 0;
        }
    }

    fn release(&mut self) {
        let Some(sequence) = &self.sequence else {
            return;
        };
        if matches!(self.state, SeqPlayState::Running | SeqPlayState::End) {
            if let Some(point) = sequence.release_point() {
                self.pointer = point;
                self.state = SeqPlayState::Running;
            }
        }
    }

    /// Advance the cursor and resolve loop, release and end transitions
    fn step(&mut self, releasing: bool) {
        let Some(sequence) = &self.sequence else {
            return;
        };
        self.pointer += 1;

        let items = sequence.len();
        let release = sequence.release_point();
        let looping = sequence.loop_point();
        let at_release = release.map_or(false, |r| self.pointer == r + 1);

        if !(at_release || self.pointer >= items) {
            return;
        }

        match (looping, release) {
            // Sustain loop inside the part before the release point
            (Some(l), Some(r)) if !releasing && l < r => self.pointer = l,
            _ if self.pointer >= items => match looping {
                Some(l) if release.map_or(true, |r| l >= r) => self.pointer = l,
                _ => self.state = SeqPlayState::End,
            },
            // Hold on the release point until the note is released
            _ if !releasing => self.pointer -= 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DutyRouting {
    /// Duty items go to the duty selector only
    Duty,
    /// Duty items carry the Sunsoft 5B mode bits and the noise period
    SunsoftMode,
}

/// Sequence-driven instrument handler (the sequence engine)
///
/// Plays the volume, arpeggio, pitch, hi-pitch and duty sequences of the
/// loaded instrument, one item per tick while the channel is sounding.
#[derive(Debug, Clone)]
pub struct SeqInstHandler {
    instrument: Option<Arc<Instrument>>,
    slots: [SequenceSlot; SEQUENCE_KIND_COUNT],
    default_volume: i32,
    default_duty: i32,
    volume: i32,
    duty_param: i32,
    routing: DutyRouting,
}

impl SeqInstHandler {
    /// Generic handler with the channel's default volume and duty
    pub fn new(default_volume: i32, default_duty: i32) -> Self {
        Self {
            instrument: None,
            slots: Default::default(),
            default_volume,
            default_duty,
            volume: default_volume,
            duty_param: default_duty,
            routing: DutyRouting::Duty,
        }
    }

    /// Sunsoft 5B handler: duty items also set the noise period (low 5 bits)
    pub fn sunsoft(default_volume: i32, default_duty: i32) -> Self {
        Self {
            routing: DutyRouting::SunsoftMode,
            ..Self::new(default_volume, default_duty)
        }
    }

    /// Instrument currently bound
    pub fn instrument(&self) -> Option<&Arc<Instrument>> {
        self.instrument.as_ref()
    }

    /// Duty parameter restored on trigger
    pub fn duty_param(&self) -> i32 {
        self.duty_param
    }

    /// Volume restored on trigger
    pub fn volume(&self) -> i32 {
        self.volume
    }

    /// Apply one item. Returns false when the sequence setting is not
    /// understood for its kind.
    pub fn process_sequence(
        &self,
        channel: &mut dyn ChannelInterface,
        sequence: &Sequence,
        position: usize,
    ) -> bool {
        let value = sequence.item(position) as i32;
        match (sequence.kind(), sequence.setting()) {
            (SequenceKind::Volume, _) => {
                channel.set_volume(value);
                true
            }
            (SequenceKind::Arpeggio, SequenceSetting::Arpeggio(mode)) => {
                let period = match mode {
                    ArpeggioMode::Absolute => channel.trigger_note(channel.note() + value),
                    ArpeggioMode::Fixed => channel.trigger_note(value),
                    ArpeggioMode::Relative => {
                        channel.set_note(channel.note() + value);
                        channel.trigger_note(channel.note())
                    }
                    ArpeggioMode::Scheme => {
                        let offset = scheme_offset(value, channel.arp_param());
                        channel.trigger_note(channel.note() + offset)
                    }
                };
                channel.set_period(period);
                true
            }
            (SequenceKind::Pitch, SequenceSetting::Pitch(PitchMode::Relative)) => {
                channel.set_period(channel.period() + value);
                true
            }
            (SequenceKind::Pitch, SequenceSetting::Pitch(PitchMode::Absolute)) => {
                let base = channel.trigger_note(channel.note());
                channel.set_period(base + value);
                true
            }
            (SequenceKind::HiPitch, _) => {
                channel.set_period(channel.period() + (value << 4));
                true
            }
            (SequenceKind::Duty, _) => {
                match self.routing {
                    DutyRouting::Duty => channel.set_duty_period(value),
                    DutyRouting::SunsoftMode => {
                        // mode bits live in the top three bits of an unsigned byte
                        let value = value & 0xFF;
                        channel.set_duty_period(value);
                        channel.set_noise_period(value & 0x1F);
                    }
                }
                true
            }
            _ => false,
        }
    }
}

/// Decode a scheme arpeggio item: a signed 6-bit offset plus a 2-bit selector
/// that adds or subtracts a nibble of the arpeggio effect parameter.
pub fn scheme_offset(item: i32, arp_param: u8) -> i32 {
    let value = if item < 0 { item + 256 } else { item };
    let mut offset = value % 0x40;
    if offset > ARPSCHEME_MAX {
        offset -= 64;
    }
    match value / 0x40 {
        1 => offset + (arp_param >> 4) as i32,
        2 => offset + (arp_param & 0x0F) as i32,
        3 => offset - (arp_param & 0x0F) as i32,
        _ => offset,
    }
}

impl InstrumentHandler for SeqInstHandler {
    fn load_instrument(&mut self, instrument: Arc<Instrument>) {
        for kind in SequenceKind::ALL {
            let slot = &mut self.slots[kind.index()];
            match instrument.sequence(kind).filter(|s| !s.is_empty()) {
                None => *slot = SequenceSlot::default(),
                Some(sequence) => {
                    let same = slot
                        .sequence
                        .as_ref()
                        .map_or(false, |bound| Arc::ptr_eq(bound, sequence));
                    if !same || slot.state == SeqPlayState::Disabled {
                        *slot = SequenceSlot::running(Arc::clone(sequence));
                    }
                }
            }
        }
        self.instrument = Some(instrument);
    }

    fn trigger_instrument(&mut self, channel: &mut dyn ChannelInterface) {
        for slot in &mut self.slots {
            slot.trigger();
        }
        self.volume = self.default_volume;
        self.duty_param = self.default_duty;
        if channel.is_active() {
            channel.set_volume(self.default_volume);
        }
    }

    fn release_instrument(&mut self, channel: &mut dyn ChannelInterface) {
        if channel.is_releasing() {
            return;
        }
        for slot in &mut self.slots {
            slot.release();
        }
    }

    fn update_instrument(&mut self, channel: &mut dyn ChannelInterface) {
        if !channel.is_active() {
            return;
        }
        for index in 0..SEQUENCE_KIND_COUNT {
            let Some(sequence) = self.slots[index].sequence.clone() else {
                continue;
            };
            match self.slots[index].state {
                SeqPlayState::Running => {
                    let pointer = self.slots[index].pointer;
                    self.process_sequence(channel, &sequence, pointer);
                    self.slots[index].step(channel.is_releasing());
                }
                SeqPlayState::End => {
                    if sequence.setting() == SequenceSetting::Arpeggio(ArpeggioMode::Fixed) {
                        let period = channel.trigger_note(channel.note());
                        channel.set_period(period);
                    }
                    self.slots[index].state = SeqPlayState::Halt;
                }
                SeqPlayState::Halt | SeqPlayState::Disabled => {}
            }
        }
    }

    fn sequence_state(&self, kind: SequenceKind) -> Option<(SeqPlayState, usize)> {
        let slot = &self.slots[kind.index()];
        slot.sequence.as_ref().map(|_| (slot.state, slot.pointer))
    }
}
