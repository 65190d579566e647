//! Echo buffer: recent notes recalled by `^n` pseudo-notes.

use crate::pattern::{EffectType, Note, PatternNote};
use crate::tables::NOTE_COUNT;

/// Number of notes remembered
pub const ECHO_BUFFER_LENGTH: usize = 4;

/// One remembered note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoSlot {
    /// Nothing played
    #[default]
    Empty,
    /// A note cut
    Halt,
    /// A pitched note (after semitone-slide / transpose adjustment)
    Note(u8),
}

/// Most recent note first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EchoBuffer {
    slots: [EchoSlot; ECHO_BUFFER_LENGTH],
}

impl EchoBuffer {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot `index` steps back, `None` past the buffer length
    pub fn get(&self, index: usize) -> Option<EchoSlot> {
        self.slots.get(index).copied()
    }

    /// Shift every slot back by one and store `slot` as the most recent
    pub fn push(&mut self, slot: EchoSlot) {
        self.slots.copy_within(0..ECHO_BUFFER_LENGTH - 1, 1);
        self.slots[0] = slot;
    }

    /// Push the (already echo-resolved) note of a row
    ///
    /// Pitched notes are stored with the semitone offset of the last slide or
    /// transpose column applied, so a later echo lands on the pitch the row
    /// ended up at.
    pub fn push_note(&mut self, cell: &PatternNote) {
        let slot = match cell.note {
            Note::Halt => EchoSlot::Halt,
            Note::On(midi) => EchoSlot::Note(adjusted_note(midi, cell)),
            Note::None | Note::Release | Note::Echo(_) => EchoSlot::Empty,
        };
        self.push(slot);
    }

    /// Forget every note
    pub fn clear(&mut self) {
        self.slots = [EchoSlot::Empty; ECHO_BUFFER_LENGTH];
    }
}

fn adjusted_note(midi: u8, cell: &PatternNote) -> u8 {
    let mut value = midi as i32;
    for cmd in cell.effects.iter().rev() {
        let semitones = (cmd.param & 0x0F) as i32;
        match cmd.kind {
            EffectType::SlideUp => {
                value += semitones;
                break;
            }
            EffectType::SlideDown => {
                value -= semitones;
                break;
            }
            EffectType::Transpose => {
                if cmd.param & 0x80 != 0 {
                    value -= semitones;
                } else {
                    value += semitones;
                }
                break;
            }
            _ => {}
        }
    }
    value.clamp(0, NOTE_COUNT as i32 - 1) as u8
}
