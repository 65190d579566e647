//! Instrument sequences: ordered item lists with loop and release points.

/// Number of sequence kinds an instrument can carry
pub const SEQUENCE_KIND_COUNT: usize = 5;

/// Highest positive offset a scheme arpeggio item can encode; larger
/// 6-bit values wrap to negative offsets.
pub const ARPSCHEME_MAX: i32 = 36;

/// Parameter a sequence drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// Instrument volume
    Volume = 0,
    /// Note offset
    Arpeggio = 1,
    /// Fine period offset
    Pitch = 2,
    /// Coarse period offset (items × 16)
    HiPitch = 3,
    /// Duty / waveform selector
    Duty = 4,
}

impl SequenceKind {
    /// Every kind in slot order
    pub const ALL: [SequenceKind; SEQUENCE_KIND_COUNT] = [
        SequenceKind::Volume,
        SequenceKind::Arpeggio,
        SequenceKind::Pitch,
        SequenceKind::HiPitch,
        SequenceKind::Duty,
    ];

    /// Slot index of this kind
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// How arpeggio items are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArpeggioMode {
    /// Offset from the triggered note, note itself unchanged
    #[default]
    Absolute,
    /// Item is an absolute note
    Fixed,
    /// Offset accumulates into the note
    Relative,
    /// Offset plus a nibble of the channel's arpeggio effect parameter
    Scheme,
}

/// How pitch items are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitchMode {
    /// Items accumulate into the period
    #[default]
    Relative,
    /// Item added to the plain note period
    Absolute,
}

/// Kind-specific interpretation of the items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceSetting {
    /// Volume, hi-pitch and duty sequences
    #[default]
    Plain,
    /// Arpeggio sequences
    Arpeggio(ArpeggioMode),
    /// Pitch sequences
    Pitch(PitchMode),
}

/// One sequence as stored in an instrument
///
/// Loop and release points are kept as given; [`Sequence::loop_point`] and
/// [`Sequence::release_point`] report out-of-range points as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    kind: SequenceKind,
    items: Vec<i8>,
    loop_point: Option<usize>,
    release_point: Option<usize>,
    setting: SequenceSetting,
}

impl Sequence {
    /// Create a sequence with no loop or release point
    pub fn new(kind: SequenceKind, items: impl Into<Vec<i8>>) -> Self {
        let setting = match kind {
            SequenceKind::Arpeggio => SequenceSetting::Arpeggio(ArpeggioMode::default()),
            SequenceKind::Pitch => SequenceSetting::Pitch(PitchMode::default()),
            _ => SequenceSetting::Plain,
        };
        Self {
            kind,
            items: items.into(),
            loop_point: None,
            release_point: None,
            setting,
        }
    }

    /// Set the loop point
    pub fn with_loop(mut self, point: usize) -> Self {
        self.loop_point = Some(point);
        self
    }

    /// Set the release point
    pub fn with_release(mut self, point: usize) -> Self {
        self.release_point = Some(point);
        self
    }

    /// Set the arpeggio mode (arpeggio sequences only)
    pub fn with_arpeggio_mode(mut self, mode: ArpeggioMode) -> Self {
        if self.kind == SequenceKind::Arpeggio {
            self.setting = SequenceSetting::Arpeggio(mode);
        }
        self
    }

    /// Set the pitch mode (pitch sequences only)
    pub fn with_pitch_mode(mut self, mode: PitchMode) -> Self {
        if self.kind == SequenceKind::Pitch {
            self.setting = SequenceSetting::Pitch(mode);
        }
        self
    }

    /// Parameter this sequence drives
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Kind-specific setting
    pub fn setting(&self) -> SequenceSetting {
        self.setting
    }

    /// Item count
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the sequence has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`, zero past the end
    pub fn item(&self, index: usize) -> i8 {
        self.items.get(index).copied().unwrap_or(0)
    }

    /// Loop point, if it lies inside the sequence
    pub fn loop_point(&self) -> Option<usize> {
        self.loop_point.filter(|&p| p < self.items.len())
    }

    /// Release point, if it lies inside the sequence
    pub fn release_point(&self) -> Option<usize> {
        self.release_point.filter(|&p| p < self.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_points_read_as_absent() {
        let seq = Sequence::new(SequenceKind::Volume, vec![1, 2, 3])
            .with_loop(3)
            .with_release(9);
        assert_eq!(seq.loop_point(), None);
        assert_eq!(seq.release_point(), None);
        let seq = seq.with_loop(2).with_release(1);
        assert_eq!(seq.loop_point(), Some(2));
        assert_eq!(seq.release_point(), Some(1));
    }

    #[test]
    fn modes_only_apply_to_matching_kind() {
        let seq = Sequence::new(SequenceKind::Volume, vec![0]).with_arpeggio_mode(ArpeggioMode::Fixed);
        assert_eq!(seq.setting(), SequenceSetting::Plain);
        let seq = Sequence::new(SequenceKind::Arpeggio, vec![0]).with_arpeggio_mode(ArpeggioMode::Fixed);
        assert_eq!(seq.setting(), SequenceSetting::Arpeggio(ArpeggioMode::Fixed));
        let seq = Sequence::new(SequenceKind::Pitch, vec![0]);
        assert_eq!(seq.setting(), SequenceSetting::Pitch(PitchMode::Relative));
    }

    #[test]
    fn reading_past_the_end_yields_zero() {
        let seq = Sequence::new(SequenceKind::Duty, vec![2]);
        assert_eq!(seq.item(0), 2);
        assert_eq!(seq.item(5), 0);
    }
}
