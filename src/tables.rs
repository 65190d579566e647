//! Note-period and vibrato lookup tables.
//!
//! Both tables are built once and shared read-only between channels via `Arc`.

use std::f64::consts::FRAC_PI_2;

use crate::settings::VibratoStyle;
use crate::{EngineError, Result};

/// Number of playable notes (C-0 .. B-7)
pub const NOTE_COUNT: usize = 96;

/// Vibrato table size: 16 depths × 16 quarter-wave phase steps
pub const VIBRATO_TABLE_LENGTH: usize = 256;

/// NTSC CPU clock feeding the 2A03 and the Sunsoft 5B
pub const NTSC_CPU_CLOCK_HZ: f64 = 1_789_773.0;

/// Frequency of the lowest note (C-0)
const BASE_FREQUENCY_HZ: f64 = 16.3516;

const SINE_VIBRATO_DEPTH: [f64; 16] = [
    1.0, 1.5, 2.5, 4.0, 5.0, 7.0, 10.0, 12.0, 14.0, 17.0, 22.0, 30.0, 44.0, 64.0, 96.0, 128.0,
];

const RAMP_VIBRATO_DEPTH: [f64; 16] = [
    1.0, 1.0, 2.0, 3.0, 4.0, 7.0, 8.0, 15.0, 16.0, 31.0, 32.0, 63.0, 64.0, 127.0, 128.0, 255.0,
];

/// Hardware period for each playable note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTable {
    periods: Vec<i32>,
}

impl NoteTable {
    /// Build a table from raw periods; exactly [`NOTE_COUNT`] entries are required.
    pub fn new(periods: Vec<u32>) -> Result<Self> {
        if periods.len() != NOTE_COUNT {
            return Err(EngineError::NoteTableLength {
                expected: NOTE_COUNT,
                actual: periods.len(),
            });
        }
        let periods = periods
            .into_iter()
            .map(|p| p.min(i32::MAX as u32) as i32)
            .collect();
        Ok(Self { periods })
    }

    /// 2A03 pulse periods for an NTSC clock (`clock / (16 f) - 1`)
    pub fn ntsc_2a03() -> Self {
        Self::from_divider(|freq| NTSC_CPU_CLOCK_HZ / (16.0 * freq) - 1.0)
    }

    /// Sunsoft 5B tone periods for an NTSC clock (`clock / (16 f)`)
    pub fn sunsoft() -> Self {
        Self::from_divider(|freq| NTSC_CPU_CLOCK_HZ / (16.0 * freq))
    }

    fn from_divider(divider: impl Fn(f64) -> f64) -> Self {
        let periods = (0..NOTE_COUNT)
            .map(|note| {
                let freq = BASE_FREQUENCY_HZ * 2f64.powf(note as f64 / 12.0);
                divider(freq).round().max(0.0) as i32
            })
            .collect();
        Self { periods }
    }

    /// Period for `note`, clamped into the table range
    pub fn period(&self, note: i32) -> i32 {
        let index = note.clamp(0, NOTE_COUNT as i32 - 1) as usize;
        self.periods[index]
    }

    /// All periods in note order
    pub fn periods(&self) -> &[i32] {
        &self.periods
    }
}

/// Quarter-wave vibrato lookup, indexed by `depth_nibble * 16 + phase`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibratoTable {
    values: [i32; VIBRATO_TABLE_LENGTH],
}

impl VibratoTable {
    /// Generate the table for a vibrato style
    pub fn new(style: VibratoStyle) -> Self {
        let mut values = [0; VIBRATO_TABLE_LENGTH];
        for depth in 0..16 {
            for phase in 0..16 {
                let value = match style {
                    VibratoStyle::Sine => {
                        let angle = (phase as f64 / 16.0) * FRAC_PI_2;
                        (angle.sin() * SINE_VIBRATO_DEPTH[depth]) as i32
                    }
                    VibratoStyle::Up => {
                        ((phase as f64 * RAMP_VIBRATO_DEPTH[depth]) / 16.0 + 1.0) as i32
                    }
                };
                values[depth * 16 + phase] = value;
            }
        }
        Self { values }
    }

    /// Raw entry; out-of-range indices read as zero
    pub fn get(&self, index: i32) -> i32 {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get(i))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for VibratoTable {
    fn default() -> Self {
        Self::new(VibratoStyle::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn note_table_rejects_wrong_length() {
        let err = NoteTable::new(vec![0; 12]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NoteTableLength {
                expected: NOTE_COUNT,
                actual: 12
            }
        ));
    }

    #[test]
    fn periods_fall_with_pitch() {
        for table in [NoteTable::ntsc_2a03(), NoteTable::sunsoft()] {
            assert!(table.periods().windows(2).all(|w| w[0] > w[1]));
        }
    }

    #[test]
    fn a4_matches_reference_period() {
        // A-4 = note 57 at 440 Hz: 1789773 / (16 * 440) - 1 = 253.2
        let table = NoteTable::ntsc_2a03();
        assert_eq!(table.period(57), 253);
        assert_eq!(NoteTable::sunsoft().period(57), 254);
    }

    #[test]
    fn note_lookup_clamps() {
        let table = NoteTable::sunsoft();
        assert_eq!(table.period(-4), table.period(0));
        assert_eq!(table.period(500), table.period(95));
    }

    #[test]
    fn sine_table_follows_quarter_wave() {
        let table = VibratoTable::new(VibratoStyle::Sine);
        assert_eq!(table.get(0), 0);
        let expected = (8.0f64 / 16.0 * FRAC_PI_2).sin() * 128.0;
        assert_abs_diff_eq!(table.get(15 * 16 + 8) as f64, expected, epsilon = 1.0);
        assert_eq!(table.get(-1), 0);
        assert_eq!(table.get(256), 0);
    }

    #[test]
    fn ramp_table_is_linear() {
        let table = VibratoTable::new(VibratoStyle::Up);
        assert_eq!(table.get(0), 1);
        assert_eq!(table.get(15 * 16 + 8), (8.0 * 255.0 / 16.0 + 1.0) as i32);
    }
}
