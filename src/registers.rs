//! Raw chip register writes.
//!
//! Channels never talk to a chip emulation directly. Every tick they emit
//! `(address, value)` pairs into a [`RegisterWriter`]; the physical transport
//! (memory-mapped bus, emulator core, log file) is up to the implementor.

use crate::chips::s5b::MixerFlags;

/// Sunsoft 5B register select port
pub const S5B_SELECT_PORT: u16 = 0xC000;

/// Sunsoft 5B register data port
pub const S5B_DATA_PORT: u16 = 0xE000;

/// Number of Sunsoft 5B registers (R0-R15)
pub const S5B_REGISTER_COUNT: usize = 16;

/// Envelope shape register; writing it restarts the envelope
pub const S5B_ENVELOPE_SHAPE_REGISTER: u8 = 13;

/// Sink for chip register writes
///
/// # Example
///
/// ```
/// use chiptrack::registers::{RegisterLog, RegisterWriter};
///
/// let mut log = RegisterLog::new();
/// log.write(0x4000, 0x30);
/// assert_eq!(log.writes(), &[(0x4000, 0x30)]);
/// ```
pub trait RegisterWriter {
    /// Write `value` to the chip address `address`
    fn write(&mut self, address: u16, value: u8);
}

impl<W: RegisterWriter + ?Sized> RegisterWriter for &mut W {
    fn write(&mut self, address: u16, value: u8) {
        (**self).write(address, value);
    }
}

/// Records every write in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterLog {
    writes: Vec<(u16, u8)>,
}

impl RegisterLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes so far, oldest first
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }

    /// Last value written to `address`
    pub fn last_write_to(&self, address: u16) -> Option<u8> {
        self.writes
            .iter()
            .rev()
            .find(|(a, _)| *a == address)
            .map(|(_, v)| *v)
    }

    /// Number of writes to `address`
    pub fn count_writes_to(&self, address: u16) -> usize {
        self.writes.iter().filter(|(a, _)| *a == address).count()
    }

    /// Drain the log
    pub fn take(&mut self) -> Vec<(u16, u8)> {
        std::mem::take(&mut self.writes)
    }

    /// Forget every write
    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

impl RegisterWriter for RegisterLog {
    fn write(&mut self, address: u16, value: u8) {
        self.writes.push((address, value));
    }
}

/// Sunsoft 5B register file decoded from select/data port writes
///
/// Writes to other addresses are ignored, so the file can sit behind a bus
/// shared with other chips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S5bRegisterFile {
    selected: u8,
    registers: [u8; S5B_REGISTER_COUNT],
    envelope_restarts: usize,
}

impl S5bRegisterFile {
    /// Create a file with every register cleared
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of register `index` (0 for indices past R15)
    pub fn register(&self, index: u8) -> u8 {
        self.registers
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    /// All 16 registers
    pub fn registers(&self) -> &[u8; S5B_REGISTER_COUNT] {
        &self.registers
    }

    /// Tone period of channel `channel` (12 bits)
    pub fn tone_period(&self, channel: u8) -> u16 {
        let lo = self.register(channel * 2) as u16;
        let hi = (self.register(channel * 2 + 1) & 0x0F) as u16;
        (hi << 8) | lo
    }

    /// Volume register of channel `channel` (bit 4 = envelope)
    pub fn volume(&self, channel: u8) -> u8 {
        self.register(8 + channel)
    }

    /// Decoded mixer register (R7)
    pub fn mixer(&self) -> MixerFlags {
        MixerFlags::from_register(self.register(7))
    }

    /// Envelope period (R11/R12)
    pub fn envelope_period(&self) -> u16 {
        u16::from_le_bytes([self.register(11), self.register(12)])
    }

    /// Number of envelope shape writes seen
    pub fn envelope_restarts(&self) -> usize {
        self.envelope_restarts
    }
}

impl RegisterWriter for S5bRegisterFile {
    fn write(&mut self, address: u16, value: u8) {
        match address {
            S5B_SELECT_PORT => self.selected = value & 0x0F,
            S5B_DATA_PORT => {
                self.registers[self.selected as usize] = value;
                if self.selected == S5B_ENVELOPE_SHAPE_REGISTER {
                    self.envelope_restarts += 1;
                }
            }
            _ => {}
        }
    }
}
