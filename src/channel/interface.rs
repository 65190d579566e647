//! Capability surface a channel exposes to its instrument handler.

/// Channel operations available to instrument handlers
///
/// Handlers never hold on to a channel; they receive this interface for the
/// duration of one call.
pub trait ChannelInterface {
    /// Current note (-1 when none)
    fn note(&self) -> i32;
    /// Replace the current note without retriggering
    fn set_note(&mut self, note: i32);
    /// Raw period before vibrato and detune
    fn period(&self) -> i32;
    /// Set the raw period (limited to the chip's range)
    fn set_period(&mut self, period: i32);
    /// Instrument volume contribution
    fn volume(&self) -> i32;
    /// Set the instrument volume contribution
    fn set_volume(&mut self, volume: i32);
    /// Duty / waveform selector
    fn duty_period(&self) -> i32;
    /// Set the duty selector; the chip translates foreign duty values
    fn set_duty_period(&mut self, duty: i32);
    /// Period for `note` (clamped to the note range)
    fn trigger_note(&mut self, note: i32) -> i32;
    /// Channel is sounding
    fn is_active(&self) -> bool;
    /// Channel is in its release phase
    fn is_releasing(&self) -> bool;
    /// Parameter of the active arpeggio effect, 0 when none
    fn arp_param(&self) -> u8;
    /// Set the noise period on chips with a noise generator
    fn set_noise_period(&mut self, _period: i32) {}
}
