//! Error types for engine construction and configuration.
//!
//! Row and tick processing never fail; these errors only surface when
//! tables, instruments or settings are handed to the engine.

use crate::chips::ChannelId;

/// Error types for playback engine setup
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Note table does not hold one period per playable note
    #[error("note table must hold {expected} periods, got {actual}")]
    NoteTableLength {
        /// Required entry count
        expected: usize,
        /// Supplied entry count
        actual: usize,
    },

    /// Instrument slot outside the instrument bank
    #[error("instrument index {index} out of range (max {max})")]
    InstrumentIndex {
        /// Requested slot
        index: u8,
        /// Number of slots
        max: usize,
    },

    /// Channel identifier not served by any chip in the engine
    #[error("no channel {0}")]
    UnknownChannel(ChannelId),

    /// Settings document could not be parsed
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
