//! Global playback settings shared by every channel.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Vibrato waveform family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VibratoStyle {
    /// Bidirectional sine vibrato
    #[default]
    Sine,
    /// Legacy one-sided ramp vibrato (pitch only moves up)
    Up,
}

/// Settings consumed by the channel state machine.
///
/// ```
/// use chiptrack::PlaybackSettings;
///
/// let settings = PlaybackSettings::from_json(r#"{ "cut_volume": false }"#).unwrap();
/// assert!(!settings.cut_volume);
/// assert!(!settings.linear_pitch);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Let computed volume reach zero even while the instrument still contributes.
    /// When false a sounding channel never drops below volume 1.
    pub cut_volume: bool,
    /// Linear pitch mode: periods are `note << 5` plus fractional steps
    pub linear_pitch: bool,
    /// Vibrato table shape
    pub vibrato_style: VibratoStyle,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            cut_volume: true,
            linear_pitch: false,
            vibrato_style: VibratoStyle::Sine,
        }
    }
}

impl PlaybackSettings {
    /// Parse settings from a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize settings to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings = PlaybackSettings::from_json("{}").unwrap();
        assert_eq!(settings, PlaybackSettings::default());
    }

    #[test]
    fn vibrato_style_is_lowercase() {
        let settings = PlaybackSettings::from_json(r#"{"vibrato_style":"up","linear_pitch":true}"#)
            .unwrap();
        assert_eq!(settings.vibrato_style, VibratoStyle::Up);
        assert!(settings.linear_pitch);
        assert!(settings.cut_volume);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = PlaybackSettings::from_json("{ cut_volume: ").unwrap_err();
        assert!(err.to_string().starts_with("invalid settings"));
    }

    #[test]
    fn json_survives_serialization() {
        let settings = PlaybackSettings {
            cut_volume: false,
            linear_pitch: true,
            vibrato_style: VibratoStyle::Up,
        };
        let text = settings.to_json().unwrap();
        assert_eq!(PlaybackSettings::from_json(&text).unwrap(), settings);
    }
}
