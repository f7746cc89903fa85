use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PresetError {
    #[error("preset {preset}: field {field} {reason}")]
    Invalid {
        preset: String,
        field: &'static str,
        reason: String,
    },
}

/// `min + seed * range` for a seed in [0, 1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRange {
    pub min: f64,
    pub range: f64,
}

impl LinearRange {
    pub fn at(&self, seed: f64) -> f64 {
        self.min + seed * self.range
    }
}

/// Shelving boost: gain in dB and cutoff in Hz, both seed-interpolated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShelfRange {
    pub db_min: f64,
    pub db_range: f64,
    pub fc_min: f64,
    #[serde(default)]
    pub fc_range: f64,
}

/// Single-tap reverb: decay is linear gain, delay is seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReverbRange {
    pub decay_min: f64,
    pub decay_range: f64,
    pub delay_min: f64,
    pub delay_range: f64,
}

/// Release ("spring bounce") rendering of a key class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReleasePreset {
    pub enabled: bool,
    pub semitones: f64,
    #[serde(default)]
    pub semitone_range: f64,
    pub highpass_fc_hz: f64,
    pub volume_scale: f64,
    pub reverb: ReverbRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyPreset {
    pub pitch: LinearRange,
    #[serde(default)]
    pub bass: Option<ShelfRange>,
    #[serde(default)]
    pub presence: Option<ShelfRange>,
    pub reverb: ReverbRange,
    #[serde(default)]
    pub random_pitch: Option<LinearRange>,
    #[serde(default)]
    pub random_volume: Option<LinearRange>,
    #[serde(default)]
    pub release: Option<ReleasePreset>,
}

/// Every key class the pool builder renders. Required fields carry no serde defaults so a
/// malformed presets file fails at load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetSet {
    pub highpass_fc_hz: f64,
    pub normal_key: KeyPreset,
    pub heavy_key: KeyPreset,
    pub mouse_left: KeyPreset,
    pub mouse_middle: KeyPreset,
}

impl PresetSet {
    pub fn validate(&self, sample_rate_hz: u32) -> Result<(), PresetError> {
        let nyquist = sample_rate_hz as f64 / 2.0;
        check_cutoff("highpass_fc_hz", "highpass_fc_hz", self.highpass_fc_hz, nyquist)?;
        for (name, preset) in [
            ("normal_key", &self.normal_key),
            ("heavy_key", &self.heavy_key),
            ("mouse_left", &self.mouse_left),
            ("mouse_middle", &self.mouse_middle),
        ] {
            preset.validate(name, nyquist)?;
        }
        Ok(())
    }
}

impl KeyPreset {
    fn validate(&self, name: &str, nyquist: f64) -> Result<(), PresetError> {
        check_range(name, "pitch", self.pitch)?;
        if self.pitch.min <= 0.0 {
            return Err(invalid(name, "pitch", "must have a positive minimum"));
        }
        check_reverb(name, "reverb", &self.reverb)?;
        for (field, shelf) in [("bass", &self.bass), ("presence", &self.presence)] {
            if let Some(shelf) = shelf {
                check_range(name, field, LinearRange { min: shelf.db_min, range: shelf.db_range })?;
                check_cutoff(name, field, shelf.fc_min, nyquist)?;
                check_cutoff(name, field, shelf.fc_min + shelf.fc_range, nyquist)?;
            }
        }
        if let Some(random_pitch) = self.random_pitch {
            check_range(name, "random_pitch", random_pitch)?;
        }
        if let Some(random_volume) = self.random_volume {
            check_range(name, "random_volume", random_volume)?;
            if random_volume.min <= 0.0 {
                return Err(invalid(name, "random_volume", "must have a positive minimum"));
            }
        }
        if let Some(release) = &self.release {
            check_range(
                name,
                "release.semitones",
                LinearRange { min: release.semitones, range: release.semitone_range },
            )?;
            check_cutoff(name, "release.highpass_fc_hz", release.highpass_fc_hz, nyquist)?;
            if !release.volume_scale.is_finite() || release.volume_scale < 0.0 {
                return Err(invalid(name, "release.volume_scale", "must be non-negative"));
            }
            check_reverb(name, "release.reverb", &release.reverb)?;
        }
        Ok(())
    }
}

fn invalid(preset: &str, field: &'static str, reason: &str) -> PresetError {
    PresetError::Invalid {
        preset: preset.to_string(),
        field,
        reason: reason.to_string(),
    }
}

fn check_range(preset: &str, field: &'static str, range: LinearRange) -> Result<(), PresetError> {
    if !range.min.is_finite() || !range.range.is_finite() {
        return Err(invalid(preset, field, "must be finite"));
    }
    if range.range < 0.0 {
        return Err(invalid(preset, field, "must have a non-negative range"));
    }
    Ok(())
}

fn check_reverb(preset: &str, field: &'static str, reverb: &ReverbRange) -> Result<(), PresetError> {
    check_range(preset, field, LinearRange { min: reverb.decay_min, range: reverb.decay_range })?;
    check_range(preset, field, LinearRange { min: reverb.delay_min, range: reverb.delay_range })?;
    if reverb.decay_min < 0.0 || reverb.delay_min < 0.0 {
        return Err(invalid(preset, field, "must not be negative"));
    }
    Ok(())
}

fn check_cutoff(preset: &str, field: &'static str, hz: f64, nyquist: f64) -> Result<(), PresetError> {
    if !hz.is_finite() || hz <= 0.0 || hz >= nyquist {
        return Err(invalid(preset, field, "must lie between 0 Hz and Nyquist"));
    }
    Ok(())
}
