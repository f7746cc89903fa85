use crate::primitives::{
    bass_boost, highpass, highpass_with_fade, normalize, pitch_shift, presence_boost,
    reverb_tail, scale, scale_clamped,
};
use keyclack_ports::preset::{KeyPreset, ReleasePreset, ShelfRange};
use keyclack_ports::source::DecodedAudio;
use rand::Rng;

pub const MIN_PITCH_FACTOR: f64 = 0.40;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DspError {
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u16),
    #[error("source audio is empty")]
    EmptySource,
    #[error("resampler: {0}")]
    Resample(String),
}

/// Settings shared by every render of one reload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderContext {
    pub sample_rate: u32,
    pub highpass_fc_hz: f64,
    pub normalize_target: f64,
}

/// Fast-typing adjustment applied to the fast press pools.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FastModifier {
    pub pitch_add: f64,
    pub reverb_scale: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shelf {
    pub gain_db: f64,
    pub cutoff_hz: f64,
}

/// Every parameter of one press render, derived from a single seed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariationParams {
    pub pitch: f64,
    pub bass: Option<Shelf>,
    pub presence: Option<Shelf>,
    pub reverb_decay: f64,
    pub reverb_delay_s: f64,
    pub volume: Option<f64>,
}

impl VariationParams {
    pub fn derive(preset: &KeyPreset, seed: f64, fast: Option<FastModifier>) -> Self {
        let mut pitch = preset.pitch.at(seed);
        if let Some(random_pitch) = preset.random_pitch {
            pitch += random_pitch.at(seed);
        }
        let mut reverb_decay = preset.reverb.decay_min + seed * preset.reverb.decay_range;
        if let Some(fast) = fast {
            pitch += fast.pitch_add;
            reverb_decay *= fast.reverb_scale;
        }
        let shelf = |s: &ShelfRange| Shelf {
            gain_db: s.db_min + seed * s.db_range,
            cutoff_hz: s.fc_min + seed * s.fc_range,
        };
        Self {
            pitch: pitch.max(MIN_PITCH_FACTOR),
            bass: preset.bass.as_ref().map(shelf),
            presence: preset.presence.as_ref().map(shelf),
            reverb_decay,
            reverb_delay_s: preset.reverb.delay_min + seed * preset.reverb.delay_range,
            volume: preset.random_volume.map(|v| v.at(seed)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReleaseParams {
    pub pitch: f64,
    pub highpass_fc_hz: f64,
    pub reverb_decay: f64,
    pub reverb_delay_s: f64,
    pub volume_scale: f64,
}

impl ReleaseParams {
    pub fn derive(release: &ReleasePreset, seed: f64) -> Self {
        let semitones = release.semitones + seed * release.semitone_range;
        Self {
            pitch: 2f64.powf(semitones / 12.0).max(MIN_PITCH_FACTOR),
            highpass_fc_hz: release.highpass_fc_hz,
            reverb_decay: release.reverb.decay_min + seed * release.reverb.decay_range,
            reverb_delay_s: release.reverb.delay_min + seed * release.reverb.delay_range,
            volume_scale: release.volume_scale,
        }
    }
}

/// One rendered clip: mono-centered interleaved stereo plus the pitch factor it was
/// rendered at.
#[derive(Clone, Debug, PartialEq)]
pub struct Variation {
    pub pcm: Vec<i16>,
    pub pitch: f64,
}

fn check_base(base: &DecodedAudio) -> Result<usize, DspError> {
    if base.is_empty() {
        return Err(DspError::EmptySource);
    }
    match base.channels {
        1 | 2 => Ok(base.channels as usize),
        other => Err(DspError::UnsupportedChannels(other)),
    }
}

pub fn render_press(
    base: &DecodedAudio,
    params: &VariationParams,
    ctx: &RenderContext,
) -> Result<Variation, DspError> {
    let ch = check_base(base)?;
    let sr = ctx.sample_rate;

    let mut proc = pitch_shift(&base.samples, params.pitch, ch)?;
    proc = highpass(&proc, ch, sr, ctx.highpass_fc_hz);
    if let Some(bass) = params.bass {
        proc = bass_boost(&proc, ch, sr, bass.gain_db, bass.cutoff_hz);
    }
    if let Some(presence) = params.presence {
        proc = presence_boost(&proc, ch, sr, presence.gain_db, presence.cutoff_hz);
    }
    proc = reverb_tail(&proc, ch, sr, params.reverb_decay, params.reverb_delay_s);
    proc = normalize(&proc, ctx.normalize_target);
    if let Some(volume) = params.volume {
        proc = scale_clamped(&proc, volume);
    }

    Ok(Variation {
        pcm: mono_center(&quantize(&proc), ch),
        pitch: params.pitch,
    })
}

pub fn render_release(
    base: &DecodedAudio,
    params: &ReleaseParams,
    ctx: &RenderContext,
) -> Result<Variation, DspError> {
    let ch = check_base(base)?;
    let sr = ctx.sample_rate;

    let mut proc = pitch_shift(&base.samples, params.pitch, ch)?;
    proc = highpass_with_fade(&proc, ch, sr, params.highpass_fc_hz);
    proc = reverb_tail(&proc, ch, sr, params.reverb_decay, params.reverb_delay_s);
    proc = normalize(&proc, ctx.normalize_target);
    proc = scale(&proc, params.volume_scale);

    Ok(Variation {
        pcm: mono_center(&quantize(&proc), ch),
        pitch: params.pitch,
    })
}

/// Draws one seed from `rng` and renders a press variant.
pub fn build_variation<R: Rng + ?Sized>(
    base: &DecodedAudio,
    preset: &KeyPreset,
    ctx: &RenderContext,
    rng: &mut R,
    fast: Option<FastModifier>,
) -> Result<Variation, DspError> {
    let seed: f64 = rng.gen();
    render_press(base, &VariationParams::derive(preset, seed, fast), ctx)
}

/// Draws one seed from `rng` and renders a release variant. `None` when the release
/// config is disabled.
pub fn build_release_variation<R: Rng + ?Sized>(
    base: &DecodedAudio,
    release: &ReleasePreset,
    ctx: &RenderContext,
    rng: &mut R,
) -> Result<Option<Variation>, DspError> {
    if !release.enabled {
        return Ok(None);
    }
    let seed: f64 = rng.gen();
    render_release(base, &ReleaseParams::derive(release, seed), ctx).map(Some)
}

/// Float to 16-bit with hard clipping.
pub fn quantize(audio: &[f32]) -> Vec<i16> {
    audio
        .iter()
        .map(|v| (v * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Interleaved stereo whose left and right samples are identical: stereo frames take the
/// average of both sides, mono frames are duplicated.
pub fn mono_center(pcm: &[i16], channels: usize) -> Vec<i16> {
    match channels {
        1 => pcm.iter().flat_map(|s| [*s, *s]).collect(),
        2 => pcm
            .chunks_exact(2)
            .flat_map(|lr| {
                let avg = ((lr[0] as i32 + lr[1] as i32) / 2) as i16;
                [avg, avg]
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Quantized interleaved stereo without centering; mono is duplicated.
pub fn quantize_stereo(base: &DecodedAudio) -> Result<Vec<i16>, DspError> {
    let ch = check_base(base)?;
    let pcm = quantize(&base.samples);
    Ok(match ch {
        1 => mono_center(&pcm, 1),
        _ => pcm,
    })
}
