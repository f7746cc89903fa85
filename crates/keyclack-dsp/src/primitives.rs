//! Stateless processing stages over interleaved float PCM.
//!
//! Every stage borrows its input and returns a new buffer with the same channel layout.
//! Out-of-range parameters degrade to a copy rather than an error; only the resampler can
//! fail.

use crate::filter_cache::{butterworth, fade_ramp, FadeCurve, FilterKind};
use crate::resample::{limit_denominator, resample_lanes};
use crate::variation::DspError;

pub const MAX_RESAMPLE_DENOMINATOR: u64 = 150;
pub const PITCH_IDENTITY_TOLERANCE: f64 = 0.002;
pub const SILENCE_PEAK: f32 = 1e-7;

fn frames(audio: &[f32], channels: usize) -> usize {
    if channels == 0 {
        0
    } else {
        audio.len() / channels
    }
}

fn fade_frames(ms: f64, sample_rate: u32) -> usize {
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

/// Pitch shift by resampling with ratio `1 / factor`. All channels go through one
/// resampler pass so they come out the same length.
pub fn pitch_shift(audio: &[f32], factor: f64, channels: usize) -> Result<Vec<f32>, DspError> {
    if channels == 0 || (factor - 1.0).abs() < PITCH_IDENTITY_TOLERANCE {
        return Ok(audio.to_vec());
    }
    let Some((up, down)) = limit_denominator(1.0 / factor, MAX_RESAMPLE_DENOMINATOR) else {
        return Ok(audio.to_vec());
    };

    let n = frames(audio, channels);
    let lanes: Vec<Vec<f64>> = (0..channels)
        .map(|ch| (0..n).map(|f| audio[f * channels + ch] as f64).collect())
        .collect();
    let per_channel = resample_lanes(&lanes, up, down)?;
    let out_frames = per_channel.iter().map(Vec::len).min().unwrap_or(0);

    let mut out = vec![0.0f32; out_frames * channels];
    for (ch, lane) in per_channel.iter().enumerate() {
        for (f, v) in lane.iter().take(out_frames).enumerate() {
            out[f * channels + ch] = *v as f32;
        }
    }
    Ok(out)
}

fn normalized_cutoff(sample_rate: u32, cutoff_hz: f64) -> Option<f64> {
    let wn = cutoff_hz / (sample_rate as f64 / 2.0);
    (wn > 0.0 && wn < 1.0 && wn.is_finite()).then_some(wn)
}

/// 2nd-order Butterworth highpass, each channel filtered independently.
pub fn highpass(audio: &[f32], channels: usize, sample_rate: u32, cutoff_hz: f64) -> Vec<f32> {
    let Some(wn) = normalized_cutoff(sample_rate, cutoff_hz) else {
        return audio.to_vec();
    };
    let section = butterworth(FilterKind::Highpass, wn);
    let n = frames(audio, channels);
    let mut out = vec![0.0f32; audio.len()];
    let mut lane = vec![0.0f64; n];
    for ch in 0..channels {
        section.filter_channel(audio, channels, ch, &mut lane);
        for (f, v) in lane.iter().enumerate() {
            out[f * channels + ch] = *v as f32;
        }
    }
    out
}

/// Highpass whose output opens with an exponential fade, used for release clicks.
pub fn highpass_with_fade(
    audio: &[f32],
    channels: usize,
    sample_rate: u32,
    cutoff_hz: f64,
) -> Vec<f32> {
    let mut out = highpass(audio, channels, sample_rate, cutoff_hz);
    let fade_ms = if cutoff_hz >= 2000.0 { 2.5 } else { 3.0 };
    let len = fade_frames(fade_ms, sample_rate).min(frames(&out, channels));
    if len == 0 {
        return out;
    }
    let ramp = fade_ramp(FadeCurve::ExpPow, len);
    for (f, g) in ramp.iter().enumerate() {
        for ch in 0..channels {
            out[f * channels + ch] *= *g;
        }
    }
    out
}

fn shelf_boost(
    audio: &[f32],
    channels: usize,
    kind: FilterKind,
    wn: f64,
    linear_gain: f64,
    ramp: Option<&[f32]>,
) -> Vec<f32> {
    let section = butterworth(kind, wn);
    let n = frames(audio, channels);
    let mut out = vec![0.0f32; audio.len()];
    let mut lane = vec![0.0f64; n];
    for ch in 0..channels {
        section.filter_channel(audio, channels, ch, &mut lane);
        for (f, filtered) in lane.iter().enumerate() {
            let env = ramp
                .and_then(|r| r.get(f))
                .map(|g| *g as f64)
                .unwrap_or(1.0);
            let i = f * channels + ch;
            out[i] = (audio[i] as f64 + filtered * linear_gain * env) as f32;
        }
    }
    out
}

fn db_to_boost(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0) - 1.0
}

/// Low-shelf style boost: `x + lowpass(x) * (10^(dB/20) - 1)`.
pub fn bass_boost(
    audio: &[f32],
    channels: usize,
    sample_rate: u32,
    gain_db: f64,
    cutoff_hz: f64,
) -> Vec<f32> {
    if gain_db <= 0.0 {
        return audio.to_vec();
    }
    let Some(wn) = normalized_cutoff(sample_rate, cutoff_hz) else {
        return audio.to_vec();
    };
    shelf_boost(audio, channels, FilterKind::Lowpass, wn, db_to_boost(gain_db), None)
}

/// High-shelf style boost at half strength. The filtered component fades in linearly so
/// filter startup does not ring over the transient.
pub fn presence_boost(
    audio: &[f32],
    channels: usize,
    sample_rate: u32,
    gain_db: f64,
    cutoff_hz: f64,
) -> Vec<f32> {
    if gain_db <= 0.0 {
        return audio.to_vec();
    }
    let Some(wn) = normalized_cutoff(sample_rate, cutoff_hz) else {
        return audio.to_vec();
    };
    let fade_ms = presence_fade_ms(cutoff_hz);
    let len = fade_frames(fade_ms, sample_rate).min(frames(audio, channels));
    let ramp = fade_ramp(FadeCurve::Linear, len);
    shelf_boost(
        audio,
        channels,
        FilterKind::Highpass,
        wn,
        db_to_boost(gain_db) * 0.5,
        Some(&ramp[..]),
    )
}

pub fn presence_fade_ms(cutoff_hz: f64) -> f64 {
    if cutoff_hz > 3500.0 {
        1.5
    } else if cutoff_hz >= 2000.0 {
        2.0
    } else {
        2.5
    }
}

/// Single-tap echo: `out[n] = x[n] + decay * x[n - delay]`.
pub fn reverb_tail(
    audio: &[f32],
    channels: usize,
    sample_rate: u32,
    decay: f64,
    delay_s: f64,
) -> Vec<f32> {
    let delay_n = (delay_s.max(0.0) * sample_rate as f64) as usize * channels;
    let mut out = audio.to_vec();
    if delay_n >= audio.len() {
        return out;
    }
    let decay = decay as f32;
    for (dst, src) in out[delay_n..].iter_mut().zip(audio.iter()) {
        *dst += src * decay;
    }
    out
}

pub fn peak(audio: &[f32]) -> f32 {
    audio.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

/// Scales so the absolute peak equals `target`. Near-silent input is returned unchanged.
pub fn normalize(audio: &[f32], target: f64) -> Vec<f32> {
    let peak = peak(audio);
    if peak <= SILENCE_PEAK {
        return audio.to_vec();
    }
    let scale = (target / peak as f64) as f32;
    audio.iter().map(|v| v * scale).collect()
}

pub fn scale_clamped(audio: &[f32], gain: f64) -> Vec<f32> {
    let gain = gain as f32;
    audio.iter().map(|v| (v * gain).clamp(-1.0, 1.0)).collect()
}

pub fn scale(audio: &[f32], gain: f64) -> Vec<f32> {
    let gain = gain as f32;
    audio.iter().map(|v| v * gain).collect()
}
