use keyclack_ports::source::{DecodedAudio, SampleSourcePort, SourceError};
use keyclack_ports::types::PcmFormat;
use std::io::ErrorKind;
use std::path::Path;

/// WAV decoder for the sound files and custom bindings.
///
/// Integer and float PCM are read as floats in [-1, 1]. Mono stays mono, anything wider
/// keeps its first two channels, and the result is linearly resampled to the target rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct HoundSampleSource;

impl HoundSampleSource {
    pub fn new() -> Self {
        Self
    }
}

impl SampleSourcePort for HoundSampleSource {
    fn load(&self, path: &Path, target: PcmFormat) -> Result<DecodedAudio, SourceError> {
        let mut reader = hound::WavReader::open(path).map_err(|e| map_error(path, e))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| map_error(path, e))?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(SourceError::UnsupportedFormat(format!(
                        "{}: {} bit integer samples",
                        path.display(),
                        spec.bits_per_sample
                    )));
                }
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| map_error(path, e))?
            }
        };

        if spec.channels == 0 {
            return Err(SourceError::UnsupportedFormat(format!(
                "{}: no channels",
                path.display()
            )));
        }
        let (samples, channels) = keep_two_channels(samples, spec.channels);
        let samples = resample_linear(&samples, channels, spec.sample_rate, target.sample_rate_hz);
        log::debug!(
            "decoded {}: {} Hz x{} -> {} frames at {} Hz",
            path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len() / channels as usize,
            target.sample_rate_hz
        );
        Ok(DecodedAudio { samples, channels })
    }
}

fn map_error(path: &Path, err: hound::Error) -> SourceError {
    match err {
        hound::Error::IoError(io) if io.kind() == ErrorKind::NotFound => {
            SourceError::NotFound(path.display().to_string())
        }
        hound::Error::FormatError(msg) => {
            SourceError::UnsupportedFormat(format!("{}: {msg}", path.display()))
        }
        hound::Error::Unsupported => {
            SourceError::UnsupportedFormat(format!("{}: unsupported wav layout", path.display()))
        }
        other => SourceError::Decode(format!("{}: {other}", path.display())),
    }
}

fn keep_two_channels(samples: Vec<f32>, channels: u16) -> (Vec<f32>, u16) {
    if channels <= 2 {
        return (samples, channels);
    }
    let out = samples
        .chunks_exact(channels as usize)
        .flat_map(|frame| [frame[0], frame[1]])
        .collect();
    (out, 2)
}

/// Linear interpolation between neighbouring frames.
pub fn resample_linear(samples: &[f32], channels: u16, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / channels;
    if frames == 0 {
        return Vec::new();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_frames = (frames as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_frames * channels);

    for i in 0..out_frames {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        if idx + 1 >= frames {
            let last = (frames - 1) * channels;
            out.extend_from_slice(&samples[last..last + channels]);
        } else {
            let a = idx * channels;
            let b = a + channels;
            for ch in 0..channels {
                out.push(samples[a + ch] * (1.0 - frac) + samples[b + ch] * frac);
            }
        }
    }
    out
}
