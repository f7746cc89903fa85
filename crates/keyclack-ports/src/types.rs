use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::{fmt, time::Duration};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

/// An output device as the host reports it. `id` is the device name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOutputDevice {
    pub id: DeviceId,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub is_default: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub channels: u16, // v1 fixed 2
    pub buffer_size_frames: Option<u32>,
}

/// Layout of every PCM buffer that crosses the engine boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn stereo(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            channels: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Volume01(pub f32);

impl Volume01 {
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

/// Immutable 16-bit interleaved clip. The only mutable part is the broadcast volume
/// level, which the sound bank writes on every volume change.
#[derive(Debug)]
pub struct PcmClip {
    format: PcmFormat,
    samples: Box<[i16]>,
    volume: AtomicU32,
}

pub type Clip = Arc<PcmClip>;

impl PcmClip {
    pub fn new(format: PcmFormat, samples: Vec<i16>, volume: Volume01) -> Self {
        Self {
            format,
            samples: samples.into_boxed_slice(),
            volume: AtomicU32::new(volume.get().to_bits()),
        }
    }

    pub fn shared(format: PcmFormat, samples: Vec<i16>, volume: Volume01) -> Clip {
        Arc::new(Self::new(format, samples, volume))
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        match self.format.channels {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate_hz == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.sample_rate_hz as f64)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: Volume01) {
        self.volume.store(volume.get().to_bits(), Ordering::Relaxed);
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
