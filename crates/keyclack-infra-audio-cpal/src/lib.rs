mod mixer;

pub use mixer::{mixer, MixerChannel, VoiceMixer};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, HostId, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfig, SupportedStreamConfigRange,
};
use keyclack_ports::audio::{
    AudioError, AudioOutputPort, AudioRenderCallback, ChannelBackend, PlaybackChannel,
};
use keyclack_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, PcmFormat};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Fallback scratch size when the device does not pin its buffer length.
const DEFAULT_SCRATCH_FRAMES: usize = 8192;

/// Output devices of one cpal host. Devices are addressed by their cpal name.
pub struct CpalAudioOutput {
    host_id: HostId,
}

impl CpalAudioOutput {
    pub fn new() -> Self {
        Self {
            host_id: cpal::default_host().id(),
        }
    }

    pub fn with_host_id(host_id: HostId) -> Self {
        Self { host_id }
    }

    fn host(host_id: HostId) -> Result<cpal::Host, AudioError> {
        cpal::host_from_id(host_id).map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
    }

    fn find_device(host: &cpal::Host, device_id: Option<&DeviceId>) -> Result<cpal::Device, AudioError> {
        let Some(wanted) = device_id else {
            return host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default output".to_string()));
        };
        host.output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?
            .find(|device| device.name().is_ok_and(|name| name == wanted.0))
            .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string()))
    }

    /// Prefers the requested rate; falls back to the device default so the engine renders
    /// its pools at whatever rate the device runs.
    fn stream_config(
        device: &cpal::Device,
        desired: AudioConfig,
    ) -> Result<(StreamConfig, SampleFormat), AudioError> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        let chosen = match pick_config(supported, desired) {
            Some(chosen) => chosen,
            None => {
                let fallback = device
                    .default_output_config()
                    .map_err(|e| AudioError::UnsupportedConfig(e.to_string()))?;
                log::warn!(
                    "no {} Hz output stream, using device default {} Hz x{}",
                    desired.sample_rate_hz,
                    fallback.sample_rate().0,
                    fallback.channels()
                );
                fallback
            }
        };
        let sample_format = chosen.sample_format();
        let mut config = chosen.config();
        config.buffer_size = match desired.buffer_size_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };
        Ok((config, sample_format))
    }
}

impl Default for CpalAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Open output stream plus the mixer channels feeding it.
pub struct CpalChannelBackend {
    channels: Vec<Arc<MixerChannel>>,
    format: PcmFormat,
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl ChannelBackend for CpalChannelBackend {
    fn channels(&self) -> Vec<Arc<dyn PlaybackChannel>> {
        self.channels
            .iter()
            .map(|c| c.clone() as Arc<dyn PlaybackChannel>)
            .collect()
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
        for channel in &self.channels {
            channel.collect_retired();
        }
    }
}

impl AudioOutputPort for CpalAudioOutput {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let host = Self::host(self.host_id)?;
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        Ok(devices
            .filter_map(|device| {
                let name = device.name().ok()?;
                let config = device.default_output_config().ok()?;
                Some(AudioOutputDevice {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    id: DeviceId(name),
                    sample_rate_hz: config.sample_rate().0,
                    channels: config.channels(),
                })
            })
            .collect())
    }

    fn open_channels(
        &self,
        device_id: Option<&DeviceId>,
        config: AudioConfig,
        polyphony: usize,
    ) -> Result<Box<dyn ChannelBackend>, AudioError> {
        let host_id = self.host_id;
        let device_id = device_id.cloned();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel();

        // cpal streams are not Send, so the stream lives and dies on its own thread.
        let join_handle = thread::Builder::new()
            .name("keyclack-output".to_string())
            .spawn(move || {
                let opened = Self::host(host_id).and_then(|host| {
                    let device = Self::find_device(&host, device_id.as_ref())?;
                    let (stream_config, sample_format) = Self::stream_config(&device, config)?;
                    let sample_rate_hz = stream_config.sample_rate.0;
                    let (channels, voice_mixer) = mixer(sample_rate_hz, polyphony);
                    let stream = build_stream(&device, &stream_config, sample_format, voice_mixer)?;
                    stream
                        .play()
                        .map_err(|e| AudioError::Backend(e.to_string()))?;
                    log::info!(
                        "output open: {} at {} Hz x{}, {} voices",
                        device.name().unwrap_or_else(|_| "unnamed output".to_string()),
                        sample_rate_hz,
                        stream_config.channels,
                        channels.len()
                    );
                    Ok((stream, channels, sample_rate_hz))
                });
                match opened {
                    Ok((stream, channels, sample_rate_hz)) => {
                        let _ = ready_tx.send(Ok((channels, sample_rate_hz)));
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let (channels, sample_rate_hz) = ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;
        Ok(Box::new(CpalChannelBackend {
            channels,
            format: PcmFormat::stereo(sample_rate_hz),
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    voice_mixer: VoiceMixer,
) -> Result<cpal::Stream, AudioError> {
    let stream = match sample_format {
        SampleFormat::F32 => build_stream_for::<f32>(device, config, voice_mixer),
        SampleFormat::I16 => build_stream_for::<i16>(device, config, voice_mixer),
        SampleFormat::U16 => build_stream_for::<u16>(device, config, voice_mixer),
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "sample format {other:?}"
            )))
        }
    };
    stream.map_err(|e| AudioError::Backend(e.to_string()))
}

fn build_stream_for<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut voice_mixer: VoiceMixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let scratch = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => DEFAULT_SCRATCH_FRAMES,
    };
    let mut left = vec![0.0f32; scratch];
    let mut right = vec![0.0f32; scratch];

    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels.max(1);
            if frames > left.len() {
                left.resize(frames, 0.0);
                right.resize(frames, 0.0);
            }
            voice_mixer.render(&mut left[..frames], &mut right[..frames]);
            write_interleaved(data, channels, &left[..frames], &right[..frames]);
        },
        |err| log::error!("output stream error: {err}"),
        None,
    )
}

fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::F32 => 3,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 1,
        _ => 0,
    }
}

fn channel_rank(available: u16, desired: u16) -> u8 {
    if available == desired {
        2
    } else if available >= 2 {
        1
    } else {
        0
    }
}

/// Best range that can run at the requested rate: exact channel count first, then any
/// stereo-capable layout, then the mixer's preferred sample formats.
fn pick_config(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Option<SupportedStreamConfig> {
    ranges
        .into_iter()
        .filter(|r| format_rank(r.sample_format()) > 0)
        .filter(|r| {
            (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&desired.sample_rate_hz)
        })
        .max_by_key(|r| {
            (
                channel_rank(r.channels(), desired.channels),
                format_rank(r.sample_format()),
            )
        })
        .map(|r| r.with_sample_rate(SampleRate(desired.sample_rate_hz)))
}

/// Writes the stereo mix into a device buffer: mono devices get the average, channels past
/// the second are silent.
fn write_interleaved<T>(data: &mut [T], channels: usize, left: &[f32], right: &[f32])
where
    T: Sample + FromSample<f32>,
{
    if channels == 0 {
        return;
    }
    for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
        let l = left.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        let r = right.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        if channels == 1 {
            out[0] = T::from_sample((l + r) * 0.5);
            continue;
        }
        out[0] = T::from_sample(l);
        out[1] = T::from_sample(r);
        for s in &mut out[2..] {
            *s = T::EQUILIBRIUM;
        }
    }
}
