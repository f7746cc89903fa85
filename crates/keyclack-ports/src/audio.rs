use crate::types::*;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// One playback voice slot.
///
/// Thread model:
/// - `play`/`stop`/`fade_out` are called only from the scheduling thread and must not block
/// - `is_busy`/`take_end_events` may be called from any thread
pub trait PlaybackChannel: Send + Sync {
    /// Start `clip` from its first frame, replacing whatever was playing.
    /// `gain` is the final linear gain; `fade_in_ms` is the attack ramp.
    fn play(&self, clip: Clip, gain: f32, fade_in_ms: u32);

    /// Hard stop: silent on the next rendered frame.
    fn stop(&self);

    fn fade_out(&self, fade_ms: u32);

    fn is_busy(&self) -> bool;

    /// Returns and clears the number of end-of-playback notifications since the last call.
    fn take_end_events(&self) -> u32;
}

/// An opened set of playback channels backed by one output stream.
pub trait ChannelBackend: Send {
    fn channels(&self) -> Vec<Arc<dyn PlaybackChannel>>;

    fn format(&self) -> PcmFormat;

    /// Releases the underlying device stream.
    fn close(self: Box<Self>);
}

/// Audio callback: must be realtime-safe.
pub trait AudioRenderCallback: Send + 'static {
    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]);
}

pub trait AudioOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError>;

    /// Opens `polyphony` channels on `device_id`, or on the default output when `None`.
    fn open_channels(
        &self,
        device_id: Option<&DeviceId>,
        config: AudioConfig,
        polyphony: usize,
    ) -> Result<Box<dyn ChannelBackend>, AudioError>;
}
