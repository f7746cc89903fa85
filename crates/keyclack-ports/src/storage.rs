use crate::preset::PresetSet;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Binding key whose value names a soundpack folder instead of a single sound file.
pub const PACK_FOLDER_KEY: &str = "__pack_folder__";

fn default_sample_rate_hz() -> u32 {
    44_100
}

fn default_channels() -> u16 {
    2
}

fn default_buffer_size_frames() -> Option<u32> {
    Some(512)
}

fn default_polyphony() -> usize {
    32
}

fn default_queue_capacity() -> usize {
    128
}

fn default_batch_max() -> usize {
    32
}

fn default_loop_timeout_ms() -> u64 {
    1
}

fn default_housekeeping_interval() -> u32 {
    40
}

fn default_pool_size() -> usize {
    12
}

fn default_normalize_target() -> f64 {
    0.25
}

fn default_jitter_min_ms() -> f64 {
    0.5
}

fn default_jitter_max_ms() -> f64 {
    1.5
}

fn default_sound_dir() -> PathBuf {
    PathBuf::from("sounds")
}

fn default_key_file() -> String {
    "key.wav".to_string()
}

fn default_mouse_file() -> String {
    "mouse.wav".to_string()
}

fn default_wpm_window() -> usize {
    15
}

fn default_fast_threshold_wpm() -> f64 {
    70.0
}

fn default_fast_band_wpm() -> f64 {
    20.0
}

fn default_ema_alpha() -> f64 {
    0.3
}

fn default_fast_pitch_add() -> f64 {
    0.02
}

fn default_fast_reverb_scale() -> f64 {
    0.8
}

fn default_volume() -> Volume01 {
    Volume01::new(0.8)
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub device: Option<DeviceId>,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_buffer_size_frames")]
    pub buffer_size_frames: Option<u32>,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate_hz: default_sample_rate_hz(),
            channels: default_channels(),
            buffer_size_frames: default_buffer_size_frames(),
        }
    }
}

impl MixerSettings {
    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate_hz: self.sample_rate_hz,
            channels: self.channels,
            buffer_size_frames: self.buffer_size_frames,
        }
    }

    /// Every rendered clip is stereo regardless of the device channel count.
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat::stereo(self.sample_rate_hz)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    #[serde(default = "default_polyphony")]
    pub polyphony: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,
    #[serde(default = "default_loop_timeout_ms")]
    pub loop_timeout_ms: u64,
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval: u32,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_normalize_target")]
    pub normalize_target: f64,
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: f64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: f64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            polyphony: default_polyphony(),
            queue_capacity: default_queue_capacity(),
            batch_max: default_batch_max(),
            loop_timeout_ms: default_loop_timeout_ms(),
            housekeeping_interval: default_housekeeping_interval(),
            pool_size: default_pool_size(),
            normalize_target: default_normalize_target(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundFiles {
    #[serde(default = "default_sound_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_key_file")]
    pub key: String,
    #[serde(default = "default_mouse_file")]
    pub mouse: String,
    /// Falls back to `mouse` when absent.
    pub mouse_middle: Option<String>,
}

impl Default for SoundFiles {
    fn default() -> Self {
        Self {
            dir: default_sound_dir(),
            key: default_key_file(),
            mouse: default_mouse_file(),
            mouse_middle: None,
        }
    }
}

impl SoundFiles {
    pub fn key_path(&self) -> PathBuf {
        self.dir.join(&self.key)
    }

    pub fn mouse_path(&self) -> PathBuf {
        self.dir.join(&self.mouse)
    }

    pub fn mouse_middle_path(&self) -> PathBuf {
        self.dir.join(self.mouse_middle.as_deref().unwrap_or(&self.mouse))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WpmSettings {
    #[serde(default = "default_wpm_window")]
    pub window: usize,
    #[serde(default = "default_fast_threshold_wpm")]
    pub fast_threshold_wpm: f64,
    #[serde(default = "default_fast_band_wpm")]
    pub fast_band_wpm: f64,
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    #[serde(default = "default_fast_pitch_add")]
    pub fast_pitch_add: f64,
    #[serde(default = "default_fast_reverb_scale")]
    pub fast_reverb_scale: f64,
}

impl Default for WpmSettings {
    fn default() -> Self {
        Self {
            window: default_wpm_window(),
            fast_threshold_wpm: default_fast_threshold_wpm(),
            fast_band_wpm: default_fast_band_wpm(),
            ema_alpha: default_ema_alpha(),
            fast_pitch_add: default_fast_pitch_add(),
            fast_reverb_scale: default_fast_reverb_scale(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub mixer: MixerSettings,
    pub engine: EngineTuning,
    pub sounds: SoundFiles,
    pub wpm: WpmSettings,
    #[serde(default = "default_volume")]
    pub volume: Volume01,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mixer: MixerSettings::default(),
            engine: EngineTuning::default(),
            sounds: SoundFiles::default(),
            wpm: WpmSettings::default(),
            volume: default_volume(),
        }
    }
}

/// Persisted per-key overrides. On disk this is a flat `key_id -> path` map where the
/// [`PACK_FOLDER_KEY`] entry names a soundpack folder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, PathBuf>", into = "BTreeMap<String, PathBuf>")]
pub struct KeyBindings {
    sounds: BTreeMap<String, PathBuf>,
    pack_folder: Option<PathBuf>,
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_sound(&mut self, key_id: impl Into<String>, path: impl Into<PathBuf>) {
        let key_id = key_id.into();
        if key_id == PACK_FOLDER_KEY {
            self.pack_folder = Some(path.into());
        } else {
            self.sounds.insert(key_id, path.into());
        }
    }

    pub fn unbind(&mut self, key_id: &str) -> bool {
        if key_id == PACK_FOLDER_KEY {
            return self.pack_folder.take().is_some();
        }
        self.sounds.remove(key_id).is_some()
    }

    pub fn set_pack_folder(&mut self, folder: Option<PathBuf>) {
        self.pack_folder = folder;
    }

    pub fn pack_folder(&self) -> Option<&Path> {
        self.pack_folder.as_deref()
    }

    pub fn sounds(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.sounds.iter().map(|(k, p)| (k.as_str(), p.as_path()))
    }

    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty() && self.pack_folder.is_none()
    }
}

impl From<BTreeMap<String, PathBuf>> for KeyBindings {
    fn from(raw: BTreeMap<String, PathBuf>) -> Self {
        let mut out = Self::default();
        for (key_id, path) in raw {
            if key_id.is_empty() || path.as_os_str().is_empty() {
                continue;
            }
            out.bind_sound(key_id, path);
        }
        out
    }
}

impl From<KeyBindings> for BTreeMap<String, PathBuf> {
    fn from(bindings: KeyBindings) -> Self {
        let mut raw = bindings.sounds;
        if let Some(folder) = bindings.pack_folder {
            raw.insert(PACK_FOLDER_KEY.to_string(), folder);
        }
        raw
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<EngineSettings, StorageError>;
    fn save_settings(&self, s: &EngineSettings) -> Result<(), StorageError>;
    fn load_presets(&self) -> Result<PresetSet, StorageError>;
    fn load_bindings(&self) -> Result<KeyBindings, StorageError>;
    fn save_bindings(&self, b: &KeyBindings) -> Result<(), StorageError>;
}
