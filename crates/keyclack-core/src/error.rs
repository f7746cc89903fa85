use keyclack_dsp::DspError;
use keyclack_ports::audio::AudioError;
use keyclack_ports::preset::PresetError;
use keyclack_ports::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid presets: {0}")]
    Preset(#[from] PresetError),
    #[error("pool build failed: {0}")]
    Dsp(#[from] DspError),
    #[error("invalid settings: {0}")]
    Config(String),
    #[error("engine output is closed")]
    Closed,
    #[error("engine already running")]
    AlreadyRunning,
    #[error("failed to spawn scheduling thread: {0}")]
    Spawn(String),
}
