use crate::types::{Clip, PcmFormat, Volume01};
use std::path::Path;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum SoundpackError {
    #[error("soundpack not found: {0}")]
    NotFound(String),
    #[error("invalid soundpack: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Alternate sound source consulted before the built-in pools.
///
/// Called from the scheduling thread at dispatch rate: implementations pay their loading
/// cost up front and must not block per call.
pub trait SoundpackResolver: Send + Sync {
    /// Returns `None` when the pack has no sound for `key_id`. Packs have no release
    /// sounds, so `is_release == true` always yields `None`.
    fn resolve(&self, key_id: &str, is_release: bool) -> Option<Clip>;

    /// Applies the broadcast volume level to every clip the pack owns.
    fn set_volume(&self, _volume: Volume01) {}
}

pub trait SoundpackLoader: Send + Sync {
    fn load_pack(
        &self,
        folder: &Path,
        format: PcmFormat,
    ) -> Result<Arc<dyn SoundpackResolver>, SoundpackError>;
}
