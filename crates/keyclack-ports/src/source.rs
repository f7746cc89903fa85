use crate::types::PcmFormat;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Interleaved float audio, already at the engine sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decodes container formats into the engine's float layout. Called only during reload.
pub trait SampleSourcePort: Send + Sync {
    fn load(&self, path: &Path, target: PcmFormat) -> Result<DecodedAudio, SourceError>;
}
