#![allow(dead_code)]

use keyclack_core::{BankContents, PoolSlot, SoundPool};
use keyclack_ports::audio::{ChannelBackend, PlaybackChannel};
use keyclack_ports::soundpack::{SoundpackError, SoundpackLoader, SoundpackResolver};
use keyclack_ports::source::{DecodedAudio, SampleSourcePort, SourceError};
use keyclack_ports::types::{Clip, PcmClip, PcmFormat, Volume01};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub const SR: u32 = 44_100;

#[derive(Clone, Debug, PartialEq)]
pub struct PlayRecord {
    pub frames: usize,
    pub gain: f32,
    pub fade_in_ms: u32,
}

#[derive(Default)]
pub struct MockChannel {
    busy: AtomicBool,
    end_events: AtomicU32,
    pub plays: Mutex<Vec<PlayRecord>>,
    pub stops: AtomicU32,
    pub fades: AtomicU32,
}

impl MockChannel {
    /// Simulates the clip running out.
    pub fn finish(&self) {
        if self.busy.swap(false, Ordering::SeqCst) {
            self.end_events.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().len()
    }
}

impl PlaybackChannel for MockChannel {
    fn play(&self, clip: Clip, gain: f32, fade_in_ms: u32) {
        self.busy.store(true, Ordering::SeqCst);
        self.plays.lock().push(PlayRecord {
            frames: clip.frames(),
            gain,
            fade_in_ms,
        });
    }

    fn stop(&self) {
        self.busy.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn fade_out(&self, _fade_ms: u32) {
        self.fades.fetch_add(1, Ordering::SeqCst);
        self.finish();
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn take_end_events(&self) -> u32 {
        self.end_events.swap(0, Ordering::SeqCst)
    }
}

pub fn mock_channels(n: usize) -> Vec<Arc<MockChannel>> {
    (0..n).map(|_| Arc::new(MockChannel::default())).collect()
}

pub fn as_playback(channels: &[Arc<MockChannel>]) -> Vec<Arc<dyn PlaybackChannel>> {
    channels
        .iter()
        .map(|c| c.clone() as Arc<dyn PlaybackChannel>)
        .collect()
}

pub fn total_plays(channels: &[Arc<MockChannel>]) -> usize {
    channels.iter().map(|c| c.play_count()).sum()
}

pub struct MockBackend {
    pub channels: Vec<Arc<MockChannel>>,
    pub closed: Arc<AtomicBool>,
}

impl ChannelBackend for MockBackend {
    fn channels(&self) -> Vec<Arc<dyn PlaybackChannel>> {
        as_playback(&self.channels)
    }

    fn format(&self) -> PcmFormat {
        PcmFormat::stereo(SR)
    }

    fn close(self: Box<Self>) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Decaying sine burst standing in for a recorded key click.
pub fn click(frames: usize) -> DecodedAudio {
    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / SR as f32;
            (t * 2.0 * std::f32::consts::PI * 1500.0).sin() * (-t * 300.0).exp() * 0.7
        })
        .collect();
    DecodedAudio {
        samples,
        channels: 1,
    }
}

/// Serves synthetic audio for the registered paths and `NotFound` for everything else.
#[derive(Default)]
pub struct MockSource {
    files: HashMap<PathBuf, DecodedAudio>,
}

impl MockSource {
    pub fn with(mut self, path: impl Into<PathBuf>, audio: DecodedAudio) -> Self {
        self.files.insert(path.into(), audio);
        self
    }
}

impl SampleSourcePort for MockSource {
    fn load(&self, path: &Path, _target: PcmFormat) -> Result<DecodedAudio, SourceError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.display().to_string()))
    }
}

/// Knows a single key and has no release sounds.
pub struct MockResolver {
    pub key_id: String,
    pub clip: Clip,
    pub volume: AtomicU32,
}

impl SoundpackResolver for MockResolver {
    fn resolve(&self, key_id: &str, is_release: bool) -> Option<Clip> {
        if is_release || key_id != self.key_id {
            return None;
        }
        Some(self.clip.clone())
    }

    fn set_volume(&self, volume: Volume01) {
        self.volume.store(volume.get().to_bits(), Ordering::SeqCst);
        self.clip.set_volume(volume);
    }
}

pub struct MockPackLoader;

impl SoundpackLoader for MockPackLoader {
    fn load_pack(
        &self,
        folder: &Path,
        format: PcmFormat,
    ) -> Result<Arc<dyn SoundpackResolver>, SoundpackError> {
        if !folder.ends_with("good-pack") {
            return Err(SoundpackError::NotFound(folder.display().to_string()));
        }
        Ok(Arc::new(MockResolver {
            key_id: "q".to_string(),
            clip: PcmClip::shared(format, vec![0; 16], Volume01::new(1.0)),
            volume: AtomicU32::new(0),
        }))
    }
}

pub fn clip_of(frames: usize) -> Clip {
    PcmClip::shared(PcmFormat::stereo(SR), vec![0; frames * 2], Volume01::new(1.0))
}

pub fn pool_of(sizes: &[usize]) -> Arc<SoundPool> {
    Arc::new(SoundPool::new(sizes.iter().map(|f| clip_of(*f)).collect()))
}

/// Contents where every slot holds `n` clips whose frame count encodes `slot * 100 + index`.
pub fn filled_contents(n: usize) -> BankContents {
    let mut contents = BankContents {
        volume: Volume01::new(1.0),
        ..BankContents::empty()
    };
    for slot in PoolSlot::ALL {
        let frames: Vec<usize> = (0..n).map(|i| slot.index() * 100 + i + 1).collect();
        contents.pools[slot.index()] = pool_of(&frames);
    }
    contents
}
