use keyclack_ports::audio::PlaybackChannel;
use keyclack_ports::types::Clip;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed set of playback channels with round-robin stealing.
pub struct ChannelRing {
    channels: Vec<Arc<dyn PlaybackChannel>>,
    /// Set while a channel is handed out but not yet playing.
    claimed: Vec<AtomicBool>,
    steal_cursor: Mutex<usize>,
}

/// A channel reserved by [`ChannelRing::acquire`]. No other acquire selects it until the
/// claim is played or dropped.
pub struct VoiceClaim<'a> {
    ring: &'a ChannelRing,
    index: usize,
}

impl VoiceClaim<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn channel(&self) -> &Arc<dyn PlaybackChannel> {
        &self.ring.channels[self.index]
    }

    /// Starts playback, which marks the channel busy, then releases the reservation.
    pub fn play(self, clip: Clip, gain: f32, fade_in_ms: u32) {
        self.channel().play(clip, gain, fade_in_ms);
    }
}

impl Drop for VoiceClaim<'_> {
    fn drop(&mut self) {
        self.ring.claimed[self.index].store(false, Ordering::Release);
    }
}

impl ChannelRing {
    pub fn new(channels: Vec<Arc<dyn PlaybackChannel>>) -> Self {
        Self {
            claimed: channels.iter().map(|_| AtomicBool::new(false)).collect(),
            channels,
            steal_cursor: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn claim(&self, index: usize) -> VoiceClaim<'_> {
        self.claimed[index].store(true, Ordering::Release);
        VoiceClaim { ring: self, index }
    }

    fn is_taken(&self, index: usize) -> bool {
        self.claimed[index].load(Ordering::Acquire) || self.channels[index].is_busy()
    }

    /// Reserves a channel to play on and reports how many channels are playing or reserved
    /// besides it.
    ///
    /// The first free channel wins. With every channel taken, the unreserved channel at or
    /// after the steal cursor is hard-stopped and returned with an active count equal to the
    /// ring size. `None` only when the ring is empty or every channel is reserved.
    pub fn acquire(&self) -> Option<(VoiceClaim<'_>, usize)> {
        let mut cursor = self.steal_cursor.lock();
        let mut idle = None;
        let mut active = 0;
        for index in 0..self.channels.len() {
            if self.is_taken(index) {
                active += 1;
            } else if idle.is_none() {
                idle = Some(index);
            }
        }
        if let Some(index) = idle {
            return Some((self.claim(index), active));
        }

        let n = self.channels.len();
        for step in 0..n {
            let index = (*cursor + step) % n;
            if self.claimed[index].load(Ordering::Acquire) {
                continue;
            }
            self.channels[index].stop();
            *cursor = (index + 1) % n;
            log::debug!("voice {index} stolen, ring full at {n}");
            return Some((self.claim(index), n));
        }
        None
    }

    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_busy()).count()
    }

    /// Clears pending end-of-playback notifications, returning how many were pending.
    pub fn drain_end_events(&self) -> u32 {
        self.channels.iter().map(|c| c.take_end_events()).sum()
    }

    pub fn stop_all(&self) {
        for channel in &self.channels {
            channel.stop();
        }
    }

    pub fn fade_out_all(&self, fade_ms: u32) {
        for channel in &self.channels {
            if channel.is_busy() {
                channel.fade_out(fade_ms);
            }
        }
    }
}
