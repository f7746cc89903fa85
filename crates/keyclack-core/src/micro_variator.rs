use crate::sound_bank::PoolSlot;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

const HISTORY: usize = 4;
const BUCKET_HISTORY: usize = 3;
const PITCH_BUCKETS: usize = 8;
const PITCH_RETRIES: usize = 10;

const HALF_WIDTH_SLOW: f64 = 0.025;
const HALF_WIDTH_SPAN: f64 = 0.010;
const SAME_KEY_SCALE: f64 = 0.65;
const OTHER_KEY_SCALE: f64 = 1.20;
const BURST_START: f64 = 1.05;
const BURST_SPAN: f64 = 0.25;
const BURST_WIDEN: f64 = 0.15;

const VOL_JITTER_MIN: f64 = 0.962;
const VOL_JITTER_MAX: f64 = 1.038;
const RELEASE_BOOST: f64 = 1.16;
const SHORT_HOLD_S: f64 = 0.05;
const LONG_HOLD_S: f64 = 0.20;
const SHORT_HOLD_SCALE: f64 = 0.86;
const LONG_HOLD_SCALE: f64 = 1.16;
const RELEASE_WPM_START: f64 = 60.0;
const RELEASE_WPM_SPAN: f64 = 60.0;
const RELEASE_WPM_ATTEN: f64 = 0.12;

/// Release loudness by hold time: 0.86 under 50 ms, 1.16 over 200 ms, linear between.
pub fn duration_scale(duration_s: f64) -> f64 {
    if duration_s < SHORT_HOLD_S {
        SHORT_HOLD_SCALE
    } else if duration_s > LONG_HOLD_S {
        LONG_HOLD_SCALE
    } else {
        let t = (duration_s - SHORT_HOLD_S) / (LONG_HOLD_S - SHORT_HOLD_S);
        SHORT_HOLD_SCALE + t * (LONG_HOLD_SCALE - SHORT_HOLD_SCALE)
    }
}

/// Pitch half-width before the random draw.
pub fn pitch_half_width(ema_wpm: f64, is_same_key: bool, burst_factor: f64) -> f64 {
    let speed = (ema_wpm / 100.0).clamp(0.0, 1.0);
    let mut half_width = HALF_WIDTH_SLOW - HALF_WIDTH_SPAN * speed;
    half_width *= if is_same_key {
        SAME_KEY_SCALE
    } else {
        OTHER_KEY_SCALE
    };
    if burst_factor > BURST_START {
        let burst = ((burst_factor - BURST_START) / BURST_SPAN).clamp(0.0, 1.0);
        half_width *= 1.0 + BURST_WIDEN * burst;
    }
    half_width
}

/// Per-event pitch bias, loudness jitter and attack length.
///
/// Owns a single generator that is never re-seeded between calls.
pub struct MicroVariator {
    rng: SmallRng,
    recent: VecDeque<(PoolSlot, usize)>,
    recent_buckets: VecDeque<usize>,
    last_key: Option<String>,
    last_half_width: f64,
}

impl MicroVariator {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            recent: VecDeque::with_capacity(HISTORY),
            recent_buckets: VecDeque::with_capacity(BUCKET_HISTORY),
            last_key: None,
            last_half_width: HALF_WIDTH_SLOW,
        }
    }

    /// Whether `key_id` repeats the previous key, then remembers it. Falls back to the
    /// input's own previous key before anything has been observed.
    pub fn observe_key(&mut self, key_id: &str, input_last_key: &str) -> bool {
        let same = match self.last_key.as_deref() {
            Some(last) => last == key_id,
            None => !input_last_key.is_empty() && input_last_key == key_id,
        };
        if self.last_key.as_deref() != Some(key_id) {
            self.last_key = Some(key_id.to_string());
        }
        same
    }

    /// Signed pitch offset drawn uniformly within the current half-width. A draw landing
    /// in one of the last three buckets is retried up to ten times.
    pub fn pitch_offset(&mut self, ema_wpm: f64, is_same_key: bool, burst_factor: f64) -> f64 {
        let half_width = pitch_half_width(ema_wpm, is_same_key, burst_factor);
        self.last_half_width = half_width;
        if half_width <= 0.0 {
            return 0.0;
        }

        let mut offset = self.rng.gen_range(-half_width..=half_width);
        let mut bucket = bucket_of(offset, half_width);
        for _ in 0..PITCH_RETRIES {
            if !self.recent_buckets.contains(&bucket) {
                break;
            }
            offset = self.rng.gen_range(-half_width..=half_width);
            bucket = bucket_of(offset, half_width);
        }
        if self.recent_buckets.len() >= BUCKET_HISTORY {
            self.recent_buckets.pop_front();
        }
        self.recent_buckets.push_back(bucket);
        offset
    }

    /// Maps an offset from the last [`Self::pitch_offset`] call onto a pitch-ordered pool.
    pub fn pitch_bias_index(&self, offset: f64, pool_len: usize) -> Option<usize> {
        if pool_len == 0 {
            return None;
        }
        let span = 2.0 * self.last_half_width;
        let t = if span > 0.0 {
            ((offset + self.last_half_width) / span).clamp(0.0, 1.0)
        } else {
            0.5
        };
        Some((t * (pool_len - 1) as f64).round() as usize)
    }

    /// Draws a pitch offset and maps it onto a pool of `pool_len`. An index among the last
    /// four selections of `slot` is rejected so the caller falls back to a random pick.
    pub fn fresh_bias(
        &mut self,
        slot: PoolSlot,
        pool_len: usize,
        ema_wpm: f64,
        is_same_key: bool,
        burst_factor: f64,
    ) -> Option<usize> {
        let offset = self.pitch_offset(ema_wpm, is_same_key, burst_factor);
        self.pitch_bias_index(offset, pool_len)
            .filter(|index| !self.recently_selected(slot, *index))
    }

    pub fn recently_selected(&self, slot: PoolSlot, index: usize) -> bool {
        self.recent.contains(&(slot, index))
    }

    pub fn record_selection(&mut self, slot: PoolSlot, index: usize) {
        if self.recent.len() >= HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back((slot, index));
    }

    pub fn vol_scale(&mut self, is_release: bool, duration_s: f64, wpm: f64) -> f64 {
        let jitter = self.rng.gen_range(VOL_JITTER_MIN..=VOL_JITTER_MAX);
        if !is_release {
            return jitter;
        }
        let over = ((wpm - RELEASE_WPM_START) / RELEASE_WPM_SPAN).clamp(0.0, 1.0);
        jitter * RELEASE_BOOST * duration_scale(duration_s) * (1.0 - RELEASE_WPM_ATTEN * over)
    }

    pub fn fade_ms(&mut self, is_release: bool, is_mouse: bool) -> u32 {
        if is_release || is_mouse {
            1
        } else {
            self.rng.gen_range(1..=4)
        }
    }
}

impl Default for MicroVariator {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_of(offset: f64, half_width: f64) -> usize {
    let t = (offset + half_width) / (2.0 * half_width);
    ((t * PITCH_BUCKETS as f64) as usize).min(PITCH_BUCKETS - 1)
}
