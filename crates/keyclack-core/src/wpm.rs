use keyclack_ports::storage::WpmSettings;
use rand::{Rng, RngCore};
use std::collections::VecDeque;
use std::time::Instant;

const MIN_SAMPLES_FOR_WPM: usize = 4;
const MIN_SAMPLES_FOR_BURST: usize = 8;
const MIN_SAMPLES_FOR_RECENT: usize = 10;
const RECENT_INTERVALS: usize = 4;
const BURST_MIN: f64 = 0.7;
const BURST_MAX: f64 = 1.3;

/// Keystrokes per second times 12: five characters per word, sixty seconds per minute.
fn wpm_over(count: usize, span_s: f64) -> f64 {
    if count < 2 || span_s <= 0.0 {
        return 0.0;
    }
    (count - 1) as f64 / span_s * 12.0
}

/// Rolling typing-speed estimate over the most recent keystrokes.
#[derive(Debug)]
pub struct WpmTracker {
    stamps: VecDeque<Instant>,
    capacity: usize,
    ema_alpha: f64,
    ema_wpm: f64,
    burst: f64,
    fast_threshold: f64,
    fast_band: f64,
}

impl WpmTracker {
    pub fn new(settings: &WpmSettings) -> Self {
        let capacity = settings.window.max(MIN_SAMPLES_FOR_WPM);
        Self {
            stamps: VecDeque::with_capacity(capacity),
            capacity,
            ema_alpha: settings.ema_alpha.clamp(0.0, 1.0),
            ema_wpm: 0.0,
            burst: 1.0,
            fast_threshold: settings.fast_threshold_wpm,
            fast_band: settings.fast_band_wpm,
        }
    }

    /// Pushes a keystroke and refreshes the EMA.
    pub fn record_at(&mut self, at: Instant) {
        if self.stamps.len() >= self.capacity {
            self.stamps.pop_front();
        }
        self.stamps.push_back(at);
        let rolling = self.rolling_wpm();
        self.ema_wpm = self.ema_alpha * rolling + (1.0 - self.ema_alpha) * self.ema_wpm;
    }

    pub fn sample_count(&self) -> usize {
        self.stamps.len()
    }

    pub fn rolling_wpm(&self) -> f64 {
        if self.stamps.len() < MIN_SAMPLES_FOR_WPM {
            return 0.0;
        }
        match (self.stamps.front(), self.stamps.back()) {
            (Some(oldest), Some(newest)) => wpm_over(
                self.stamps.len(),
                newest.duration_since(*oldest).as_secs_f64(),
            ),
            _ => 0.0,
        }
    }

    pub fn ema_wpm(&self) -> f64 {
        self.ema_wpm
    }

    pub fn burst_factor(&self) -> f64 {
        self.burst
    }

    /// Returns `(base_wpm, burst_factor)`, updating the smoothed burst factor.
    pub fn burst_wpm(&mut self) -> (f64, f64) {
        let n = self.stamps.len();
        if n < MIN_SAMPLES_FOR_BURST {
            return (0.0, 1.0);
        }
        let base = self.rolling_wpm();
        if n >= MIN_SAMPLES_FOR_RECENT && base > 0.0 {
            let newest = self.stamps[n - 1];
            let start = self.stamps[n - 1 - RECENT_INTERVALS];
            let recent = wpm_over(
                RECENT_INTERVALS + 1,
                newest.duration_since(start).as_secs_f64(),
            );
            if recent > 0.0 {
                let ratio = (recent / base).clamp(BURST_MIN, BURST_MAX);
                self.burst = 0.6 * self.burst + 0.4 * ratio;
            }
        }
        (base, self.burst)
    }

    /// Probability of the fast pool: the EMA mapped linearly across the threshold band.
    pub fn fast_probability(&self) -> f64 {
        if self.fast_band <= 0.0 {
            return if self.ema_wpm >= self.fast_threshold { 1.0 } else { 0.0 };
        }
        let low = self.fast_threshold - self.fast_band / 2.0;
        ((self.ema_wpm - low) / self.fast_band).clamp(0.0, 1.0)
    }

    /// Draws the fast/slow decision against `rng`.
    pub fn choose_fast(&self, rng: &mut dyn RngCore) -> bool {
        let p = self.fast_probability();
        if p <= 0.0 {
            return false;
        }
        rng.gen::<f64>() < p
    }
}
