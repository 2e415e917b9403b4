use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default sliding window for rate estimation.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
///
/// Fed from progress callbacks, which report cumulative totals; use
/// [`record_total`](Self::record_total) to convert them into deltas.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
    last_total: u64,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES),
                window_size: window_size.unwrap_or(DEFAULT_WINDOW),
                last_total: 0,
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap();
        push_sample(&mut s, bytes);
    }

    /// Records a cumulative total, sampling the delta since the last call.
    ///
    /// A total lower than the previous one (a resumed upload restarting its
    /// count) resets the baseline without sampling.
    pub fn record_total(&self, total: u64) {
        let mut s = self.inner.lock().unwrap();
        if total >= s.last_total {
            let delta = total - s.last_total;
            push_sample(&mut s, delta);
        }
        s.last_total = total;
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap();
        if s.samples.len() < 2 {
            return 0.0;
        }

        let first = &s.samples[0];
        let last = &s.samples[s.samples.len() - 1];
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // The first sample marks the window start; its bytes predate it.
        let bytes: u64 = s.samples[1..].iter().map(|sample| sample.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        let mut s = self.inner.lock().unwrap();
        s.samples.clear();
        s.last_total = 0;
    }
}

fn push_sample(s: &mut SpeedInner, bytes: u64) {
    let now = Instant::now();
    s.samples.push(SpeedSample {
        bytes,
        timestamp: now,
    });

    // Prune samples outside the window.
    if let Some(cutoff) = now.checked_sub(s.window_size) {
        s.samples.retain(|sample| sample.timestamp >= cutoff);
    }

    if s.samples.len() > s.max_samples {
        let excess = s.samples.len() - s.max_samples;
        s.samples.drain(..excess);
    }
}
