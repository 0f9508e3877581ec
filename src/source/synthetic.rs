//! Procedural Sample Source
//!
//! [`SyntheticSource`] computes every sample from its channel's
//! [`WavePattern`] on demand, so a 64 channel x 1,000,000 sample dataset
//! costs nothing to hold. Patterns are deterministic functions of the
//! sample index, which makes envelope results reproducible in tests.
//!
//! # Patterns
//!
//! - [`WavePattern::Constant`] - Fixed value
//! - [`WavePattern::Sine`] - Sinusoid with frequency (Hz) and amplitude
//! - [`WavePattern::Square`] - Square wave with a period in samples
//! - [`WavePattern::Sawtooth`] - Linear ramp that resets every period
//! - [`WavePattern::Spikes`] - Zero baseline with single-sample transients
//! - [`WavePattern::Noise`] - Seeded white noise

use super::{check_bounds, ContentChange, SampleBlock, SampleSource, SourceError, Subscribers};
use crate::types::ChannelInfo;
use crossbeam_channel::Sender;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// Waveform generating one channel's samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WavePattern {
    /// Constant value
    Constant(f32),
    /// Sine wave; `frequency` in Hz
    Sine {
        frequency: f64,
        amplitude: f32,
        offset: f32,
    },
    /// Square wave alternating between `+amplitude` and `-amplitude`
    Square { period: usize, amplitude: f32 },
    /// Ramp from 0 to `amplitude` over `period` samples
    Sawtooth { period: usize, amplitude: f32 },
    /// A single sample of height `amplitude` every `every` samples, starting at `phase`
    Spikes {
        every: usize,
        phase: usize,
        amplitude: f32,
    },
    /// Uniform noise in `[-amplitude, amplitude]`
    Noise { amplitude: f32, seed: u64 },
}

impl Default for WavePattern {
    fn default() -> Self {
        WavePattern::Sine {
            frequency: 10.0,
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

impl WavePattern {
    /// Value at a sample index
    pub fn sample(&self, index: usize, sample_rate: f64) -> f32 {
        match *self {
            WavePattern::Constant(v) => v,
            WavePattern::Sine {
                frequency,
                amplitude,
                offset,
            } => {
                let t = index as f64 / sample_rate;
                offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
            }
            WavePattern::Square { period, amplitude } => {
                let period = period.max(2);
                if index % period < period / 2 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            WavePattern::Sawtooth { period, amplitude } => {
                let period = period.max(1);
                amplitude * (index % period) as f32 / period as f32
            }
            WavePattern::Spikes {
                every,
                phase,
                amplitude,
            } => {
                let every = every.max(1);
                if index >= phase && (index - phase) % every == 0 {
                    amplitude
                } else {
                    0.0
                }
            }
            WavePattern::Noise { amplitude, seed } => {
                let bits = splitmix64(seed ^ index as u64);
                let unit = (bits >> 40) as f32 / (1u64 << 24) as f32;
                amplitude * (2.0 * unit - 1.0)
            }
        }
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// A Sample Source computing samples from per-channel patterns
#[derive(Debug)]
pub struct SyntheticSource {
    channels: Vec<ChannelInfo>,
    patterns: RwLock<Vec<WavePattern>>,
    sample_rate: f64,
    sample_count: usize,
    unreadable: Mutex<Vec<Range<usize>>>,
    subscribers: Subscribers,
    reads: AtomicU64,
}

impl SyntheticSource {
    /// Create a source where every channel uses `pattern`
    pub fn new(channels: Vec<ChannelInfo>, sample_rate: f64, sample_count: usize, pattern: WavePattern) -> Self {
        let patterns = vec![pattern; channels.len()];
        let channels = channels
            .into_iter()
            .enumerate()
            .map(|(index, mut info)| {
                info.index = index;
                info
            })
            .collect();
        Self {
            channels,
            patterns: RwLock::new(patterns),
            sample_rate,
            sample_count,
            unreadable: Mutex::new(Vec::new()),
            subscribers: Subscribers::default(),
            reads: AtomicU64::new(0),
        }
    }

    /// Replace one channel's pattern and notify subscribers
    pub fn set_pattern(&self, channel: usize, pattern: WavePattern) {
        {
            let mut patterns = self.patterns.write().unwrap_or_else(|e| e.into_inner());
            match patterns.get_mut(channel) {
                Some(slot) => *slot = pattern,
                None => return,
            }
        }
        self.subscribers.notify(ContentChange {
            channels: channel..channel + 1,
            samples: 0..self.sample_count,
        });
    }

    /// Builder-style pattern override, without notification
    pub fn with_pattern(self, channel: usize, pattern: WavePattern) -> Self {
        {
            let mut patterns = self.patterns.write().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = patterns.get_mut(channel) {
                *slot = pattern;
            }
        }
        self
    }

    /// Make reads that touch `samples` fail with an I/O error
    pub fn set_unreadable(&self, samples: Range<usize>) {
        let mut unreadable = self.unreadable.lock().unwrap_or_else(|e| e.into_inner());
        unreadable.push(samples);
    }

    /// Make every range readable again
    pub fn clear_unreadable(&self) {
        let mut unreadable = self.unreadable.lock().unwrap_or_else(|e| e.into_inner());
        unreadable.clear();
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Value of one raw sample, bypassing failure simulation
    pub fn value_at(&self, channel: usize, index: usize) -> f32 {
        let patterns = self.patterns.read().unwrap_or_else(|e| e.into_inner());
        patterns
            .get(channel)
            .map(|p| p.sample(index, self.sample_rate))
            .unwrap_or(0.0)
    }
}

impl SampleSource for SyntheticSource {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sample_count(&self) -> usize {
        self.sample_count
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_metadata(&self, index: usize) -> Option<ChannelInfo> {
        self.channels.get(index).cloned()
    }

    fn read(&self, channels: Range<usize>, samples: Range<usize>) -> Result<SampleBlock, SourceError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        check_bounds(&channels, &samples, self.channels.len(), self.sample_count)?;

        {
            let unreadable = self.unreadable.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(bad) = unreadable
                .iter()
                .find(|r| r.start < samples.end && samples.start < r.end)
            {
                return Err(SourceError::Io(format!("samples {:?} are unreadable", bad)));
            }
        }

        let patterns = self.patterns.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(channels.len() * samples.len());
        for pattern in &patterns[channels.clone()] {
            out.extend(samples.clone().map(|i| pattern.sample(i, self.sample_rate)));
        }
        let len = samples.len();
        SampleBlock::new(channels, samples.start, len, out)
            .ok_or_else(|| SourceError::Decode("block shape mismatch".to_string()))
    }

    fn on_content_changed(&self, subscriber: Sender<ContentChange>) {
        self.subscribers.add(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelType;
    use crossbeam_channel::unbounded;

    fn channels(n: usize) -> Vec<ChannelInfo> {
        (0..n)
            .map(|i| ChannelInfo::new(i, format!("EEG {:03}", i + 1), ChannelType::Eeg))
            .collect()
    }

    #[test]
    fn test_spikes_pattern() {
        let p = WavePattern::Spikes {
            every: 100,
            phase: 7,
            amplitude: 5.0,
        };
        assert_eq!(p.sample(7, 1000.0), 5.0);
        assert_eq!(p.sample(107, 1000.0), 5.0);
        assert_eq!(p.sample(8, 1000.0), 0.0);
        assert_eq!(p.sample(3, 1000.0), 0.0);
    }

    #[test]
    fn test_noise_is_deterministic_and_bounded() {
        let p = WavePattern::Noise {
            amplitude: 2.0,
            seed: 42,
        };
        for i in 0..1000 {
            let v = p.sample(i, 1.0);
            assert!((-2.0..=2.0).contains(&v));
            assert_eq!(v, p.sample(i, 1.0));
        }
    }

    #[test]
    fn test_large_dataset_reads() {
        let source = SyntheticSource::new(
            channels(64),
            1000.0,
            1_000_000,
            WavePattern::Sawtooth {
                period: 10,
                amplitude: 10.0,
            },
        );
        let block = source.read(60..64, 999_990..1_000_000).unwrap();
        assert_eq!(block.channel_count(), 4);
        assert_eq!(block.row(3)[0], 0.0);
        assert_eq!(block.row(3)[5], 5.0);
        assert!(source.read(0..1, 999_990..1_000_001).is_err());
    }

    #[test]
    fn test_set_pattern_notifies() {
        let source = SyntheticSource::new(channels(2), 100.0, 500, WavePattern::Constant(1.0));
        let (tx, rx) = unbounded();
        source.on_content_changed(tx);
        source.set_pattern(1, WavePattern::Constant(2.0));

        let change = rx.try_recv().unwrap();
        assert_eq!(change.channels, 1..2);
        assert_eq!(change.samples, 0..500);
        assert_eq!(source.value_at(1, 10), 2.0);
        assert_eq!(source.value_at(0, 10), 1.0);
    }
}
