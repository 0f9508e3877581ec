//! Data provider contracts consumed by the engine
//!
//! The engine never decodes files itself. Everything it draws comes from
//! two collaborators injected at construction time:
//!
//! - [`SampleSource`] - random-access reads over a channel x sample array,
//!   plus per-channel metadata and a content-change subscription
//! - [`EventSource`] - ordered event markers for a time range
//!
//! Two in-process implementations are provided for embedding and testing:
//!
//! - [`MemorySource`] - owns its samples and supports "apply processing"
//!   edits that notify subscribers
//! - [`SyntheticSource`] - generates samples procedurally so that datasets
//!   with millions of samples cost no memory
//!
//! # Content changes
//!
//! Subscribers register a crossbeam [`Sender`]; the source pushes one
//! [`ContentChange`] per processing step. The viewer drains these on the
//! UI thread and invalidates the affected cache blocks.

pub mod memory;
pub mod synthetic;

pub use memory::{EventList, MemorySource};
pub use synthetic::{SyntheticSource, WavePattern};

use crate::types::{ChannelInfo, EventMarker, TimeRange};
use crossbeam_channel::Sender;
use std::ops::Range;
use std::sync::Mutex;
use thiserror::Error;

/// Failures reported by a Sample Source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The underlying storage could not be read
    #[error("read failed: {0}")]
    Io(String),

    /// The stored data could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),

    /// The request reaches past the end of the dataset
    #[error("range out of bounds: channels {channels:?}, samples {samples:?}")]
    OutOfBounds {
        channels: Range<usize>,
        samples: Range<usize>,
    },
}

/// A rectangular block of raw samples, stored channel-major
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Channels covered (storage indices)
    pub channels: Range<usize>,
    /// First sample index
    pub start: usize,
    /// Samples per channel
    pub len: usize,
    data: Vec<f32>,
}

impl SampleBlock {
    /// Wrap channel-major data; `None` if the length does not match the shape
    pub fn new(channels: Range<usize>, start: usize, len: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != channels.len() * len {
            return None;
        }
        Some(Self {
            channels,
            start,
            len,
            data,
        })
    }

    /// Samples of the `local`-th channel in the block
    pub fn row(&self, local: usize) -> &[f32] {
        let offset = local * self.len;
        &self.data[offset..offset + self.len]
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Region of the dataset whose content changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub channels: Range<usize>,
    pub samples: Range<usize>,
}

/// Random-access provider of raw samples
///
/// Implementations must be `Send + Sync`: reads are issued from the fetch
/// worker threads while metadata is queried on the UI thread.
pub trait SampleSource: Send + Sync {
    /// Number of channels
    fn channel_count(&self) -> usize;

    /// Number of samples per channel
    fn sample_count(&self) -> usize;

    /// Sampling frequency in Hz
    fn sample_rate(&self) -> f64;

    /// Recording duration in seconds
    fn duration(&self) -> f64 {
        let rate = self.sample_rate();
        if rate > 0.0 {
            self.sample_count() as f64 / rate
        } else {
            0.0
        }
    }

    /// Metadata for a storage index
    fn channel_metadata(&self, index: usize) -> Option<ChannelInfo>;

    /// Read a `channels x samples` block
    fn read(&self, channels: Range<usize>, samples: Range<usize>) -> Result<SampleBlock, SourceError>;

    /// Register a subscriber for content changes
    fn on_content_changed(&self, subscriber: Sender<ContentChange>);
}

/// Provider of instantaneous event markers
pub trait EventSource: Send + Sync {
    /// Events whose time lies within `range`, ordered by time
    fn events_in(&self, range: TimeRange) -> Vec<EventMarker>;
}

/// Subscriber list shared by the bundled sources
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<Sender<ContentChange>>>,
}

impl Subscribers {
    pub(crate) fn add(&self, sender: Sender<ContentChange>) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.push(sender);
    }

    /// Send to every live subscriber, dropping disconnected ones
    pub(crate) fn notify(&self, change: ContentChange) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

/// Check a request against the dataset shape
pub(crate) fn check_bounds(
    channels: &Range<usize>,
    samples: &Range<usize>,
    channel_count: usize,
    sample_count: usize,
) -> Result<(), SourceError> {
    if channels.start > channels.end
        || samples.start > samples.end
        || channels.end > channel_count
        || samples.end > sample_count
    {
        return Err(SourceError::OutOfBounds {
            channels: channels.clone(),
            samples: samples.clone(),
        });
    }
    Ok(())
}
