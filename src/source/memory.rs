//! In-memory Sample Source and event list
//!
//! [`MemorySource`] owns a dense channel-major sample array. Processing
//! steps are applied through [`MemorySource::apply_processing`], which is
//! the only way the data changes; each step notifies subscribers with the
//! affected region so cached envelopes can be dropped.

use super::{check_bounds, ContentChange, EventSource, SampleBlock, SampleSource, SourceError, Subscribers};
use crate::types::{ChannelInfo, EventMarker, TimeRange};
use crossbeam_channel::Sender;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// A Sample Source backed by owned sample vectors
#[derive(Debug)]
pub struct MemorySource {
    channels: Vec<ChannelInfo>,
    sample_rate: f64,
    sample_count: usize,
    /// One vector per channel, all `sample_count` long
    data: RwLock<Vec<Vec<f32>>>,
    /// Sample ranges whose reads fail, for simulating broken storage
    unreadable: Mutex<Vec<Range<usize>>>,
    subscribers: Subscribers,
    reads: AtomicU64,
}

impl MemorySource {
    /// Create a source from per-channel data
    ///
    /// Channels shorter than the longest one are padded with zeros.
    pub fn new(channels: Vec<ChannelInfo>, sample_rate: f64, mut data: Vec<Vec<f32>>) -> Self {
        data.resize_with(channels.len(), Vec::new);
        data.truncate(channels.len());
        let sample_count = data.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut data {
            row.resize(sample_count, 0.0);
        }

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
            sample_rate,
            sample_count,
            data: RwLock::new(data),
            unreadable: Mutex::new(Vec::new()),
            subscribers: Subscribers::default(),
            reads: AtomicU64::new(0),
        }
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

    /// Number of successful and failed `read` calls so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Apply a processing step to a region and notify subscribers
    ///
    /// `step` receives each affected channel's sample slice. The notification
    /// is sent after the write lock is released, so subscribers that react by
    /// re-reading observe the processed data.
    pub fn apply_processing<F>(&self, channels: Range<usize>, samples: Range<usize>, mut step: F)
    where
        F: FnMut(&mut [f32]),
    {
        let channels = channels.start.min(self.channels.len())..channels.end.min(self.channels.len());
        let samples = samples.start.min(self.sample_count)..samples.end.min(self.sample_count);
        if channels.is_empty() || samples.is_empty() {
            return;
        }

        {
            let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
            for row in &mut data[channels.clone()] {
                step(&mut row[samples.clone()]);
            }
        }

        tracing::debug!(
            "Processing applied to channels {:?}, samples {:?}",
            channels,
            samples
        );
        self.subscribers.notify(ContentChange { channels, samples });
    }
}

impl SampleSource for MemorySource {
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
                return Err(SourceError::Io(format!(
                    "samples {:?} are unreadable",
                    bad
                )));
            }
        }

        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(channels.len() * samples.len());
        for row in &data[channels.clone()] {
            out.extend_from_slice(&row[samples.clone()]);
        }
        let len = samples.len();
        SampleBlock::new(channels, samples.start, len, out)
            .ok_or_else(|| SourceError::Decode("block shape mismatch".to_string()))
    }

    fn on_content_changed(&self, subscriber: Sender<ContentChange>) {
        self.subscribers.add(subscriber);
    }
}

/// A sorted, immutable list of event markers
#[derive(Debug, Clone, Default)]
pub struct EventList {
    events: Vec<EventMarker>,
}

impl EventList {
    /// Create a list; events are sorted by time
    pub fn new(mut events: Vec<EventMarker>) -> Self {
        events.retain(|e| e.time.is_finite());
        events.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.code.cmp(&b.code)));
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn all(&self) -> &[EventMarker] {
        &self.events
    }
}

impl EventSource for EventList {
    fn events_in(&self, range: TimeRange) -> Vec<EventMarker> {
        let first = self.events.partition_point(|e| e.time < range.start);
        self.events[first..]
            .iter()
            .take_while(|e| e.time <= range.end)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelType;
    use crossbeam_channel::unbounded;

    fn two_channel_source() -> MemorySource {
        MemorySource::new(
            vec![
                ChannelInfo::new(0, "Fz", ChannelType::Eeg),
                ChannelInfo::new(1, "Cz", ChannelType::Eeg),
            ],
            100.0,
            vec![(0..10).map(|i| i as f32).collect(), vec![1.0; 10]],
        )
    }

    #[test]
    fn test_read_block() {
        let source = two_channel_source();
        assert_eq!(source.sample_count(), 10);
        assert!((source.duration() - 0.1).abs() < 1e-12);

        let block = source.read(0..2, 2..5).unwrap();
        assert_eq!(block.row(0), &[2.0, 3.0, 4.0]);
        assert_eq!(block.row(1), &[1.0, 1.0, 1.0]);
        assert_eq!(source.read_count(), 1);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let source = two_channel_source();
        assert!(matches!(
            source.read(0..3, 0..5),
            Err(SourceError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_unreadable_range() {
        let source = two_channel_source();
        source.set_unreadable(4..6);
        assert!(matches!(source.read(0..1, 0..5), Err(SourceError::Io(_))));
        assert!(source.read(0..1, 0..4).is_ok());
        source.clear_unreadable();
        assert!(source.read(0..1, 0..10).is_ok());
    }

    #[test]
    fn test_apply_processing_notifies() {
        let source = two_channel_source();
        let (tx, rx) = unbounded();
        source.on_content_changed(tx);

        source.apply_processing(1..2, 0..5, |row| row.iter_mut().for_each(|v| *v *= 3.0));

        let change = rx.try_recv().unwrap();
        assert_eq!(change.channels, 1..2);
        assert_eq!(change.samples, 0..5);
        let block = source.read(1..2, 0..6).unwrap();
        assert_eq!(block.row(0), &[3.0, 3.0, 3.0, 3.0, 3.0, 1.0]);
    }

    #[test]
    fn test_pads_short_channels() {
        let source = MemorySource::new(
            vec![
                ChannelInfo::new(0, "a", ChannelType::Misc),
                ChannelInfo::new(0, "b", ChannelType::Misc),
            ],
            10.0,
            vec![vec![1.0; 4]],
        );
        assert_eq!(source.sample_count(), 4);
        assert_eq!(source.channel_metadata(1).unwrap().index, 1);
        assert_eq!(source.read(1..2, 0..4).unwrap().row(0), &[0.0; 4]);
    }

    #[test]
    fn test_event_list_range_query() {
        let events = EventList::new(vec![
            EventMarker::new(5.0, 2),
            EventMarker::new(1.0, 1),
            EventMarker::new(9.0, 3),
        ]);
        let found = events.events_in(TimeRange::new(1.0, 5.0));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].code, 1);
        assert_eq!(found[1].code, 2);
        assert!(events.events_in(TimeRange::new(6.0, 8.0)).is_empty());
    }
}
