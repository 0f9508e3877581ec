//! Mock construction helpers

use crossbeam_channel::Sender;
use mockall::mock;
use std::ops::Range;
use tracevis_rs::source::{ContentChange, SampleBlock, SampleSource, SourceError};
use tracevis_rs::types::{ChannelInfo, ChannelType};

// Sample Source with scripted reads
mock! {
    pub Source {}

    impl SampleSource for Source {
        fn channel_count(&self) -> usize;
        fn sample_count(&self) -> usize;
        fn sample_rate(&self) -> f64;
        fn channel_metadata(&self, index: usize) -> Option<ChannelInfo>;
        fn read(&self, channels: Range<usize>, samples: Range<usize>) -> Result<SampleBlock, SourceError>;
        fn on_content_changed(&self, subscriber: Sender<ContentChange>);
    }
}

/// Mock source whose reads fail whenever they touch `unreadable`; other reads return zeros
pub fn flaky_source(channels: usize, sample_rate: f64, samples: usize, unreadable: Range<usize>) -> MockSource {
    let mut source = MockSource::new();
    source.expect_channel_count().return_const(channels);
    source.expect_sample_count().return_const(samples);
    source.expect_sample_rate().return_const(sample_rate);
    source
        .expect_channel_metadata()
        .returning(move |i| (i < channels).then(|| ChannelInfo::new(i, format!("MISC {}", i), ChannelType::Misc)));
    source.expect_read().returning(move |chans, range| {
        if range.start < unreadable.end && unreadable.start < range.end {
            return Err(SourceError::Io(format!("samples {:?} are on a damaged segment", range)));
        }
        let len = range.end - range.start;
        let data = vec![0.0; chans.len() * len];
        SampleBlock::new(chans, range.start, len, data).ok_or_else(|| SourceError::Decode("bad shape".to_string()))
    });
    source.expect_on_content_changed().returning(|_| ());
    source
}
