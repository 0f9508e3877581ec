//! Test data builders for sources, configs and viewers

use std::sync::Arc;
use tracevis_rs::config::{CacheSettings, ViewSettings, ViewerConfig};
use tracevis_rs::source::{EventList, MemorySource, SyntheticSource, WavePattern};
use tracevis_rs::types::{ChannelInfo, ChannelType, EventMarker};
use tracevis_rs::viewer::Viewer;

/// Builder for in-process Sample Sources
pub struct SourceBuilder {
    channels: usize,
    sample_rate: f64,
    samples: usize,
    kind: ChannelType,
    bad: Vec<usize>,
}

impl SourceBuilder {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            sample_rate: 100.0,
            samples: 10_000,
            kind: ChannelType::Eeg,
            bad: Vec::new(),
        }
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn kind(mut self, kind: ChannelType) -> Self {
        self.kind = kind;
        self
    }

    pub fn bad(mut self, channel: usize) -> Self {
        self.bad.push(channel);
        self
    }

    pub fn infos(&self) -> Vec<ChannelInfo> {
        (0..self.channels)
            .map(|i| {
                ChannelInfo::new(i, format!("{} {:03}", self.kind.name(), i), self.kind)
                    .with_bad(self.bad.contains(&i))
            })
            .collect()
    }

    pub fn synthetic(self, pattern: WavePattern) -> Arc<SyntheticSource> {
        Arc::new(SyntheticSource::new(self.infos(), self.sample_rate, self.samples, pattern))
    }

    /// Memory-backed source with `value(channel, sample)` as its data
    pub fn memory<F>(self, value: F) -> Arc<MemorySource>
    where
        F: Fn(usize, usize) -> f32,
    {
        let data = (0..self.channels)
            .map(|c| (0..self.samples).map(|i| value(c, i)).collect())
            .collect();
        Arc::new(MemorySource::new(self.infos(), self.sample_rate, data))
    }
}

/// Small blocks and one worker so tests touch many blocks quickly
pub fn test_config() -> ViewerConfig {
    ViewerConfig {
        cache: CacheSettings {
            block_points: 64,
            channels_per_block: 2,
            fetch_workers: 1,
            ..CacheSettings::default()
        },
        view: ViewSettings {
            initial_channels: 4,
            ..ViewSettings::default()
        },
        ..ViewerConfig::default()
    }
}

pub fn events(markers: &[(f64, i32)]) -> Arc<EventList> {
    Arc::new(EventList::new(
        markers.iter().map(|&(t, code)| EventMarker::new(t, code)).collect(),
    ))
}

/// Viewer over a memory source whose main plot is `width` pixels wide (gutter excluded)
pub fn viewer_with_plot(source: Arc<MemorySource>, plot_width: f64, height: f64) -> Viewer {
    let config = test_config();
    let gutter = config.view.gutter_px;
    let mut viewer = Viewer::new(source, Arc::new(EventList::default()), config)
        .unwrap_or_else(|e| panic!("viewer construction failed: {}", e));
    viewer.resize(plot_width + gutter, height);
    viewer
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracevis_rs::source::SampleSource;

    #[test]
    fn test_source_builder() {
        let source = SourceBuilder::new(3)
            .sample_rate(250.0)
            .samples(500)
            .kind(ChannelType::Ecg)
            .bad(1)
            .memory(|c, i| (c * 1000 + i) as f32);

        assert_eq!(source.channel_count(), 3);
        assert_eq!(source.sample_count(), 500);
        assert_eq!(source.sample_rate(), 250.0);
        assert!(source.channel_metadata(1).unwrap().bad);
        assert!(!source.channel_metadata(0).unwrap().bad);

        let block = source.read(2..3, 10..12).unwrap();
        assert_eq!(block.row(0), &[2010.0, 2011.0]);
    }
}
