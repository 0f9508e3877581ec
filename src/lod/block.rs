//! Envelope blocks and the block grid of the LOD pyramid
//!
//! Level `k` aggregates `2^k` raw samples into one [`Envelope`]. Every
//! level is cut into blocks of `block_points` envelope points for a group
//! of `channels_per_block` channels, so block `b` of level `k` covers the
//! raw samples `[b * P * 2^k, (b + 1) * P * 2^k)` and its children are
//! blocks `2b` and `2b + 1` of level `k - 1`.

use crate::source::{SampleBlock, SourceError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Upper bound on raw samples requested from the source per read
const RAW_CHUNK_SAMPLES: usize = 1 << 16;

/// Smallest sample range a failed read is narrowed down to
const MIN_FAILED_SAMPLES: usize = 64;

/// Extra reads one block may spend narrowing down failed ranges
const MAX_SPLIT_READS: usize = 64;

/// Minimum and maximum of all raw samples aggregated into one output point
///
/// A gap (no data) is represented by NaN in both fields, matching the way
/// plot backends break a line at NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: f32,
    pub max: f32,
}

impl Envelope {
    /// Envelope with no data behind it
    pub const GAP: Envelope = Envelope {
        min: f32::NAN,
        max: f32::NAN,
    };

    /// Envelope of a single sample
    pub fn point(value: f32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.min.is_nan() || self.max.is_nan()
    }

    /// Widen to include one more sample; NaN samples are skipped
    pub fn include(self, value: f32) -> Self {
        if value.is_nan() {
            self
        } else if self.is_gap() {
            Self::point(value)
        } else {
            Self {
                min: self.min.min(value),
                max: self.max.max(value),
            }
        }
    }

    /// Min of mins, max of maxes; a gap contributes nothing
    pub fn merge(self, other: Envelope) -> Self {
        match (self.is_gap(), other.is_gap()) {
            (true, _) => other,
            (_, true) => self,
            _ => Self {
                min: self.min.min(other.min),
                max: self.max.max(other.max),
            },
        }
    }

    /// Whether `value` lies within the band
    pub fn contains(&self, value: f32) -> bool {
        !self.is_gap() && value >= self.min && value <= self.max
    }
}

/// Identity of one cached block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    /// Pyramid level; stride is `2^level`
    pub level: u32,
    /// Index of the channel group
    pub channel_group: usize,
    /// Block index along time at this level
    pub block: usize,
}

impl BlockKey {
    pub fn new(level: u32, channel_group: usize, block: usize) -> Self {
        Self {
            level,
            channel_group,
            block,
        }
    }

    /// The two blocks of the next finer level this block aggregates
    pub fn children(&self) -> Option<(BlockKey, BlockKey)> {
        if self.level == 0 {
            return None;
        }
        let level = self.level - 1;
        Some((
            BlockKey::new(level, self.channel_group, self.block * 2),
            BlockKey::new(level, self.channel_group, self.block * 2 + 1),
        ))
    }
}

/// Shape of the block grid for one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodGeometry {
    pub block_points: usize,
    pub channels_per_block: usize,
    pub channel_count: usize,
    pub sample_count: usize,
}

impl LodGeometry {
    pub fn new(block_points: usize, channels_per_block: usize, channel_count: usize, sample_count: usize) -> Self {
        Self {
            block_points: block_points.max(2),
            channels_per_block: channels_per_block.max(1),
            channel_count,
            sample_count,
        }
    }

    pub fn stride(level: u32) -> usize {
        1usize << level
    }

    /// Raw samples covered by one block at `level`
    pub fn block_span(&self, level: u32) -> usize {
        self.block_points << level
    }

    /// Coarsest level; a single block covers the whole dataset
    pub fn max_level(&self) -> u32 {
        let blocks = self.sample_count.div_ceil(self.block_points).max(1);
        if blocks <= 1 {
            0
        } else {
            usize::BITS - (blocks - 1).leading_zeros()
        }
    }

    /// Largest power-of-two stride not above `target_stride`, as a level
    pub fn level_for_stride(&self, target_stride: usize) -> u32 {
        let target = target_stride.max(1);
        (usize::BITS - 1 - target.leading_zeros()).min(self.max_level())
    }

    pub fn group_count(&self) -> usize {
        self.channel_count.div_ceil(self.channels_per_block)
    }

    pub fn block_count(&self, level: u32) -> usize {
        self.sample_count.div_ceil(self.block_span(level))
    }

    /// Storage channels of a channel group
    pub fn channels_of(&self, group: usize) -> Range<usize> {
        let start = (group * self.channels_per_block).min(self.channel_count);
        start..(start + self.channels_per_block).min(self.channel_count)
    }

    /// First raw sample of a block, ignoring the dataset end
    pub fn block_start(&self, key: &BlockKey) -> usize {
        key.block * self.block_span(key.level)
    }

    /// Raw samples of a block, clipped to the dataset
    pub fn samples_of(&self, key: &BlockKey) -> Range<usize> {
        let start = self.block_start(key).min(self.sample_count);
        start..(start + self.block_span(key.level)).min(self.sample_count)
    }

    /// Keys covering a region at one level, group-major and ordered by time
    pub fn keys_for(&self, channels: &Range<usize>, samples: &Range<usize>, level: u32) -> Vec<BlockKey> {
        if channels.is_empty() || samples.is_empty() {
            return Vec::new();
        }
        let first_group = channels.start / self.channels_per_block;
        let last_group = (channels.end - 1) / self.channels_per_block;
        let span = self.block_span(level);
        let first_block = samples.start / span;
        let last_block = (samples.end - 1) / span;

        let mut keys = Vec::with_capacity((last_group - first_group + 1) * (last_block - first_block + 1));
        for group in first_group..=last_group {
            for block in first_block..=last_block {
                keys.push(BlockKey::new(level, group, block));
            }
        }
        keys
    }

    /// Memory footprint of a full block for a group
    pub fn block_bytes(&self, group: usize) -> usize {
        self.channels_of(group).len() * self.block_points * std::mem::size_of::<Envelope>()
    }
}

/// An immutable block of envelopes, channel-major
///
/// A block may be partial: sample ranges whose reads failed are listed in
/// [`EnvelopeBlock::failed`] and their points hold [`Envelope::GAP`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeBlock {
    pub key: BlockKey,
    /// Storage channels covered
    pub channels: Range<usize>,
    samples: Range<usize>,
    failed: Vec<Range<usize>>,
    failure: Option<String>,
    points: usize,
    data: Vec<Envelope>,
}

impl EnvelopeBlock {
    /// Build a block by reducing raw samples
    ///
    /// `read` is called with sample ranges of at most a few tens of
    /// thousands of samples, aligned to the stride, so memory use stays
    /// bounded at coarse levels. A failed read is retried in halves down to
    /// `max(stride, 64)` samples, and whatever still fails is left as a gap.
    /// Only a block with no readable sample at all is an error.
    pub fn reduce<F>(key: BlockKey, geometry: &LodGeometry, mut read: F) -> Result<Self, SourceError>
    where
        F: FnMut(Range<usize>) -> Result<SampleBlock, SourceError>,
    {
        let channels = geometry.channels_of(key.channel_group);
        let samples = geometry.samples_of(&key);
        let stride = LodGeometry::stride(key.level);
        let points = geometry.block_points;
        let origin = geometry.block_start(&key);
        let unit = stride.max(MIN_FAILED_SAMPLES);
        let mut data = vec![Envelope::GAP; channels.len() * points];
        let mut failed: Vec<Range<usize>> = Vec::new();
        let mut first_error = None;
        let mut split_reads = 0;

        let chunk = (RAW_CHUNK_SAMPLES / stride).max(1) * stride;
        let mut pos = samples.start;
        while pos < samples.end {
            let end = (pos + chunk).min(samples.end);
            // Depth-first so failed ranges come out in sample order
            let mut pending = vec![pos..end];
            while let Some(range) = pending.pop() {
                let raw = match read(range.clone()) {
                    Ok(raw) if raw.channel_count() == channels.len() && raw.len == range.len() => raw,
                    result => {
                        let err = match result {
                            Ok(raw) => SourceError::Decode(format!(
                                "expected {}x{} samples, got {}x{}",
                                channels.len(),
                                range.len(),
                                raw.channel_count(),
                                raw.len
                            )),
                            Err(e) => e,
                        };
                        if range.len() > unit && split_reads + 2 <= MAX_SPLIT_READS {
                            split_reads += 2;
                            let mid = range.start + range.len().div_ceil(unit) / 2 * unit;
                            pending.push(mid..range.end);
                            pending.push(range.start..mid);
                        } else {
                            match failed.last_mut() {
                                Some(last) if last.end == range.start => last.end = range.end,
                                _ => failed.push(range),
                            }
                            first_error.get_or_insert(err);
                        }
                        continue;
                    }
                };
                for local in 0..channels.len() {
                    let out = &mut data[local * points..(local + 1) * points];
                    for (i, &value) in raw.row(local).iter().enumerate() {
                        let p = (range.start + i - origin) / stride;
                        out[p] = out[p].include(value);
                    }
                }
            }
            pos = end;
        }

        let failed_samples: usize = failed.iter().map(|r| r.len()).sum();
        let failure = match first_error {
            Some(err) if failed_samples >= samples.len() => return Err(err),
            other => other.map(|e| e.to_string()),
        };

        Ok(Self {
            key,
            channels,
            samples,
            failed,
            failure,
            points,
            data,
        })
    }

    /// Build a block by pairwise merging its two children
    ///
    /// `right` is `None` when the right child lies past the dataset end.
    pub fn merge_children(key: BlockKey, left: &EnvelopeBlock, right: Option<&EnvelopeBlock>) -> Self {
        let points = left.points;
        let half = points / 2;
        let channels = left.channels.clone();
        let mut data = Vec::with_capacity(channels.len() * points);

        for local in 0..channels.len() {
            let left_row = left.row(local);
            for j in 0..half {
                data.push(left_row[2 * j].merge(left_row[2 * j + 1]));
            }
            match right {
                Some(right) => {
                    let right_row = right.row(local);
                    for j in 0..half {
                        data.push(right_row[2 * j].merge(right_row[2 * j + 1]));
                    }
                }
                None => data.extend(std::iter::repeat(Envelope::GAP).take(points - half)),
            }
        }

        let mut failed: Vec<Range<usize>> = Vec::new();
        for range in left.failed.iter().chain(right.into_iter().flat_map(|r| r.failed.iter())) {
            match failed.last_mut() {
                Some(last) if last.end == range.start => last.end = range.end,
                _ => failed.push(range.clone()),
            }
        }

        Self {
            key,
            channels,
            samples: left.samples.start..right.map_or(left.samples.end, |r| r.samples.end),
            failed,
            failure: left.failure.clone().or_else(|| right.and_then(|r| r.failure.clone())),
            points,
            data,
        }
    }

    /// Envelopes of the `local`-th channel of the group
    pub fn row(&self, local: usize) -> &[Envelope] {
        &self.data[local * self.points..(local + 1) * self.points]
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<Envelope>()
    }

    /// Raw samples the block covers, clipped to the dataset
    pub fn samples(&self) -> &Range<usize> {
        &self.samples
    }

    /// Sample ranges that could not be read, sorted and disjoint
    pub fn failed(&self) -> &[Range<usize>] {
        &self.failed
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Error of the first failed read, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether any readable sample of the block lies in `range`
    pub fn has_data_in(&self, range: &Range<usize>) -> bool {
        let end = range.end.min(self.samples.end);
        let mut cursor = range.start.max(self.samples.start);
        for failed in &self.failed {
            if failed.end <= cursor {
                continue;
            }
            if failed.start > cursor {
                break;
            }
            cursor = failed.end;
        }
        cursor < end
    }
}
