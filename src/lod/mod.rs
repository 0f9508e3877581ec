//! Level-of-detail envelope cache
//!
//! The cache serves min/max envelopes of the Sample Source at power-of-two
//! strides. Blocks are built on demand: from their two children at the next
//! finer level when both are cached, otherwise by reducing a raw read.
//! Because every level is a min/max reduction of the level below, a painted
//! envelope always spans every raw sample it stands for.
//!
//! # Main Types
//!
//! - [`LodCache`] - Thread-safe block store with LRU eviction under a byte budget
//! - [`SampleWindow`] - Rectangular copy of envelopes handed to callers
//! - [`CacheLookup`] - Non-blocking lookup result plus the blocks still missing
//! - [`FetchPool`] - Background workers that materialize missing blocks
//!
//! # Failure handling
//!
//! A failed source read is narrowed down to the sample ranges that really
//! cannot be read. The rest of the block is cached as usual and only the
//! failed ranges show up as gaps. A block with nothing readable is
//! remembered as unavailable. Both kinds are retried once
//! [`LodCache::clear_unavailable`] is called, which the viewer does once the
//! viewport settles.

pub mod block;
pub mod worker;

pub use block::{BlockKey, Envelope, EnvelopeBlock, LodGeometry};
pub use worker::{FetchBatch, FetchPool};

use crate::config::CacheSettings;
use crate::error::{Result, ViewerError};
use crate::source::{ContentChange, SampleSource};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

/// Region of a window with no data behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGap {
    pub channels: Range<usize>,
    pub samples: Range<usize>,
}

/// Envelopes for a `channels x samples` region at one stride
///
/// The window is a copy; evicting or invalidating the blocks it was built
/// from does not affect it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    /// Storage channels covered
    pub channels: Range<usize>,
    /// Pyramid level the envelopes come from
    pub level: u32,
    /// Raw samples per envelope point
    pub stride: usize,
    /// First raw sample of the first point
    pub start_sample: usize,
    /// Points per channel
    pub points: usize,
    /// Unavailable regions, painted as gaps
    pub gaps: Vec<WindowGap>,
    sample_count: usize,
    data: Vec<Envelope>,
}

impl SampleWindow {
    fn assemble(
        geometry: &LodGeometry,
        channels: Range<usize>,
        samples: &Range<usize>,
        level: u32,
        resident: &HashMap<BlockKey, Arc<EnvelopeBlock>>,
        unavailable: &HashSet<BlockKey>,
    ) -> Self {
        let stride = LodGeometry::stride(level);
        let first_point = samples.start / stride;
        let end_point = samples.end.div_ceil(stride);
        let points = end_point - first_point;
        let block_points = geometry.block_points;

        let mut data = Vec::with_capacity(channels.len() * points);
        for channel in channels.clone() {
            let group = channel / geometry.channels_per_block;
            let local = channel - group * geometry.channels_per_block;
            for point in first_point..end_point {
                let key = BlockKey::new(level, group, point / block_points);
                let envelope = resident
                    .get(&key)
                    .map(|block| block.row(local)[point % block_points])
                    .unwrap_or(Envelope::GAP);
                data.push(envelope);
            }
        }

        let mut gaps: Vec<WindowGap> = Vec::new();
        for key in geometry.keys_for(&channels, samples, level) {
            let failed = if unavailable.contains(&key) {
                vec![geometry.samples_of(&key)]
            } else if let Some(block) = resident.get(&key) {
                block.failed().to_vec()
            } else {
                continue;
            };
            let group = geometry.channels_of(key.channel_group);
            let group = group.start.max(channels.start)..group.end.min(channels.end);
            for range in failed {
                let range = range.start.max(samples.start)..range.end.min(samples.end);
                if range.is_empty() {
                    continue;
                }
                match gaps.last_mut() {
                    Some(last) if last.channels == group && last.samples.end == range.start => {
                        last.samples.end = range.end;
                    }
                    _ => gaps.push(WindowGap {
                        channels: group.clone(),
                        samples: range,
                    }),
                }
            }
        }

        Self {
            channels,
            level,
            stride,
            start_sample: first_point * stride,
            points,
            gaps,
            sample_count: geometry.sample_count,
            data,
        }
    }

    /// Envelopes of one storage channel, if it is inside the window
    pub fn row(&self, channel: usize) -> Option<&[Envelope]> {
        if !self.channels.contains(&channel) {
            return None;
        }
        let local = channel - self.channels.start;
        Some(&self.data[local * self.points..(local + 1) * self.points])
    }

    /// Raw samples behind the `point`-th envelope
    pub fn point_samples(&self, point: usize) -> Range<usize> {
        let start = (self.start_sample + point * self.stride).min(self.sample_count);
        start..(start + self.stride).min(self.sample_count)
    }

    /// One past the last raw sample covered
    pub fn end_sample(&self) -> usize {
        (self.start_sample + self.points * self.stride).min(self.sample_count)
    }

    /// Whether every point has data
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Result of a non-blocking cache lookup
#[derive(Debug, Clone, Default)]
pub struct CacheLookup {
    /// Best window available right now; coarser than requested on a miss
    pub window: Option<SampleWindow>,
    /// Blocks of the requested level still to be built
    pub missing: Vec<BlockKey>,
}

impl CacheLookup {
    /// Whether the window is at the requested level with nothing missing
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.window.is_some()
    }
}

/// Counters describing cache behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub blocks: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub source_reads: u64,
    pub unavailable: usize,
    /// The budget cannot hold a block; nothing is retained
    pub exhausted: bool,
}

struct CachedBlock {
    block: Arc<EnvelopeBlock>,
    tick: u64,
}

#[derive(Default)]
struct CacheInner {
    blocks: HashMap<BlockKey, CachedBlock>,
    /// tick -> key, oldest first
    recency: BTreeMap<u64, BlockKey>,
    unavailable: HashMap<BlockKey, String>,
    tick: u64,
    bytes: usize,
    epoch: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn touch(&mut self, key: &BlockKey) -> Option<Arc<EnvelopeBlock>> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.blocks.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, *key);
        Some(entry.block.clone())
    }

    fn remove(&mut self, key: &BlockKey) -> bool {
        match self.blocks.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                self.bytes -= entry.block.size_bytes();
                true
            }
            None => false,
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.blocks.remove(&key) {
            self.bytes -= entry.block.size_bytes();
            self.stats.evictions += 1;
            tracing::debug!("Evicted LOD block {:?}", key);
        }
        true
    }
}

/// Multi-resolution envelope cache over a Sample Source
pub struct LodCache {
    source: Arc<dyn SampleSource>,
    geometry: LodGeometry,
    budget_bytes: usize,
    inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for LodCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LodCache")
            .field("geometry", &self.geometry)
            .field("budget_bytes", &self.budget_bytes)
            .finish_non_exhaustive()
    }
}

impl LodCache {
    /// Create a cache for `source`
    ///
    /// A budget too small for a single block does not fail construction;
    /// the cache then runs in always-miss mode and [`LodCache::budget_status`]
    /// reports it.
    pub fn new(source: Arc<dyn SampleSource>, settings: &CacheSettings) -> Self {
        let geometry = LodGeometry::new(
            settings.block_points,
            settings.channels_per_block,
            source.channel_count(),
            source.sample_count(),
        );
        let cache = Self {
            source,
            geometry,
            budget_bytes: settings.budget_bytes,
            inner: Mutex::new(CacheInner::default()),
        };
        if let Err(e) = cache.budget_status() {
            tracing::warn!("LOD cache degraded to always-miss mode: {}", e);
            cache.lock().stats.exhausted = true;
        }
        cache
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn geometry(&self) -> &LodGeometry {
        &self.geometry
    }

    /// Counter incremented by every invalidation
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = inner.stats.clone();
        stats.blocks = inner.blocks.len();
        stats.bytes = inner.bytes;
        stats.unavailable = inner.unavailable.len() + inner.blocks.values().filter(|b| b.block.is_partial()).count();
        stats
    }

    /// `Err(CacheExhausted)` when the budget cannot hold the largest block
    pub fn budget_status(&self) -> Result<()> {
        let block_bytes = self.geometry.block_bytes(0);
        if block_bytes > self.budget_bytes {
            return Err(ViewerError::CacheExhausted {
                budget_bytes: self.budget_bytes,
                block_bytes,
            });
        }
        Ok(())
    }

    pub fn is_resident(&self, key: &BlockKey) -> bool {
        self.lock().blocks.contains_key(key)
    }

    pub fn is_unavailable(&self, key: &BlockKey) -> bool {
        self.lock().unavailable.contains_key(key)
    }

    fn clamp(&self, channels: Range<usize>, samples: Range<usize>) -> (Range<usize>, Range<usize>) {
        let c = &self.geometry;
        (
            channels.start.min(c.channel_count)..channels.end.min(c.channel_count),
            samples.start.min(c.sample_count)..samples.end.min(c.sample_count),
        )
    }

    /// Fetch envelopes for a region, building missing blocks synchronously
    ///
    /// The level used is the coarsest whose stride does not exceed
    /// `target_stride`. Samples that cannot be read become gaps; if nothing
    /// in the region can be read the call fails with `DataUnavailable`.
    pub fn fetch(&self, channels: Range<usize>, samples: Range<usize>, target_stride: usize) -> Result<SampleWindow> {
        let requested = (channels.clone(), samples.clone());
        let (channels, samples) = self.clamp(channels, samples);
        if channels.is_empty() || samples.is_empty() {
            return Err(ViewerError::InvalidRange(format!(
                "channels {:?}, samples {:?} outside {}x{} dataset",
                requested.0, requested.1, self.geometry.channel_count, self.geometry.sample_count
            )));
        }

        let level = self.geometry.level_for_stride(target_stride);
        let keys = self.geometry.keys_for(&channels, &samples, level);
        let mut resident = HashMap::new();
        let mut unavailable = HashSet::new();
        let mut reason = None;
        for key in keys {
            match self.materialize(key) {
                Ok(block) => {
                    resident.insert(key, block);
                }
                Err(e) => {
                    reason.get_or_insert_with(|| e.to_string());
                    unavailable.insert(key);
                }
            }
        }

        if !resident.values().any(|block| block.has_data_in(&samples)) {
            let reason = reason.or_else(|| resident.values().find_map(|b| b.failure().map(str::to_string)));
            return Err(ViewerError::DataUnavailable {
                channels,
                samples,
                reason: reason.unwrap_or_default(),
            });
        }
        Ok(SampleWindow::assemble(
            &self.geometry,
            channels,
            &samples,
            level,
            &resident,
            &unavailable,
        ))
    }

    /// Best immediately available window, without touching the source
    ///
    /// Uses the requested level when all its blocks are cached, otherwise
    /// the next coarser level that is. `missing` always lists the blocks of
    /// the requested level that still need building.
    pub fn lookup(&self, channels: Range<usize>, samples: Range<usize>, target_stride: usize) -> CacheLookup {
        let (channels, samples) = self.clamp(channels, samples);
        if channels.is_empty() || samples.is_empty() {
            return CacheLookup::default();
        }

        let wanted = self.geometry.level_for_stride(target_stride);
        let mut inner = self.lock();
        let mut missing = Vec::new();
        let mut window = None;

        for level in wanted..=self.geometry.max_level() {
            let mut resident = HashMap::new();
            let mut unavailable = HashSet::new();
            let mut complete = true;
            for key in self.geometry.keys_for(&channels, &samples, level) {
                if inner.unavailable.contains_key(&key) {
                    unavailable.insert(key);
                } else if let Some(block) = inner.blocks.get(&key) {
                    resident.insert(key, block.block.clone());
                } else {
                    complete = false;
                    if level == wanted {
                        missing.push(key);
                    }
                }
            }
            if complete {
                for key in resident.keys() {
                    inner.touch(key);
                }
                window = Some(SampleWindow::assemble(
                    &self.geometry,
                    channels,
                    &samples,
                    level,
                    &resident,
                    &unavailable,
                ));
                break;
            }
        }

        CacheLookup { window, missing }
    }

    /// Return a cached block or build it
    ///
    /// The lock is not held while reading the source. A block built across
    /// an invalidation is returned to the caller but not retained.
    pub fn materialize(&self, key: BlockKey) -> Result<Arc<EnvelopeBlock>> {
        let (epoch, children) = {
            let mut inner = self.lock();
            if let Some(block) = inner.touch(&key) {
                inner.stats.hits += 1;
                return Ok(block);
            }
            if let Some(reason) = inner.unavailable.get(&key) {
                return Err(self.unavailable_error(&key, reason.clone()));
            }
            inner.stats.misses += 1;

            let children = key.children().and_then(|(left, right)| {
                let left = inner.touch(&left)?;
                if right.block >= self.geometry.block_count(right.level) {
                    return Some((left, None));
                }
                let right = inner.touch(&right)?;
                Some((left, Some(right)))
            });
            (inner.epoch, children)
        };

        let block = match children {
            Some((left, right)) => EnvelopeBlock::merge_children(key, &left, right.as_deref()),
            None => {
                let channels = self.geometry.channels_of(key.channel_group);
                let mut reads = 0u64;
                let reduced = EnvelopeBlock::reduce(key, &self.geometry, |samples| {
                    reads += 1;
                    self.source.read(channels.clone(), samples)
                });
                let mut inner = self.lock();
                inner.stats.source_reads += reads;
                match reduced {
                    Ok(block) => {
                        if let Some(reason) = block.failure() {
                            tracing::warn!(
                                "Source read failed for samples {:?} of LOD block {:?}: {}",
                                block.failed(),
                                key,
                                reason
                            );
                        }
                        block
                    }
                    Err(e) => {
                        tracing::warn!("Source read failed for LOD block {:?}: {}", key, e);
                        if inner.epoch == epoch {
                            inner.unavailable.insert(key, e.to_string());
                        }
                        return Err(self.unavailable_error(&key, e.to_string()));
                    }
                }
            }
        };

        let block = Arc::new(block);
        self.store(key, block.clone(), epoch);
        Ok(block)
    }

    fn unavailable_error(&self, key: &BlockKey, reason: String) -> ViewerError {
        ViewerError::DataUnavailable {
            channels: self.geometry.channels_of(key.channel_group),
            samples: self.geometry.samples_of(key),
            reason,
        }
    }

    fn store(&self, key: BlockKey, block: Arc<EnvelopeBlock>, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!("Discarding LOD block {:?} built before an invalidation", key);
            return;
        }
        let bytes = block.size_bytes();
        if bytes > self.budget_bytes {
            if !inner.stats.exhausted {
                tracing::warn!(
                    "LOD cache budget of {} bytes cannot hold a {} byte block, running in always-miss mode",
                    self.budget_bytes,
                    bytes
                );
                inner.stats.exhausted = true;
            }
            return;
        }
        if inner.blocks.contains_key(&key) {
            return;
        }
        while inner.bytes + bytes > self.budget_bytes && inner.evict_oldest() {}

        inner.tick += 1;
        let tick = inner.tick;
        inner.recency.insert(tick, key);
        inner.blocks.insert(key, CachedBlock { block, tick });
        inner.bytes += bytes;
    }

    /// Drop every block and unavailable marker overlapping a changed region
    ///
    /// Nothing is recomputed here; affected blocks are rebuilt on the next
    /// fetch.
    pub fn invalidate(&self, change: &ContentChange) {
        let geometry = self.geometry;
        let overlaps = |key: &BlockKey| {
            let channels = geometry.channels_of(key.channel_group);
            let samples = geometry.samples_of(key);
            channels.start < change.channels.end
                && change.channels.start < channels.end
                && samples.start < change.samples.end
                && change.samples.start < samples.end
        };

        let mut inner = self.lock();
        let doomed: Vec<BlockKey> = inner.blocks.keys().filter(|k| overlaps(k)).copied().collect();
        for key in &doomed {
            inner.remove(key);
        }
        inner.unavailable.retain(|key, _| !overlaps(key));
        inner.epoch += 1;
        tracing::debug!(
            "Invalidated {} LOD blocks for channels {:?}, samples {:?}",
            doomed.len(),
            change.channels,
            change.samples
        );
    }

    /// Drop everything
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        inner.blocks.clear();
        inner.recency.clear();
        inner.unavailable.clear();
        inner.bytes = 0;
        inner.epoch += 1;
    }

    /// Forget read failures so the blocks are retried; returns how many
    ///
    /// Partial blocks are dropped too so their failed ranges are read again.
    pub fn clear_unavailable(&self) -> usize {
        let mut inner = self.lock();
        let partial: Vec<BlockKey> = inner
            .blocks
            .iter()
            .filter(|(_, b)| b.block.is_partial())
            .map(|(key, _)| *key)
            .collect();
        for key in &partial {
            inner.remove(key);
        }
        let count = inner.unavailable.len() + partial.len();
        inner.unavailable.clear();
        if count > 0 {
            tracing::debug!("Retrying {} unavailable LOD blocks", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, SyntheticSource, WavePattern};
    use crate::types::{ChannelInfo, ChannelType};
    use proptest::prelude::*;

    fn settings(block_points: usize, channels_per_block: usize) -> CacheSettings {
        CacheSettings {
            block_points,
            channels_per_block,
            ..CacheSettings::default()
        }
    }

    fn channels(n: usize) -> Vec<ChannelInfo> {
        (0..n)
            .map(|i| ChannelInfo::new(i, format!("CH{}", i), ChannelType::Misc))
            .collect()
    }

    fn memory_source(rows: Vec<Vec<f32>>) -> Arc<MemorySource> {
        Arc::new(MemorySource::new(channels(rows.len()), 100.0, rows))
    }

    #[test]
    fn test_fetch_picks_stride_not_above_target() {
        let source = Arc::new(SyntheticSource::new(
            channels(64),
            1000.0,
            1_000_000,
            WavePattern::Sawtooth {
                period: 100,
                amplitude: 1.0,
            },
        ));
        let cache = LodCache::new(source, &CacheSettings::default());
        let window = cache.fetch(0..64, 500_000..510_000, 20).unwrap();
        assert!(window.stride <= 20);
        assert_eq!(window.stride, 16);
        assert_eq!(window.channels, 0..64);
        assert!(window.start_sample <= 500_000);
        assert!(window.end_sample() >= 510_000);
        assert!(window.is_complete());
    }

    #[test]
    fn test_fetch_clamps_and_rejects_empty() {
        let cache = LodCache::new(memory_source(vec![vec![1.0; 100]]), &settings(16, 1));
        let window = cache.fetch(0..5, 90..500, 1).unwrap();
        assert_eq!(window.channels, 0..1);
        assert_eq!(window.end_sample(), 100);
        assert!(matches!(
            cache.fetch(3..5, 0..10, 1),
            Err(ViewerError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_coarse_level_built_from_cached_children() {
        let source = memory_source(vec![(0..64).map(|i| i as f32).collect()]);
        let cache = LodCache::new(source.clone(), &settings(8, 1));
        cache.fetch(0..1, 0..64, 1).unwrap();
        let reads = source.read_count();

        let coarse = cache.fetch(0..1, 0..16, 2).unwrap();
        assert_eq!(source.read_count(), reads);
        assert_eq!(coarse.row(0).unwrap()[0], Envelope { min: 0.0, max: 1.0 });
    }

    #[test]
    fn test_lookup_falls_back_to_coarser_level() {
        let source = memory_source(vec![(0..64).map(|i| i as f32).collect()]);
        let cache = LodCache::new(source, &settings(8, 1));
        cache.fetch(0..1, 0..64, 64).unwrap();

        let lookup = cache.lookup(0..1, 0..16, 1);
        assert!(!lookup.is_exact());
        assert_eq!(lookup.missing, vec![BlockKey::new(0, 0, 0), BlockKey::new(0, 0, 1)]);
        let window = lookup.window.unwrap();
        assert!(window.stride > 1);
        assert_eq!(window.row(0).unwrap()[0].min, 0.0);
    }

    #[test]
    fn test_partial_failure_yields_gaps() {
        let source = memory_source(vec![vec![0.5; 64], vec![0.5; 64]]);
        source.set_unreadable(20..24);
        let cache = LodCache::new(source.clone(), &settings(8, 1));

        let window = cache.fetch(0..2, 0..64, 1).unwrap();
        assert_eq!(
            window.gaps,
            vec![
                WindowGap {
                    channels: 0..1,
                    samples: 16..24
                },
                WindowGap {
                    channels: 1..2,
                    samples: 16..24
                },
            ]
        );
        let row = window.row(1).unwrap();
        assert!(row[16].is_gap());
        assert!(!row[15].is_gap());
        assert_eq!(cache.stats().unavailable, 2);
    }

    #[test]
    fn test_total_failure_is_data_unavailable() {
        let source = memory_source(vec![vec![0.5; 256]]);
        source.set_unreadable(100..200);
        let cache = LodCache::new(source.clone(), &settings(64, 1));

        let err = cache.fetch(0..1, 100..200, 1).unwrap_err();
        assert!(err.is_data_unavailable());

        // Failure is remembered until cleared
        source.clear_unreadable();
        assert!(cache.fetch(0..1, 100..200, 1).is_err());
        // Blocks 64..128, 128..192 and 192..256 all touch the bad range
        assert_eq!(cache.clear_unavailable(), 3);
        assert!(cache.fetch(0..1, 100..200, 1).is_ok());
    }

    #[test]
    fn test_failed_range_inside_block_stays_narrow() {
        let source = memory_source(vec![vec![0.5; 1_000_000]]);
        source.set_unreadable(100..200);
        let cache = LodCache::new(source.clone(), &settings(1024, 8));

        let window = cache.fetch(0..1, 0..10_000, 8).unwrap();
        assert_eq!(window.stride, 8);
        assert_eq!(
            window.gaps,
            vec![WindowGap {
                channels: 0..1,
                samples: 64..256
            }]
        );
        let row = window.row(0).unwrap();
        assert!(!row[7].is_gap());
        assert!(row[8].is_gap());
        assert!(row[31].is_gap());
        assert!(!row[32].is_gap());

        // The partial block is cached, not tombstoned
        let key = BlockKey::new(3, 0, 0);
        assert!(cache.is_resident(&key));
        assert!(!cache.is_unavailable(&key));
        assert_eq!(cache.stats().unavailable, 1);

        let err = cache.fetch(0..1, 100..200, 8).unwrap_err();
        assert!(err.is_data_unavailable());

        source.clear_unreadable();
        assert_eq!(cache.clear_unavailable(), 1);
        assert!(!cache.is_resident(&key));
        assert!(cache.fetch(0..1, 0..10_000, 8).unwrap().is_complete());
    }

    #[test]
    fn test_lru_eviction_respects_budget() {
        let source = memory_source(vec![vec![1.0; 1024]]);
        let block_bytes = 16 * std::mem::size_of::<Envelope>();
        let cache = LodCache::new(
            source,
            &CacheSettings {
                budget_bytes: block_bytes * 4,
                ..settings(16, 1)
            },
        );
        for block in 0..8 {
            cache.materialize(BlockKey::new(0, 0, block)).unwrap();
        }
        // Keep block 4 warm
        cache.materialize(BlockKey::new(0, 0, 4)).unwrap();
        cache.materialize(BlockKey::new(0, 0, 8)).unwrap();

        let stats = cache.stats();
        assert!(stats.bytes <= block_bytes * 4);
        assert_eq!(stats.blocks, 4);
        assert!(cache.is_resident(&BlockKey::new(0, 0, 4)));
        assert!(!cache.is_resident(&BlockKey::new(0, 0, 5)));
        assert_eq!(stats.evictions, 5);
    }

    #[test]
    fn test_returned_window_survives_eviction() {
        let source = memory_source(vec![(0..32).map(|i| i as f32).collect()]);
        let cache = LodCache::new(source, &settings(8, 1));
        let window = cache.fetch(0..1, 0..8, 1).unwrap();
        cache.invalidate_all();
        assert_eq!(window.row(0).unwrap()[7], Envelope::point(7.0));
    }

    #[test]
    fn test_always_miss_when_budget_too_small() {
        let source = memory_source(vec![vec![2.0; 64]]);
        let cache = LodCache::new(
            source,
            &CacheSettings {
                budget_bytes: 16,
                ..settings(8, 1)
            },
        );
        assert!(matches!(
            cache.budget_status(),
            Err(ViewerError::CacheExhausted { .. })
        ));
        let window = cache.fetch(0..1, 0..64, 1).unwrap();
        assert_eq!(window.row(0).unwrap()[3], Envelope::point(2.0));
        let stats = cache.stats();
        assert!(stats.exhausted);
        assert_eq!(stats.blocks, 0);
    }

    #[test]
    fn test_invalidate_drops_overlapping_levels() {
        let source = memory_source(vec![vec![1.0; 64], vec![1.0; 64]]);
        let cache = LodCache::new(source.clone(), &settings(8, 1));
        cache.fetch(0..2, 0..64, 1).unwrap();
        cache.fetch(0..2, 0..64, 8).unwrap();
        let epoch = cache.epoch();

        source.apply_processing(1..2, 10..12, |row| row.iter_mut().for_each(|v| *v = 9.0));
        cache.invalidate(&ContentChange {
            channels: 1..2,
            samples: 10..12,
        });

        assert_eq!(cache.epoch(), epoch + 1);
        assert!(!cache.is_resident(&BlockKey::new(0, 1, 1)));
        assert!(!cache.is_resident(&BlockKey::new(3, 1, 0)));
        assert!(cache.is_resident(&BlockKey::new(0, 1, 0)));
        assert!(cache.is_resident(&BlockKey::new(0, 0, 1)));

        let window = cache.fetch(1..2, 0..64, 8).unwrap();
        assert_eq!(window.row(1).unwrap()[1].max, 9.0);
    }

    proptest! {
        #[test]
        fn prop_envelope_contains_every_raw_sample(
            values in prop::collection::vec(-1000.0f32..1000.0, 1..600),
            target_stride in 1usize..64,
            warm_fine in any::<bool>(),
        ) {
            let n = values.len();
            let source = memory_source(vec![values.clone()]);
            let cache = LodCache::new(source, &settings(8, 1));
            if warm_fine {
                cache.fetch(0..1, 0..n, 1).unwrap();
            }
            let window = cache.fetch(0..1, 0..n, target_stride).unwrap();
            let row = window.row(0).unwrap();
            for (point, envelope) in row.iter().enumerate() {
                for i in window.point_samples(point) {
                    prop_assert!(envelope.contains(values[i]),
                        "sample {} = {} outside {:?}", i, values[i], envelope);
                }
            }
        }
    }
}
