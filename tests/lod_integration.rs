//! Integration tests for the level-of-detail pipeline
//!
//! These tests validate the path from a Sample Source to drawable envelopes:
//! - Level selection for large datasets
//! - Read failures surfacing as DataUnavailable and gap markers
//! - Budget exhaustion
//! - Invalidation after content changes
//! - Background building through the fetch pool

mod common;

use common::builders::SourceBuilder;
use common::mock_helpers::flaky_source;
use common::test_timeout;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use tracevis_rs::config::{CacheSettings, ViewSettings};
use tracevis_rs::interaction::SelectionState;
use tracevis_rs::lod::{FetchPool, LodCache};
use tracevis_rs::render::{Composer, DisplayOptions, Layer, Primitive, RectKind, Scene, Style};
use tracevis_rs::source::{EventList, SampleSource, WavePattern};
use tracevis_rs::viewport::{ChannelTable, Viewport};
use tracevis_rs::ViewerError;

fn viewport_for(source: &dyn SampleSource, plot_width: f64) -> Viewport {
    Viewport::new(
        ChannelTable::from_source(source),
        source.sample_rate(),
        source.sample_count(),
        &ViewSettings::default(),
        plot_width,
        400.0,
    )
}

#[test]
fn test_large_dataset_serves_stride_at_or_below_target() {
    let source = SourceBuilder::new(64)
        .sample_rate(1000.0)
        .samples(1_000_000)
        .synthetic(WavePattern::default());
    let cache = LodCache::new(source.clone(), &CacheSettings::default());

    // 10 s at 1 kHz over 500 px
    let viewport = viewport_for(source.as_ref(), 500.0);
    assert_eq!(viewport.sample_range().start, 0);
    assert_eq!(viewport.target_stride(), 20);

    let window = cache
        .fetch(0..64, viewport.sample_range(), viewport.target_stride())
        .unwrap();
    assert!(window.stride <= 20);
    assert_eq!(window.stride, 16);
    assert_eq!(window.channels, 0..64);
    assert!(window.is_complete());
    assert!(window.end_sample() >= viewport.sample_range().end);

    // Sine of amplitude 1: every envelope stays within it
    for envelope in window.row(63).unwrap() {
        assert!(envelope.min >= -1.0 && envelope.max <= 1.0);
    }
}

#[test]
fn test_unreadable_region_reports_unavailable_and_draws_gap() {
    // 100 Hz, samples 10_000..20_000 are seconds 100..200
    let source = Arc::new(flaky_source(4, 100.0, 60_000, 10_000..20_000));
    let cache = LodCache::new(source.clone(), &CacheSettings::default());

    let mut viewport = viewport_for(source.as_ref(), 500.0);
    viewport.set_time_window(100.0, 10.0);
    let err = cache
        .fetch(0..4, viewport.sample_range(), viewport.target_stride())
        .unwrap_err();
    assert!(err.is_data_unavailable());
    match err {
        ViewerError::DataUnavailable { channels, samples, .. } => {
            assert_eq!(channels, 0..4);
            assert_eq!(samples.start, 10_000);
        }
        other => panic!("unexpected error: {}", other),
    }

    let composer = Composer::new(ViewSettings::default(), Style::default());
    let events = EventList::default();
    let options = DisplayOptions::default();
    let scene = Scene {
        cache: &cache,
        annotations: &[],
        labels: &[],
        events: &events,
        options: &options,
    };
    let composition = composer.compose(&viewport, &SelectionState::default(), &scene);
    assert!(composition.missing.is_empty());

    let gaps = composition
        .draw_list
        .layer(Layer::Traces)
        .filter(|p| matches!(p, Primitive::FilledRect { kind: RectKind::Gap { .. }, .. }))
        .count();
    assert_eq!(gaps, 4);
    assert!(!composition
        .draw_list
        .layer(Layer::Traces)
        .any(|p| matches!(p, Primitive::Polyline { .. })));
}

#[test]
fn test_partial_failure_keeps_readable_blocks() {
    let source = Arc::new(flaky_source(4, 100.0, 60_000, 10_000..10_100));
    let cache = LodCache::new(source, &CacheSettings::default());

    // Level 1 blocks span 2048 samples; only 64-sample pieces of block 4
    // touching the damaged segment are lost
    let window = cache.fetch(0..4, 9_500..10_501, 2).unwrap();
    assert_eq!(window.stride, 2);
    assert!(!window.is_complete());
    assert_eq!(window.gaps.len(), 1);
    assert_eq!(window.gaps[0].channels, 0..4);
    assert_eq!(window.gaps[0].samples, 9_984..10_112);

    let row = window.row(0).unwrap();
    assert!(!row[0].is_gap());
    assert!(!row[241].is_gap());
    assert!(row[242].is_gap());
    assert!(row[305].is_gap());
    assert!(!row[306].is_gap());
    assert!(!row.last().unwrap().is_gap());
}

#[test]
fn test_coarse_stride_keeps_data_beside_failure() {
    let source = SourceBuilder::new(1).samples(1_000_000).memory(|_, i| (i % 100) as f32);
    source.set_unreadable(100..200);
    let cache = LodCache::new(source.clone(), &CacheSettings::default());

    let window = cache.fetch(0..1, 0..1_000_000, 1000).unwrap();
    assert_eq!(window.stride, 512);
    assert_eq!(window.gaps.len(), 1);
    let gap = &window.gaps[0].samples;
    assert_eq!(gap.start, 0);
    assert!(gap.end <= 1024);
    assert!(gap.start <= 100 && gap.end >= 200);

    let row = window.row(0).unwrap();
    let first_readable = gap.end.div_ceil(window.stride);
    assert!(row[..first_readable].iter().all(|e| e.is_gap()));
    assert!(row[first_readable..].iter().all(|e| !e.is_gap()));
}

#[test]
fn test_tiny_budget_degrades_to_always_miss() {
    let source = SourceBuilder::new(8).samples(5_000).synthetic(WavePattern::Constant(3.0));
    let settings = CacheSettings {
        budget_bytes: 16,
        ..CacheSettings::default()
    };
    let cache = LodCache::new(source, &settings);
    assert!(matches!(cache.budget_status(), Err(ViewerError::CacheExhausted { .. })));

    let window = cache.fetch(0..8, 0..1_000, 1).unwrap();
    assert_eq!(window.row(7).unwrap()[0].max, 3.0);
    let stats = cache.stats();
    assert!(stats.exhausted);
    assert_eq!(stats.blocks, 0);
    assert_eq!(stats.bytes, 0);
}

#[test]
fn test_content_change_invalidates_cached_envelopes() {
    let source = SourceBuilder::new(2).samples(1_000).memory(|_, _| 1.0);
    let cache = LodCache::new(source.clone(), &CacheSettings::default());
    let (tx, rx) = unbounded();
    source.on_content_changed(tx);

    let before = cache.fetch(0..2, 0..1_000, 4).unwrap();
    assert!(before.row(0).unwrap().iter().all(|e| e.max == 1.0));

    source.apply_processing(0..1, 0..100, |row| row.iter_mut().for_each(|v| *v *= 2.0));
    let change = rx.recv_timeout(test_timeout()).unwrap();
    assert_eq!(change.channels, 0..1);
    assert_eq!(change.samples, 0..100);
    cache.invalidate(&change);

    let after = cache.fetch(0..2, 0..1_000, 4).unwrap();
    assert_eq!(after.row(0).unwrap()[0].max, 2.0);
    assert!(after.row(1).unwrap().iter().all(|e| e.max == 1.0));
}

#[test]
fn test_fetch_pool_fills_missing_blocks() {
    let source = SourceBuilder::new(16)
        .sample_rate(1000.0)
        .samples(200_000)
        .synthetic(WavePattern::Square {
            period: 50,
            amplitude: 2.0,
        });
    let cache = Arc::new(LodCache::new(source, &CacheSettings::default()));
    let mut pool = FetchPool::new(cache.clone(), 2, 64);

    let lookup = cache.lookup(0..16, 0..100_000, 64);
    assert!(lookup.window.is_none());
    assert!(!lookup.missing.is_empty());

    let queued = pool.submit(&lookup.missing, 1);
    assert_eq!(queued, lookup.missing.len());
    let batch = pool.wait_idle(test_timeout());
    assert_eq!(batch.loaded, queued);
    assert!(batch.redraw);
    assert_eq!(pool.in_flight(), 0);

    let lookup = cache.lookup(0..16, 0..100_000, 64);
    assert!(lookup.is_exact());
    let window = lookup.window.unwrap();
    assert_eq!(window.stride, 64);
    for envelope in window.row(15).unwrap() {
        assert_eq!((envelope.min, envelope.max), (-2.0, 2.0));
    }
}
