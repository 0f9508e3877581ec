//! Viewport model
//!
//! Holds the visible time range, the channel window and the display scale,
//! and derives the LOD stride needed for the current plot width. Every
//! mutator clamps to the dataset; requests that would leave a non-positive
//! time span are ignored.
//!
//! # Main Types
//!
//! - [`Viewport`] - Time/channel window, plot size and amplitude scale
//! - [`ChannelTable`] - Display order, per-channel gain and bad flags
//! - [`TimeTicks`] - Integer nanosecond time used for exact pan round trips

use crate::config::ViewSettings;
use crate::source::SampleSource;
use crate::types::{ChannelInfo, TimeRange};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Time in integer nanoseconds
///
/// Positions are kept in ticks so that panning by `+d` and then `-d`
/// lands exactly where it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimeTicks(pub i64);

impl TimeTicks {
    pub const PER_SECOND: i64 = 1_000_000_000;
    pub const ZERO: TimeTicks = TimeTicks(0);

    pub fn from_seconds(seconds: f64) -> Self {
        TimeTicks((seconds * Self::PER_SECOND as f64).round() as i64)
    }

    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / Self::PER_SECOND as f64
    }
}

/// Per-channel display state that outlives any single viewport position
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable {
    infos: Vec<ChannelInfo>,
    /// Display position -> storage index
    order: Vec<usize>,
    gains: Vec<f64>,
    bad: Vec<bool>,
}

impl ChannelTable {
    /// Build from metadata; gains start at the channel type's default
    pub fn new(infos: Vec<ChannelInfo>) -> Self {
        let gains = infos.iter().map(|c| c.kind.default_gain()).collect();
        let bad = infos.iter().map(|c| c.bad).collect();
        let order = (0..infos.len()).collect();
        Self {
            infos,
            order,
            gains,
            bad,
        }
    }

    /// Read metadata for every channel of a source
    pub fn from_source(source: &dyn SampleSource) -> Self {
        let infos = (0..source.channel_count())
            .map(|i| {
                source
                    .channel_metadata(i)
                    .unwrap_or_else(|| ChannelInfo::new(i, format!("CH{:03}", i + 1), Default::default()))
            })
            .collect();
        Self::new(infos)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn info(&self, storage: usize) -> Option<&ChannelInfo> {
        self.infos.get(storage)
    }

    /// Storage indices in display order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn storage_at(&self, position: usize) -> Option<usize> {
        self.order.get(position).copied()
    }

    pub fn position_of(&self, storage: usize) -> Option<usize> {
        self.order.iter().position(|&s| s == storage)
    }

    /// Move the channel at display position `from` to position `to`
    pub fn move_channel(&mut self, from: usize, to: usize) -> bool {
        if from >= self.order.len() || from == to {
            return false;
        }
        let to = to.min(self.order.len() - 1);
        let storage = self.order.remove(from);
        self.order.insert(to, storage);
        true
    }

    pub fn gain(&self, storage: usize) -> f64 {
        self.gains.get(storage).copied().unwrap_or(1.0)
    }

    /// Set a gain; non-finite or non-positive values are ignored
    pub fn set_gain(&mut self, storage: usize, gain: f64) -> bool {
        if !gain.is_finite() || gain <= 0.0 {
            return false;
        }
        match self.gains.get_mut(storage) {
            Some(slot) => {
                *slot = gain;
                true
            }
            None => false,
        }
    }

    pub fn is_bad(&self, storage: usize) -> bool {
        self.bad.get(storage).copied().unwrap_or(false)
    }

    pub fn set_bad(&mut self, storage: usize, bad: bool) {
        if let Some(slot) = self.bad.get_mut(storage) {
            *slot = bad;
        }
    }

    /// Flip the bad flag, returning the new state
    pub fn toggle_bad(&mut self, storage: usize) -> bool {
        let bad = !self.is_bad(storage);
        self.set_bad(storage, bad);
        bad
    }

    /// Storage indices of every bad channel, ascending
    pub fn bad_channels(&self) -> Vec<usize> {
        (0..self.bad.len()).filter(|&i| self.bad[i]).collect()
    }
}

/// The visible region and display scale
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    time_start: TimeTicks,
    time_span: TimeTicks,
    total_duration: TimeTicks,
    min_span: TimeTicks,
    sample_rate: f64,
    sample_count: usize,
    first_channel_index: usize,
    n_visible_channels: usize,
    plot_width_px: f64,
    plot_height_px: f64,
    pixels_per_channel_row: f64,
    global_scale: f64,
    channels: ChannelTable,
}

impl Viewport {
    /// Viewport at the start of the recording with the configured window
    pub fn new(
        channels: ChannelTable,
        sample_rate: f64,
        sample_count: usize,
        settings: &ViewSettings,
        plot_width_px: f64,
        plot_height_px: f64,
    ) -> Self {
        let total_seconds = if sample_rate > 0.0 {
            sample_count as f64 / sample_rate
        } else {
            0.0
        };
        let total_duration = TimeTicks::from_seconds(total_seconds);
        // Never fewer than 3 samples on screen
        let min_span = if sample_rate > 0.0 {
            TimeTicks::from_seconds(3.0 / sample_rate).min(total_duration)
        } else {
            total_duration
        };
        let span = TimeTicks::from_seconds(settings.initial_duration)
            .clamp(min_span, total_duration)
            .max(TimeTicks(1));

        let mut viewport = Self {
            time_start: TimeTicks::ZERO,
            time_span: span,
            total_duration,
            min_span,
            sample_rate,
            sample_count,
            first_channel_index: 0,
            n_visible_channels: 0,
            plot_width_px: plot_width_px.max(1.0),
            plot_height_px: plot_height_px.max(1.0),
            pixels_per_channel_row: 0.0,
            global_scale: 1.0,
            channels,
        };
        viewport.set_channel_window(0, settings.initial_channels);
        viewport
    }

    // ==================== Accessors ====================

    pub fn time_start(&self) -> f64 {
        self.time_start.as_seconds()
    }

    pub fn time_span(&self) -> f64 {
        self.time_span.as_seconds()
    }

    pub fn time_end(&self) -> f64 {
        (self.time_start.0 + self.time_span.0) as f64 / TimeTicks::PER_SECOND as f64
    }

    pub fn time_start_ticks(&self) -> TimeTicks {
        self.time_start
    }

    pub fn time_span_ticks(&self) -> TimeTicks {
        self.time_span
    }

    pub fn visible_range(&self) -> TimeRange {
        TimeRange::new(self.time_start(), self.time_end())
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration.as_seconds()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn first_channel_index(&self) -> usize {
        self.first_channel_index
    }

    pub fn n_visible_channels(&self) -> usize {
        self.n_visible_channels
    }

    pub fn total_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn plot_width_px(&self) -> f64 {
        self.plot_width_px
    }

    pub fn plot_height_px(&self) -> f64 {
        self.plot_height_px
    }

    pub fn pixels_per_channel_row(&self) -> f64 {
        self.pixels_per_channel_row
    }

    pub fn global_scale(&self) -> f64 {
        self.global_scale
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelTable {
        &mut self.channels
    }

    /// Storage indices of the visible channels, top to bottom
    pub fn visible_channels(&self) -> Vec<usize> {
        let end = self.first_channel_index + self.n_visible_channels;
        self.channels.order()[self.first_channel_index..end].to_vec()
    }

    // ==================== Time window ====================

    /// Clamp a start so the whole span stays inside the recording
    fn clamp_start(&self, start: TimeTicks) -> TimeTicks {
        let latest = TimeTicks((self.total_duration.0 - self.time_span.0).max(0));
        start.clamp(TimeTicks::ZERO, latest)
    }

    /// Shift the visible range by `delta` seconds
    pub fn pan(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        let moved = TimeTicks(self.time_start.0.saturating_add(TimeTicks::from_seconds(delta).0));
        self.time_start = self.clamp_start(moved);
    }

    /// Divide the span by `factor`, keeping `anchor` at the same screen position
    ///
    /// `factor > 1` zooms in. Invalid factors are ignored.
    pub fn zoom(&mut self, factor: f64, anchor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let old_span = self.time_span.as_seconds();
        let new_span = TimeTicks::from_seconds(old_span / factor).clamp(self.min_span, self.total_duration);
        if new_span.0 <= 0 {
            return;
        }
        let anchor = if anchor.is_finite() {
            anchor.clamp(self.time_start(), self.time_end())
        } else {
            self.time_start() + old_span / 2.0
        };
        let relative = (anchor - self.time_start()) / old_span;
        let start = anchor - relative * new_span.as_seconds();
        self.time_span = new_span;
        self.time_start = self.clamp_start(TimeTicks::from_seconds(start));
    }

    /// Set the visible range directly
    pub fn set_time_window(&mut self, start: f64, span: f64) {
        if !start.is_finite() || !span.is_finite() {
            return;
        }
        self.set_time_window_ticks(TimeTicks::from_seconds(start), TimeTicks::from_seconds(span));
    }

    /// Set the visible range in ticks, e.g. to restore a captured window
    pub fn set_time_window_ticks(&mut self, start: TimeTicks, span: TimeTicks) {
        if span.0 <= 0 {
            return;
        }
        self.time_span = span.clamp(self.min_span, self.total_duration);
        self.time_start = self.clamp_start(start);
    }

    /// Grow or shrink the span by a fraction, keeping the left edge
    ///
    /// If the grown span would run past the end, the start moves left.
    pub fn change_duration(&mut self, fraction: f64) {
        if !fraction.is_finite() || fraction <= -1.0 {
            return;
        }
        let span = TimeTicks::from_seconds(self.time_span() * (1.0 + fraction))
            .clamp(self.min_span, self.total_duration);
        let overflow = (self.time_start.0 + span.0 - self.total_duration.0).max(0);
        self.time_span = span;
        self.time_start = self.clamp_start(TimeTicks(self.time_start.0 - overflow));
    }

    /// Center the view on a time and a display position
    pub fn center_on(&mut self, time: f64, position: Option<usize>) {
        if time.is_finite() {
            let start = time - self.time_span() / 2.0;
            self.time_start = self.clamp_start(TimeTicks::from_seconds(start));
        }
        if let Some(position) = position {
            let first = position.saturating_sub(self.n_visible_channels / 2);
            self.set_channel_window(first, self.n_visible_channels);
        }
    }

    // ==================== Channel window ====================

    /// Show `count` channels starting at display position `first`
    pub fn set_channel_window(&mut self, first: usize, count: usize) {
        let total = self.channels.len();
        let count = count.clamp(total.min(1), total);
        self.n_visible_channels = count;
        self.first_channel_index = first.min(total - count);
        self.relayout();
    }

    /// Move the channel window by `delta` positions
    pub fn scroll_channels(&mut self, delta: isize) {
        let first = self.first_channel_index.saturating_add_signed(delta);
        self.set_channel_window(first, self.n_visible_channels);
    }

    /// Show `delta` more (or fewer) channels
    pub fn change_channel_count(&mut self, delta: isize) {
        let count = self.n_visible_channels.saturating_add_signed(delta).max(1);
        let total = self.channels.len();
        let first = if self.first_channel_index + count > total {
            total.saturating_sub(count)
        } else {
            self.first_channel_index
        };
        self.set_channel_window(first, count);
    }

    /// Move a channel's display position
    pub fn move_channel(&mut self, from: usize, to: usize) -> bool {
        self.channels.move_channel(from, to)
    }

    // ==================== Scale ====================

    /// Set one channel's gain; invalid values are ignored
    pub fn set_gain(&mut self, channel: usize, value: f64) -> bool {
        self.channels.set_gain(channel, value)
    }

    /// Multiply the global amplitude scale
    pub fn scale_all(&mut self, step: f64) {
        if step.is_finite() && step > 0.0 {
            self.global_scale *= step;
        }
    }

    /// Update the plot area size in pixels
    pub fn resize(&mut self, width_px: f64, height_px: f64) {
        if width_px.is_finite() && width_px >= 1.0 {
            self.plot_width_px = width_px;
        }
        if height_px.is_finite() && height_px >= 1.0 {
            self.plot_height_px = height_px;
        }
        self.relayout();
    }

    fn relayout(&mut self) {
        self.pixels_per_channel_row = if self.n_visible_channels > 0 {
            self.plot_height_px / self.n_visible_channels as f64
        } else {
            0.0
        };
    }

    // ==================== Derivations ====================

    /// Number of raw samples spanned by the visible range
    pub fn visible_samples(&self) -> f64 {
        self.time_span() * self.sample_rate
    }

    /// Raw samples per horizontal pixel, rounded down, at least 1
    pub fn target_stride(&self) -> usize {
        let per_pixel = self.visible_samples() / self.plot_width_px;
        // Tolerate float noise in exact ratios like 10000 / 500
        (per_pixel + 1e-9).floor().max(1.0) as usize
    }

    /// Raw sample indices needed to draw the visible range
    pub fn sample_range(&self) -> Range<usize> {
        let start = (self.time_start() * self.sample_rate).floor().max(0.0) as usize;
        let end = (self.time_end() * self.sample_rate).ceil() as usize + 1;
        start.min(self.sample_count)..end.min(self.sample_count)
    }

    pub fn sample_to_time(&self, sample: usize) -> f64 {
        sample as f64 / self.sample_rate
    }
}
