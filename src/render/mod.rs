//! Render composer
//!
//! Turns the viewport, the selection, the cached envelopes, the annotation
//! snapshot and the event markers into a [`DrawList`]: backend-agnostic
//! primitives in viewport pixel coordinates, grouped into layers that a
//! presentation backend paints back to front.
//!
//! # Layers
//!
//! 1. [`Layer::Grid`] - time grid lines, time labels, channel names
//! 2. [`Layer::Traces`] - min/max bands or lines per channel, plus gap markers
//! 3. [`Layer::Annotations`] - translucent regions colored by label
//! 4. [`Layer::Events`] - event marker ticks
//! 5. [`Layer::BadChannels`] - hatching over channels flagged bad
//! 6. [`Layer::Selection`] - highlights, drafts, drag feedback, time cursor
//! 7. [`Layer::Labels`] - per-type scalebars and the "N more channels" indicator
//!
//! # Purity
//!
//! [`Composer::compose`] only reads: cache misses are reported in
//! [`Composition::missing`] for the caller to schedule, and the same inputs
//! always produce the same list.

pub mod mapping;
pub mod overview;
pub mod style;

pub use mapping::{PixelMapping, RowLayout};
pub use overview::Overview;
pub use style::{Palette, Style};

use crate::annotations::{Annotation, AnnotationId, ChannelScope};
use crate::config::ViewSettings;
use crate::error::{Result, ViewerError};
use crate::interaction::SelectionState;
use crate::lod::{BlockKey, Envelope, LodCache, SampleWindow};
use crate::source::EventSource;
use crate::types::{ChannelType, Rgba};
use crate::viewport::Viewport;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

// ==================== Draw primitives ====================

/// Paint order group; lower layers are painted first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Layer {
    Grid,
    Traces,
    Annotations,
    Events,
    BadChannels,
    Selection,
    Labels,
}

/// Axis-aligned rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min: [x0.min(x1) as f32, y0.min(y1) as f32],
            max: [x0.max(x1) as f32, y0.max(y1) as f32],
        }
    }

    pub fn width(&self) -> f32 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f32 {
        self.max[1] - self.min[1]
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min[0] && x <= self.max[0] && y >= self.min[1] && y <= self.max[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolylineKind {
    /// Zigzag through each column's max and min
    Envelope,
    /// Sample-by-sample line
    Line,
}

/// What a filled rectangle stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RectKind {
    Annotation(AnnotationId),
    /// Data unavailable for this channel and time range
    Gap { channel: usize },
    BadChannel { channel: usize, hatched: bool },
    Selected(AnnotationId),
    Draft,
    ChannelHighlight { channel: usize },
    /// Where a dragged channel will land
    DropTarget,
    /// Channel type strip in the overview
    ChannelStrip { channel: usize },
    /// Current viewport extent in the overview
    ViewRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickKind {
    Grid,
    Event { code: i32 },
    Cursor,
    /// Grab handle on an annotation edge
    ResizeHandle,
    /// One row of amplitude for a channel type
    Scalebar { kind: ChannelType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextAnchor {
    Left,
    Center,
    Right,
}

/// A single backend-agnostic draw command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Primitive {
    Polyline {
        points: Vec<[f32; 2]>,
        color: Rgba,
        width: f32,
        kind: PolylineKind,
        channel: usize,
    },
    FilledRect {
        rect: Rect,
        color: Rgba,
        kind: RectKind,
    },
    /// Vertical line from `y0` to `y1`
    Tick {
        x: f32,
        y0: f32,
        y1: f32,
        color: Rgba,
        kind: TickKind,
    },
    Text {
        pos: [f32; 2],
        text: String,
        color: Rgba,
        anchor: TextAnchor,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawItem {
    pub layer: Layer,
    pub primitive: Primitive,
}

/// Layered, ordered sequence of draw primitives
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawList {
    items: Vec<DrawItem>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: Layer, primitive: Primitive) {
        self.items.push(DrawItem { layer, primitive });
    }

    /// Items in paint order
    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    pub fn layer(&self, layer: Layer) -> impl Iterator<Item = &Primitive> + '_ {
        self.items
            .iter()
            .filter(move |item| item.layer == layer)
            .map(|item| &item.primitive)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Put items in layer order, keeping insertion order within a layer
    fn finish(mut self) -> Self {
        self.items.sort_by_key(|item| item.layer);
        self
    }

    /// Serialized form, for snapshot comparisons and out-of-process renderers
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ViewerError::Serialization(format!("Failed to serialize draw list: {}", e)))
    }
}

// ==================== Composition ====================

/// Toggles that change what is drawn without touching the data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_events: bool,
    pub show_annotations: bool,
    pub show_scalebars: bool,
    /// Annotation labels not drawn
    pub hidden_labels: BTreeSet<String>,
}

impl DisplayOptions {
    pub fn new(view: &ViewSettings) -> Self {
        Self {
            show_scalebars: view.show_scalebars,
            ..Self::default()
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_events: true,
            show_annotations: true,
            show_scalebars: true,
            hidden_labels: BTreeSet::new(),
        }
    }
}

/// Read-only data a frame is composed from
pub struct Scene<'a> {
    pub cache: &'a LodCache,
    /// Snapshot ordered by `(onset, id)`
    pub annotations: &'a [Annotation],
    /// Label registry, for color assignment
    pub labels: &'a [String],
    pub events: &'a dyn EventSource,
    pub options: &'a DisplayOptions,
}

/// Output of one composition
#[derive(Debug, Clone)]
pub struct Composition {
    pub draw_list: DrawList,
    /// Blocks needed at full fidelity that are not cached yet
    pub missing: Vec<BlockKey>,
    /// Mapping the list was drawn with
    pub mapping: PixelMapping,
}

/// Preferred spacing between time grid lines
const GRID_TARGET_PX: f64 = 100.0;

/// Builds draw lists
#[derive(Debug, Clone, Default)]
pub struct Composer {
    settings: ViewSettings,
    style: Style,
}

impl Composer {
    pub fn new(settings: ViewSettings, style: Style) -> Self {
        Self { settings, style }
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.style
    }

    /// Compose one frame
    pub fn compose(&self, viewport: &Viewport, selection: &SelectionState, scene: &Scene<'_>) -> Composition {
        let mapping = PixelMapping::new(viewport, &self.settings);
        let rows: Vec<(usize, usize)> = viewport
            .visible_channels()
            .into_iter()
            .take(mapping.layout.shown)
            .enumerate()
            .collect();

        let mut list = DrawList::new();
        let mut missing = Vec::new();

        self.compose_grid(&mut list, &mapping, viewport, &rows);
        self.compose_traces(&mut list, &mut missing, &mapping, viewport, &rows, scene);
        if scene.options.show_annotations {
            self.compose_annotations(&mut list, &mapping, &rows, selection, scene);
        }
        if scene.options.show_events {
            self.compose_events(&mut list, &mapping, viewport, scene);
        }
        self.compose_bad_channels(&mut list, &mapping, viewport, &rows);
        self.compose_selection(&mut list, &mapping, &rows, selection, scene);

        if scene.options.show_scalebars {
            self.compose_scalebars(&mut list, &mapping, viewport, &rows);
        }

        if mapping.layout.elided > 0 {
            list.push(
                Layer::Labels,
                Primitive::Text {
                    pos: [
                        (mapping.plot_left + 4.0) as f32,
                        (mapping.row_top(mapping.layout.shown) + mapping.layout.row_height / 2.0) as f32,
                    ],
                    text: format!("{} more channels", mapping.layout.elided),
                    color: self.style.palette.text,
                    anchor: TextAnchor::Left,
                },
            );
        }

        tracing::trace!(
            "Composed {} primitives, {} blocks missing",
            list.len(),
            missing.len()
        );
        Composition {
            draw_list: list.finish(),
            missing,
            mapping,
        }
    }

    fn trace_color(&self, viewport: &Viewport, channel: usize) -> Rgba {
        let table = viewport.channels();
        if table.is_bad(channel) {
            return self.style.palette.bad_channel;
        }
        table
            .info(channel)
            .map(|info| info.kind.style().color)
            .unwrap_or(self.style.palette.text)
    }

    fn compose_grid(&self, list: &mut DrawList, mapping: &PixelMapping, viewport: &Viewport, rows: &[(usize, usize)]) {
        let palette = &self.style.palette;
        let step = grid_step(mapping.time_span, mapping.plot_width, GRID_TARGET_PX);
        let first = (mapping.time_start / step).ceil() as i64;
        let last = ((mapping.time_start + mapping.time_span) / step).floor() as i64;
        for k in first..=last {
            let t = k as f64 * step;
            let x = mapping.time_to_x(t) as f32;
            list.push(
                Layer::Grid,
                Primitive::Tick {
                    x,
                    y0: 0.0,
                    y1: mapping.plot_height as f32,
                    color: palette.grid,
                    kind: TickKind::Grid,
                },
            );
            list.push(
                Layer::Grid,
                Primitive::Text {
                    pos: [x, mapping.plot_height as f32],
                    text: format_time(t, step),
                    color: palette.text,
                    anchor: TextAnchor::Center,
                },
            );
        }

        for &(row, channel) in rows {
            let name = viewport
                .channels()
                .info(channel)
                .map(|info| info.name.clone())
                .unwrap_or_default();
            list.push(
                Layer::Grid,
                Primitive::Text {
                    pos: [(mapping.plot_left - 4.0) as f32, mapping.row_center(row) as f32],
                    text: name,
                    color: self.trace_color(viewport, channel),
                    anchor: TextAnchor::Right,
                },
            );
        }
    }

    fn compose_traces(
        &self,
        list: &mut DrawList,
        missing: &mut Vec<BlockKey>,
        mapping: &PixelMapping,
        viewport: &Viewport,
        rows: &[(usize, usize)],
        scene: &Scene<'_>,
    ) {
        // One lookup per channel group, so reordered rows never pull in
        // the groups lying between them
        let per_block = scene.cache.geometry().channels_per_block;
        let mut groups: BTreeMap<usize, Range<usize>> = BTreeMap::new();
        for &(_, channel) in rows {
            groups
                .entry(channel / per_block)
                .and_modify(|r| {
                    r.start = r.start.min(channel);
                    r.end = r.end.max(channel + 1);
                })
                .or_insert(channel..channel + 1);
        }
        let mut windows = Vec::with_capacity(groups.len());
        for channels in groups.into_values() {
            let lookup = scene
                .cache
                .lookup(channels, viewport.sample_range(), viewport.target_stride());
            missing.extend(lookup.missing);
            windows.extend(lookup.window);
        }

        let table = viewport.channels();
        let rate = viewport.sample_rate();
        for &(row, channel) in rows {
            let Some(window) = windows.iter().find(|w| w.channels.contains(&channel)) else {
                continue;
            };
            let Some(info) = table.info(channel) else {
                continue;
            };
            let scale = info.unit_scale * table.gain(channel) * viewport.global_scale();
            let color = self.trace_color(viewport, channel);
            let center = mapping.row_center(row);
            let y = |value: f32| (center - mapping.value_offset(value, scale, self.settings.clipping_rows)) as f32;

            let runs = if window.stride <= self.settings.line_mode_max_stride {
                line_runs(window, channel, mapping, rate, &y)
            } else {
                envelope_runs(&column_envelopes(window, channel, mapping, rate), mapping, &y)
            };
            let kind = if window.stride <= self.settings.line_mode_max_stride {
                PolylineKind::Line
            } else {
                PolylineKind::Envelope
            };
            for points in runs {
                list.push(
                    Layer::Traces,
                    Primitive::Polyline {
                        points,
                        color,
                        width: 1.0,
                        kind,
                        channel,
                    },
                );
            }

            for gap in window.gaps.iter().filter(|g| g.channels.contains(&channel)) {
                let x0 = mapping.time_to_x(gap.samples.start as f64 / rate).max(mapping.plot_left);
                let x1 = mapping
                    .time_to_x(gap.samples.end as f64 / rate)
                    .min(mapping.plot_left + mapping.plot_width);
                if x1 <= x0 {
                    continue;
                }
                let top = mapping.row_top(row);
                list.push(
                    Layer::Traces,
                    Primitive::FilledRect {
                        rect: Rect::new(x0, top, x1, top + mapping.layout.row_height),
                        color: self.style.palette.gap,
                        kind: RectKind::Gap { channel },
                    },
                );
            }
        }
    }

    /// One bar per channel type on screen, one row tall, labelled with
    /// the amplitude a row spans
    ///
    /// The bar sits on the first good row of its type, or the first row
    /// when every channel of the type is bad. Stim channels get none.
    fn compose_scalebars(&self, list: &mut DrawList, mapping: &PixelMapping, viewport: &Viewport, rows: &[(usize, usize)]) {
        let table = viewport.channels();
        let mut placed: Vec<(ChannelType, usize, usize, bool)> = Vec::new();
        for &(row, channel) in rows {
            let Some(info) = table.info(channel) else {
                continue;
            };
            if info.kind == ChannelType::Stim {
                continue;
            }
            let good = !table.is_bad(channel);
            match placed.iter_mut().find(|p| p.0 == info.kind) {
                Some(entry) if !entry.3 && good => *entry = (info.kind, row, channel, good),
                Some(_) => {}
                None => placed.push((info.kind, row, channel, good)),
            }
        }

        let color = self.style.palette.scalebar;
        let x = mapping.plot_left as f32;
        let half = mapping.layout.row_height / 2.0;
        for (kind, row, channel, _) in placed {
            let rows_per_unit = table.gain(channel) * viewport.global_scale();
            if !(rows_per_unit > 0.0) {
                continue;
            }
            let (unit, unit_scaling) = kind.display_unit();
            let amount = unit_scaling / rows_per_unit;
            let center = mapping.row_center(row);
            list.push(
                Layer::Labels,
                Primitive::Tick {
                    x,
                    y0: (center - half) as f32,
                    y1: (center + half) as f32,
                    color,
                    kind: TickKind::Scalebar { kind },
                },
            );
            list.push(
                Layer::Labels,
                Primitive::Text {
                    pos: [x + 4.0, center as f32],
                    text: format!("{} {}", format_amount(amount), unit),
                    color,
                    anchor: TextAnchor::Left,
                },
            );
        }
    }

    /// Horizontal extent of an interval, at least one pixel wide
    fn span_x(mapping: &PixelMapping, start: f64, end: f64) -> Option<(f64, f64)> {
        let left = mapping.plot_left;
        let right = left + mapping.plot_width;
        let x0 = mapping.time_to_x(start).max(left);
        let x1 = mapping.time_to_x(end).min(right);
        if x0 > right || x1 < left {
            return None;
        }
        Some((x0, x1.max(x0 + 1.0)))
    }

    /// Row bands covered by a channel scope
    fn scope_bands(mapping: &PixelMapping, rows: &[(usize, usize)], scope: &ChannelScope) -> Vec<(f64, f64)> {
        match scope {
            ChannelScope::All => vec![(0.0, mapping.row_top(mapping.layout.shown))],
            ChannelScope::Subset(_) => rows
                .iter()
                .filter(|&&(_, c)| scope.applies_to(c))
                .map(|&(row, _)| (mapping.row_top(row), mapping.row_top(row + 1)))
                .collect(),
        }
    }

    fn compose_annotations(
        &self,
        list: &mut DrawList,
        mapping: &PixelMapping,
        rows: &[(usize, usize)],
        selection: &SelectionState,
        scene: &Scene<'_>,
    ) {
        let editing = selection.draft.as_ref().and_then(|d| d.editing);
        for annotation in scene.annotations {
            if Some(annotation.id) == editing || scene.options.hidden_labels.contains(&annotation.label) {
                continue;
            }
            let Some((x0, x1)) = Self::span_x(mapping, annotation.onset, annotation.end()) else {
                continue;
            };
            let index = scene.labels.iter().position(|l| *l == annotation.label);
            let fill = self.style.annotation_fill(&annotation.label, index);
            for (y0, y1) in Self::scope_bands(mapping, rows, &annotation.channels) {
                list.push(
                    Layer::Annotations,
                    Primitive::FilledRect {
                        rect: Rect::new(x0, y0, x1, y1),
                        color: fill,
                        kind: RectKind::Annotation(annotation.id),
                    },
                );
            }
            list.push(
                Layer::Annotations,
                Primitive::Text {
                    pos: [(x0 + 2.0) as f32, 0.0],
                    text: annotation.label.clone(),
                    color: self.style.annotation_color(&annotation.label, index),
                    anchor: TextAnchor::Left,
                },
            );
        }
    }

    fn compose_events(&self, list: &mut DrawList, mapping: &PixelMapping, viewport: &Viewport, scene: &Scene<'_>) {
        let color = self.style.palette.event;
        for event in scene.events.events_in(viewport.visible_range()) {
            let x = mapping.time_to_x(event.time) as f32;
            list.push(
                Layer::Events,
                Primitive::Tick {
                    x,
                    y0: 0.0,
                    y1: mapping.plot_height as f32,
                    color,
                    kind: TickKind::Event { code: event.code },
                },
            );
            list.push(
                Layer::Events,
                Primitive::Text {
                    pos: [x, 0.0],
                    text: event.display_text(),
                    color,
                    anchor: TextAnchor::Center,
                },
            );
        }
    }

    fn compose_bad_channels(&self, list: &mut DrawList, mapping: &PixelMapping, viewport: &Viewport, rows: &[(usize, usize)]) {
        let color = self.style.palette.bad_channel.with_alpha(50);
        for &(row, channel) in rows {
            if !viewport.channels().is_bad(channel) {
                continue;
            }
            let top = mapping.row_top(row);
            list.push(
                Layer::BadChannels,
                Primitive::FilledRect {
                    rect: Rect::new(
                        mapping.plot_left,
                        top,
                        mapping.plot_left + mapping.plot_width,
                        top + mapping.layout.row_height,
                    ),
                    color,
                    kind: RectKind::BadChannel {
                        channel,
                        hatched: true,
                    },
                },
            );
        }
    }

    fn push_handles(&self, list: &mut DrawList, mapping: &PixelMapping, x0: f64, x1: f64) {
        for x in [x0, x1] {
            list.push(
                Layer::Selection,
                Primitive::Tick {
                    x: x as f32,
                    y0: 0.0,
                    y1: mapping.plot_height as f32,
                    color: self.style.palette.text,
                    kind: TickKind::ResizeHandle,
                },
            );
        }
    }

    fn compose_selection(
        &self,
        list: &mut DrawList,
        mapping: &PixelMapping,
        rows: &[(usize, usize)],
        selection: &SelectionState,
        scene: &Scene<'_>,
    ) {
        let palette = &self.style.palette;

        for &(row, channel) in rows {
            if selection.highlighted_channels.contains(&channel) {
                let top = mapping.row_top(row);
                list.push(
                    Layer::Selection,
                    Primitive::FilledRect {
                        rect: Rect::new(
                            0.0,
                            top,
                            mapping.plot_left + mapping.plot_width,
                            top + mapping.layout.row_height,
                        ),
                        color: palette.highlight,
                        kind: RectKind::ChannelHighlight { channel },
                    },
                );
            }
        }

        let editing = selection.draft.as_ref().and_then(|d| d.editing);
        if let Some(id) = selection.selected_annotation.filter(|id| Some(*id) != editing) {
            if let Some(a) = scene.annotations.iter().find(|a| a.id == id) {
                if let Some((x0, x1)) = Self::span_x(mapping, a.onset, a.end()) {
                    list.push(
                        Layer::Selection,
                        Primitive::FilledRect {
                            rect: Rect::new(x0, 0.0, x1, mapping.plot_height),
                            color: palette.highlight,
                            kind: RectKind::Selected(id),
                        },
                    );
                    self.push_handles(list, mapping, x0, x1);
                }
            }
        }

        if let Some(draft) = &selection.draft {
            if let Some((x0, x1)) = Self::span_x(mapping, draft.onset, draft.end()) {
                let index = scene.labels.iter().position(|l| *l == draft.label);
                let fill = self.style.annotation_fill(&draft.label, index);
                for (y0, y1) in Self::scope_bands(mapping, rows, &draft.channels) {
                    list.push(
                        Layer::Selection,
                        Primitive::FilledRect {
                            rect: Rect::new(x0, y0, x1, y1),
                            color: fill,
                            kind: RectKind::Draft,
                        },
                    );
                }
                self.push_handles(list, mapping, x0, x1);
            }
        }

        if let Some(drag) = selection.channel_drag {
            if let Some(row) = mapping.position_to_row(drag.to) {
                let y = mapping.row_top(row);
                list.push(
                    Layer::Selection,
                    Primitive::FilledRect {
                        rect: Rect::new(0.0, y - 1.0, mapping.plot_left + mapping.plot_width, y + 1.0),
                        color: palette.cursor,
                        kind: RectKind::DropTarget,
                    },
                );
            }
        }

        if let Some(t) = selection.time_cursor {
            let x = mapping.time_to_x(t);
            if x >= mapping.plot_left && x <= mapping.plot_left + mapping.plot_width {
                list.push(
                    Layer::Selection,
                    Primitive::Tick {
                        x: x as f32,
                        y0: 0.0,
                        y1: mapping.plot_height as f32,
                        color: palette.cursor,
                        kind: TickKind::Cursor,
                    },
                );
            }
        }
    }
}

// ==================== Trace reduction ====================

/// Band per pixel column covering every envelope point that maps into it
///
/// A raw sample at time `t` belongs to column `floor(x(t))`. Each envelope
/// point is merged into every column one of its samples maps to, so a
/// column's band contains all of its raw samples.
pub fn column_envelopes(window: &SampleWindow, channel: usize, mapping: &PixelMapping, sample_rate: f64) -> Vec<Envelope> {
    let columns = mapping.plot_width.ceil().max(0.0) as usize;
    let mut bands = vec![Envelope::GAP; columns];
    let Some(row) = window.row(channel) else {
        return bands;
    };
    if columns == 0 || sample_rate <= 0.0 {
        return bands;
    }
    let px_per_second = mapping.plot_width / mapping.time_span;
    let column_of = |sample: usize| ((sample as f64 / sample_rate - mapping.time_start) * px_per_second).floor();

    for (point, envelope) in row.iter().enumerate() {
        if envelope.is_gap() {
            continue;
        }
        let samples = window.point_samples(point);
        if samples.is_empty() {
            continue;
        }
        let first = column_of(samples.start);
        let last = column_of(samples.end - 1);
        if last < 0.0 || first >= columns as f64 {
            continue;
        }
        let first = first.max(0.0) as usize;
        let last = (last as usize).min(columns - 1);
        for band in &mut bands[first..=last] {
            *band = band.merge(*envelope);
        }
    }
    bands
}

/// Zigzag polylines through column bands, split at empty columns
fn envelope_runs<F>(bands: &[Envelope], mapping: &PixelMapping, y: &F) -> Vec<Vec<[f32; 2]>>
where
    F: Fn(f32) -> f32,
{
    let mut runs = Vec::new();
    let mut current: Vec<[f32; 2]> = Vec::new();
    for (column, band) in bands.iter().enumerate() {
        if band.is_gap() {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            continue;
        }
        let x = (mapping.plot_left + column as f64 + 0.5) as f32;
        current.push([x, y(band.max)]);
        current.push([x, y(band.min)]);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Point-by-point polylines, split at gaps
fn line_runs<F>(window: &SampleWindow, channel: usize, mapping: &PixelMapping, sample_rate: f64, y: &F) -> Vec<Vec<[f32; 2]>>
where
    F: Fn(f32) -> f32,
{
    let mut runs = Vec::new();
    let Some(row) = window.row(channel) else {
        return runs;
    };
    let mut current: Vec<[f32; 2]> = Vec::new();
    for (point, envelope) in row.iter().enumerate() {
        if envelope.is_gap() {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            continue;
        }
        let t = window.point_samples(point).start as f64 / sample_rate;
        let x = mapping.time_to_x(t) as f32;
        current.push([x, y(envelope.min)]);
        if envelope.max != envelope.min {
            current.push([x, y(envelope.max)]);
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

// ==================== Grid ====================

/// A 1-2-5 step giving roughly `target_px` between grid lines
pub fn grid_step(span: f64, width_px: f64, target_px: f64) -> f64 {
    if !(span > 0.0) || !(width_px > 0.0) {
        return 1.0;
    }
    let raw = span * target_px / width_px;
    let magnitude = 10f64.powf(raw.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .map(|m| m * magnitude)
        .find(|step| *step >= raw)
        .unwrap_or(10.0 * magnitude)
}

/// Seconds with as many decimals as the grid step needs
fn format_time(t: f64, step: f64) -> String {
    let decimals = (-step.log10().floor()).max(0.0) as usize;
    format!("{:.*}", decimals, t)
}

/// Round to three significant digits and drop trailing zeros
fn format_amount(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let digits = 2 - value.abs().log10().floor() as i32;
    let rounded = if digits >= 0 {
        let factor = 10f64.powi(digits);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-digits);
        (value / factor).round() * factor
    };
    rounded.to_string()
}
