//! Overview bar
//!
//! A compact map of the whole recording: time runs left to right over the
//! full duration, channels top to bottom in display order. It shows the
//! channel types, bad channels, events, annotations and the rectangle the
//! main view currently covers. Clicking or dragging in it recenters the
//! viewport.

use super::{DrawList, Layer, Primitive, Rect, RectKind, Scene, Style, TickKind};
use crate::interaction::SelectionState;
use crate::types::TimeRange;
use crate::viewport::Viewport;

/// Width of the channel-type strip on the left edge
const STRIP_PX: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overview {
    pub width_px: f64,
    pub height_px: f64,
}

impl Default for Overview {
    fn default() -> Self {
        Self {
            width_px: 800.0,
            height_px: 60.0,
        }
    }
}

impl Overview {
    pub fn new(width_px: f64, height_px: f64) -> Self {
        Self { width_px, height_px }
    }

    pub fn resize(&mut self, width_px: f64, height_px: f64) {
        self.width_px = width_px.max(1.0);
        self.height_px = height_px.max(1.0);
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && x <= self.width_px && y >= 0.0 && y <= self.height_px
    }

    pub fn time_to_x(&self, time: f64, total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        time / total * self.width_px
    }

    pub fn x_to_time(&self, x: f64, total: f64) -> f64 {
        (x / self.width_px).clamp(0.0, 1.0) * total
    }

    fn row_height(&self, channels: usize) -> f64 {
        self.height_px / channels.max(1) as f64
    }

    /// Display position under a y coordinate
    pub fn y_to_position(&self, y: f64, channels: usize) -> usize {
        let position = (y.max(0.0) / self.row_height(channels)).floor() as usize;
        position.min(channels.saturating_sub(1))
    }

    /// Time and display position under a point
    pub fn target_at(&self, x: f64, y: f64, viewport: &Viewport) -> (f64, usize) {
        (
            self.x_to_time(x, viewport.total_duration()),
            self.y_to_position(y, viewport.total_channels()),
        )
    }

    /// Center the viewport on the point under the pointer
    pub fn navigate(&self, viewport: &mut Viewport, x: f64, y: f64) {
        let (time, position) = self.target_at(x, y, viewport);
        viewport.center_on(time, Some(position));
    }

    /// Compose the overview for the current state
    pub fn compose(&self, viewport: &Viewport, selection: &SelectionState, scene: &Scene<'_>, style: &Style) -> DrawList {
        let mut list = DrawList::new();
        let total = viewport.total_duration();
        let table = viewport.channels();
        let count = table.len();
        let row = self.row_height(count);

        for (position, &channel) in table.order().iter().enumerate() {
            let Some(info) = table.info(channel) else {
                continue;
            };
            let top = position as f64 * row;
            list.push(
                Layer::Grid,
                Primitive::FilledRect {
                    rect: Rect::new(0.0, top, STRIP_PX, top + row),
                    color: info.kind.style().color,
                    kind: RectKind::ChannelStrip { channel },
                },
            );
            if table.is_bad(channel) {
                list.push(
                    Layer::BadChannels,
                    Primitive::FilledRect {
                        rect: Rect::new(STRIP_PX, top, self.width_px, top + row.max(1.0)),
                        color: style.palette.bad_channel,
                        kind: RectKind::BadChannel {
                            channel,
                            hatched: false,
                        },
                    },
                );
            }
        }

        if scene.options.show_events {
            for event in scene.events.events_in(TimeRange::new(0.0, total)) {
                list.push(
                    Layer::Events,
                    Primitive::Tick {
                        x: self.time_to_x(event.time, total) as f32,
                        y0: 0.0,
                        y1: self.height_px as f32,
                        color: style.palette.event,
                        kind: TickKind::Event { code: event.code },
                    },
                );
            }
        }

        if scene.options.show_annotations {
            for annotation in scene.annotations {
                if scene.options.hidden_labels.contains(&annotation.label) {
                    continue;
                }
                let x0 = self.time_to_x(annotation.onset, total);
                let x1 = self.time_to_x(annotation.end(), total).max(x0 + 1.0);
                let index = scene.labels.iter().position(|l| *l == annotation.label);
                list.push(
                    Layer::Annotations,
                    Primitive::FilledRect {
                        rect: Rect::new(x0, 0.0, x1, self.height_px),
                        color: style.annotation_fill(&annotation.label, index),
                        kind: RectKind::Annotation(annotation.id),
                    },
                );
            }
        }

        let first = viewport.first_channel_index() as f64;
        let shown = viewport.n_visible_channels() as f64;
        list.push(
            Layer::Selection,
            Primitive::FilledRect {
                rect: Rect::new(
                    self.time_to_x(viewport.time_start(), total),
                    first * row,
                    self.time_to_x(viewport.time_end(), total),
                    (first + shown) * row,
                ),
                color: style.palette.view_range,
                kind: RectKind::ViewRange,
            },
        );
        if let Some(t) = selection.time_cursor {
            list.push(
                Layer::Selection,
                Primitive::Tick {
                    x: self.time_to_x(t, total) as f32,
                    y0: 0.0,
                    y1: self.height_px as f32,
                    color: style.palette.cursor,
                    kind: TickKind::Cursor,
                },
            );
        }

        list.finish()
    }
}
