//! Interaction controller
//!
//! Maps an abstract stream of [`InputEvent`]s onto viewport changes,
//! annotation edits and selection state. The controller is an explicit
//! state machine:
//!
//! ```text
//!                 press (gutter)           press + modifier / annotation mode
//!   ChannelDragging <-------- Idle --------> AnnotationDrafting
//!                            / |  \
//!           press (plain)   /  |   \  press near an annotation edge
//!                  Panning <   |    > AnnotationResizing
//!                              |
//!                   secondary press
//!                              v
//!                           Zooming
//! ```
//!
//! Every gesture returns to `Idle` on release. Escape (or a toolkit
//! cancel) aborts any gesture without committing: drafts are dropped,
//! resizes revert to their original geometry and pans/zooms restore the
//! viewport captured at the press. Events that make no sense in the
//! current state are ignored, so no input sequence can leave the
//! controller stuck.
//!
//! Hit-testing uses pixel tolerances, so edges stay grabbable at any zoom.

pub mod input;

pub use input::{InputEvent, Key, Modifiers, PointerButton};

use crate::annotations::{Annotation, AnnotationId, AnnotationStore, ChannelScope};
use crate::config::{InteractionSettings, ViewSettings};
use crate::render::{DisplayOptions, Overview, PixelMapping};
use crate::viewport::{TimeTicks, Viewport};
use std::collections::BTreeSet;

/// What an in-progress drag does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragMode {
    #[default]
    None,
    Pan,
    Zoom,
    AnnotationCreate,
    AnnotationResize,
    ChannelReorder,
}

/// Annotation edge grabbed by a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

/// Annotation geometry being created or resized, not yet committed
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub onset: f64,
    pub duration: f64,
    pub label: String,
    pub channels: ChannelScope,
    /// Stored annotation this draft previews, if resizing
    pub editing: Option<AnnotationId>,
}

impl Draft {
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    fn of(annotation: &Annotation) -> Self {
        Self {
            onset: annotation.onset,
            duration: annotation.duration,
            label: annotation.label.clone(),
            channels: annotation.channels.clone(),
            editing: Some(annotation.id),
        }
    }
}

/// Channel being dragged in the gutter, by display position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDrag {
    pub from: usize,
    pub to: usize,
}

/// Everything the user has picked or is dragging
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionState {
    /// Storage indices
    pub highlighted_channels: BTreeSet<usize>,
    pub selected_annotation: Option<AnnotationId>,
    pub draft: Option<Draft>,
    pub drag_mode: DragMode,
    /// Time of the vertical cursor line
    pub time_cursor: Option<f64>,
    pub channel_drag: Option<ChannelDrag>,
}

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Panning,
    Zooming,
    AnnotationDrafting,
    AnnotationResizing,
    ChannelDragging,
}

/// Time window captured at a press, for exact restores
#[derive(Debug, Clone, Copy, PartialEq)]
struct SavedWindow {
    start: TimeTicks,
    span: TimeTicks,
}

impl SavedWindow {
    fn capture(viewport: &Viewport) -> Self {
        Self {
            start: viewport.time_start_ticks(),
            span: viewport.time_span_ticks(),
        }
    }

    fn restore(self, viewport: &mut Viewport) {
        viewport.set_time_window_ticks(self.start, self.span);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Idle,
    Panning {
        press: (f64, f64),
        moved: bool,
        window: SavedWindow,
        seconds_per_px: f64,
    },
    Zooming {
        press: (f64, f64),
        moved: bool,
        window: SavedWindow,
        anchor: f64,
    },
    Drafting {
        anchor: f64,
    },
    Resizing {
        edge: Edge,
        original: Annotation,
        press_time: f64,
    },
    ChannelDragging {
        press_y: f64,
        moved: bool,
    },
}

/// Input state machine
#[derive(Debug, Clone)]
pub struct InteractionController {
    settings: InteractionSettings,
    view: ViewSettings,
    gesture: Gesture,
    selection: SelectionState,
    display: DisplayOptions,
    annotation_mode: bool,
    draft_label: String,
}

impl InteractionController {
    pub fn new(settings: InteractionSettings, view: ViewSettings) -> Self {
        let draft_label = settings.default_label.clone();
        let display = DisplayOptions::new(&view);
        Self {
            settings,
            view,
            gesture: Gesture::Idle,
            selection: SelectionState::default(),
            display,
            annotation_mode: false,
            draft_label,
        }
    }

    pub fn state(&self) -> ControllerState {
        match self.gesture {
            Gesture::Idle => ControllerState::Idle,
            Gesture::Panning { .. } => ControllerState::Panning,
            Gesture::Zooming { .. } => ControllerState::Zooming,
            Gesture::Drafting { .. } => ControllerState::AnnotationDrafting,
            Gesture::Resizing { .. } => ControllerState::AnnotationResizing,
            Gesture::ChannelDragging { .. } => ControllerState::ChannelDragging,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.gesture == Gesture::Idle
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionState {
        &mut self.selection
    }

    pub fn display_options(&self) -> &DisplayOptions {
        &self.display
    }

    pub fn display_options_mut(&mut self) -> &mut DisplayOptions {
        &mut self.display
    }

    /// Whether an unmodified drag drafts annotations
    pub fn annotation_mode(&self) -> bool {
        self.annotation_mode
    }

    pub fn set_annotation_mode(&mut self, enabled: bool) {
        self.annotation_mode = enabled;
    }

    /// Label given to the next drafted annotation
    pub fn draft_label(&self) -> &str {
        &self.draft_label
    }

    pub fn set_draft_label(&mut self, label: impl Into<String>) {
        self.draft_label = label.into();
    }

    /// Process one event; returns whether anything visible changed
    pub fn handle(
        &mut self,
        event: InputEvent,
        viewport: &mut Viewport,
        store: &mut AnnotationStore,
        overview: &Overview,
    ) -> bool {
        let mapping = PixelMapping::new(viewport, &self.view);
        let changed = match event {
            InputEvent::PointerDown {
                x,
                y,
                button,
                modifiers,
            } => self.pointer_down(x, y, button, modifiers, &mapping, viewport, store),
            InputEvent::PointerMove { x, y, .. } => self.pointer_move(x, y, &mapping, viewport),
            InputEvent::PointerUp { x, y, .. } => self.pointer_up(x, y, &mapping, viewport, store),
            InputEvent::PointerCancel => self.cancel(viewport),
            InputEvent::Wheel {
                dx,
                dy,
                x,
                y,
                modifiers,
            } => self.wheel(dx, dy, x, y, modifiers, &mapping, viewport),
            InputEvent::Key { key, modifiers } => self.key(key, modifiers, viewport, store),
            InputEvent::OverviewPress { x, y } | InputEvent::OverviewDrag { x, y } => {
                if !self.is_idle() {
                    return false;
                }
                overview.navigate(viewport, x, y);
                true
            }
        };
        if changed {
            tracing::trace!("Input {:?} handled, now {:?}", event, self.state());
        }
        changed
    }

    // ==================== Pointer ====================

    #[allow(clippy::too_many_arguments)]
    fn pointer_down(
        &mut self,
        x: f64,
        y: f64,
        button: PointerButton,
        modifiers: Modifiers,
        mapping: &PixelMapping,
        viewport: &Viewport,
        store: &AnnotationStore,
    ) -> bool {
        if !self.is_idle() {
            return false;
        }

        if mapping.in_gutter(x, y) {
            let Some(position) = mapping.y_to_position(y) else {
                return false;
            };
            if button != PointerButton::Primary {
                return false;
            }
            self.gesture = Gesture::ChannelDragging { press_y: y, moved: false };
            self.selection.channel_drag = Some(ChannelDrag {
                from: position,
                to: position,
            });
            self.selection.drag_mode = DragMode::ChannelReorder;
            return true;
        }

        if !mapping.in_plot(x, y) {
            return false;
        }
        let time = mapping.x_to_time(x).clamp(0.0, viewport.total_duration());

        if button == PointerButton::Secondary {
            self.gesture = Gesture::Zooming {
                press: (x, y),
                moved: false,
                window: SavedWindow::capture(viewport),
                anchor: time,
            };
            self.selection.drag_mode = DragMode::Zoom;
            return true;
        }

        let modifier_held = modifiers.has(self.settings.annotation_modifier);
        if !modifier_held {
            if let Some((annotation, edge)) = self.edge_hit(x, y, mapping, viewport, store) {
                self.selection.selected_annotation = Some(annotation.id);
                self.selection.draft = Some(Draft::of(&annotation));
                self.selection.drag_mode = DragMode::AnnotationResize;
                self.gesture = Gesture::Resizing {
                    edge,
                    original: annotation,
                    press_time: mapping.x_to_time(x),
                };
                return true;
            }
        }

        if modifier_held || self.annotation_mode {
            self.selection.draft = Some(Draft {
                onset: time,
                duration: 0.0,
                label: self.draft_label.clone(),
                channels: ChannelScope::All,
                editing: None,
            });
            self.selection.drag_mode = DragMode::AnnotationCreate;
            self.gesture = Gesture::Drafting { anchor: time };
            return true;
        }

        self.gesture = Gesture::Panning {
            press: (x, y),
            moved: false,
            window: SavedWindow::capture(viewport),
            seconds_per_px: mapping.seconds_per_px(),
        };
        self.selection.drag_mode = DragMode::Pan;
        true
    }

    fn beyond_slop(&self, press: (f64, f64), x: f64, y: f64) -> bool {
        let slop = self.settings.click_slop_px;
        (x - press.0).abs() > slop || (y - press.1).abs() > slop
    }

    fn pointer_move(&mut self, x: f64, y: f64, mapping: &PixelMapping, viewport: &mut Viewport) -> bool {
        let total = viewport.total_duration();
        let slop = self.settings.click_slop_px;
        let escaped = match &self.gesture {
            Gesture::Panning { press, .. } | Gesture::Zooming { press, .. } => self.beyond_slop(*press, x, y),
            _ => false,
        };

        match &mut self.gesture {
            Gesture::Idle => false,
            Gesture::Panning {
                press,
                moved,
                window,
                seconds_per_px,
            } => {
                *moved |= escaped;
                window.restore(viewport);
                viewport.pan(-(x - press.0) * *seconds_per_px);
                true
            }
            Gesture::Zooming {
                press,
                moved,
                window,
                anchor,
            } => {
                *moved |= escaped;
                window.restore(viewport);
                let factor = ((x - press.0) / self.settings.drag_zoom_px).exp();
                viewport.zoom(factor, *anchor);
                true
            }
            Gesture::Drafting { anchor } => {
                let time = mapping.x_to_time(x).clamp(0.0, total);
                if let Some(draft) = self.selection.draft.as_mut() {
                    draft.onset = anchor.min(time);
                    draft.duration = (time - *anchor).abs();
                }
                true
            }
            Gesture::Resizing {
                edge,
                original,
                press_time,
            } => {
                let delta = mapping.x_to_time(x) - *press_time;
                let (onset, duration) = match edge {
                    Edge::End => {
                        let room = (total - original.onset).max(0.0);
                        (original.onset, (original.duration + delta).clamp(0.0, room))
                    }
                    Edge::Start => {
                        let end = original.end();
                        let onset = (original.onset + delta).clamp(0.0, end);
                        (onset, end - onset)
                    }
                };
                if let Some(draft) = self.selection.draft.as_mut() {
                    draft.onset = onset;
                    draft.duration = duration;
                }
                true
            }
            Gesture::ChannelDragging { press_y, moved } => {
                *moved |= (y - *press_y).abs() > slop;
                let to = match mapping.y_to_position(y) {
                    Some(position) => position,
                    None if y < 0.0 => mapping.first_position,
                    None => mapping.first_position + mapping.layout.shown.saturating_sub(1),
                };
                match self.selection.channel_drag.as_mut() {
                    Some(drag) if drag.to != to => {
                        drag.to = to;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn pointer_up(
        &mut self,
        x: f64,
        y: f64,
        mapping: &PixelMapping,
        viewport: &mut Viewport,
        store: &mut AnnotationStore,
    ) -> bool {
        if self.is_idle() {
            return false;
        }
        self.pointer_move(x, y, mapping, viewport);
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        let draft = self.selection.draft.take();
        let channel_drag = self.selection.channel_drag.take();
        self.selection.drag_mode = DragMode::None;

        match gesture {
            Gesture::Idle => {}
            Gesture::Panning { moved, window, .. } => {
                if !moved {
                    window.restore(viewport);
                    self.click(x, y, mapping, viewport, store);
                }
            }
            Gesture::Zooming { moved, window, .. } => {
                if !moved {
                    window.restore(viewport);
                    self.selection.time_cursor = None;
                }
            }
            Gesture::Drafting { .. } => match draft {
                Some(draft) if draft.duration > 0.0 => {
                    let id = store.create(draft.onset, draft.duration, draft.label, draft.channels);
                    self.selection.selected_annotation = Some(id);
                }
                _ => self.click(x, y, mapping, viewport, store),
            },
            Gesture::Resizing { original, .. } => {
                if let Some(draft) = draft {
                    store.resize(original.id, draft.onset, draft.duration);
                }
            }
            Gesture::ChannelDragging { moved, .. } => {
                if let Some(drag) = channel_drag {
                    if drag.to != drag.from {
                        viewport.move_channel(drag.from, drag.to);
                    } else if !moved {
                        if let Some(storage) = viewport.channels().storage_at(drag.from) {
                            let bad = viewport.channels_mut().toggle_bad(storage);
                            tracing::debug!("Channel {} marked {}", storage, if bad { "bad" } else { "good" });
                        }
                    }
                }
            }
        }
        true
    }

    /// Press and release without a drag in the trace area
    fn click(&mut self, x: f64, y: f64, mapping: &PixelMapping, viewport: &Viewport, store: &AnnotationStore) {
        let time = mapping.x_to_time(x).clamp(0.0, viewport.total_duration());
        let channel = mapping
            .y_to_position(y)
            .and_then(|position| viewport.channels().storage_at(position));
        self.selection.time_cursor = Some(time);
        self.selection.highlighted_channels = channel.into_iter().collect();
        self.selection.selected_annotation = if self.display.show_annotations {
            store
                .snapshot()
                .iter()
                .rev()
                .find(|a| {
                    !self.display.hidden_labels.contains(&a.label)
                        && a.onset <= time
                        && time <= a.end()
                        && channel.map_or(true, |c| a.channels.applies_to(c))
                })
                .map(|a| a.id)
        } else {
            None
        };
    }

    /// Nearest annotation edge within the hit tolerance
    ///
    /// Ties go to the later edge, so a zero-length annotation is grabbed by
    /// its end and grows to the right.
    fn edge_hit(
        &self,
        x: f64,
        y: f64,
        mapping: &PixelMapping,
        viewport: &Viewport,
        store: &AnnotationStore,
    ) -> Option<(Annotation, Edge)> {
        if !self.display.show_annotations {
            return None;
        }
        let channel = mapping
            .y_to_position(y)
            .and_then(|position| viewport.channels().storage_at(position));
        let tolerance = self.settings.hit_tolerance_px;

        let snapshot = store.snapshot();
        let mut best: Option<(f64, &Annotation, Edge)> = None;
        for annotation in snapshot.iter() {
            if self.display.hidden_labels.contains(&annotation.label) {
                continue;
            }
            if channel.is_some_and(|c| !annotation.channels.applies_to(c)) {
                continue;
            }
            for (edge, time) in [(Edge::Start, annotation.onset), (Edge::End, annotation.end())] {
                let distance = (mapping.time_to_x(time) - x).abs();
                if distance > tolerance {
                    continue;
                }
                if !matches!(best, Some((d, ..)) if distance > d) {
                    best = Some((distance, annotation, edge));
                }
            }
        }
        best.map(|(_, annotation, edge)| (annotation.clone(), edge))
    }

    /// Abort the current gesture without committing
    fn cancel(&mut self, viewport: &mut Viewport) -> bool {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => return false,
            Gesture::Panning { window, .. } | Gesture::Zooming { window, .. } => window.restore(viewport),
            Gesture::Drafting { .. } | Gesture::Resizing { .. } | Gesture::ChannelDragging { .. } => {}
        }
        self.selection.draft = None;
        self.selection.channel_drag = None;
        self.selection.drag_mode = DragMode::None;
        tracing::debug!("Gesture cancelled");
        true
    }

    // ==================== Wheel and keys ====================

    #[allow(clippy::too_many_arguments)]
    fn wheel(
        &mut self,
        dx: f64,
        dy: f64,
        x: f64,
        y: f64,
        modifiers: Modifiers,
        mapping: &PixelMapping,
        viewport: &mut Viewport,
    ) -> bool {
        if !self.is_idle() {
            return false;
        }
        let zoom_amount = if dx != 0.0 {
            dx
        } else if modifiers.any() {
            -dy
        } else {
            0.0
        };

        if zoom_amount != 0.0 {
            let anchor = if mapping.in_plot(x, y) {
                mapping.x_to_time(x)
            } else {
                viewport.time_start() + viewport.time_span() / 2.0
            };
            viewport.zoom(self.settings.zoom_step.powf(zoom_amount.signum()), anchor);
            true
        } else if dy != 0.0 {
            viewport.scroll_channels(dy.signum() as isize);
            true
        } else {
            false
        }
    }

    fn key(&mut self, key: Key, modifiers: Modifiers, viewport: &mut Viewport, store: &mut AnnotationStore) -> bool {
        if !self.is_idle() {
            return key == Key::Escape && self.cancel(viewport);
        }

        let span = viewport.time_span();
        let center = viewport.time_start() + span / 2.0;
        let pan_step = if modifiers.shift {
            span
        } else {
            span * self.settings.pan_fraction
        };
        let page = viewport.n_visible_channels() as isize;
        let count_step = if modifiers.shift { 10 } else { 1 };

        match key {
            Key::Left => viewport.pan(-pan_step),
            Key::Right => viewport.pan(pan_step),
            Key::Up => viewport.scroll_channels(-page),
            Key::Down => viewport.scroll_channels(page),
            Key::Plus if modifiers.ctrl => viewport.scale_all(self.settings.scale_step),
            Key::Minus if modifiers.ctrl => viewport.scale_all(1.0 / self.settings.scale_step),
            Key::Plus => viewport.zoom(self.settings.zoom_step, center),
            Key::Minus => viewport.zoom(1.0 / self.settings.zoom_step, center),
            Key::Home => viewport.change_duration(-0.2),
            Key::End => viewport.change_duration(0.25),
            Key::PageUp => viewport.change_channel_count(-count_step),
            Key::PageDown => viewport.change_channel_count(count_step),
            Key::Delete | Key::Backspace => {
                let Some(id) = self.selection.selected_annotation.take() else {
                    return false;
                };
                return store.delete(id).is_some();
            }
            Key::Escape => {
                let had_selection =
                    self.selection.selected_annotation.is_some() || !self.selection.highlighted_channels.is_empty();
                self.selection.selected_annotation = None;
                self.selection.highlighted_channels.clear();
                return had_selection;
            }
            Key::Char('z') if modifiers.ctrl => {
                let done = if modifiers.shift { store.redo() } else { store.undo() };
                self.prune_selection(store);
                return done;
            }
            Key::Char('y') if modifiers.ctrl => {
                let done = store.redo();
                self.prune_selection(store);
                return done;
            }
            Key::Char('a') if modifiers.shift => {
                self.display.show_annotations = !self.display.show_annotations;
            }
            Key::Char('a') => {
                self.annotation_mode = !self.annotation_mode;
                tracing::debug!("Annotation mode {}", if self.annotation_mode { "on" } else { "off" });
            }
            Key::Char('e') => {
                self.display.show_events = !self.display.show_events;
            }
            Key::Char('s') => {
                self.display.show_scalebars = !self.display.show_scalebars;
            }
            Key::Char(_) => return false,
        }
        true
    }

    /// Forget a selected annotation that no longer exists
    fn prune_selection(&mut self, store: &AnnotationStore) {
        if let Some(id) = self.selection.selected_annotation {
            if store.get(id).is_none() {
                self.selection.selected_annotation = None;
            }
        }
    }
}
