//! Settings sections of the viewer configuration
//!
//! Each section is plain serde data with defaults, grouped by the
//! component that reads it.
//!
//! # Main Types
//!
//! - [`CacheSettings`] - LOD cache memory budget, block geometry, fetch pool size
//! - [`ViewSettings`] - Initial viewport and row/label layout
//! - [`InteractionSettings`] - Pan/zoom steps, hit-test tolerances, annotation modifier
//! - [`AnnotationSettings`] - Undo history depth

use serde::{Deserialize, Serialize};

/// Default LOD cache budget (256 MiB)
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 256 * 1024 * 1024;

/// Default number of envelope points per cache block
pub const DEFAULT_BLOCK_POINTS: usize = 1024;

/// Settings for the LOD cache and its fetch workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Memory budget for envelope blocks in bytes
    pub budget_bytes: usize,

    /// Envelope points per block along the time axis
    pub block_points: usize,

    /// Channels grouped into one block
    pub channels_per_block: usize,

    /// Number of background fetch threads
    pub fetch_workers: usize,

    /// Capacity of the fetch job queue
    pub queue_depth: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            block_points: DEFAULT_BLOCK_POINTS,
            channels_per_block: 8,
            fetch_workers: 2,
            queue_depth: 64,
        }
    }
}

/// Settings for the initial viewport and trace layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Initial visible time span in seconds
    pub initial_duration: f64,

    /// Initial number of visible channels
    pub initial_channels: usize,

    /// Smallest row height drawn for small datasets
    pub min_row_px: f64,

    /// Datasets with more channels than this require rows tall enough for a label
    pub dense_channel_limit: usize,

    /// Height of a channel label; the row threshold for dense datasets
    pub label_row_px: f64,

    /// Width of the channel-name gutter left of the traces
    pub gutter_px: f64,

    /// Largest LOD stride still drawn as a plain line instead of a min/max band
    pub line_mode_max_stride: usize,

    /// Clip traces to this many row heights around their baseline
    pub clipping_rows: Option<f64>,

    /// Draw one scalebar per visible channel type
    pub show_scalebars: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            initial_duration: 10.0,
            initial_channels: 20,
            min_row_px: 2.0,
            dense_channel_limit: 32,
            label_row_px: 10.0,
            gutter_px: 80.0,
            line_mode_max_stride: 1,
            clipping_rows: None,
            show_scalebars: true,
        }
    }
}

impl ViewSettings {
    /// Minimum row height before channels get elided, for a dataset size
    pub fn row_threshold_px(&self, total_channels: usize) -> f64 {
        if total_channels > self.dense_channel_limit {
            self.min_row_px.max(self.label_row_px)
        } else {
            self.min_row_px
        }
    }
}

/// Keyboard modifier that switches a plain drag into annotation drafting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationModifier {
    #[default]
    Shift,
    Alt,
    Ctrl,
}

/// Settings for pointer and keyboard interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    /// Fraction of the visible span moved by an arrow key
    pub pan_fraction: f64,

    /// Zoom factor applied by +/- and one wheel notch
    pub zoom_step: f64,

    /// Amplitude factor applied by ctrl + +/-
    pub scale_step: f64,

    /// Distance in pixels within which an annotation edge can be grabbed
    pub hit_tolerance_px: f64,

    /// Pointer travel in pixels below which a press/release is a click
    pub click_slop_px: f64,

    /// Modifier that turns a drag into annotation drafting
    pub annotation_modifier: AnnotationModifier,

    /// Label given to newly drafted annotations
    pub default_label: String,

    /// Horizontal drag distance in pixels that zooms by a factor of e
    pub drag_zoom_px: f64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            pan_fraction: 0.25,
            zoom_step: 1.25,
            scale_step: 1.25,
            hit_tolerance_px: 5.0,
            click_slop_px: 3.0,
            annotation_modifier: AnnotationModifier::Shift,
            default_label: "BAD_".to_string(),
            drag_zoom_px: 200.0,
        }
    }
}

/// Settings for the annotation store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    /// Maximum number of undo entries kept; `None` keeps all
    pub undo_limit: Option<usize>,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            undo_limit: Some(1000),
        }
    }
}
