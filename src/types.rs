//! Core data types for the trace viewer engine
//!
//! This module contains the fundamental data structures shared by the
//! cache, viewport, annotation, and rendering layers.
//!
//! # Main Types
//!
//! - [`ChannelType`] - Closed set of channel kinds with an explicit style table
//! - [`ChannelInfo`] - Per-channel metadata reported by the Sample Source
//! - [`EventMarker`] - Instantaneous, read-only event produced externally
//! - [`TimeRange`] - A closed interval of time in seconds
//! - [`Rgba`] - Backend-agnostic color used by draw primitives
//!
//! # Channel Styling
//!
//! Styling is looked up from a static table keyed by [`ChannelType`] rather
//! than inspected at runtime. Each entry carries the trace color and the
//! amplitude (in SI units) that should span half a channel row by default.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An RGBA color with straight (unmultiplied) alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    /// Opaque color from components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Rgba([r, g, b, 255])
    }

    /// Same color with a different alpha
    pub const fn with_alpha(self, alpha: u8) -> Self {
        let [r, g, b, _] = self.0;
        Rgba([r, g, b, alpha])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// Generate a distinct color based on an index
    ///
    /// Uses the golden ratio to spread hues evenly across the color wheel,
    /// with medium saturation and value so the result reads on light and
    /// dark backgrounds.
    pub fn distinct(index: usize) -> Self {
        const GOLDEN_RATIO: f32 = 0.618033988749895;
        let hue = ((index as f32 * GOLDEN_RATIO) % 1.0) * 360.0;
        let (r, g, b) = hsv_to_rgb(hue, 0.7, 0.85);
        Rgba::rgb(r, g, b)
    }
}

/// Convert HSV (hue in degrees, saturation/value in 0..1) to RGB bytes
fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> (u8, u8, u8) {
    let c = value * saturation;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match (hue / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

/// Kind of a recorded channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Electroencephalography
    #[default]
    Eeg,
    /// Magnetometer
    Mag,
    /// Gradiometer
    Grad,
    /// Electrooculography
    Eog,
    /// Electrocardiography
    Ecg,
    /// Electromyography
    Emg,
    /// Stereotactic EEG
    Seeg,
    /// Deep brain stimulation contacts
    Dbs,
    /// Stimulus/trigger channel
    Stim,
    /// Respiration
    Resp,
    /// Anything else
    Misc,
}

/// Style table entry for a channel type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStyle {
    /// Trace color
    pub color: Rgba,
    /// Amplitude in SI units that spans half a channel row at gain 1
    pub scaling: f64,
}

impl ChannelType {
    /// All channel types in display order
    pub fn all() -> &'static [ChannelType] {
        &[
            ChannelType::Eeg,
            ChannelType::Mag,
            ChannelType::Grad,
            ChannelType::Eog,
            ChannelType::Ecg,
            ChannelType::Emg,
            ChannelType::Seeg,
            ChannelType::Dbs,
            ChannelType::Stim,
            ChannelType::Resp,
            ChannelType::Misc,
        ]
    }

    /// Look up the style table entry for this type
    pub fn style(&self) -> ChannelStyle {
        let (color, scaling) = match self {
            ChannelType::Eeg => (Rgba::BLACK, 20e-6),
            ChannelType::Mag => (Rgba::rgb(0, 0, 139), 1e-12),
            ChannelType::Grad => (Rgba::rgb(0, 0, 255), 4e-11),
            ChannelType::Eog => (Rgba::BLACK, 150e-6),
            ChannelType::Ecg => (Rgba::rgb(191, 0, 191), 5e-4),
            ChannelType::Emg => (Rgba::BLACK, 1e-3),
            ChannelType::Seeg => (Rgba::rgb(139, 69, 19), 1e-4),
            ChannelType::Dbs => (Rgba::rgb(46, 139, 87), 1e-4),
            ChannelType::Stim | ChannelType::Resp | ChannelType::Misc => (Rgba::BLACK, 1.0),
        };
        ChannelStyle { color, scaling }
    }

    /// Default gain in channel rows per SI unit
    pub fn default_gain(&self) -> f64 {
        1.0 / (2.0 * self.style().scaling)
    }

    /// Display unit and the factor from SI units to it
    pub fn display_unit(&self) -> (&'static str, f64) {
        match self {
            ChannelType::Eeg | ChannelType::Eog | ChannelType::Ecg | ChannelType::Emg | ChannelType::Dbs => {
                ("µV", 1e6)
            }
            ChannelType::Mag => ("fT", 1e15),
            ChannelType::Grad => ("fT/cm", 1e13),
            ChannelType::Seeg => ("mV", 1e3),
            ChannelType::Stim | ChannelType::Resp | ChannelType::Misc => ("AU", 1.0),
        }
    }

    /// Short lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            ChannelType::Eeg => "eeg",
            ChannelType::Mag => "mag",
            ChannelType::Grad => "grad",
            ChannelType::Eog => "eog",
            ChannelType::Ecg => "ecg",
            ChannelType::Emg => "emg",
            ChannelType::Seeg => "seeg",
            ChannelType::Dbs => "dbs",
            ChannelType::Stim => "stim",
            ChannelType::Resp => "resp",
            ChannelType::Misc => "misc",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ChannelType::all()
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            // "meg" is the umbrella name some providers use for magnetometers
            .or_else(|| (lower == "meg").then_some(ChannelType::Mag))
            .ok_or_else(|| format!("unknown channel type '{}'", s))
    }
}

/// Metadata of one channel as reported by the Sample Source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Storage index in the source
    pub index: usize,
    /// Channel name
    pub name: String,
    /// Channel type
    pub kind: ChannelType,
    /// Factor converting raw sample values to SI units
    pub unit_scale: f64,
    /// Whether the channel was flagged bad by the provider
    pub bad: bool,
}

impl ChannelInfo {
    /// Create channel metadata with unit scale 1 and no bad flag
    pub fn new(index: usize, name: impl Into<String>, kind: ChannelType) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
            unit_scale: 1.0,
            bad: false,
        }
    }

    /// Set the unit scale
    pub fn with_unit_scale(mut self, unit_scale: f64) -> Self {
        self.unit_scale = unit_scale;
        self
    }

    /// Set the bad flag
    pub fn with_bad(mut self, bad: bool) -> Self {
        self.bad = bad;
        self
    }
}

/// An instantaneous event produced outside this engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    /// Event time in seconds
    pub time: f64,
    /// Numeric event code
    pub code: i32,
    /// Optional human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl EventMarker {
    pub fn new(time: f64, code: i32) -> Self {
        Self {
            time,
            code,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Text to draw next to the marker
    pub fn display_text(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.code.to_string(),
        }
    }
}

/// A closed interval of time in seconds with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Create a range, swapping the bounds if given in reverse
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    /// Whether `[start, end]` intersects this range (touching counts)
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start <= self.end && end >= self.start
    }
}
