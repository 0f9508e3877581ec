//! Pixel mapping between viewport coordinates and data coordinates
//!
//! The horizontal axis maps time affinely onto the plot area to the right
//! of the label gutter; the vertical axis maps display rows onto equal
//! bands. Both mappings are invertible, which is what hit-testing in the
//! interaction controller relies on.

use crate::config::ViewSettings;
use crate::viewport::Viewport;

/// Which rows are drawn and how tall they are
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowLayout {
    /// Height of one drawn row in pixels
    pub row_height: f64,
    /// Rows drawn, starting at the viewport's first channel
    pub shown: usize,
    /// Visible channels left out because rows would be too thin
    pub elided: usize,
}

impl RowLayout {
    /// Lay out the viewport's channel window
    ///
    /// When rows would be thinner than the threshold for this dataset size,
    /// rows get the threshold height and the last slot holds the
    /// "N more channels" indicator.
    pub fn compute(viewport: &Viewport, settings: &ViewSettings) -> Self {
        let count = viewport.n_visible_channels();
        let height = viewport.plot_height_px();
        if count == 0 {
            return Self {
                row_height: height,
                shown: 0,
                elided: 0,
            };
        }
        let natural = height / count as f64;
        let threshold = settings.row_threshold_px(viewport.total_channels());
        if natural >= threshold || threshold <= 0.0 {
            return Self {
                row_height: natural,
                shown: count,
                elided: 0,
            };
        }
        let slots = (height / threshold).floor() as usize;
        let shown = slots.saturating_sub(1).clamp(1, count);
        Self {
            row_height: threshold,
            shown,
            elided: count - shown,
        }
    }
}

/// Affine pixel <-> data mapping for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMapping {
    /// Left edge of the trace area (width of the label gutter)
    pub plot_left: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    pub time_start: f64,
    pub time_span: f64,
    pub layout: RowLayout,
    /// Display position of the first drawn row
    pub first_position: usize,
}

impl PixelMapping {
    pub fn new(viewport: &Viewport, settings: &ViewSettings) -> Self {
        Self {
            plot_left: settings.gutter_px.max(0.0),
            plot_width: viewport.plot_width_px(),
            plot_height: viewport.plot_height_px(),
            time_start: viewport.time_start(),
            time_span: viewport.time_span(),
            layout: RowLayout::compute(viewport, settings),
            first_position: viewport.first_channel_index(),
        }
    }

    /// Seconds per horizontal pixel
    pub fn seconds_per_px(&self) -> f64 {
        self.time_span / self.plot_width
    }

    pub fn time_to_x(&self, time: f64) -> f64 {
        self.plot_left + (time - self.time_start) / self.time_span * self.plot_width
    }

    pub fn x_to_time(&self, x: f64) -> f64 {
        self.time_start + (x - self.plot_left) / self.plot_width * self.time_span
    }

    /// Top edge of a drawn row
    pub fn row_top(&self, row: usize) -> f64 {
        row as f64 * self.layout.row_height
    }

    pub fn row_center(&self, row: usize) -> f64 {
        (row as f64 + 0.5) * self.layout.row_height
    }

    /// Drawn row under a y coordinate
    pub fn y_to_row(&self, y: f64) -> Option<usize> {
        if !(y >= 0.0) || self.layout.row_height <= 0.0 {
            return None;
        }
        let row = (y / self.layout.row_height).floor() as usize;
        (row < self.layout.shown).then_some(row)
    }

    /// Display position under a y coordinate
    pub fn y_to_position(&self, y: f64) -> Option<usize> {
        self.y_to_row(y).map(|row| self.first_position + row)
    }

    pub fn position_to_row(&self, position: usize) -> Option<usize> {
        let row = position.checked_sub(self.first_position)?;
        (row < self.layout.shown).then_some(row)
    }

    /// Whether a point lies in the trace area
    pub fn in_plot(&self, x: f64, y: f64) -> bool {
        x >= self.plot_left && x <= self.plot_left + self.plot_width && y >= 0.0 && y <= self.plot_height
    }

    /// Whether a point lies in the channel-name gutter
    pub fn in_gutter(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && x < self.plot_left && y >= 0.0 && y <= self.plot_height
    }

    /// Vertical offset in pixels of a value within its row
    ///
    /// `scale` is `unit_scale * gain * global_scale`, in rows per raw unit.
    /// Positive values go up. With `clip_rows`, the offset is limited to
    /// half that many row heights either way.
    pub fn value_offset(&self, value: f32, scale: f64, clip_rows: Option<f64>) -> f64 {
        let offset = value as f64 * scale * self.layout.row_height;
        match clip_rows {
            Some(rows) => {
                let limit = rows * self.layout.row_height / 2.0;
                offset.clamp(-limit, limit)
            }
            None => offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelInfo, ChannelType};
    use crate::viewport::ChannelTable;

    fn viewport(channels: usize, visible: usize, height: f64) -> Viewport {
        let table = ChannelTable::new(
            (0..channels)
                .map(|i| ChannelInfo::new(i, format!("C{}", i), ChannelType::Misc))
                .collect(),
        );
        let settings = ViewSettings {
            initial_channels: visible,
            ..ViewSettings::default()
        };
        let mut vp = Viewport::new(table, 100.0, 10_000, &settings, 800.0, height);
        vp.set_time_window(10.0, 8.0);
        vp
    }

    #[test]
    fn test_time_mapping_is_invertible() {
        let vp = viewport(4, 4, 400.0);
        let m = PixelMapping::new(&vp, &ViewSettings::default());
        assert_eq!(m.time_to_x(10.0), 80.0);
        assert_eq!(m.time_to_x(18.0), 880.0);
        for x in [80.0, 123.5, 500.0, 880.0] {
            assert!((m.time_to_x(m.x_to_time(x)) - x).abs() < 1e-9);
        }
        assert!((m.seconds_per_px() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_row_mapping() {
        let vp = viewport(4, 4, 400.0);
        let m = PixelMapping::new(&vp, &ViewSettings::default());
        assert_eq!(m.layout.row_height, 100.0);
        assert_eq!(m.row_center(1), 150.0);
        assert_eq!(m.y_to_row(150.0), Some(1));
        assert_eq!(m.y_to_row(399.0), Some(3));
        assert_eq!(m.y_to_row(400.0), None);
        assert_eq!(m.y_to_row(-1.0), None);
        assert!(m.in_gutter(10.0, 50.0));
        assert!(!m.in_plot(10.0, 50.0));
    }

    #[test]
    fn test_dense_dataset_elides_rows() {
        // 300 channels in 400px is 1.33px per row, below the 10px label threshold
        let vp = viewport(300, 300, 400.0);
        let layout = RowLayout::compute(&vp, &ViewSettings::default());
        assert_eq!(layout.row_height, 10.0);
        assert_eq!(layout.shown, 39);
        assert_eq!(layout.elided, 261);
    }

    #[test]
    fn test_small_dataset_uses_lower_threshold() {
        // 30 channels at 3px each stay above the 2px threshold
        let vp = viewport(30, 30, 90.0);
        let layout = RowLayout::compute(&vp, &ViewSettings::default());
        assert_eq!(layout.shown, 30);
        assert_eq!(layout.elided, 0);
    }

    #[test]
    fn test_value_offset_clipping() {
        let vp = viewport(4, 4, 400.0);
        let m = PixelMapping::new(&vp, &ViewSettings::default());
        assert_eq!(m.value_offset(1.0, 0.5, None), 50.0);
        assert_eq!(m.value_offset(10.0, 0.5, Some(1.0)), 50.0);
        assert_eq!(m.value_offset(-10.0, 0.5, Some(1.0)), -50.0);
    }
}
