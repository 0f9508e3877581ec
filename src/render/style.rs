//! Colors used by the composer
//!
//! Trace colors come from the [`ChannelType`](crate::types::ChannelType)
//! style table; everything else lives here.

use crate::types::Rgba;
use std::collections::BTreeMap;

/// Color of labels that mark bad data
pub const BAD_LABEL_COLOR: Rgba = Rgba::rgb(255, 0, 0);

/// Fixed colors of non-trace elements
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub grid: Rgba,
    pub text: Rgba,
    pub bad_channel: Rgba,
    pub gap: Rgba,
    pub event: Rgba,
    pub cursor: Rgba,
    pub highlight: Rgba,
    pub view_range: Rgba,
    pub scalebar: Rgba,
    /// Alpha applied to annotation region fills
    pub annotation_alpha: u8,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            grid: Rgba::rgb(211, 211, 211),
            text: Rgba::BLACK,
            bad_channel: Rgba::rgb(169, 169, 169),
            gap: Rgba::rgb(255, 140, 0).with_alpha(90),
            event: Rgba::rgb(0, 128, 0),
            cursor: Rgba::rgb(0, 0, 255),
            highlight: Rgba::rgb(255, 255, 0).with_alpha(60),
            view_range: Rgba::rgb(0, 128, 0).with_alpha(60),
            scalebar: Rgba::rgb(170, 51, 119),
            annotation_alpha: 75,
        }
    }
}

/// Palette plus per-label annotation colors
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Style {
    pub palette: Palette,
    label_colors: BTreeMap<String, Rgba>,
}

impl Style {
    /// Pin a label to a color
    pub fn set_label_color(&mut self, label: impl Into<String>, color: Rgba) {
        self.label_colors.insert(label.into(), color);
    }

    /// Opaque color for an annotation label
    ///
    /// Explicit overrides win; labels starting with "bad" (any case) are
    /// red; other labels get a distinct hue by registry position.
    pub fn annotation_color(&self, label: &str, registry_index: Option<usize>) -> Rgba {
        if let Some(color) = self.label_colors.get(label) {
            return *color;
        }
        if label.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("bad")) {
            return BAD_LABEL_COLOR;
        }
        Rgba::distinct(registry_index.unwrap_or(0))
    }

    /// Translucent fill for an annotation region
    pub fn annotation_fill(&self, label: &str, registry_index: Option<usize>) -> Rgba {
        self.annotation_color(label, registry_index)
            .with_alpha(self.palette.annotation_alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_labels_are_red() {
        let style = Style::default();
        assert_eq!(style.annotation_color("BAD_blink", Some(3)), BAD_LABEL_COLOR);
        assert_eq!(style.annotation_color("bad", None), BAD_LABEL_COLOR);
        assert_ne!(style.annotation_color("edge", Some(0)), BAD_LABEL_COLOR);
    }

    #[test]
    fn test_override_and_distinct() {
        let mut style = Style::default();
        assert_ne!(
            style.annotation_color("a", Some(0)),
            style.annotation_color("b", Some(1))
        );
        style.set_label_color("BAD_x", Rgba::rgb(1, 2, 3));
        assert_eq!(style.annotation_color("BAD_x", Some(0)), Rgba::rgb(1, 2, 3));
        assert_eq!(style.annotation_fill("BAD_x", None).alpha(), 75);
    }
}
