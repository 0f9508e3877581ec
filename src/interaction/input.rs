//! Abstract input events
//!
//! Any presentation toolkit can drive the controller by translating its
//! native events into these. Pointer coordinates are in main-view pixels
//! (gutter included); overview events carry overview pixels.

use crate::config::AnnotationModifier;

/// Modifier keys held during an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
    };
    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        alt: false,
    };
    pub const ALT: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: true,
    };

    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt
    }

    /// Whether the configured annotation modifier is held
    pub fn has(&self, modifier: AnnotationModifier) -> bool {
        match modifier {
            AnnotationModifier::Shift => self.shift,
            AnnotationModifier::Alt => self.alt,
            AnnotationModifier::Ctrl => self.ctrl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Plus,
    Minus,
    Home,
    End,
    PageUp,
    PageDown,
    Delete,
    Backspace,
    Escape,
    /// Printable key, lowercase
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown {
        x: f64,
        y: f64,
        button: PointerButton,
        modifiers: Modifiers,
    },
    PointerMove {
        x: f64,
        y: f64,
        modifiers: Modifiers,
    },
    PointerUp {
        x: f64,
        y: f64,
        button: PointerButton,
        modifiers: Modifiers,
    },
    /// The pointer left the window or the toolkit aborted the gesture
    PointerCancel,
    /// Scroll deltas in notches; positive `dy` scrolls down
    Wheel {
        dx: f64,
        dy: f64,
        x: f64,
        y: f64,
        modifiers: Modifiers,
    },
    Key {
        key: Key,
        modifiers: Modifiers,
    },
    OverviewPress {
        x: f64,
        y: f64,
    },
    OverviewDrag {
        x: f64,
        y: f64,
    },
}

impl InputEvent {
    pub fn key(key: Key) -> Self {
        InputEvent::Key {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn key_with(key: Key, modifiers: Modifiers) -> Self {
        InputEvent::Key { key, modifiers }
    }

    pub fn press(x: f64, y: f64) -> Self {
        InputEvent::PointerDown {
            x,
            y,
            button: PointerButton::Primary,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn drag_to(x: f64, y: f64) -> Self {
        InputEvent::PointerMove {
            x,
            y,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn release(x: f64, y: f64) -> Self {
        InputEvent::PointerUp {
            x,
            y,
            button: PointerButton::Primary,
            modifiers: Modifiers::NONE,
        }
    }
}
