//! Event types produced by the input pipelines.
//!
//! Raw hardware events enter at the left (key events, touch reports) and the
//! pipelines refine them into the annotated and tap events the screens see.

use std::time::Duration;

use crate::geometry::{Point, Size, TouchCoordinateTransform};
use crate::input::keycode::{KeyCode, KeyPress, Led};

/// A raw key transition from the keyboard device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub press: KeyPress,
}

impl KeyEvent {
    pub fn pressed(key: KeyCode) -> Self {
        Self {
            key,
            press: KeyPress::Pressed,
        }
    }

    pub fn released(key: KeyCode) -> Self {
        Self {
            key,
            press: KeyPress::Released,
        }
    }
}

/// Modifier state attached to every annotated key event.
///
/// Shift/alt/ctrl/meta are momentary; capslock is a hardware latch; compose
/// is a soft latch owned by the compose stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierAnnotation {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub capslock: bool,
    pub compose: bool,
}

impl ModifierAnnotation {
    pub fn capslock(state: bool) -> Self {
        Self {
            capslock: state,
            ..Self::default()
        }
    }

    pub fn compose(state: bool) -> Self {
        Self {
            compose: state,
            ..Self::default()
        }
    }
}

/// A key event annotated by the keystream pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatedKeyEvent {
    pub key: KeyCode,
    pub press: KeyPress,
    pub annotation: ModifierAnnotation,
    pub character: Option<char>,
    /// True when this event is a modifier state change rather than a typable key.
    pub is_modifier: bool,
    /// True for events that drive the physical LEDs (capslock, compose).
    pub is_led_able: bool,
}

impl AnnotatedKeyEvent {
    pub fn plain(key: KeyCode, press: KeyPress, annotation: ModifierAnnotation) -> Self {
        Self {
            key,
            press,
            annotation,
            character: None,
            is_modifier: false,
            is_led_able: false,
        }
    }
}

/// One tracked contact inside a touch report. Two slots are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub x: i32,
    pub y: i32,
    pub pressure: i32,
    pub slot: usize,
}

impl TouchEvent {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn apply_transform(self, transform: TouchCoordinateTransform, screen_size: Size) -> Self {
        let p = transform.apply(self.point(), screen_size);
        Self {
            x: p.x,
            y: p.y,
            ..self
        }
    }
}

/// Everything the touchscreen reported at one SYN boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchReport {
    pub touches: Vec<TouchEvent>,
    pub timestamp: Duration,
}

/// Lifecycle of a persistent touch across reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Began,
    Moved,
    Stationary,
    Ended,
}

/// A contact with a stable identity across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentTouch {
    pub touch_id: u64,
    pub location: Point,
    pub max_pressure: i32,
    pub phase: TouchPhase,
}

/// Per-frame delta of persistent touches. Emitted only when nonempty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentTouchReport {
    pub began: Vec<PersistentTouch>,
    pub moved: Vec<PersistentTouch>,
    pub ended: Vec<PersistentTouch>,
    pub timestamp: Duration,
}

impl PersistentTouchReport {
    pub fn is_empty(&self) -> bool {
        self.began.is_empty() && self.moved.is_empty() && self.ended.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPhase {
    Initiated,
    Completed,
    Canceled,
}

/// A recognized (or abandoned) tap gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapEvent {
    pub location: Point,
    pub phase: TapPhase,
}

/// An LED write request flowing toward the keyboard device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLed {
    pub led: Led,
    pub state: bool,
}

/// The event bus delivered to the active screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Key(AnnotatedKeyEvent),
    Tap(TapEvent),
    KeyboardDisconnect,
}
