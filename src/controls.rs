use std::time::Duration;

use crate::{
    engine::GbKey,
    input::{Position, RawPointerEvent, TouchHandler, TouchPhase},
};

/// Axis-aligned rectangle in surface coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.x
            && position.x < self.x + self.width
            && position.y >= self.y
            && position.y < self.y + self.height
    }

    pub fn center(&self) -> Position {
        Position::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Single on-screen button: presses its key while the contact is inside the
/// frame, releases when the contact leaves or ends.
///
/// Key transitions are reported through the sink closure, typically wired to
/// [`crate::console::Console::key_down`]/[`crate::console::Console::key_up`].
pub struct ButtonControl<F> {
    frame: Rect,
    key: GbKey,
    pressed: bool,
    on_key: F,
}

impl<F: FnMut(GbKey, bool)> ButtonControl<F> {
    pub fn new(frame: Rect, key: GbKey, on_key: F) -> Self {
        Self {
            frame,
            key,
            pressed: false,
            on_key,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    fn set_pressed(&mut self, pressed: bool) {
        if self.pressed != pressed {
            self.pressed = pressed;
            (self.on_key)(self.key, pressed);
        }
    }
}

impl<F: FnMut(GbKey, bool)> TouchHandler for ButtonControl<F> {
    fn on_touch_event(
        &mut self,
        phase: TouchPhase,
        position: Position,
        _timestamp: Duration,
        _raw: &RawPointerEvent,
    ) {
        match phase {
            TouchPhase::Start | TouchPhase::Move => {
                self.set_pressed(self.frame.contains(position));
            }
            TouchPhase::End => self.set_pressed(false),
        }
    }
}

const DPAD_DIRECTIONS: [GbKey; 4] = [GbKey::Up, GbKey::Down, GbKey::Left, GbKey::Right];

/// Four-way directional pad over a rectangular frame.
///
/// The contact's offset from the frame center selects the active direction
/// set (diagonals press two keys); contacts inside the dead zone, outside
/// the frame, or ended release everything.
pub struct DirectionalPad<F> {
    frame: Rect,
    dead_zone: f64,
    held: [bool; 4],
    on_key: F,
}

impl<F: FnMut(GbKey, bool)> DirectionalPad<F> {
    pub fn new(frame: Rect, dead_zone: f64, on_key: F) -> Self {
        Self {
            frame,
            dead_zone,
            held: [false; 4],
            on_key,
        }
    }

    fn desired(&self, position: Position) -> [bool; 4] {
        if !self.frame.contains(position) {
            return [false; 4];
        }

        let center = self.frame.center();
        let dx = position.x - center.x;
        let dy = position.y - center.y;
        [
            dy < -self.dead_zone,
            dy > self.dead_zone,
            dx < -self.dead_zone,
            dx > self.dead_zone,
        ]
    }

    fn apply(&mut self, desired: [bool; 4]) {
        // Releases before presses so a chord change never overlaps opposing
        // directions.
        for (index, key) in DPAD_DIRECTIONS.iter().enumerate() {
            if self.held[index] && !desired[index] {
                self.held[index] = false;
                (self.on_key)(*key, false);
            }
        }
        for (index, key) in DPAD_DIRECTIONS.iter().enumerate() {
            if !self.held[index] && desired[index] {
                self.held[index] = true;
                (self.on_key)(*key, true);
            }
        }
    }
}

impl<F: FnMut(GbKey, bool)> TouchHandler for DirectionalPad<F> {
    fn on_touch_event(
        &mut self,
        phase: TouchPhase,
        position: Position,
        _timestamp: Duration,
        _raw: &RawPointerEvent,
    ) {
        match phase {
            TouchPhase::Start | TouchPhase::Move => {
                let desired = self.desired(position);
                self.apply(desired);
            }
            TouchPhase::End => self.apply([false; 4]),
        }
    }
}
