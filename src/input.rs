use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    time::Duration,
};

use log::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    Start,
    Move,
    End,
}

/// Point in surface or page coordinates, depending on context.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerFamily {
    Touch,
    Mouse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// Raw device event as delivered by the host's windowing layer.
///
/// `contacts` holds the active contact points in page coordinates: a touch
/// event carries its target touches (possibly none on release), a mouse
/// event carries the cursor. Both families are fed in unconditionally; some
/// platforms fire both for a single physical interaction.
#[derive(Clone, Debug)]
pub struct RawPointerEvent {
    pub family: PointerFamily,
    pub action: PointerAction,
    pub contacts: Vec<Position>,
    pub timestamp: Duration,
}

impl RawPointerEvent {
    pub fn mouse(action: PointerAction, page: Position, timestamp: Duration) -> Self {
        Self {
            family: PointerFamily::Mouse,
            action,
            contacts: vec![page],
            timestamp,
        }
    }

    pub fn touch(action: PointerAction, contacts: Vec<Position>, timestamp: Duration) -> Self {
        Self {
            family: PointerFamily::Touch,
            action,
            contacts,
            timestamp,
        }
    }
}

/// Consumer of the canonical event stream: recognizers and the delegate both
/// implement this.
pub trait TouchHandler {
    fn on_touch_event(
        &mut self,
        phase: TouchPhase,
        position: Position,
        timestamp: Duration,
        raw: &RawPointerEvent,
    );
}

impl<F> TouchHandler for F
where
    F: FnMut(TouchPhase, Position, Duration, &RawPointerEvent),
{
    fn on_touch_event(
        &mut self,
        phase: TouchPhase,
        position: Position,
        timestamp: Duration,
        raw: &RawPointerEvent,
    ) {
        self(phase, position, timestamp, raw)
    }
}

/// Normalizes raw pointer events into one ordered canonical stream and fans
/// it out to the registered recognizers, then the delegate.
///
/// Positions are surface-relative: the surface's page offset is subtracted
/// from the raw page coordinates. Release events carry no usable coordinates
/// on some devices, so the listener caches the last known position and
/// substitutes it for every End dispatch.
pub struct TouchListener {
    offset: Position,
    delegate: Box<dyn TouchHandler>,
    recognizers: Vec<Box<dyn TouchHandler>>,
    touch: Position,
    last_dispatch: Option<(Duration, TouchPhase)>,
}

impl TouchListener {
    pub fn new(offset: Position, delegate: impl TouchHandler + 'static) -> Self {
        Self {
            offset,
            delegate: Box::new(delegate),
            recognizers: Vec::new(),
            touch: Position::default(),
            last_dispatch: None,
        }
    }

    /// Register a recognizer. Registration order is notification order, and
    /// every recognizer sees every event before the delegate does.
    pub fn add_recognizer(&mut self, recognizer: impl TouchHandler + 'static) {
        self.recognizers.push(Box::new(recognizer));
    }

    /// Update the surface's page offset after a relayout.
    pub fn set_offset(&mut self, offset: Position) {
        self.offset = offset;
    }

    pub fn last_position(&self) -> Position {
        self.touch
    }

    /// Feed one raw event through the pipeline.
    pub fn handle(&mut self, event: &RawPointerEvent) {
        match event.action {
            PointerAction::Down => self.dispatch_contact(TouchPhase::Start, event),
            PointerAction::Move => self.dispatch_contact(TouchPhase::Move, event),
            PointerAction::Up | PointerAction::Cancel => {
                let position = self.touch;
                self.dispatch(TouchPhase::End, position, event);
            }
        }
    }

    fn dispatch_contact(&mut self, phase: TouchPhase, event: &RawPointerEvent) {
        let Some(contact) = event.contacts.first().copied() else {
            debug!(
                "ignoring {:?} {:?} event with no contact points",
                event.family, event.action
            );
            return;
        };

        let position = Position {
            x: contact.x - self.offset.x,
            y: contact.y - self.offset.y,
        };
        self.touch = position;
        self.dispatch(phase, position, event);
    }

    fn dispatch(&mut self, phase: TouchPhase, position: Position, event: &RawPointerEvent) {
        // Both pointer families can fire for one physical interaction;
        // deliver each semantic contact once.
        let stamp = (event.timestamp, phase);
        if self.last_dispatch == Some(stamp) {
            debug!("suppressing duplicate {phase:?} dispatch at {:?}", event.timestamp);
            return;
        }
        self.last_dispatch = Some(stamp);

        for recognizer in &mut self.recognizers {
            let isolated = AssertUnwindSafe(|| {
                recognizer.on_touch_event(phase, position, event.timestamp, event);
            });
            if catch_unwind(isolated).is_err() {
                warn!("touch recognizer panicked during {phase:?} dispatch");
            }
        }

        self.delegate
            .on_touch_event(phase, position, event.timestamp, event);
    }
}
