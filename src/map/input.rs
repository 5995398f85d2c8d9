//! Pointer, wheel and keyboard gestures mapped onto [`View`] mutations.
//!
//! The controller owns the one-way `user_adjusted` latch: once the user pans
//! or zooms by hand, bounds widening from the stream no longer triggers an
//! automatic refit for the rest of the session.

use bevy::math::DVec2;

use super::view::View;

pub const DEFAULT_ZOOM_STEP: f64 = 1.1;
pub const DOUBLE_CLICK_MS: i64 = 350;
pub const DOUBLE_CLICK_SLOP_PX: f64 = 6.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum PointerState {
    #[default]
    Idle,
    Dragging {
        last: DVec2,
    },
}

/// What a gesture did to the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputOutcome {
    Ignored,
    DragStarted,
    Panned,
    Zoomed,
    /// Double-click: the caller recomputes bounds and refits.
    RefitRequested,
}

#[derive(Clone, Debug)]
pub struct InputController {
    state: PointerState,
    user_adjusted: bool,
    last_press: Option<(DVec2, i64)>,
    pointer: Option<DVec2>,
    zoom_step: f64,
}

impl InputController {
    pub fn new(zoom_step: f64) -> Self {
        Self {
            state: PointerState::Idle,
            user_adjusted: false,
            last_press: None,
            pointer: None,
            zoom_step: if zoom_step > 1.0 {
                zoom_step
            } else {
                DEFAULT_ZOOM_STEP
            },
        }
    }

    pub fn user_adjusted(&self) -> bool {
        self.user_adjusted
    }

    /// Last known pointer position in screen pixels.
    pub fn pointer(&self) -> Option<DVec2> {
        self.pointer
    }

    pub fn pointer_down(&mut self, pos: DVec2, now_ms: i64) -> InputOutcome {
        self.pointer = Some(pos);

        let is_double = self.last_press.is_some_and(|(at, t)| {
            now_ms - t <= DOUBLE_CLICK_MS && at.distance(pos) <= DOUBLE_CLICK_SLOP_PX
        });
        if is_double {
            self.last_press = None;
            self.state = PointerState::Idle;
            return InputOutcome::RefitRequested;
        }

        self.last_press = Some((pos, now_ms));
        self.state = PointerState::Dragging { last: pos };
        InputOutcome::DragStarted
    }

    pub fn pointer_move(&mut self, pos: DVec2, view: &mut View) -> InputOutcome {
        self.pointer = Some(pos);
        let PointerState::Dragging { last } = self.state else {
            return InputOutcome::Ignored;
        };

        let delta = pos - last;
        self.state = PointerState::Dragging { last: pos };
        if delta == DVec2::ZERO {
            return InputOutcome::Ignored;
        }
        view.pan_by(delta);
        self.user_adjusted = true;
        InputOutcome::Panned
    }

    pub fn pointer_up(&mut self) -> InputOutcome {
        self.state = PointerState::Idle;
        InputOutcome::Ignored
    }

    /// Pointer left the surface: abandon any drag and forget the hover point.
    pub fn pointer_leave(&mut self) {
        self.state = PointerState::Idle;
        self.pointer = None;
    }

    /// Zoom by `steps` wheel notches (positive zooms in) about `pos`.
    pub fn wheel(&mut self, pos: DVec2, steps: f64, view: &mut View) -> InputOutcome {
        self.pointer = Some(pos);
        if steps == 0.0 || !steps.is_finite() {
            return InputOutcome::Ignored;
        }
        view.zoom_at(pos, self.zoom_step.powf(steps));
        self.user_adjusted = true;
        InputOutcome::Zoomed
    }

    /// Keyboard pan by a screen-space delta.
    pub fn key_pan(&mut self, delta: DVec2, view: &mut View) -> InputOutcome {
        if delta == DVec2::ZERO {
            return InputOutcome::Ignored;
        }
        view.pan_by(delta);
        self.user_adjusted = true;
        InputOutcome::Panned
    }
}

impl Default for InputController {
    fn default() -> Self {
        Self::new(DEFAULT_ZOOM_STEP)
    }
}
