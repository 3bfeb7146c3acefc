//! Pointer, wheel and keyboard routing.
//!
//! [`InputState`] turns raw events into [`InputAction`]s; the map view applies
//! them. Keeping the gesture state machine free of the camera and layers lets
//! it be driven from any windowing layer.

/// Gesture in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapViewStatus {
    #[default]
    Idle,
    Drag,
    DragRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

/// Pointer position in CSS pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub x: f64,
    pub y: f64,
    pub button: PointerButton,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(x: f64, y: f64, button: PointerButton) -> Self {
        Self {
            x,
            y,
            button,
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    fn point(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    /// Camera pan, in fractions of the canvas.
    Translate { dx: f64, dy: f64 },
    /// Camera rotation, in fractions of the canvas.
    Rotate { yaw: f64, pitch: f64 },
    /// Normalized screen position with the origin at the bottom-left.
    Zoom { delta: f64, x: f64, y: f64 },
    PickObject { x: f64, y: f64 },
    PickRegion { pointer: (f64, f64), anchor: (f64, f64) },
    PickFilter { pointer: (f64, f64), anchor: (f64, f64) },
    /// Turn the union of the filter selections into the active filter.
    CommitFilter,
    ResetFilter,
    ApplyBrushing,
    ClearPicking,
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    status: MapViewStatus,
    last_point: (f64, f64),
    current_point: (f64, f64),
    brushing_pivot: Option<(f64, f64)>,
    filter_pivot: Option<(f64, f64)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> MapViewStatus {
        self.status
    }

    pub fn current_point(&self) -> (f64, f64) {
        self.current_point
    }

    pub fn is_brushing(&self) -> bool {
        self.brushing_pivot.is_some()
    }

    pub fn pointer_down(&mut self, event: &PointerEvent) -> Vec<InputAction> {
        let mut actions = Vec::new();
        match event.button {
            PointerButton::Left | PointerButton::Middle => {
                self.last_point = event.point();
                if event.modifiers.ctrl {
                    actions.push(InputAction::PickObject { x: event.x, y: event.y });
                } else {
                    self.status = MapViewStatus::Drag;
                }
            }
            PointerButton::Right => {
                if !event.modifiers.alt {
                    actions.push(InputAction::ClearPicking);
                }
                self.status = MapViewStatus::DragRight;
            }
        }
        actions
    }

    /// `client` is the canvas size in CSS pixels.
    pub fn pointer_move(&mut self, event: &PointerEvent, client: (f64, f64)) -> Vec<InputAction> {
        let mut actions = Vec::new();
        let point = event.point();
        self.current_point = point;

        if self.status == MapViewStatus::Drag {
            if event.modifiers.alt {
                let anchor = *self.brushing_pivot.get_or_insert(point);
                actions.push(InputAction::PickRegion { pointer: point, anchor });
            } else {
                self.brushing_pivot = None;
                let dx = self.last_point.0 - point.0;
                let dy = point.1 - self.last_point.1;
                let (w, h) = (client.0.max(1.0), client.1.max(1.0));
                if event.modifiers.shift {
                    actions.push(InputAction::Rotate { yaw: dx / w, pitch: dy / h });
                } else {
                    actions.push(InputAction::Translate { dx: dx / w, dy: dy / h });
                }
                self.last_point = point;
            }
        } else {
            self.brushing_pivot = None;
        }

        if self.status == MapViewStatus::DragRight && event.modifiers.alt {
            let anchor = *self.filter_pivot.get_or_insert(point);
            actions.push(InputAction::PickFilter { pointer: point, anchor });
        } else if self.filter_pivot.take().is_some() {
            actions.push(InputAction::CommitFilter);
        }
        actions
    }

    pub fn pointer_up(&mut self) -> Vec<InputAction> {
        self.status = MapViewStatus::Idle;
        Vec::new()
    }

    /// Positive `delta_y` (wheel toward the user) zooms out.
    pub fn wheel(&mut self, x: f64, y: f64, delta_y: f64, client: (f64, f64)) -> Vec<InputAction> {
        let max_axis = client.0.max(client.1).max(1.0);
        vec![InputAction::Zoom {
            delta: -delta_y * 0.01,
            x: x / max_axis,
            y: (client.1 - y) / max_axis,
        }]
    }

    pub fn key_up(&mut self, key: &str) -> Vec<InputAction> {
        match key {
            "Enter" => vec![InputAction::ApplyBrushing],
            "r" => vec![InputAction::ClearPicking],
            "q" => vec![InputAction::ResetFilter],
            _ => Vec::new(),
        }
    }
}
