use serde::{Deserialize, Serialize};

/// Protocol-scoped handle of a DOM node (`backendNodeId` in CDP).
pub type BackendNodeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

impl Viewport {
    pub fn center(&self) -> Point {
        Point {
            x: f64::from(self.width) / 2.0,
            y: f64::from(self.height) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Content quad of a box model: four corners as `[x1, y1, x2, y2, x3, y3, x4, y4]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub Vec<f64>);

impl Quad {
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Quad(vec![
            x,
            y,
            x + width,
            y,
            x + width,
            y + height,
            x,
            y + height,
        ])
    }

    /// Average of the four corners. `None` for malformed quads and for centers
    /// outside the positive quadrant, which means the element is off-screen.
    pub fn center(&self) -> Option<Point> {
        if self.0.len() < 8 {
            return None;
        }
        let x = (self.0[0] + self.0[2] + self.0[4] + self.0[6]) / 4.0;
        let y = (self.0[1] + self.0[3] + self.0[5] + self.0[7]) / 4.0;
        if x > 0.0 && y > 0.0 {
            Some(Point { x, y })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Moved,
    Pressed,
    Released,
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    None,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub point: Point,
    pub button: MouseButton,
    pub buttons: u32,
    pub click_count: u32,
    pub delta_x: f64,
    pub delta_y: f64,
}

impl MouseEvent {
    pub fn moved(point: Point) -> Self {
        Self {
            kind: MouseEventKind::Moved,
            point,
            button: MouseButton::None,
            buttons: 0,
            click_count: 0,
            delta_x: 0.0,
            delta_y: 0.0,
        }
    }

    pub fn pressed(point: Point) -> Self {
        Self {
            kind: MouseEventKind::Pressed,
            button: MouseButton::Left,
            buttons: 1,
            click_count: 1,
            ..Self::moved(point)
        }
    }

    pub fn released(point: Point) -> Self {
        Self {
            kind: MouseEventKind::Released,
            button: MouseButton::Left,
            click_count: 1,
            ..Self::moved(point)
        }
    }

    pub fn wheel(point: Point, delta_y: f64) -> Self {
        Self {
            kind: MouseEventKind::Wheel,
            delta_y,
            ..Self::moved(point)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key: String,
    pub code: String,
    pub key_code: u32,
    pub modifiers: u32,
    pub text: Option<String>,
}

/// One child frame of the active page, in document order. Index 0 is the main
/// frame and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub index: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub index: usize,
    pub url: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_center() {
        let quad = Quad::from_rect(10.0, 20.0, 100.0, 40.0);
        assert_eq!(quad.center(), Some(Point { x: 60.0, y: 40.0 }));
    }

    #[test]
    fn test_offscreen_or_malformed_quad_has_no_center() {
        assert_eq!(Quad(vec![1.0, 2.0]).center(), None);
        assert_eq!(Quad::from_rect(-50.0, -50.0, 10.0, 10.0).center(), None);
    }
}
