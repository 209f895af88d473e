use serde::{Serialize, Deserialize};
use kurbo::{Point, Rect};

/// Corner handles of a box. Hit-tested in declaration order.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum HandleType {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl HandleType {
    pub const ALL: [HandleType; 4] = [
        HandleType::TopLeft,
        HandleType::TopRight,
        HandleType::BottomLeft,
        HandleType::BottomRight,
    ];

    pub fn moves_left(self) -> bool {
        matches!(self, HandleType::TopLeft | HandleType::BottomLeft)
    }

    pub fn moves_top(self) -> bool {
        matches!(self, HandleType::TopLeft | HandleType::TopRight)
    }
}

/// What part of the area selection a pointer grabbed.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum AreaHandle {
    Corner(HandleType),
    Move,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum AreaMode {
    #[default]
    Idle,
    Drawing,
    Dragging,
    Resizing,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Move,
    Brush,
    AreaSelect,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Canvas,
    Fullscreen,
    Studio,
    Hybrid,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum PointerSource {
    #[default]
    Mouse,
    Touch,
    Pen,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Axis-aligned box in canvas space.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    #[serde(alias = "w")]
    pub width: f64,
    #[serde(alias = "h")]
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Bounds { x, y, width, height }
    }

    /// Box spanned by two arbitrary corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Bounds::from(Rect::from_points(a, b))
    }

    pub fn right(&self) -> f64 { self.x + self.width }
    pub fn bottom(&self) -> f64 { self.y + self.height }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if !self.overlaps(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        Some(Bounds::new(x, y, self.right().min(other.right()) - x, self.bottom().min(other.bottom()) - y))
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Bounds {
        Bounds { x: self.x + dx, y: self.y + dy, ..*self }
    }

    pub fn corner(&self, handle: HandleType) -> Point {
        match handle {
            HandleType::TopLeft => Point::new(self.x, self.y),
            HandleType::TopRight => Point::new(self.right(), self.y),
            HandleType::BottomLeft => Point::new(self.x, self.bottom()),
            HandleType::BottomRight => Point::new(self.right(), self.bottom()),
        }
    }
}

impl From<Rect> for Bounds {
    fn from(r: Rect) -> Self {
        let r = r.abs();
        Bounds { x: r.x0, y: r.y0, width: r.width(), height: r.height() }
    }
}

impl From<Bounds> for Rect {
    fn from(b: Bounds) -> Self {
        Rect::new(b.x, b.y, b.x + b.width, b.y + b.height)
    }
}
