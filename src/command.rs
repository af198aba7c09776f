use crate::style::{Color, FontSpec};

/// Arrowhead shape at the destination end of a message line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowheadKind {
    /// Closed and filled triangle.
    Filled,
    /// Closed triangle, stroke only.
    Triangle,
    /// Two open strokes.
    Line,
}

impl ArrowheadKind {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "filled" => Self::Filled,
            "triangle" => Self::Triangle,
            _ => Self::Line,
        }
    }
}

/// Horizontal direction an arrowhead points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// -1 for left, +1 for right.
    pub fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// One renderer-facing primitive. Coordinates are absolute canvas units with
/// the origin at the top-left; `selector` names the style rule chain the
/// primitive was resolved under, for debugging and for renderers that want to
/// attach semantic classes to output elements.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
        selector: String,
    },
    StrokeRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
        line_width: f32,
        selector: String,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: Color,
        line_width: f32,
        /// `Some` strokes dashed with the given on/off lengths.
        dash: Option<[f32; 2]>,
        selector: String,
    },
    /// Open stroked path through the points, in order.
    Polyline {
        points: Vec<(f32, f32)>,
        color: Color,
        line_width: f32,
        selector: String,
    },
    Arrowhead {
        /// Tip of the head; the line it terminates arrives from the opposite
        /// side.
        tip: (f32, f32),
        direction: Direction,
        width: f32,
        height: f32,
        kind: ArrowheadKind,
        color: Color,
        fill_color: Color,
        line_width: f32,
        selector: String,
    },
    Text {
        x: f32,
        /// Baseline, not top.
        baseline: f32,
        text: String,
        font: FontSpec,
        size: f32,
        color: Color,
        selector: String,
    },
}

/// The four paint layers, in paint order. Within a layer, commands paint in
/// push order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layers {
    /// Page fill and block backgrounds.
    pub background: Vec<DrawCommand>,
    /// Entity header boxes, lifelines, activation bars.
    pub base: Vec<DrawCommand>,
    /// Messages, notes, destroy crosses.
    pub content: Vec<DrawCommand>,
    /// Block frames, titles, branch separators.
    pub frame: Vec<DrawCommand>,
}

/// Output of a compile: canvas dimensions plus the layered command lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub width: f32,
    pub height: f32,
    pub layers: Layers,
}

impl Compiled {
    /// All commands in paint order.
    pub fn commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.layers
            .background
            .iter()
            .chain(self.layers.base.iter())
            .chain(self.layers.content.iter())
            .chain(self.layers.frame.iter())
    }
}
