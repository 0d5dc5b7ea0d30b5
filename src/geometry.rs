//! Quad and rectangle geometry used for screen-space framing.

use glam::{Mat4, Vec2, Vec3};

use crate::host::HostCamera;

/// Axis-aligned rectangle, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

/// Local rectangle of a scene node: content size plus normalized anchor.
///
/// The anchor is the fraction of the rectangle that lies below/left of the
/// node's origin, so `(0.5, 0.5)` centers the rectangle on the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalRect {
    pub width: f32,
    pub height: f32,
    pub anchor_x: f32,
    pub anchor_y: f32,
}

impl LocalRect {
    pub const fn new(width: f32, height: f32, anchor_x: f32, anchor_y: f32) -> Self {
        Self {
            width,
            height,
            anchor_x,
            anchor_y,
        }
    }

    /// Rectangle centered on the node's origin.
    pub const fn centered(width: f32, height: f32) -> Self {
        Self::new(width, height, 0.5, 0.5)
    }
}

/// The four named corners of a [`BoundsQuad`], in fixed enumeration order.
///
/// The order matters: extremal-corner queries resolve ties to the first
/// corner in this enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    BottomLeft,
    TopRight,
    TopLeft,
    BottomRight,
}

impl Corner {
    pub const ORDER: [Corner; 4] = [
        Corner::BottomLeft,
        Corner::TopRight,
        Corner::TopLeft,
        Corner::BottomRight,
    ];
}

/// Axis of an extremal-corner query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Direction of an extremal-corner query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
}

/// Four-corner rectangle representation carried through transforms.
///
/// Always derived from a [`LocalRect`] and an affine transform; after a
/// rotation or a perspective projection the corners need not stay
/// axis-aligned, so bounding-rect and extremal queries scan all four
/// corners instead of trusting any two opposite ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsQuad {
    pub bottom_left: Vec3,
    pub top_right: Vec3,
    pub top_left: Vec3,
    pub bottom_right: Vec3,
}

impl BoundsQuad {
    /// Places the four corners around the origin per the rect's anchor,
    /// with z = 0.
    pub fn from_rect(rect: &LocalRect) -> Self {
        let left = -rect.width * rect.anchor_x;
        let right = rect.width * (1.0 - rect.anchor_x);
        let bottom = -rect.height * rect.anchor_y;
        let top = rect.height * (1.0 - rect.anchor_y);
        Self {
            bottom_left: Vec3::new(left, bottom, 0.0),
            top_right: Vec3::new(right, top, 0.0),
            top_left: Vec3::new(left, top, 0.0),
            bottom_right: Vec3::new(right, bottom, 0.0),
        }
    }

    /// Applies an affine transform to all four corners.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        Self {
            bottom_left: matrix.transform_point3(self.bottom_left),
            top_right: matrix.transform_point3(self.top_right),
            top_left: matrix.transform_point3(self.top_left),
            bottom_right: matrix.transform_point3(self.bottom_right),
        }
    }

    /// Maps all four world-space corners to screen space through the
    /// camera's projection.
    pub fn projected(&self, camera: &dyn HostCamera) -> Self {
        Self {
            bottom_left: camera.world_to_screen(self.bottom_left),
            top_right: camera.world_to_screen(self.top_right),
            top_left: camera.world_to_screen(self.top_left),
            bottom_right: camera.world_to_screen(self.bottom_right),
        }
    }

    pub fn corner(&self, corner: Corner) -> Vec3 {
        match corner {
            Corner::BottomLeft => self.bottom_left,
            Corner::TopRight => self.top_right,
            Corner::TopLeft => self.top_left,
            Corner::BottomRight => self.bottom_right,
        }
    }

    /// Axis-aligned rect spanning the min/max of all four corners' x and y.
    pub fn bounding_rect(&self) -> Rect {
        let mut min = Vec2::new(self.bottom_left.x, self.bottom_left.y);
        let mut max = min;
        for corner in &Corner::ORDER[1..] {
            let point = self.corner(*corner);
            min = min.min(Vec2::new(point.x, point.y));
            max = max.max(Vec2::new(point.x, point.y));
        }
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// Which named corner holds the extremal coordinate on `axis`.
    ///
    /// Ties resolve to the first corner in [`Corner::ORDER`].
    pub fn extremal_corner(&self, axis: Axis, extremum: Extremum) -> Corner {
        let mut best = Corner::BottomLeft;
        let mut value = self.component(best, axis);
        for corner in &Corner::ORDER[1..] {
            let candidate = self.component(*corner, axis);
            let better = match extremum {
                Extremum::Min => candidate < value,
                Extremum::Max => candidate > value,
            };
            if better {
                best = *corner;
                value = candidate;
            }
        }
        best
    }

    fn component(&self, corner: Corner, axis: Axis) -> f32 {
        let point = self.corner(corner);
        match axis {
            Axis::X => point.x,
            Axis::Y => point.y,
        }
    }
}
