//! Common types shared across the host interface.

use std::rc::Rc;

use glam::Vec2;

use crate::geometry::Rect;
use crate::host::traits::MirrorHost;

/// Handle to a node in the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// Handle to a host-owned render-target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Texture coordinate wrap mode for render-target surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    ClampToBorder,
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Descriptor for creating a render-target surface.
#[derive(Debug, Clone)]
pub struct SurfaceDescriptor {
    pub label: Option<String>,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

impl Default for SurfaceDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            wrap_u: WrapMode::ClampToBorder,
            wrap_v: WrapMode::ClampToBorder,
        }
    }
}

/// Camera projection kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    Orthographic,
}

/// Axis along which a camera's field of view is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FovAxis {
    Vertical,
    Horizontal,
}

/// Output sizing policy of a mirror visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    /// Scale down (never up) so the projected content fits the visual's
    /// allotted area, preserving aspect.
    Fit,
    /// Match the projected screen size of the target.
    Raw,
}

/// Reusable descriptor binding a render-target surface to a mirror visual.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub surface: SurfaceId,
    pub rect: Rect,
    pub original_size: Vec2,
    /// Render targets are produced bottom-up; the visual must flip V.
    pub flip_uv: bool,
    /// Atlas packing opt-out; the surface is rewritten every frame.
    pub packable: bool,
}

impl DisplayFrame {
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            rect: Rect::default(),
            original_size: Vec2::ZERO,
            flip_uv: true,
            packable: false,
        }
    }
}

/// The host's global per-node render traversal, held in a single mutable
/// slot. The host reads the slot again for every child it visits, so a
/// swap mid-traversal takes effect immediately.
pub type WalkFn = Rc<dyn Fn(&dyn MirrorHost, NodeId, u32)>;

/// The host's global per-frame render driver, held in a single mutable slot.
pub type DriverFn = Rc<dyn Fn(&dyn MirrorHost, f32)>;
