//! Host collaborator contracts.
//!
//! These traits define the narrow interface the host engine must expose for
//! mirror captures to work: scene-graph reads, a per-node render-flag
//! override, the screen registry, the camera abstraction, the surface store,
//! and the two global render entry points. Everything else about the engine
//! stays opaque.

use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use thiserror::Error;

use crate::geometry::{LocalRect, Rect};
use crate::host::types::{
    DisplayFrame, DriverFn, FovAxis, NodeId, ProjectionKind, SizeMode, SurfaceDescriptor,
    SurfaceId, WalkFn,
};

/// Host interface error type.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("failed to resize surface to {width}x{height}: {reason}")]
    SurfaceResizeFailed {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("out of memory")]
    OutOfMemory,
    #[error("device lost")]
    DeviceLost,
}

pub type HostResult<T> = Result<T, HostError>;

/// The host engine as seen by the mirror system.
pub trait MirrorHost {
    // Scene graph

    /// Parent of a node, `None` at a tree root.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Whether the node and all of its ancestors are active.
    fn is_active(&self, node: NodeId) -> bool;

    /// The node's local rectangle, if it has renderable content bounds.
    fn node_rect(&self, node: NodeId) -> Option<LocalRect>;

    /// The node's world transform matrix.
    fn world_matrix(&self, node: NodeId) -> Mat4;

    /// Whether the node's own visuals draw during traversal. Children are
    /// unaffected by this flag.
    fn render_flag(&self, node: NodeId) -> bool;

    /// Overrides the node's own render flag.
    fn set_render_flag(&self, node: NodeId, render: bool);

    // Screens and cameras

    /// The known screen-root nodes, used for direct membership tests while
    /// walking a target's ancestor chain.
    fn screens(&self) -> Vec<NodeId>;

    /// The designated camera of a screen root.
    fn screen_camera(&self, screen: NodeId) -> Option<Rc<dyn HostCamera>>;

    /// Every render camera currently part of the scene.
    fn render_cameras(&self) -> Vec<Rc<dyn HostCamera>>;

    // Surfaces

    /// Creates a render-target surface. Initial dimensions are 0x0 until the
    /// first resize.
    fn create_surface(&self, descriptor: &SurfaceDescriptor) -> HostResult<SurfaceId>;

    /// Resizes a render-target surface. Destructive to anything cached
    /// against the old storage.
    fn resize_surface(&self, surface: SurfaceId, width: u32, height: u32) -> HostResult<()>;

    fn destroy_surface(&self, surface: SurfaceId);

    /// Per-axis ratio between framebuffer pixels and logical screen pixels.
    fn display_scale(&self) -> Vec2;

    // Global render entry points

    /// Currently installed traversal function.
    fn walk(&self) -> WalkFn;

    fn set_walk(&self, walk: WalkFn);

    /// Currently installed per-frame render driver.
    fn frame_driver(&self) -> DriverFn;

    fn set_frame_driver(&self, driver: DriverFn);
}

/// The host camera abstraction.
///
/// The mirror system never builds projection matrices itself; it drives
/// this interface to achieve exact framing and relies on the host for the
/// actual math. Implementations use interior mutability: the camera is a
/// shared engine object mutated mid-frame and restored before the frame
/// ends.
pub trait HostCamera {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);

    fn projection(&self) -> ProjectionKind;

    /// Which screen axis the field-of-view value is defined along.
    fn fov_axis(&self) -> FovAxis;

    /// Full field of view in radians along [`fov_axis`](Self::fov_axis).
    fn fov(&self) -> f32;
    fn set_fov(&self, radians: f32);

    /// Half-height of the orthographic view volume in world units.
    fn ortho_height(&self) -> f32;
    fn set_ortho_height(&self, height: f32);

    /// Normalized oriented-space viewport: the portion of the render target
    /// this camera writes to.
    fn viewport(&self) -> Rect;
    fn set_viewport(&self, viewport: Rect);

    fn world_position(&self) -> Vec3;
    fn set_world_position(&self, position: Vec3);

    /// World matrix of the camera's node.
    fn world_matrix(&self) -> Mat4;

    /// View matrix as of the last [`refresh_matrices`](Self::refresh_matrices).
    fn view_matrix(&self) -> Mat4;

    /// Current render size in pixels (window-derived or fixed).
    fn render_size(&self) -> Vec2;

    /// Whether the render size follows the target window.
    fn is_window_sized(&self) -> bool;
    fn set_window_sized(&self, window_sized: bool);

    /// Forces a fixed render size; implies the size no longer follows the
    /// window.
    fn set_fixed_size(&self, width: u32, height: u32);

    /// Target surface, `None` when rendering to the window.
    fn target_surface(&self) -> Option<SurfaceId>;
    fn set_target_surface(&self, surface: Option<SurfaceId>);

    /// Projects a world-space point to screen pixels (z holds depth).
    fn world_to_screen(&self, world: Vec3) -> Vec3;

    /// Recomputes view and projection matrices from current state.
    fn refresh_matrices(&self);

    /// Overrides the projection-matrix-dirty flag, suppressing a rebuild
    /// the host would otherwise schedule.
    fn set_projection_dirty(&self, dirty: bool);
}

/// The sprite-like consumer displaying a capture's surface.
pub trait MirrorVisual {
    fn size_mode(&self) -> SizeMode;

    /// Pixel area allotted to the visual, bounding fit-mode output.
    fn allotted_size(&self) -> Vec2;

    /// Drops the cached frame binding; called when the underlying surface
    /// storage was rebuilt.
    fn clear_frame(&self);

    fn set_frame(&self, frame: &DisplayFrame);

    /// Re-uploads render data immediately; the host's regular per-frame
    /// refresh has already run when a capture finishes.
    fn refresh_render_data(&self);
}
