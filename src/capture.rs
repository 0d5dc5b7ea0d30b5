//! Per-target capture unit: exact camera framing and constrained traversal.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::{Vec2, Vec3};

use crate::geometry::{Axis, BoundsQuad, Extremum, Rect};
use crate::host::{
    DisplayFrame, DriverFn, FovAxis, HostCamera, HostResult, MirrorHost, MirrorVisual, NodeId,
    ProjectionKind, SizeMode, SurfaceDescriptor, SurfaceId, WalkFn,
};

/// Camera state saved before a capture pass and restored in full afterward.
#[derive(Debug, Clone, Copy)]
struct CameraState {
    viewport: Rect,
    position: Vec3,
    surface: Option<SurfaceId>,
    window_sized: bool,
    fov: f32,
    ortho_height: f32,
}

impl CameraState {
    fn save(camera: &dyn HostCamera) -> Self {
        Self {
            viewport: camera.viewport(),
            position: camera.world_position(),
            surface: camera.target_surface(),
            window_sized: camera.is_window_sized(),
            fov: camera.fov(),
            ortho_height: camera.ortho_height(),
        }
    }

    fn restore(&self, camera: &dyn HostCamera) {
        camera.set_target_surface(self.surface);
        camera.set_window_sized(self.window_sized);
        camera.set_viewport(self.viewport);
        camera.set_fov(self.fov);
        camera.set_ortho_height(self.ortho_height);
        camera.set_world_position(self.position);
    }
}

/// Drop guard restoring a camera's saved state unconditionally, so a
/// capture abandoned partway can never leak camera state into the rest of
/// the frame.
struct CameraRestore<'a> {
    camera: &'a dyn HostCamera,
    state: CameraState,
}

impl<'a> CameraRestore<'a> {
    fn save(camera: &'a dyn HostCamera) -> Self {
        Self {
            camera,
            state: CameraState::save(camera),
        }
    }
}

impl Drop for CameraRestore<'_> {
    fn drop(&mut self) {
        self.state.restore(self.camera);
    }
}

/// Drop guard for the host's traversal slot: installs a walk function and
/// puts the previously installed one back when dropped, on every exit path.
pub(crate) struct WalkSlotGuard<'a> {
    host: &'a dyn MirrorHost,
    previous: WalkFn,
}

impl<'a> WalkSlotGuard<'a> {
    pub(crate) fn install(host: &'a dyn MirrorHost, walk: WalkFn) -> Self {
        let previous = host.walk();
        host.set_walk(walk);
        Self { host, previous }
    }
}

impl Drop for WalkSlotGuard<'_> {
    fn drop(&mut self) {
        self.host.set_walk(self.previous.clone());
    }
}

/// Captures the render output of a target sub-tree into an owned off-screen
/// surface, once per frame, using a camera chosen by the scheduler.
///
/// The capture computes the exact projection parameters (field of view or
/// orthographic extent, position, viewport) that frame its target, renders
/// one constrained traversal of the target's sub-tree into its surface, and
/// restores the camera bit-for-bit before returning.
pub struct MirrorCapture {
    node: NodeId,
    visual: Rc<dyn MirrorVisual>,
    surface: SurfaceId,
    surface_size: Cell<(u32, u32)>,
    frame: RefCell<DisplayFrame>,
    target: Cell<Option<NodeId>>,
    hide_target: Cell<bool>,
    custom_camera: RefCell<Option<Rc<dyn HostCamera>>>,
    chain: Rc<RefCell<Vec<NodeId>>>,
    listeners: RefCell<Vec<Rc<dyn Fn(&MirrorCapture)>>>,
}

impl MirrorCapture {
    /// Creates the capture and its owned render-target surface.
    pub fn new(
        host: &dyn MirrorHost,
        node: NodeId,
        visual: Rc<dyn MirrorVisual>,
        descriptor: &SurfaceDescriptor,
    ) -> HostResult<Rc<Self>> {
        let surface = host.create_surface(descriptor)?;
        Ok(Rc::new(Self {
            node,
            visual,
            surface,
            surface_size: Cell::new((0, 0)),
            frame: RefCell::new(DisplayFrame::new(surface)),
            target: Cell::new(None),
            hide_target: Cell::new(false),
            custom_camera: RefCell::new(None),
            chain: Rc::new(RefCell::new(Vec::new())),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// The owning (visual) node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The owned render-target surface.
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Current surface pixel dimensions.
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size.get()
    }

    /// Explicitly configured target, if any; the capture frames its own
    /// node otherwise.
    pub fn target(&self) -> Option<NodeId> {
        self.target.get()
    }

    pub fn set_target(&self, target: Option<NodeId>) {
        self.target.set(target);
    }

    /// Whether the captured sub-tree is excluded from the normal pass.
    pub fn hide_target(&self) -> bool {
        self.hide_target.get()
    }

    pub fn set_hide_target(&self, hide: bool) {
        self.hide_target.set(hide);
    }

    pub fn has_custom_camera(&self) -> bool {
        self.custom_camera.borrow().is_some()
    }

    /// Supplies a pre-configured camera; reprojection math is skipped and
    /// output size is taken from the visual's allotted area.
    pub fn set_custom_camera(&self, camera: Option<Rc<dyn HostCamera>>) {
        *self.custom_camera.borrow_mut() = camera;
    }

    /// Snapshot of the current display-frame descriptor.
    pub fn display_frame(&self) -> DisplayFrame {
        self.frame.borrow().clone()
    }

    /// Subscribes to the per-frame "captured" notification.
    pub fn on_captured(&self, listener: impl Fn(&MirrorCapture) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Clears the visual binding and destroys the owned surface.
    pub fn dispose(&self, host: &dyn MirrorHost) {
        self.visual.clear_frame();
        host.destroy_surface(self.surface);
    }

    pub(crate) fn clear_chain(&self) {
        self.chain.borrow_mut().clear();
    }

    pub(crate) fn emit_captured(&self) {
        let listeners: Vec<Rc<dyn Fn(&MirrorCapture)>> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(self);
        }
    }

    /// Resolves the camera for this frame's capture and rebuilds the
    /// ancestor chain from the target up to its screen root.
    ///
    /// Screen ownership is a direct membership test against the host's
    /// screen registry, not a per-node component scan. Returns `None` (with
    /// an empty chain) when the target is missing or inactive, or when no
    /// screen root owns it.
    pub(crate) fn resolve_camera(&self, host: &dyn MirrorHost) -> Option<Rc<dyn HostCamera>> {
        let target = self.target.get().unwrap_or(self.node);
        let mut chain = self.chain.borrow_mut();
        chain.clear();
        if !host.is_active(target) || host.node_rect(target).is_none() {
            return None;
        }

        let screens = host.screens();
        let mut node = target;
        loop {
            chain.push(node);
            if screens.contains(&node) {
                break;
            }
            match host.parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
        }

        let camera = match &*self.custom_camera.borrow() {
            Some(camera) => Some(camera.clone()),
            None => chain
                .last()
                .copied()
                .and_then(|root| host.screen_camera(root)),
        };
        if camera.is_none() {
            chain.clear();
        }
        camera
    }

    /// Runs one full capture pass with the given camera.
    ///
    /// Returns `Ok(true)` when a surface was produced, `Ok(false)` for a
    /// skipped (degenerate or unresolvable) pass. The camera is restored on
    /// every path, including errors.
    pub(crate) fn frame_move(
        &self,
        host: &dyn MirrorHost,
        camera: &Rc<dyn HostCamera>,
        real_walk: &WalkFn,
        real_driver: &DriverFn,
    ) -> HostResult<bool> {
        let target = self.target.get().unwrap_or(self.node);
        let Some(local) = host.node_rect(target) else {
            return Ok(false);
        };
        let world = BoundsQuad::from_rect(&local).transformed(host.world_matrix(target));

        let restore = CameraRestore::save(camera.as_ref());
        // TODO: save and restore the camera clear color once HostCamera
        // exposes it.

        let (tex_width, tex_height) = if self.custom_camera.borrow().is_some() {
            // The caller configured the camera; output size is whatever the
            // visual was allotted.
            let allotted = self.visual.allotted_size();
            let width = allotted.x.round().abs() as u32;
            let height = allotted.y.round().abs() as u32;
            if width == 0 || height == 0 {
                log::debug!("mirror capture {:?}: degenerate output, skipped", self.node);
                return Ok(false);
            }
            (width, height)
        } else {
            camera.refresh_matrices();
            let screen = world.projected(camera.as_ref());
            let x_min = screen.extremal_corner(Axis::X, Extremum::Min);
            let x_max = screen.extremal_corner(Axis::X, Extremum::Max);
            let y_min = screen.extremal_corner(Axis::Y, Extremum::Min);
            let y_max = screen.extremal_corner(Axis::Y, Extremum::Max);
            let px_width = screen.corner(x_max).x - screen.corner(x_min).x;
            let px_height = screen.corner(y_max).y - screen.corner(y_min).y;

            let (tex_width, tex_height) = if self.visual.size_mode() == SizeMode::Fit {
                let allotted = self.visual.allotted_size();
                let scale = (allotted.x / px_width)
                    .min(allotted.y / px_height)
                    .min(1.0);
                (
                    (px_width * scale).round().abs() as u32,
                    (px_height * scale).round().abs() as u32,
                )
            } else {
                // Screen projection is in framebuffer pixels; correct for a
                // logical-to-framebuffer scale mismatch.
                let scale = host.display_scale();
                (
                    (px_width / scale.x).round().abs() as u32,
                    (px_height / scale.y).round().abs() as u32,
                )
            };
            if tex_width == 0 || tex_height == 0 {
                log::debug!("mirror capture {:?}: degenerate output, skipped", self.node);
                return Ok(false);
            }

            let aspect = tex_width as f32 / tex_height as f32;
            match camera.projection() {
                ProjectionKind::Perspective => {
                    // Bound the worst-case corner: for each axis pick the
                    // extremal corner farther from the optical axis on
                    // screen, and derive the half-angle it subtends in
                    // camera space.
                    let render_size = camera.render_size();
                    let center_x = render_size.x * 0.5;
                    let center_y = render_size.y * 0.5;
                    let x_far = if (screen.corner(x_min).x - center_x).abs()
                        > (screen.corner(x_max).x - center_x).abs()
                    {
                        x_min
                    } else {
                        x_max
                    };
                    let y_far = if (screen.corner(y_min).y - center_y).abs()
                        > (screen.corner(y_max).y - center_y).abs()
                    {
                        y_min
                    } else {
                        y_max
                    };

                    let fov_on_y = camera.fov_axis() == FovAxis::Vertical;
                    let view = camera.view_matrix();

                    let corner = view.transform_point3(world.corner(x_far));
                    let flat = Vec3::new(
                        if fov_on_y { corner.x / aspect } else { corner.x },
                        0.0,
                        corner.z,
                    );
                    let fov_h = flat.angle_between(Vec3::NEG_Z);

                    let corner = view.transform_point3(world.corner(y_far));
                    let upright = Vec3::new(
                        0.0,
                        if fov_on_y { corner.y } else { corner.y * aspect },
                        corner.z,
                    );
                    let fov_v = upright.angle_between(Vec3::NEG_Z);

                    camera.set_fov(fov_h.max(fov_v) * 2.0);
                }
                ProjectionKind::Orthographic => {
                    // The camera need not face straight down an axis: fit
                    // the target in camera-local space and recenter the
                    // camera on it within its own view plane.
                    let world_from_camera = camera.world_matrix();
                    let local = world.transformed(world_from_camera.inverse());
                    let rect = local.bounding_rect();
                    let half_width = rect.width * 0.5;
                    let half_height = rect.height * 0.5;
                    camera.set_ortho_height(half_width.max(half_height));
                    let center = world_from_camera.transform_point3(Vec3::new(
                        rect.x + half_width,
                        rect.y + half_height,
                        0.0,
                    ));
                    camera.set_world_position(center);
                }
            }
            (tex_width, tex_height)
        };

        if self.surface_size.get() != (tex_width, tex_height) {
            let (old_width, old_height) = self.surface_size.get();
            log::debug!(
                "mirror surface {:?} resize: {}x{} -> {}x{}",
                self.surface,
                old_width,
                old_height,
                tex_width,
                tex_height
            );
            host.resize_surface(self.surface, tex_width, tex_height)?;
            self.surface_size.set((tex_width, tex_height));
            if self.visual.size_mode() != SizeMode::Fit {
                // The old storage is gone; the cached binding must be
                // rebuilt against the new surface.
                self.visual.clear_frame();
            }
            let mut frame = self.frame.borrow_mut();
            frame.rect = Rect::new(0.0, 0.0, tex_width as f32, tex_height as f32);
            frame.original_size = Vec2::new(tex_width as f32, tex_height as f32);
        }

        camera.set_target_surface(Some(self.surface));
        camera.set_fixed_size(tex_width, tex_height);

        // Second reprojection: the size and aspect changes above shifted
        // the projected bounds; map them exactly onto the full output area.
        camera.refresh_matrices();
        let bounds = world.projected(camera.as_ref()).bounding_rect();
        camera.set_viewport(Rect::new(
            -bounds.x / bounds.width,
            -bounds.y / bounds.height,
            tex_width as f32 / bounds.width,
            tex_height as f32 / bounds.height,
        ));
        // Only the viewport changed, not the field of view; skip the matrix
        // rebuild the viewport write scheduled.
        camera.set_projection_dirty(false);

        {
            let allow_target = self
                .target
                .get()
                .is_some_and(|explicit| explicit != self.node);
            let filter = traversal_filter(self.chain.clone(), real_walk.clone(), allow_target);
            let _walk = WalkSlotGuard::install(host, filter);
            real_driver(host, 0.0);
        }

        drop(restore);

        self.visual.set_frame(&self.frame.borrow());
        // The host's per-frame render-data refresh has already run; push
        // the rebound frame through explicitly.
        self.visual.refresh_render_data();
        Ok(true)
    }
}

/// Builds the capture-pass walk: follows the saved ancestor chain from the
/// screen root down to the target, suppressing each ancestor's own render
/// flag (children unaffected), and hands the target's sub-tree to the real
/// traversal. Nodes off the chain are skipped entirely.
fn traversal_filter(
    chain: Rc<RefCell<Vec<NodeId>>>,
    real_walk: WalkFn,
    allow_target: bool,
) -> WalkFn {
    Rc::new(move |host: &dyn MirrorHost, node, level| {
        if chain.borrow().last() != Some(&node) {
            // Off-chain sibling: not part of this capture.
            return;
        }
        chain.borrow_mut().pop();
        let reached_target = chain.borrow().is_empty();

        let flag = host.render_flag(node);
        // Ancestors never draw their own visuals; the target draws only
        // when it was explicitly configured as a node other than the
        // capture's own, so a capture never renders itself into its own
        // surface.
        host.set_render_flag(node, flag && reached_target && allow_target);

        if reached_target {
            // The target's sub-tree renders through the real traversal; the
            // guard puts this filter back when it returns.
            let _walk = WalkSlotGuard::install(host, real_walk.clone());
            real_walk(host, node, level);
        } else {
            real_walk(host, node, level);
        }

        host.set_render_flag(node, flag);
    })
}
