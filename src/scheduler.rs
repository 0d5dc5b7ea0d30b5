//! Process-wide capture scheduling: frame-driver interception and
//! per-frame orchestration of all registered captures.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::capture::{MirrorCapture, WalkSlotGuard};
use crate::host::{DriverFn, HostCamera, MirrorHost, NodeId, WalkFn};

/// The single registry of active [`MirrorCapture`] instances.
///
/// The scheduler intercepts the host's per-frame render driver; every frame
/// it runs before the driver's normal body, produces each registered
/// capture's surface, then invokes the original driver for the normal pass.
/// It owns the exclusive right to flip camera enabled flags and the
/// traversal slot during that window; individual captures never touch
/// engine-level switches themselves.
///
/// The scheduler does not own captures: registration and deregistration
/// follow the captures' external enable/disable lifecycle.
pub struct CaptureScheduler {
    shared: Rc<SchedulerShared>,
}

struct SchedulerShared {
    captures: RefCell<Vec<Rc<MirrorCapture>>>,
    real_driver: RefCell<Option<DriverFn>>,
    real_walk: RefCell<Option<WalkFn>>,
    wrapper: RefCell<Option<DriverFn>>,
}

impl CaptureScheduler {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(SchedulerShared {
                captures: RefCell::new(Vec::new()),
                real_driver: RefCell::new(None),
                real_walk: RefCell::new(None),
                wrapper: RefCell::new(None),
            }),
        }
    }

    /// Registers a capture; idempotent. Captures run in registration order.
    pub fn register(&self, capture: &Rc<MirrorCapture>) {
        let mut captures = self.shared.captures.borrow_mut();
        if !captures.iter().any(|known| Rc::ptr_eq(known, capture)) {
            log::debug!("registered mirror capture for node {:?}", capture.node());
            captures.push(capture.clone());
        }
    }

    /// Deregisters a capture (swap-with-last) and drops its transient
    /// ancestor chain.
    pub fn deregister(&self, capture: &Rc<MirrorCapture>) {
        let mut captures = self.shared.captures.borrow_mut();
        if let Some(index) = captures.iter().position(|known| Rc::ptr_eq(known, capture)) {
            captures.swap_remove(index);
            capture.clear_chain();
            log::debug!("deregistered mirror capture for node {:?}", capture.node());
        }
    }

    /// Once-per-frame hook, run after the host's update phase and before
    /// its render driver fires.
    ///
    /// Re-captures the real driver and traversal functions whenever the
    /// host swapped either slot externally (hot reload, re-registration),
    /// so the interception always wraps the current original rather than a
    /// stale one.
    pub fn post_update(&self, host: &dyn MirrorHost) {
        let current = host.frame_driver();
        let wrapper = self.shared.wrapper.borrow().clone();
        let installed = wrapper
            .as_ref()
            .is_some_and(|wrapper| Rc::ptr_eq(&current, wrapper));
        if !installed {
            log::trace!("intercepting host frame driver");
            *self.shared.real_driver.borrow_mut() = Some(current);
            let wrapper = wrapper.unwrap_or_else(|| self.frame_wrapper());
            host.set_frame_driver(wrapper.clone());
            *self.shared.wrapper.borrow_mut() = Some(wrapper);
        }

        let walk = host.walk();
        let known = self.shared.real_walk.borrow().clone();
        if !known.is_some_and(|known| Rc::ptr_eq(&known, &walk)) {
            *self.shared.real_walk.borrow_mut() = Some(walk);
        }
    }

    /// Restores the host's real frame driver if the scheduler's wrapper is
    /// still the installed one.
    pub fn shutdown(&self, host: &dyn MirrorHost) {
        let wrapper = self.shared.wrapper.borrow().clone();
        let real = self.shared.real_driver.borrow().clone();
        if let (Some(wrapper), Some(real)) = (wrapper, real) {
            if Rc::ptr_eq(&host.frame_driver(), &wrapper) {
                log::info!("restoring host frame driver");
                host.set_frame_driver(real);
            }
        }
    }

    fn frame_wrapper(&self) -> DriverFn {
        let shared = Rc::downgrade(&self.shared);
        Rc::new(move |host: &dyn MirrorHost, dt| {
            if let Some(shared) = shared.upgrade() {
                shared.frame(host, dt);
            }
        })
    }
}

impl Default for CaptureScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerShared {
    /// The intercepted per-frame body: capture passes first, then the
    /// normal pass through the original driver.
    fn frame(&self, host: &dyn MirrorHost, dt: f32) {
        let Some(real_driver) = self.real_driver.borrow().clone() else {
            return;
        };
        let Some(real_walk) = self.real_walk.borrow().clone() else {
            real_driver(host, dt);
            return;
        };

        let captures: Vec<Rc<MirrorCapture>> = self.captures.borrow().clone();
        if captures.is_empty() {
            real_driver(host, dt);
            return;
        }

        // Snapshot every render camera's enabled state, then disable them
        // all: capture passes must not leak into the normal camera set.
        let cameras = host.render_cameras();
        let enabled: Vec<bool> = cameras.iter().map(|camera| camera.is_enabled()).collect();
        for camera in &cameras {
            camera.set_enabled(false);
        }

        let mut hide: HashSet<NodeId> = HashSet::new();
        let mut hide_children_only: HashSet<NodeId> = HashSet::new();
        let mut custom_cameras: Vec<Rc<dyn HostCamera>> = Vec::new();
        let mut captured: Vec<Rc<MirrorCapture>> = Vec::new();

        for capture in &captures {
            // Deregistered before its turn: skip for this frame.
            if !self.is_registered(capture) {
                continue;
            }
            let Some(camera) = capture.resolve_camera(host) else {
                log::trace!("mirror capture {:?}: no camera, skipped", capture.node());
                continue;
            };
            // The camera must belong to this frame's snapshot and must have
            // been enabled before the pass began.
            let Some(index) = cameras.iter().position(|known| Rc::ptr_eq(known, &camera)) else {
                continue;
            };
            if !enabled[index] {
                continue;
            }

            camera.set_enabled(true);
            if capture.has_custom_camera() {
                custom_cameras.push(camera.clone());
            }
            match capture.frame_move(host, &camera, &real_walk, &real_driver) {
                Ok(true) => {
                    let target = capture.target().unwrap_or(capture.node());
                    if capture.hide_target() && host.is_active(target) {
                        hide.insert(target);
                        if target == capture.node() {
                            hide_children_only.insert(target);
                        }
                    }
                    captured.push(capture.clone());
                }
                Ok(false) => {}
                Err(error) => {
                    log::error!("mirror capture {:?} failed: {error}", capture.node());
                }
            }
            camera.set_enabled(false);
        }

        // Captures never permanently disable the normal scene.
        for (camera, was_enabled) in cameras.iter().zip(&enabled) {
            camera.set_enabled(*was_enabled);
        }
        // Custom-camera targets were already rendered once; keep them out
        // of the normal pass to avoid a double draw.
        for camera in &custom_cameras {
            camera.set_enabled(false);
        }

        {
            let walk = if hide.is_empty() {
                real_walk.clone()
            } else {
                exclusion_walk(hide, hide_children_only, real_walk.clone())
            };
            let _walk = WalkSlotGuard::install(host, walk);
            real_driver(host, dt);
        }

        for camera in &custom_cameras {
            camera.set_enabled(true);
        }

        // Deferred notifications, only for captures still registered now.
        for capture in &captured {
            if self.is_registered(capture) {
                capture.emit_captured();
            }
        }
    }

    fn is_registered(&self, capture: &Rc<MirrorCapture>) -> bool {
        self.captures
            .borrow()
            .iter()
            .any(|known| Rc::ptr_eq(known, capture))
    }
}

/// Normal-pass walk excluding this frame's hidden targets: a node marked
/// children-only still draws its own visuals over a no-op child traversal;
/// a fully excluded node is skipped with its whole sub-tree. Marks are
/// consumed on first encounter.
fn exclusion_walk(
    hide: HashSet<NodeId>,
    children_only: HashSet<NodeId>,
    real_walk: WalkFn,
) -> WalkFn {
    let hide = RefCell::new(hide);
    let children_only = RefCell::new(children_only);
    let noop: WalkFn = Rc::new(|_: &dyn MirrorHost, _, _| {});
    Rc::new(move |host: &dyn MirrorHost, node, level| {
        if !hide.borrow_mut().remove(&node) {
            real_walk(host, node, level);
        } else if children_only.borrow_mut().remove(&node) {
            let _walk = WalkSlotGuard::install(host, noop.clone());
            real_walk(host, node, level);
        }
    })
}
