//! mirror2d - sub-tree render capture for 2D scene graphs
//!
//! Captures an arbitrary sub-tree of a 2D scene graph into an off-screen
//! surface ("mirror") every frame, as a building block for screenshots,
//! soft masks, custom post-effects, or render-to-bitmap caching.
//!
//! # Features
//! - Exact camera framing: the minimal perspective field of view or
//!   orthographic extent, plus a viewport remap, that frames an arbitrary
//!   target rectangle after screen-space projection without aspect
//!   distortion or clipping
//! - Isolated traversal: the host's single global render walk is redirected
//!   for one pass to visit only the target sub-tree, then restored; the
//!   captured sub-tree can be excluded from the subsequent normal pass
//! - Multiple independent mirrors per frame, coordinated by one scheduler
//!   that intercepts the host's per-frame render driver
//! - Narrow host contracts: scene graph, camera, surfaces, and the two
//!   global render entry points are consumed through small traits
//!
//! The host is responsible for projection math, GPU surfaces, and the scene
//! graph itself; this crate implements the policy driving them.

pub mod capture;
pub mod geometry;
pub mod host;
pub mod scheduler;

pub use capture::MirrorCapture;
pub use scheduler::CaptureScheduler;
