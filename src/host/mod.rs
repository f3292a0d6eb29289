//! Host-side boundary.
//!
//! The scene-graph engine, its traversal and its windowing shell live outside
//! this crate. This module defines the two extension points the bridge
//! consumes, the cull-time visitor context and the render stage's keyed bin
//! list, together with the rasterizer-context traits the bridge needs to
//! allocate surfaces, upload staged output and draw the present quad.

use glam::Vec3;

pub mod cull;
pub mod raster;
pub mod stage;
pub mod wgpu;

pub use cull::{CullContext, Frustum};
pub use raster::{RasterContext, RasterTargets};
pub use stage::{FrameState, RenderBin, RenderStage};
pub use self::wgpu::{WgpuRaster, WgpuTargets};

/// Identifies one logical rendering surface/thread-context.
///
/// Per-context bridge state is arena-indexed by this id, never by pointer
/// identity, so contexts can be destroyed and recreated without aliasing
/// hazards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderContextId(pub usize);

impl RenderContextId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Pixel dimensions of the active viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned box bounding a client's renderable objects, in the bridge
/// node's local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An empty box that fails every intersection test.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The eight corner points.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}
