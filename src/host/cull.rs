//! Cull-time visitor context.
//!
//! The host traversal invokes the bridge node once per cull pass with the
//! transform stack and culling state valid at that point. The node uses this
//! context to frustum-test its client's bound, widen the host's computed
//! near/far range, and register itself into the stage's bins.

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use super::stage::RenderStage;
use super::{Aabb, RenderContextId, Viewport};

/// View frustum as six inward-facing planes, extracted from a combined
/// projection * model-view matrix.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract the clip planes from `projection * model_view`.
    pub fn from_matrix(clip_from_local: Mat4) -> Self {
        let m = clip_from_local;
        let row = |i: usize| Vec4::new(m.x_axis[i], m.y_axis[i], m.z_axis[i], m.w_axis[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3 + r2, // near
            r3 - r2, // far
        ];
        Self { planes }
    }

    /// Conservative box/frustum intersection: the box survives unless it is
    /// entirely outside one plane.
    pub fn intersects(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        for plane in &self.planes {
            let normal = plane.xyz();
            // Box corner farthest along the plane normal.
            let p = Vec3::new(
                if normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if normal.dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Per-node cull invocation state handed to the bridge by the host traversal.
pub struct CullContext<'a> {
    pub context_id: RenderContextId,
    pub viewport: Viewport,
    /// Model-view matrix valid at this point of traversal.
    pub model_view: Mat4,
    pub projection: Mat4,
    frustum: Frustum,
    /// Near/far range the host computed so far, widened by bridge bounds.
    computed_near_far: Option<(f32, f32)>,
    pub(crate) stage: &'a mut RenderStage,
}

impl<'a> CullContext<'a> {
    pub fn new(
        context_id: RenderContextId,
        viewport: Viewport,
        model_view: Mat4,
        projection: Mat4,
        stage: &'a mut RenderStage,
    ) -> Self {
        Self {
            context_id,
            viewport,
            model_view,
            projection,
            frustum: Frustum::from_matrix(projection * model_view),
            computed_near_far: None,
            stage,
        }
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn stage(&mut self) -> &mut RenderStage {
        self.stage
    }

    /// Widen the computed near/far range to cover `bound` in eye space.
    pub fn update_near_far(&mut self, bound: &Aabb) {
        if bound.is_empty() {
            return;
        }
        let mut near = f32::INFINITY;
        let mut far = f32::NEG_INFINITY;
        for corner in bound.corners() {
            // Eye space looks down -z; distance along the view axis.
            let z = -self.model_view.transform_point3(corner).z;
            near = near.min(z);
            far = far.max(z);
        }
        let merged = match self.computed_near_far {
            Some((n, f)) => (n.min(near), f.max(far)),
            None => (near, far),
        };
        self.computed_near_far = Some(merged);
    }

    pub fn computed_near_far(&self) -> Option<(f32, f32)> {
        self.computed_near_far
    }
}
