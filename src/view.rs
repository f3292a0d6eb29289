//! View-properties derivation.
//!
//! Once per dispatch the bridge reduces the active projection and model-view
//! matrices to a handful of vectors from which a kernel reconstructs a
//! world-space ray per output pixel, without ever transferring matrices into
//! the kernel. The projection is inverted in its explicit algebraic form,
//! separately for the perspective and orthographic cases; the result is then
//! carried into the node's local space by the inverse model-view matrix.
//!
//! Ray setup inside a kernel, for pixel `(x, y)` on a `width` x `height`
//! viewport:
//!
//! * perspective: `direction = origin_to_lower_left + edge_x * (x / width)
//!   + edge_y * (y / height)`, `initial_point = origin`
//! * orthographic: `direction = origin_to_lower_left`, `initial_point =
//!   origin + edge_x * (x / width) + edge_y * (y / height)`
//!
//! For a hit at `p = initial_point + t * direction` the depth value is
//!
//! * perspective: `depth = (t - 1) / (far - near) * far / t`
//! * orthographic: `depth = (t - 1) / (far - near) * near`
//!
//! and anything outside `[0, 1]` lies outside the view volume.

use glam::{DVec3, Mat4, Vec3};

/// Projection kind, distinguished by the bottom row of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Perspective,
    Orthographic,
}

/// Per-dispatch view description in the bridge's local coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewProperties {
    /// The eye point (perspective), or the eye point translated to the near
    /// plane's lower-left corner (orthographic).
    pub origin: Vec3,
    /// Vector from the eye to the near plane's lower-left corner
    /// (perspective), or the shared ray direction (orthographic).
    pub origin_to_lower_left: Vec3,
    /// Vector spanning the near plane's horizontal edge.
    pub edge_x: Vec3,
    /// Vector spanning the near plane's vertical edge.
    pub edge_y: Vec3,
    pub projection: Projection,
    /// Distance from the eye to the near plane.
    pub near: f32,
    /// Distance from the eye to the far plane.
    pub far: f32,
}

impl ViewProperties {
    /// Derive the view properties from the matrices recorded at cull time.
    ///
    /// `projection` must be a standard frustum or orthographic matrix; the
    /// two forms are inverted by their own closed-form expressions rather
    /// than a generic matrix inverse.
    pub fn derive(model_view: Mat4, projection: Mat4) -> Self {
        let pm = projection.as_dmat4();
        let inv = model_view.as_dmat4().inverse();

        // A perspective matrix maps w' from -z, so its (3,3) element is zero.
        let perspective = pm.w_axis.w == 0.0;

        let (near, far, left, right, bottom, top) = if perspective {
            // Frustum matrix, column-major:
            //   col2.z = -(f + n) / (f - n)      col3.z = -2 f n / (f - n)
            //   col0.x = 2 n / (r - l)           col2.x = (r + l) / (r - l)
            //   col1.y = 2 n / (t - b)           col2.y = (t + b) / (t - b)
            let near = pm.w_axis.z / (pm.z_axis.z - 1.0);
            let far = pm.w_axis.z / (pm.z_axis.z + 1.0);
            let left = near * (pm.z_axis.x - 1.0) / pm.x_axis.x;
            let right = near * (pm.z_axis.x + 1.0) / pm.x_axis.x;
            let bottom = near * (pm.z_axis.y - 1.0) / pm.y_axis.y;
            let top = near * (pm.z_axis.y + 1.0) / pm.y_axis.y;
            (near, far, left, right, bottom, top)
        } else {
            // Orthographic matrix, column-major:
            //   col2.z = -2 / (f - n)            col3.z = -(f + n) / (f - n)
            //   col0.x = 2 / (r - l)             col3.x = -(r + l) / (r - l)
            //   col1.y = 2 / (t - b)             col3.y = -(t + b) / (t - b)
            let near = (pm.w_axis.z + 1.0) / pm.z_axis.z;
            let far = (pm.w_axis.z - 1.0) / pm.z_axis.z;
            let left = -(1.0 + pm.w_axis.x) / pm.x_axis.x;
            let right = (1.0 - pm.w_axis.x) / pm.x_axis.x;
            let bottom = -(1.0 + pm.w_axis.y) / pm.y_axis.y;
            let top = (1.0 - pm.w_axis.y) / pm.y_axis.y;
            (near, far, left, right, bottom, top)
        };

        let (origin, origin_to_lower_left) = if perspective {
            (
                inv.transform_point3(DVec3::ZERO),
                inv.transform_vector3(DVec3::new(left, bottom, -near)),
            )
        } else {
            (
                inv.transform_point3(DVec3::new(left, bottom, 0.0)),
                inv.transform_vector3(DVec3::new(0.0, 0.0, -near)),
            )
        };
        let edge_x = inv.transform_vector3(DVec3::new(right - left, 0.0, 0.0));
        let edge_y = inv.transform_vector3(DVec3::new(0.0, top - bottom, 0.0));

        Self {
            origin: origin.as_vec3(),
            origin_to_lower_left: origin_to_lower_left.as_vec3(),
            edge_x: edge_x.as_vec3(),
            edge_y: edge_y.as_vec3(),
            projection: if perspective {
                Projection::Perspective
            } else {
                Projection::Orthographic
            },
            near: near as f32,
            far: far as f32,
        }
    }

    /// Pack into the GPU uniform layout used by shipped kernels.
    pub fn to_uniform(&self) -> ViewUniform {
        ViewUniform {
            origin: [self.origin.x, self.origin.y, self.origin.z, 0.0],
            lower_left: [
                self.origin_to_lower_left.x,
                self.origin_to_lower_left.y,
                self.origin_to_lower_left.z,
                0.0,
            ],
            edge_x: [self.edge_x.x, self.edge_x.y, self.edge_x.z, 0.0],
            edge_y: [self.edge_y.x, self.edge_y.y, self.edge_y.z, 0.0],
            near: self.near,
            far: self.far,
            projection: match self.projection {
                Projection::Perspective => 0,
                Projection::Orthographic => 1,
            },
            _pad: 0,
        }
    }
}

/// GPU-side mirror of [`ViewProperties`]; 16-byte aligned rows.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewUniform {
    pub origin: [f32; 4],
    pub lower_left: [f32; 4],
    pub edge_x: [f32; 4],
    pub edge_y: [f32; 4],
    pub near: f32,
    pub far: f32,
    pub projection: u32,
    pub _pad: u32,
}

/// Depth value of a ray hit at parameter `t`, by projection type.
///
/// Host-side twin of the mapping kernels apply; used by tests and by clients
/// that shade on the CPU.
pub fn depth_at(projection: Projection, t: f32, near: f32, far: f32) -> f32 {
    match projection {
        Projection::Perspective => (t - 1.0) / (far - near) * far / t,
        Projection::Orthographic => (t - 1.0) / (far - near) * near,
    }
}
