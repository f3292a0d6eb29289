//! Shared fullscreen quad.
//!
//! Every bridge node presents through the same screen-aligned quad: four
//! corner vertices with texture coordinates, plus the WGSL that samples the
//! color buffer and writes the depth buffer to the fragment depth. The quad
//! is built once per process on first use and reference-counted across all
//! node instances; when the last node drops its handle the geometry is torn
//! down, and a later node rebuilds it.

use std::sync::{Arc, Weak};

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// One quad vertex: clip-space position plus texture coordinate.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

/// The process-wide present-quad resource.
pub struct SharedQuad {
    /// Corner vertices in triangle-strip order.
    pub vertices: [QuadVertex; 4],
    /// Shader drawing the quad: color from the color buffer, fragment depth
    /// from the depth buffer.
    pub shader: &'static str,
}

lazy_static! {
    static ref QUAD: Mutex<Weak<SharedQuad>> = Mutex::new(Weak::new());
}

impl SharedQuad {
    /// Get a handle to the shared quad, building it if no handle is alive.
    pub fn acquire() -> Arc<SharedQuad> {
        let mut slot = QUAD.lock();
        if let Some(quad) = slot.upgrade() {
            return quad;
        }
        let quad = Arc::new(SharedQuad::build());
        *slot = Arc::downgrade(&quad);
        quad
    }

    /// Number of handles currently alive.
    pub fn live_handles() -> usize {
        QUAD.lock().strong_count()
    }

    fn build() -> Self {
        let v = |x: f32, y: f32, u: f32, w: f32| QuadVertex {
            position: [x, y],
            tex_coord: [u, w],
        };
        Self {
            vertices: [
                v(-1.0, -1.0, 0.0, 0.0),
                v(1.0, -1.0, 1.0, 0.0),
                v(-1.0, 1.0, 0.0, 1.0),
                v(1.0, 1.0, 1.0, 1.0),
            ],
            shader: include_str!("shaders/present.wgsl"),
        }
    }
}
