//! Render-scheduler integration.
//!
//! Bridge nodes do not draw inline with their stage traversal. During cull
//! each node registers itself into two injected bins: a [`ComputeBin`] at a
//! negative key, which runs before every ordinary bin and dispatches the
//! compute work, and a [`PresentBin`] at a positive key, which draws the
//! result quads in the stage's normal ordering. Keys below the most negative
//! and above the most positive existing keys are chosen so injected bins never
//! collide with bins the host already placed.

pub mod quad;

pub use quad::{QuadVertex, SharedQuad};

use std::sync::Arc;

use glam::Mat4;

use crate::host::{FrameState, RasterContext, RenderBin, RenderStage};
use crate::node::{BridgeNode, DataVariance};

/// One compute registration: the node plus the matrices captured at cull time.
pub struct ComputeEntry {
    pub node: Arc<BridgeNode>,
    pub model_view: Mat4,
    pub projection: Mat4,
}

/// Bin that dispatches compute work ahead of all rasterization.
///
/// The raster queue is drained once before the first dispatch so compute
/// reads no targets the rasterizer is still writing.
#[derive(Default)]
pub struct ComputeBin {
    entries: Vec<ComputeEntry>,
}

impl ComputeBin {
    /// Find the stage's compute bin, injecting one below the lowest existing
    /// key if none is present yet.
    pub fn get_or_create(stage: &mut RenderStage) -> &mut ComputeBin {
        let existing = stage
            .bin_list()
            .iter()
            .filter(|(_, bin)| bin.as_any().is::<ComputeBin>())
            .map(|(key, _)| *key)
            .next();
        let key = match existing {
            Some(key) => key,
            None => {
                let key = stage.next_key_below();
                stage.insert(key, Box::new(ComputeBin::default()));
                key
            }
        };
        stage
            .bin_mut(key)
            .and_then(|bin| bin.as_any_mut().downcast_mut::<ComputeBin>())
            .expect("bin inserted above")
    }

    pub fn push(&mut self, entry: ComputeEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RenderBin for ComputeBin {
    fn draw(&mut self, raster: &mut dyn RasterContext, _frame: &mut FrameState) {
        if self.entries.is_empty() {
            return;
        }
        // Barrier between the previous frame's rasterization and this
        // frame's compute dispatches.
        if let Err(e) = raster.finish() {
            log::error!("[scheduler] pre-compute barrier failed: {}", e);
            return;
        }
        for entry in self.entries.drain(..) {
            entry
                .node
                .execute_compute(raster, entry.model_view, entry.projection);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Bin that draws the result quads in stage order.
pub struct PresentBin {
    nodes: Vec<Arc<BridgeNode>>,
    dynamic_nodes: usize,
}

impl Default for PresentBin {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            dynamic_nodes: 0,
        }
    }
}

impl PresentBin {
    /// Find the stage's present bin, injecting one above the highest existing
    /// key if none is present yet.
    pub fn get_or_create(stage: &mut RenderStage) -> &mut PresentBin {
        let existing = stage
            .bin_list()
            .iter()
            .filter(|(_, bin)| bin.as_any().is::<PresentBin>())
            .map(|(key, _)| *key)
            .next();
        let key = match existing {
            Some(key) => key,
            None => {
                let key = stage.next_key_above();
                stage.insert(key, Box::new(PresentBin::default()));
                key
            }
        };
        stage
            .bin_mut(key)
            .and_then(|bin| bin.as_any_mut().downcast_mut::<PresentBin>())
            .expect("bin inserted above")
    }

    /// Register a node for presentation. The same node registered twice in
    /// one frame counts its data variance only once.
    pub fn push(&mut self, node: Arc<BridgeNode>) {
        let seen = self.nodes.iter().any(|n| Arc::ptr_eq(n, &node));
        if !seen && node.data_variance() == DataVariance::Dynamic {
            self.dynamic_nodes += 1;
        }
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl RenderBin for PresentBin {
    fn draw(&mut self, raster: &mut dyn RasterContext, frame: &mut FrameState) {
        for node in self.nodes.drain(..) {
            node.execute_present(raster);
            // Pairs with the gate entry made at cull registration.
            node.gate().leave();
        }
        for _ in 0..self.dynamic_nodes {
            frame.decrement_dynamic();
        }
        self.dynamic_nodes = 0;
    }

    fn dynamic_leaves(&self) -> usize {
        self.dynamic_nodes
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
