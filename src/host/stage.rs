//! Render stage and bin list.
//!
//! The host's render stage exposes an ordered, numerically keyed list of
//! render bins. Negative keys execute before the stage's own scene contents,
//! positive keys after, in ascending key order within each group. Custom bins
//! inserted during one traversal of the stage are found again by subsequent
//! traversals of the same stage, so exactly one bin of each custom kind exists
//! per stage.

use std::any::Any;
use std::collections::BTreeMap;

use super::raster::RasterContext;

/// One ordered bucket of draw operations within a stage.
pub trait RenderBin: Send {
    /// Execute the bin's draw operations.
    fn draw(&mut self, raster: &mut dyn RasterContext, frame: &mut FrameState);

    /// Number of dynamic (volatile-data) objects this bin will draw.
    fn dynamic_leaves(&self) -> usize {
        0
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Mutable state threaded through one frame's draw phase.
pub struct FrameState {
    /// Dynamic objects not yet drawn this frame. The host blocks the next
    /// update traversal until this reaches zero.
    dynamic_remaining: usize,
}

impl FrameState {
    pub fn new(dynamic_count: usize) -> Self {
        Self {
            dynamic_remaining: dynamic_count,
        }
    }

    /// Mark one dynamic object as drawn. Must be called exactly once per
    /// dynamic object per frame.
    pub fn decrement_dynamic(&mut self) {
        debug_assert!(self.dynamic_remaining > 0, "dynamic count underflow");
        self.dynamic_remaining = self.dynamic_remaining.saturating_sub(1);
    }

    pub fn dynamic_remaining(&self) -> usize {
        self.dynamic_remaining
    }
}

/// A render stage holding the keyed bin list.
#[derive(Default)]
pub struct RenderStage {
    bins: BTreeMap<i32, Box<dyn RenderBin>>,
}

impl RenderStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered bin list, keyed by bin number.
    pub fn bin_list(&mut self) -> &mut BTreeMap<i32, Box<dyn RenderBin>> {
        &mut self.bins
    }

    /// Insert a bin at the given key, replacing any bin already there.
    pub fn insert(&mut self, key: i32, bin: Box<dyn RenderBin>) {
        self.bins.insert(key, bin);
    }

    pub fn bin_mut(&mut self, key: i32) -> Option<&mut Box<dyn RenderBin>> {
        self.bins.get_mut(&key)
    }

    /// A key strictly below every existing key (and below zero), for bins
    /// that must run before all others.
    pub fn next_key_below(&self) -> i32 {
        self.bins.keys().next().copied().unwrap_or(0).min(0) - 1
    }

    /// A key strictly above every existing key (and above zero), for bins
    /// that must run after all others.
    pub fn next_key_above(&self) -> i32 {
        self.bins.keys().next_back().copied().unwrap_or(0).max(0) + 1
    }

    /// Sum of dynamic objects announced by every bin.
    pub fn dynamic_leaves(&self) -> usize {
        self.bins.values().map(|b| b.dynamic_leaves()).sum()
    }

    /// Begin the draw phase: a [`FrameState`] seeded with this stage's
    /// dynamic-object count.
    pub fn begin_frame(&self) -> FrameState {
        FrameState::new(self.dynamic_leaves())
    }

    /// Execute all bins: negative keys, (the stage's scene contents, drawn by
    /// the host between the two groups), then positive keys.
    pub fn execute(&mut self, raster: &mut dyn RasterContext, frame: &mut FrameState) {
        for (_, bin) in self.bins.iter_mut().filter(|(k, _)| **k < 0) {
            bin.draw(raster, frame);
        }
        for (_, bin) in self.bins.iter_mut().filter(|(k, _)| **k >= 0) {
            bin.draw(raster, frame);
        }
    }

    /// Discard all per-frame bins; the host does this after the draw phase.
    pub fn clear(&mut self) {
        self.bins.clear();
    }
}
