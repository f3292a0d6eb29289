//! Pluggable compute clients.
//!
//! A client supplies the actual compute work a bridge node runs: it builds
//! per-context objects (pipelines, data buffers) on whatever device the
//! context negotiation settled on, re-binds whenever the target images are
//! reallocated, and dispatches once per frame with the derived view
//! properties. All per-context objects live in the opaque data box the node
//! stores for it, so one client instance serves any number of contexts.

pub mod glyphs;

pub use glyphs::{Glyph, GlyphClient};

use std::any::Any;

use crate::backend::{ComputeContext, ComputeQueue, ImagePair};
use crate::error::BridgeResult;
use crate::host::{Aabb, Viewport};
use crate::view::ViewProperties;

pub trait ComputeClient: Send + Sync {
    /// Build the client's objects for one freshly negotiated context.
    fn build(
        &self,
        context: &dyn ComputeContext,
        queue: &mut dyn ComputeQueue,
    ) -> BridgeResult<Box<dyn Any + Send>>;

    /// Point the per-context objects at new target images. Called after
    /// every (re)allocation, before the next dispatch.
    fn bind_images(&self, data: &mut (dyn Any + Send), images: &dyn ImagePair)
        -> BridgeResult<()>;

    /// Run one frame of compute work into the bound images.
    fn dispatch(
        &self,
        data: &mut (dyn Any + Send),
        context: &dyn ComputeContext,
        queue: &mut dyn ComputeQueue,
        view: &ViewProperties,
        viewport: Viewport,
    ) -> BridgeResult<()>;

    /// World-space bound of whatever the client renders, for culling and
    /// near/far fitting. An empty bound makes the node invisible.
    fn bound(&self) -> Aabb;
}
