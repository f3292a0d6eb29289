//! Rasterizer-side boundary traits.
//!
//! The bridge consumes the host's graphics context through this surface: a
//! handle identifying the currently active rendering context, viewport
//! queries, target allocation, the staged upload used by the copy-through
//! path, and the present-quad draw.

use std::any::Any;

use crate::backend::HostFrame;
use crate::error::BridgeResult;
use crate::scheduler::SharedQuad;

use super::{RenderContextId, Viewport};

/// The currently active rasterizer context.
pub trait RasterContext: Send {
    /// Id of the logical rendering surface this context draws.
    fn context_id(&self) -> RenderContextId;

    /// Pixel dimensions of the active viewport.
    fn viewport(&self) -> Viewport;

    /// Hard device barrier: block until all rasterizer work submitted so far
    /// has completed. Issued once per stage before the first kernel dispatch.
    fn finish(&mut self) -> BridgeResult<()>;

    /// Allocate (or reallocate) the rasterizer-side color/depth surface pair
    /// at the given size.
    fn create_targets(&mut self, width: u32, height: u32)
        -> BridgeResult<Box<dyn RasterTargets>>;

    /// Upload one staged compute frame into the surfaces via a sub-region
    /// update (copy-through path).
    fn upload_targets(
        &mut self,
        targets: &dyn RasterTargets,
        frame: &HostFrame,
    ) -> BridgeResult<()>;

    /// Draw the screen-aligned quad sampling the pair's color and depth.
    fn draw_present(
        &mut self,
        targets: &dyn RasterTargets,
        quad: &SharedQuad,
    ) -> BridgeResult<()>;

    fn as_any(&self) -> &dyn Any;
}

/// The rasterizer-owned color/depth surface pair.
///
/// Both surfaces exist together and always share one size; at the end of
/// every successful frame they contain the latest compute output regardless
/// of the interop path taken.
pub trait RasterTargets: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn as_any(&self) -> &dyn Any;
}
