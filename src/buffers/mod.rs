//! Target-buffer lifecycle.
//!
//! Each context owns a color/depth target pair on the raster side and a
//! compute-side view of it. On the zero-copy path the compute images wrap
//! the raster targets directly and dispatches are bracketed by
//! acquire/release fences. On the copy-through path the compute side renders
//! into private images, and release reads them back and uploads into the
//! raster targets.
//!
//! Resize ordering matters: compute-side wrappers are dropped before the
//! raster targets they wrap are released, and the client re-binds after the
//! new images exist.

use crate::client::ComputeClient;
use crate::context::PerContextState;
use crate::error::{BridgeError, BridgeResult};
use crate::host::RasterContext;

/// Ensure the context's targets match `width` x `height`, (re)allocating and
/// re-binding the client when they do not.
pub fn ensure_sized(
    state: &mut PerContextState,
    raster: &mut dyn RasterContext,
    client: &dyn ComputeClient,
    width: u32,
    height: u32,
) -> BridgeResult<()> {
    if width == 0 || height == 0 {
        return Err(BridgeError::buffer(
            "resize",
            format!("degenerate viewport {}x{}", width, height),
        ));
    }
    if state.width == width && state.height == height && state.images.is_some() {
        return Ok(());
    }

    log::debug!(
        "[buffers] resizing targets {}x{} -> {}x{}",
        state.width,
        state.height,
        width,
        height
    );

    // Wrappers go before the targets they wrap.
    state.images = None;
    state.targets = None;

    let targets = raster.create_targets(width, height)?;
    let images = if state.sharing {
        state.context.wrap_targets(targets.as_ref())?
    } else {
        state.context.create_private_pair(width, height)?
    };

    if let Some(data) = state.client_data.as_deref_mut() {
        client.bind_images(data, images.as_ref())?;
    }

    state.targets = Some(targets);
    state.images = Some(images);
    state.width = width;
    state.height = height;
    Ok(())
}

/// Make the target images writable by compute. On the zero-copy path this
/// fences against outstanding raster work; copy-through images are private,
/// so nothing is needed.
pub fn acquire(state: &mut PerContextState) -> BridgeResult<()> {
    let images = state
        .images
        .as_deref_mut()
        .ok_or_else(|| BridgeError::buffer("acquire", "no target images allocated"))?;
    if state.sharing {
        state.queue.acquire_images(images)?;
    }
    Ok(())
}

/// Hand the images back to the rasterizer. Zero-copy releases the fence;
/// copy-through reads the private images back and uploads them into the
/// raster targets.
pub fn release(state: &mut PerContextState, raster: &mut dyn RasterContext) -> BridgeResult<()> {
    let images = state
        .images
        .as_deref_mut()
        .ok_or_else(|| BridgeError::buffer("release", "no target images allocated"))?;
    if state.sharing {
        state.queue.release_images(images)?;
        return Ok(());
    }

    let frame = state.queue.read_back(&*images)?;
    let targets = state
        .targets
        .as_deref()
        .ok_or_else(|| BridgeError::buffer("release", "no raster targets allocated"))?;
    raster.upload_targets(targets, &frame)
}
