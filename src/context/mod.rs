//! Per-render-context compute state.
//!
//! A bridge node can be drawn from several host render contexts, each with
//! its own device realities. All compute-side objects are therefore held in
//! a growable arena indexed by [`RenderContextId`], and each slot is
//! initialized lazily on the first draw from its context.
//!
//! Initialization negotiates device sharing: every device of the platform is
//! first tried with the raster context offered for sharing, and only when no
//! device accepts does it retry without, settling on copy-through readback.

use std::any::Any;

use crate::backend::{ComputeContext, ComputePlatform, ComputeQueue, ImagePair};
use crate::client::ComputeClient;
use crate::error::{BridgeError, BridgeResult};
use crate::host::{RasterContext, RasterTargets, RenderContextId};

/// Everything one render context needs to run compute and present results.
pub struct PerContextState {
    pub context: Box<dyn ComputeContext>,
    pub queue: Box<dyn ComputeQueue>,
    /// Raster-side color/depth targets, sized on first use.
    pub targets: Option<Box<dyn RasterTargets>>,
    /// Compute-side view of the targets (zero-copy) or private images
    /// (copy-through).
    pub images: Option<Box<dyn ImagePair>>,
    /// Client-owned per-context objects (pipelines, buffers).
    pub client_data: Option<Box<dyn Any + Send>>,
    pub width: u32,
    pub height: u32,
    /// Whether the compute context shares the raster device.
    pub sharing: bool,
}

impl PerContextState {
    /// Negotiate a compute context for `raster` and build the client's
    /// per-context objects on it.
    ///
    /// Tries every device with sharing first. A platform with no devices at
    /// all is an immediate error; devices that refuse are logged and skipped.
    pub fn initialize(
        platform: &dyn ComputePlatform,
        raster: &dyn RasterContext,
        client: &dyn ComputeClient,
    ) -> BridgeResult<Self> {
        let devices = platform.enumerate_devices();
        if devices.is_empty() {
            return Err(BridgeError::NoComputeDevice);
        }

        let mut context = None;
        for (index, info) in devices.iter().enumerate() {
            match platform.create_context(index, Some(raster)) {
                Ok(ctx) => {
                    log::info!("[context] sharing raster device with {}", info);
                    context = Some(ctx);
                    break;
                }
                Err(e) => {
                    log::debug!("[context] {} does not share raster device: {}", info, e);
                }
            }
        }
        if context.is_none() {
            log::warn!("[context] no device shares the raster device, using copy-through");
            for (index, info) in devices.iter().enumerate() {
                match platform.create_context(index, None) {
                    Ok(ctx) => {
                        log::info!("[context] standalone context on {}", info);
                        context = Some(ctx);
                        break;
                    }
                    Err(e) => {
                        log::debug!("[context] {} unusable: {}", info, e);
                    }
                }
            }
        }
        let context = context.ok_or(BridgeError::NoComputeDevice)?;

        let mut queue = context.create_queue()?;
        let sharing = context.shares_raster_device();
        let client_data = client
            .build(context.as_ref(), queue.as_mut())
            .map_err(|e| BridgeError::ClientBuild(e.to_string()))?;

        Ok(Self {
            context,
            queue,
            targets: None,
            images: None,
            client_data: Some(client_data),
            width: 0,
            height: 0,
            sharing,
        })
    }

}

/// Initialization status of one arena slot.
pub enum SlotState {
    /// First draw from this context has not happened yet.
    Uninitialized,
    Ready(PerContextState),
    /// Initialization or a later operation failed; the slot stays failed
    /// until explicitly reset.
    Invalid,
}

impl SlotState {
    pub fn is_invalid(&self) -> bool {
        matches!(self, SlotState::Invalid)
    }
}

/// Growable per-render-context slot array.
#[derive(Default)]
pub struct ContextArena {
    slots: Vec<SlotState>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `id`, growing the arena as needed.
    pub fn slot_mut(&mut self, id: RenderContextId) -> &mut SlotState {
        if id.index() >= self.slots.len() {
            self.slots
                .resize_with(id.index() + 1, || SlotState::Uninitialized);
        }
        &mut self.slots[id.index()]
    }

    pub fn slot(&self, id: RenderContextId) -> Option<&SlotState> {
        self.slots.get(id.index())
    }

    /// Drop all compute state so every context re-initializes on next draw.
    /// Also clears invalid latches.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = SlotState::Uninitialized;
        }
    }

    /// Drop one context's compute state, e.g. when the host tears down that
    /// rendering surface.
    pub fn reset_slot(&mut self, id: RenderContextId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            *slot = SlotState::Uninitialized;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
