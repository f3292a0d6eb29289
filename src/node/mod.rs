//! The bridge node.
//!
//! [`BridgeNode`] is the scene-graph-facing object: the host culls it once
//! per frame per render context, and the injected scheduler bins call back
//! into it to dispatch compute and to present the result. All compute state
//! is lazy per context; a failure on one context latches that context
//! invalid without affecting the others, and the latch holds until an
//! explicit [`BridgeNode::reset`].

pub mod gate;

pub use gate::ActivationGate;

use std::sync::{Arc, Weak};

use glam::Mat4;
use parking_lot::Mutex;

use crate::buffers;
use crate::client::ComputeClient;
use crate::context::{ContextArena, PerContextState, SlotState};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{CullContext, RasterContext, RenderContextId, Viewport};
use crate::scheduler::{ComputeBin, ComputeEntry, PresentBin, SharedQuad};
use crate::view::ViewProperties;

/// Whether the client's data may change between frames. Dynamic nodes take
/// part in the host's end-of-frame dynamic-object handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataVariance {
    Static,
    Dynamic,
}

/// A client plus its current owner. Attaching a slot to a second node steals
/// it from the first; a client never serves two nodes at once.
pub struct ClientSlot {
    client: Arc<dyn ComputeClient>,
    pub(crate) owner: Mutex<Weak<BridgeNode>>,
}

impl ClientSlot {
    pub fn new(client: Arc<dyn ComputeClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            owner: Mutex::new(Weak::new()),
        })
    }

    pub fn client(&self) -> &Arc<dyn ComputeClient> {
        &self.client
    }

    /// The node currently holding this client, if any.
    pub fn owner(&self) -> Option<Arc<BridgeNode>> {
        self.owner.lock().upgrade()
    }
}

struct NodeInner {
    client: Option<Arc<ClientSlot>>,
    contexts: ContextArena,
}

pub struct BridgeNode {
    platform: Arc<dyn crate::backend::ComputePlatform>,
    variance: DataVariance,
    gate: ActivationGate,
    quad: Arc<SharedQuad>,
    inner: Mutex<NodeInner>,
}

impl BridgeNode {
    /// A static, active node. Compute state is built lazily on first draw.
    pub fn new(platform: Arc<dyn crate::backend::ComputePlatform>) -> Arc<Self> {
        Self::with_options(platform, DataVariance::Static, true)
    }

    /// Full-control constructor; `initially_active` false builds the node
    /// with its gate closed so the application can attach and fill a client
    /// before the first frame sees it.
    pub fn with_options(
        platform: Arc<dyn crate::backend::ComputePlatform>,
        variance: DataVariance,
        initially_active: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform,
            variance,
            gate: ActivationGate::new(initially_active),
            quad: SharedQuad::acquire(),
            inner: Mutex::new(NodeInner {
                client: None,
                contexts: ContextArena::new(),
            }),
        })
    }

    pub fn data_variance(&self) -> DataVariance {
        self.variance
    }

    pub fn gate(&self) -> &ActivationGate {
        &self.gate
    }

    pub fn activate(&self) {
        self.gate.activate();
    }

    /// Block until in-flight frames drain, then keep the node out of the
    /// scheduler until [`activate`](Self::activate).
    pub fn deactivate(&self) {
        self.gate.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Attach `slot`'s client to this node, stealing it from any previous
    /// owner. All per-context compute state is rebuilt on next draw.
    pub fn attach_client(self: &Arc<Self>, slot: &Arc<ClientSlot>) {
        let previous = {
            let mut owner = slot.owner.lock();
            let previous = owner.upgrade();
            *owner = Arc::downgrade(self);
            previous
        };
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, self) {
                log::debug!("[node] client stolen from previous owner");
                previous.clear_client();
            }
        }
        let mut inner = self.inner.lock();
        inner.client = Some(slot.clone());
        inner.contexts.reset();
    }

    /// Remove the client, if any. Per-context compute state is dropped.
    pub fn detach_client(&self) {
        let slot = {
            let mut inner = self.inner.lock();
            inner.contexts.reset();
            inner.client.take()
        };
        if let Some(slot) = slot {
            *slot.owner.lock() = Weak::new();
        }
    }

    fn clear_client(&self) {
        let mut inner = self.inner.lock();
        inner.client = None;
        inner.contexts.reset();
    }

    pub fn client(&self) -> Option<Arc<ClientSlot>> {
        self.inner.lock().client.clone()
    }

    /// Drop all per-context compute state, including invalid latches. Every
    /// context re-initializes on its next draw.
    pub fn reset(&self) {
        self.inner.lock().contexts.reset();
    }

    /// Drop one context's compute state, for when the host destroys that
    /// rendering surface. Clears the context's invalid latch too.
    pub fn reset_context(&self, id: RenderContextId) {
        self.inner.lock().contexts.reset_slot(id);
    }

    /// Whether the given context is latched invalid.
    pub fn is_invalid(&self, id: RenderContextId) -> bool {
        self.inner
            .lock()
            .contexts
            .slot(id)
            .map(SlotState::is_invalid)
            .unwrap_or(false)
    }

    /// Cull-traversal entry point: frustum-test the client's bound, widen
    /// the computed near/far range, and register into the stage's bins.
    pub fn cull(self: &Arc<Self>, cx: &mut CullContext<'_>) {
        let bound = {
            let inner = self.inner.lock();
            match inner.client.as_ref() {
                Some(slot) => slot.client().bound(),
                None => return,
            }
        };
        if bound.is_empty() || !cx.frustum().intersects(&bound) {
            return;
        }
        if !self.gate.try_enter() {
            return;
        }
        cx.update_near_far(&bound);

        let (model_view, projection) = (cx.model_view, cx.projection);
        let stage = cx.stage();
        ComputeBin::get_or_create(stage).push(ComputeEntry {
            node: self.clone(),
            model_view,
            projection,
        });
        PresentBin::get_or_create(stage).push(self.clone());
    }

    /// Dispatch one frame of compute work on `raster`'s context. Lazily
    /// initializes the context's compute state; any failure latches the
    /// context invalid and is logged, never propagated to the host.
    pub fn execute_compute(&self, raster: &mut dyn RasterContext, model_view: Mat4, projection: Mat4) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let client = match inner.client.as_ref() {
            Some(slot) => slot.client().clone(),
            None => return,
        };
        let id = raster.context_id();
        let slot = inner.contexts.slot_mut(id);

        if matches!(slot, SlotState::Uninitialized) {
            match PerContextState::initialize(self.platform.as_ref(), raster, client.as_ref()) {
                Ok(state) => *slot = SlotState::Ready(state),
                Err(e) => {
                    log::error!("[node] context {} initialization failed: {}", id.index(), e);
                    *slot = SlotState::Invalid;
                    return;
                }
            }
        }

        let viewport = raster.viewport();
        let outcome = match slot {
            SlotState::Ready(state) => Self::run_frame(
                state,
                raster,
                client.as_ref(),
                model_view,
                projection,
                viewport,
            ),
            _ => return,
        };
        if let Err(e) = outcome {
            log::error!("[node] context {} compute failed: {}", id.index(), e);
            *slot = SlotState::Invalid;
        }
    }

    fn run_frame(
        state: &mut PerContextState,
        raster: &mut dyn RasterContext,
        client: &dyn ComputeClient,
        model_view: Mat4,
        projection: Mat4,
        viewport: Viewport,
    ) -> BridgeResult<()> {
        buffers::ensure_sized(state, raster, client, viewport.width, viewport.height)?;
        let view = ViewProperties::derive(model_view, projection);
        buffers::acquire(state)?;
        let data = state
            .client_data
            .as_deref_mut()
            .ok_or_else(|| BridgeError::Dispatch("client data missing".into()))?;
        client.dispatch(
            data,
            state.context.as_ref(),
            state.queue.as_mut(),
            &view,
            viewport,
        )?;
        buffers::release(state, raster)?;
        Ok(())
    }

    /// Draw the result quad for `raster`'s context. Skipped silently when
    /// the context is uninitialized or latched invalid.
    pub fn execute_present(&self, raster: &mut dyn RasterContext) {
        let mut inner = self.inner.lock();
        let id = raster.context_id();
        let slot = inner.contexts.slot_mut(id);
        let state = match slot {
            SlotState::Ready(state) => state,
            _ => return,
        };
        let targets = match state.targets.as_deref() {
            Some(targets) => targets,
            None => return,
        };
        if let Err(e) = raster.draw_present(targets, &self.quad) {
            log::error!("[node] context {} present failed: {}", id.index(), e);
            *slot = SlotState::Invalid;
        }
    }
}
