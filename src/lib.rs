//! Cross-API compute/render bridge.
//!
//! The bridge lets a compute kernel produce color and depth for a full-screen
//! region and presents that output inside an otherwise conventional
//! retained-mode scene graph. It negotiates a zero-copy interop path between
//! the rasterizer and the compute backend, with a copy-through fallback staged
//! over host memory, and injects its own compute and present bins into the
//! host's render stage without breaking the stage's ordering invariants.
//!
//! The host traversal engine and the windowing shell stay outside this crate;
//! they are consumed through the traits in [`host`]. The compute side is
//! consumed through the traits in [`backend`]. Concrete visualization
//! algorithms plug in through [`client::ComputeClient`].

pub mod backend;
pub mod buffers;
pub mod client;
pub mod context;
pub mod error;
pub mod host;
pub mod node;
pub mod scheduler;
pub mod view;

pub use backend::{
    ComputeContext, ComputePlatform, ComputeQueue, DeviceInfo, HostFrame, ImagePair, WgpuPlatform,
};
pub use client::{ComputeClient, Glyph, GlyphClient};
pub use error::{BridgeError, BridgeResult};
pub use host::{CullContext, RasterContext, RenderContextId, RenderStage, Viewport};
pub use node::{ActivationGate, BridgeNode, ClientSlot, DataVariance};
pub use view::{Projection, ViewProperties};
