//! Compute-backend boundary.
//!
//! The bridge talks to the kernel-execution API exclusively through the traits
//! in this module: platform/device enumeration, context creation with or
//! without rasterizer interop, command queues and the two-image target pair.
//! One production implementation exists ([`wgpu`][self::wgpu]); tests drive
//! the bridge with scripted doubles.

use std::any::Any;

use crate::error::BridgeResult;
use crate::host::{RasterContext, RasterTargets};

pub mod wgpu;

pub use self::wgpu::{WgpuContext, WgpuImagePair, WgpuPlatform, WgpuQueue};

/// Rough capability class of an enumerated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

/// A device turned up by platform enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// The platform the device belongs to (a wgpu backend in production).
    pub platform: String,
    /// Human-readable device name, used in every log line about the device.
    pub name: String,
    pub kind: DeviceKind,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}, {})", self.name, self.kind, self.platform)
    }
}

/// Entry point of the compute side: enumerate devices and open contexts.
///
/// `create_context` with `interop` set attempts to create the context on the
/// rasterizer's own device so kernels write the rasterizer's surfaces without
/// a host copy; the attempt fails when the stacks cannot share. Without
/// `interop` the context is standalone and the bridge stages output through
/// host memory instead.
pub trait ComputePlatform: Send + Sync {
    /// Enumerate every available device, preferred devices first.
    fn enumerate_devices(&self) -> Vec<DeviceInfo>;

    /// Open a context on device `index` of the last enumeration.
    fn create_context(
        &self,
        index: usize,
        interop: Option<&dyn RasterContext>,
    ) -> BridgeResult<Box<dyn ComputeContext>>;
}

/// An open compute context bound to one device.
pub trait ComputeContext: Send {
    fn info(&self) -> &DeviceInfo;

    /// Whether this context operates directly on rasterizer-owned memory.
    fn shares_raster_device(&self) -> bool;

    fn create_queue(&self) -> BridgeResult<Box<dyn ComputeQueue>>;

    /// Wrap rasterizer-owned surfaces for zero-copy kernel access.
    ///
    /// Only valid on a sharing context; a non-sharing context reports a
    /// buffer error instead.
    fn wrap_targets(&self, targets: &dyn RasterTargets) -> BridgeResult<Box<dyn ImagePair>>;

    /// Allocate a private color/depth image pair plus host staging, for the
    /// copy-through path.
    fn create_private_pair(&self, width: u32, height: u32) -> BridgeResult<Box<dyn ImagePair>>;

    /// Concrete-type access for clients that need the raw device API.
    fn as_any(&self) -> &dyn Any;
}

/// Command queue created on a context's device.
pub trait ComputeQueue: Send {
    /// Transfer target ownership to the compute side before a dispatch.
    fn acquire_images(&mut self, pair: &mut dyn ImagePair) -> BridgeResult<()>;

    /// Hand the targets back to the rasterizer after a dispatch.
    fn release_images(&mut self, pair: &mut dyn ImagePair) -> BridgeResult<()>;

    /// Synchronously read a private pair back into host memory.
    fn read_back(&mut self, pair: &dyn ImagePair) -> BridgeResult<HostFrame>;

    /// Block until all submitted work on this queue has completed.
    fn finish(&mut self) -> BridgeResult<()>;

    fn as_any(&mut self) -> &mut dyn Any;
}

/// The color/depth image pair a kernel renders into.
///
/// Invariant: the two images always exist together and share one size.
pub trait ImagePair: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// True when the images alias rasterizer-owned memory.
    fn zero_copy(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// One frame of compute output staged in host memory (copy-through path).
///
/// Color is tightly packed RGBA f32, depth a single f32 channel.
pub struct HostFrame {
    pub width: u32,
    pub height: u32,
    pub color: Vec<f32>,
    pub depth: Vec<f32>,
}

impl HostFrame {
    pub fn new(width: u32, height: u32, color: Vec<f32>, depth: Vec<f32>) -> Self {
        debug_assert_eq!(color.len(), (width * height * 4) as usize);
        debug_assert_eq!(depth.len(), (width * height) as usize);
        Self {
            width,
            height,
            color,
            depth,
        }
    }
}
