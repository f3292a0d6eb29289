//! Scripted doubles for the backend and rasterizer boundaries.
//!
//! Every double appends to a shared event log so tests assert on the exact
//! order of boundary crossings rather than on internal state.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use gpu_bridge::backend::{
    ComputeContext, ComputePlatform, ComputeQueue, DeviceInfo, DeviceKind, HostFrame, ImagePair,
};
use gpu_bridge::error::{BridgeError, BridgeResult};
use gpu_bridge::host::{Aabb, RasterContext, RasterTargets, RenderContextId, Viewport};
use gpu_bridge::scheduler::SharedQuad;
use gpu_bridge::view::ViewProperties;
use gpu_bridge::ComputeClient;

use glam::Mat4;

use gpu_bridge::host::{CullContext, RenderStage};
use gpu_bridge::BridgeNode;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Drive one full host frame: cull, then stage execution. Returns the
/// dynamic-object count still outstanding afterwards.
pub fn run_frame(
    node: &Arc<BridgeNode>,
    raster: &mut MockRaster,
    model_view: Mat4,
    projection: Mat4,
) -> usize {
    init_logging();
    let mut stage = RenderStage::new();
    {
        let mut cx = CullContext::new(
            raster.context_id(),
            raster.viewport(),
            model_view,
            projection,
            &mut stage,
        );
        node.cull(&mut cx);
    }
    let mut frame = stage.begin_frame();
    stage.execute(raster, &mut frame);
    frame.dynamic_remaining()
}

/// Camera five units back on +z, looking at the origin.
pub fn default_matrices() -> (Mat4, Mat4) {
    (
        Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -5.0)),
        Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0),
    )
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        let mut events = self.0.lock();
        std::mem::take(&mut *events)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Index of the first event starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

/// Platform double: a fixed device list with per-device scripting of which
/// creation attempts succeed.
pub struct MockPlatform {
    pub devices: Vec<DeviceInfo>,
    /// Device indices that accept an interop context.
    pub interop_ok: Vec<usize>,
    /// Device indices that refuse even a standalone context.
    pub standalone_fail: Vec<usize>,
    pub log: EventLog,
}

impl MockPlatform {
    pub fn device(name: &str) -> DeviceInfo {
        DeviceInfo {
            platform: "mock".to_string(),
            name: name.to_string(),
            kind: DeviceKind::DiscreteGpu,
        }
    }

    /// One device that accepts interop.
    pub fn sharing(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            devices: vec![Self::device("mock-gpu")],
            interop_ok: vec![0],
            standalone_fail: vec![],
            log,
        })
    }

    /// One device that refuses interop but accepts standalone.
    pub fn copy_through(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            devices: vec![Self::device("mock-gpu")],
            interop_ok: vec![],
            standalone_fail: vec![],
            log,
        })
    }

    /// No devices at all.
    pub fn barren(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            devices: vec![],
            interop_ok: vec![],
            standalone_fail: vec![],
            log,
        })
    }
}

impl ComputePlatform for MockPlatform {
    fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        self.log.push("platform.enumerate");
        self.devices.clone()
    }

    fn create_context(
        &self,
        index: usize,
        interop: Option<&dyn RasterContext>,
    ) -> BridgeResult<Box<dyn ComputeContext>> {
        let sharing = interop.is_some();
        self.log
            .push(format!("platform.create dev{} interop={}", index, sharing));
        if sharing && !self.interop_ok.contains(&index) {
            return Err(BridgeError::ContextCreation("no interop".to_string()));
        }
        if !sharing && self.standalone_fail.contains(&index) {
            return Err(BridgeError::ContextCreation("device refused".to_string()));
        }
        Ok(Box::new(MockContext {
            info: self.devices[index].clone(),
            sharing,
            log: self.log.clone(),
        }))
    }
}

pub struct MockContext {
    info: DeviceInfo,
    sharing: bool,
    log: EventLog,
}

impl ComputeContext for MockContext {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn shares_raster_device(&self) -> bool {
        self.sharing
    }

    fn create_queue(&self) -> BridgeResult<Box<dyn ComputeQueue>> {
        Ok(Box::new(MockQueue {
            log: self.log.clone(),
        }))
    }

    fn wrap_targets(&self, targets: &dyn RasterTargets) -> BridgeResult<Box<dyn ImagePair>> {
        if !self.sharing {
            return Err(BridgeError::buffer("wrap", "standalone context"));
        }
        self.log
            .push(format!("context.wrap {}x{}", targets.width(), targets.height()));
        Ok(Box::new(MockImagePair {
            width: targets.width(),
            height: targets.height(),
            zero_copy: true,
        }))
    }

    fn create_private_pair(&self, width: u32, height: u32) -> BridgeResult<Box<dyn ImagePair>> {
        self.log
            .push(format!("context.private {}x{}", width, height));
        Ok(Box::new(MockImagePair {
            width,
            height,
            zero_copy: false,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockQueue {
    log: EventLog,
}

impl ComputeQueue for MockQueue {
    fn acquire_images(&mut self, pair: &mut dyn ImagePair) -> BridgeResult<()> {
        self.log
            .push(format!("queue.acquire {}x{}", pair.width(), pair.height()));
        Ok(())
    }

    fn release_images(&mut self, pair: &mut dyn ImagePair) -> BridgeResult<()> {
        self.log
            .push(format!("queue.release {}x{}", pair.width(), pair.height()));
        Ok(())
    }

    fn read_back(&mut self, pair: &dyn ImagePair) -> BridgeResult<HostFrame> {
        let (w, h) = (pair.width(), pair.height());
        self.log.push(format!("queue.read_back {}x{}", w, h));
        Ok(HostFrame::new(
            w,
            h,
            vec![0.25; (w * h * 4) as usize],
            vec![0.5; (w * h) as usize],
        ))
    }

    fn finish(&mut self) -> BridgeResult<()> {
        self.log.push("queue.finish");
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct MockImagePair {
    width: u32,
    height: u32,
    zero_copy: bool,
}

impl ImagePair for MockImagePair {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn zero_copy(&self) -> bool {
        self.zero_copy
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockTargets {
    width: u32,
    height: u32,
}

impl RasterTargets for MockTargets {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockRaster {
    pub id: RenderContextId,
    pub viewport: Viewport,
    pub log: EventLog,
}

impl MockRaster {
    pub fn new(id: usize, width: u32, height: u32, log: EventLog) -> Self {
        Self {
            id: RenderContextId(id),
            viewport: Viewport::new(width, height),
            log,
        }
    }
}

impl RasterContext for MockRaster {
    fn context_id(&self) -> RenderContextId {
        self.id
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn finish(&mut self) -> BridgeResult<()> {
        self.log.push("raster.finish");
        Ok(())
    }

    fn create_targets(&mut self, width: u32, height: u32) -> BridgeResult<Box<dyn RasterTargets>> {
        self.log
            .push(format!("raster.targets {}x{}", width, height));
        Ok(Box::new(MockTargets { width, height }))
    }

    fn upload_targets(
        &mut self,
        targets: &dyn RasterTargets,
        frame: &HostFrame,
    ) -> BridgeResult<()> {
        assert_eq!((targets.width(), targets.height()), (frame.width, frame.height));
        self.log
            .push(format!("raster.upload {}x{}", frame.width, frame.height));
        Ok(())
    }

    fn draw_present(&mut self, targets: &dyn RasterTargets, _quad: &SharedQuad) -> BridgeResult<()> {
        self.log
            .push(format!("raster.present {}x{}", targets.width(), targets.height()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Client double with a scriptable bound and failure switches.
pub struct RecordingClient {
    pub bound: Mutex<Aabb>,
    pub fail_build: Mutex<bool>,
    pub fail_dispatch: Mutex<bool>,
    pub log: EventLog,
}

struct RecordingData {
    bound_images: usize,
}

impl RecordingClient {
    pub fn new(bound: Aabb, log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            bound: Mutex::new(bound),
            fail_build: Mutex::new(false),
            fail_dispatch: Mutex::new(false),
            log,
        })
    }

    pub fn unit(log: EventLog) -> Arc<Self> {
        Self::new(
            Aabb::new(glam::Vec3::splat(-1.0), glam::Vec3::splat(1.0)),
            log,
        )
    }
}

impl ComputeClient for RecordingClient {
    fn build(
        &self,
        context: &dyn ComputeContext,
        _queue: &mut dyn ComputeQueue,
    ) -> BridgeResult<Box<dyn Any + Send>> {
        if *self.fail_build.lock() {
            return Err(BridgeError::ClientBuild("scripted failure".to_string()));
        }
        self.log
            .push(format!("client.build on {}", context.info().name));
        Ok(Box::new(RecordingData { bound_images: 0 }))
    }

    fn bind_images(
        &self,
        data: &mut (dyn Any + Send),
        images: &dyn ImagePair,
    ) -> BridgeResult<()> {
        let data = data
            .downcast_mut::<RecordingData>()
            .ok_or_else(|| BridgeError::Dispatch("foreign data".to_string()))?;
        data.bound_images += 1;
        self.log.push(format!(
            "client.bind {}x{} zero_copy={}",
            images.width(),
            images.height(),
            images.zero_copy()
        ));
        Ok(())
    }

    fn dispatch(
        &self,
        data: &mut (dyn Any + Send),
        _context: &dyn ComputeContext,
        _queue: &mut dyn ComputeQueue,
        view: &ViewProperties,
        viewport: Viewport,
    ) -> BridgeResult<()> {
        if *self.fail_dispatch.lock() {
            return Err(BridgeError::Dispatch("scripted failure".to_string()));
        }
        let data = data
            .downcast_mut::<RecordingData>()
            .ok_or_else(|| BridgeError::Dispatch("foreign data".to_string()))?;
        assert!(data.bound_images > 0, "dispatch before bind_images");
        self.log.push(format!(
            "client.dispatch {}x{} {:?}",
            viewport.width, viewport.height, view.projection
        ));
        Ok(())
    }

    fn bound(&self) -> Aabb {
        *self.bound.lock()
    }
}
