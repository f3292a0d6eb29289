//! wgpu implementation of the compute-backend traits.
//!
//! Sharing negotiation is adapter identity: a context "shares" the raster
//! device when the requested adapter is the same physical adapter the
//! rasterizer runs on, in which case the context adopts the rasterizer's
//! device and queue outright and target wrapping is free. A standalone
//! context gets its own device and stages frames back through a mapped
//! staging buffer.

use std::any::Any;
use std::sync::Arc;

use super::{ComputeContext, ComputeQueue, DeviceInfo, DeviceKind, HostFrame, ImagePair};
use crate::error::{BridgeError, BridgeResult, BufferErrorContext};
use crate::host::{RasterContext, RasterTargets, WgpuRaster, WgpuTargets};

/// Target color format. 32-bit float so kernels can store HDR intermediate
/// results without banding; not filterable, so presentation uses texel loads.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Target depth format, written by kernels as a plain storage texture.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

fn device_kind(ty: wgpu::DeviceType) -> DeviceKind {
    match ty {
        wgpu::DeviceType::DiscreteGpu => DeviceKind::DiscreteGpu,
        wgpu::DeviceType::IntegratedGpu => DeviceKind::IntegratedGpu,
        wgpu::DeviceType::VirtualGpu => DeviceKind::VirtualGpu,
        wgpu::DeviceType::Cpu => DeviceKind::Cpu,
        wgpu::DeviceType::Other => DeviceKind::Other,
    }
}

fn describe(info: &wgpu::AdapterInfo) -> DeviceInfo {
    DeviceInfo {
        platform: format!("wgpu/{:?}", info.backend),
        name: info.name.clone(),
        kind: device_kind(info.device_type),
    }
}

/// Two adapter handles naming the same physical adapter.
fn same_adapter(a: &wgpu::AdapterInfo, b: &wgpu::AdapterInfo) -> bool {
    a.backend == b.backend && a.name == b.name && a.vendor == b.vendor && a.device == b.device
}

/// Kernels write both target formats as storage textures; an adapter that
/// cannot do that cannot host a context at all.
fn supports_storage_targets(adapter: &wgpu::Adapter) -> bool {
    [COLOR_FORMAT, DEPTH_FORMAT].iter().all(|&format| {
        adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
    })
}

/// The production platform: one wgpu instance, all backends.
pub struct WgpuPlatform {
    adapters: Vec<wgpu::Adapter>,
}

impl WgpuPlatform {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let mut adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .collect();
        // Discrete first, software renderers last.
        adapters.sort_by_key(|a| match a.get_info().device_type {
            wgpu::DeviceType::DiscreteGpu => 0,
            wgpu::DeviceType::IntegratedGpu => 1,
            wgpu::DeviceType::VirtualGpu => 2,
            wgpu::DeviceType::Other => 3,
            wgpu::DeviceType::Cpu => 4,
        });
        for adapter in &adapters {
            log::info!("[backend] adapter: {}", describe(&adapter.get_info()));
        }
        Self { adapters }
    }
}

impl Default for WgpuPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl super::ComputePlatform for WgpuPlatform {
    fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        self.adapters
            .iter()
            .map(|a| describe(&a.get_info()))
            .collect()
    }

    fn create_context(
        &self,
        index: usize,
        interop: Option<&dyn RasterContext>,
    ) -> BridgeResult<Box<dyn ComputeContext>> {
        let adapter = self
            .adapters
            .get(index)
            .ok_or_else(|| BridgeError::Backend(format!("no adapter at index {}", index)))?;
        let info = adapter.get_info();
        if !supports_storage_targets(adapter) {
            return Err(BridgeError::ContextCreation(format!(
                "{} cannot write the kernel target formats as storage textures",
                info.name
            )));
        }

        if let Some(raster) = interop {
            let raster = raster
                .as_any()
                .downcast_ref::<WgpuRaster>()
                .ok_or_else(|| {
                    BridgeError::ContextCreation("rasterizer is not wgpu-backed".into())
                })?;
            if !same_adapter(&info, raster.adapter_info()) {
                return Err(BridgeError::ContextCreation(format!(
                    "{} is not the rasterizer's adapter",
                    info.name
                )));
            }
            // Same physical adapter: adopt the rasterizer's device and queue.
            return Ok(Box::new(WgpuContext {
                info: describe(&info),
                device: raster.device().clone(),
                queue: raster.queue().clone(),
                shares: true,
            }));
        }

        // Descending limit tiers: full limits first, then the downlevel
        // profiles for adapters that refuse them.
        let tiers = [
            ("default", wgpu::Limits::default()),
            ("downlevel", wgpu::Limits::downlevel_defaults()),
            ("webgl2", wgpu::Limits::downlevel_webgl2_defaults()),
        ];
        let mut last_error = String::new();
        for (tier, limits) in tiers {
            match pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("bridge-compute-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                },
                None,
            )) {
                Ok((device, queue)) => {
                    if tier != "default" {
                        log::warn!("[backend] {} created with {} limits", info.name, tier);
                    }
                    return Ok(Box::new(WgpuContext {
                        info: describe(&info),
                        device: Arc::new(device),
                        queue: Arc::new(queue),
                        shares: false,
                    }));
                }
                Err(e) => {
                    log::debug!("[backend] {} refused {} limits: {}", info.name, tier, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(BridgeError::ContextCreation(format!(
            "{}: {}",
            info.name, last_error
        )))
    }
}

pub struct WgpuContext {
    info: DeviceInfo,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    shares: bool,
}

impl WgpuContext {
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

impl ComputeContext for WgpuContext {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn shares_raster_device(&self) -> bool {
        self.shares
    }

    fn create_queue(&self) -> BridgeResult<Box<dyn ComputeQueue>> {
        Ok(Box::new(WgpuQueue {
            device: self.device.clone(),
            queue: self.queue.clone(),
        }))
    }

    fn wrap_targets(&self, targets: &dyn RasterTargets) -> BridgeResult<Box<dyn ImagePair>> {
        if !self.shares {
            return Err(BridgeError::buffer(
                "wrap",
                "standalone context cannot wrap rasterizer surfaces",
            ));
        }
        let targets = targets
            .as_any()
            .downcast_ref::<WgpuTargets>()
            .ok_or_else(|| BridgeError::buffer("wrap", "targets are not wgpu-backed"))?;
        Ok(Box::new(WgpuImagePair {
            color: targets.color().clone(),
            depth: targets.depth().clone(),
            width: targets.width(),
            height: targets.height(),
            zero_copy: true,
        }))
    }

    fn create_private_pair(&self, width: u32, height: u32) -> BridgeResult<Box<dyn ImagePair>> {
        let texture = |label, format| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };
        Ok(Box::new(WgpuImagePair {
            color: Arc::new(texture("bridge-private-color", COLOR_FORMAT)),
            depth: Arc::new(texture("bridge-private-depth", DEPTH_FORMAT)),
            width,
            height,
            zero_copy: false,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Color/depth texture pair visible to kernels.
pub struct WgpuImagePair {
    color: Arc<wgpu::Texture>,
    depth: Arc<wgpu::Texture>,
    width: u32,
    height: u32,
    zero_copy: bool,
}

impl WgpuImagePair {
    pub fn color(&self) -> &Arc<wgpu::Texture> {
        &self.color
    }

    pub fn depth(&self) -> &Arc<wgpu::Texture> {
        &self.depth
    }
}

impl ImagePair for WgpuImagePair {
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

pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuQueue {
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Copy one texture level to the host, stripping the copy's row padding.
    fn read_texture(
        &self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    ) -> BridgeResult<Vec<f32>> {
        let unpadded = (width * bytes_per_pixel) as usize;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded = (unpadded + align - 1) / align * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bridge-readback-staging"),
            size: (padded * height as usize) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bridge-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| BridgeError::buffer("read", "map callback dropped"))?
            .buffer_context("read")?;

        let data = slice.get_mapped_range();
        let mut bytes = Vec::with_capacity(unpadded * height as usize);
        for row in 0..height as usize {
            bytes.extend_from_slice(&data[row * padded..row * padded + unpadded]);
        }
        drop(data);
        staging.unmap();

        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

impl ComputeQueue for WgpuQueue {
    fn acquire_images(&mut self, pair: &mut dyn ImagePair) -> BridgeResult<()> {
        // Submissions on a shared wgpu queue are ordered; the semantic fence
        // is free here.
        log::trace!(
            "[backend] acquire {}x{} (zero-copy)",
            pair.width(),
            pair.height()
        );
        Ok(())
    }

    fn release_images(&mut self, pair: &mut dyn ImagePair) -> BridgeResult<()> {
        log::trace!(
            "[backend] release {}x{} (zero-copy)",
            pair.width(),
            pair.height()
        );
        Ok(())
    }

    fn read_back(&mut self, pair: &dyn ImagePair) -> BridgeResult<HostFrame> {
        let pair = pair
            .as_any()
            .downcast_ref::<WgpuImagePair>()
            .ok_or_else(|| BridgeError::buffer("read", "image pair is not wgpu-backed"))?;
        let (w, h) = (pair.width, pair.height);
        let color = self.read_texture(&pair.color, w, h, 16)?;
        let depth = self.read_texture(&pair.depth, w, h, 4)?;
        Ok(HostFrame::new(w, h, color, depth))
    }

    fn finish(&mut self) -> BridgeResult<()> {
        self.queue.submit(std::iter::empty());
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
