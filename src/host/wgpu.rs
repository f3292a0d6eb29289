//! wgpu implementation of the rasterizer-context traits.
//!
//! [`WgpuRaster`] wraps the device/queue pair a host renderer already owns.
//! The frame target (the attachment the present quad draws into) is set by
//! the host once per frame; the present pipeline and the quad's vertex
//! buffer are built on first use and cached for the context's lifetime.
//! Compute output composites with rasterized geometry through the depth
//! test, so the frame target must carry a `Depth32Float` attachment.

use std::any::Any;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::{RasterContext, RasterTargets, RenderContextId, Viewport};
use crate::backend::HostFrame;
use crate::error::{BridgeError, BridgeResult, BufferErrorContext};
use crate::scheduler::{QuadVertex, SharedQuad};

/// Depth format the present pass tests and writes against.
pub const FRAME_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Raster-side color/depth target pair.
///
/// Allocated with storage, sampling and upload usages so the same textures
/// serve both the zero-copy path (kernels write them directly) and the
/// copy-through path (host frames are uploaded into them).
pub struct WgpuTargets {
    color: Arc<wgpu::Texture>,
    depth: Arc<wgpu::Texture>,
    width: u32,
    height: u32,
}

impl WgpuTargets {
    pub fn color(&self) -> &Arc<wgpu::Texture> {
        &self.color
    }

    pub fn depth(&self) -> &Arc<wgpu::Texture> {
        &self.depth
    }
}

impl RasterTargets for WgpuTargets {
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

struct PresentPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    vertices: wgpu::Buffer,
}

/// A host render context backed by wgpu.
pub struct WgpuRaster {
    id: RenderContextId,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    /// Format of the color attachment the present quad draws into.
    output_format: wgpu::TextureFormat,
    viewport: Viewport,
    /// Current frame attachments, set by the host before the draw phase.
    frame_color: Option<wgpu::TextureView>,
    frame_depth: Option<wgpu::TextureView>,
    present: Option<PresentPipeline>,
}

impl WgpuRaster {
    pub fn new(
        id: RenderContextId,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter_info: wgpu::AdapterInfo,
        output_format: wgpu::TextureFormat,
        viewport: Viewport,
    ) -> Self {
        Self {
            id,
            device,
            queue,
            adapter_info,
            output_format,
            viewport,
            frame_color: None,
            frame_depth: None,
            present: None,
        }
    }

    /// Open a windowless context on the system's default adapter, with its
    /// own offscreen frame target. Returns `None` when no adapter exists, so
    /// GPU tests can skip on headless CI.
    pub fn headless(id: RenderContextId, width: u32, height: u32) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let adapter_info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("bridge-raster-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .ok()?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let frame = |label, format, usage| {
            device
                .create_texture(&wgpu::TextureDescriptor {
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
                    usage,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        let color = frame(
            "bridge-headless-color",
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth = frame(
            "bridge-headless-depth",
            FRAME_DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        let mut raster = Self::new(
            id,
            device,
            queue,
            adapter_info,
            wgpu::TextureFormat::Rgba8Unorm,
            Viewport::new(width, height),
        );
        raster.set_frame_target(color, depth);
        Some(raster)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Point the present pass at this frame's attachments.
    pub fn set_frame_target(&mut self, color: wgpu::TextureView, depth: wgpu::TextureView) {
        self.frame_color = Some(color);
        self.frame_depth = Some(depth);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Clear the frame attachments: color to `color`, depth to the far
    /// plane. Hosts with their own scene pass clear as part of it; headless
    /// contexts call this before the stage executes.
    pub fn clear_frame(&mut self, color: wgpu::Color) -> BridgeResult<()> {
        let frame_color = self.frame_color.as_ref().buffer_context("clear")?;
        let frame_depth = self.frame_depth.as_ref().buffer_context("clear")?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bridge-clear-encoder"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bridge-clear-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: frame_color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: frame_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn ensure_present_pipeline(&mut self, quad: &SharedQuad) {
        if self.present.is_none() {
            let shader = self
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("bridge-present-shader"),
                    source: wgpu::ShaderSource::Wgsl(quad.shader.into()),
                });

            let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            };
            let bind_layout =
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("bridge-present-bind-layout"),
                        entries: &[texture_entry(0), texture_entry(1)],
                    });
            let layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("bridge-present-layout"),
                    bind_group_layouts: &[&bind_layout],
                    push_constant_ranges: &[],
                });

            let pipeline = self
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("bridge-present-pipeline"),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: "vs_main",
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<QuadVertex>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                        }],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: "fs_main",
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.output_format,
                            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleStrip,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: FRAME_DEPTH_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                });

            let vertices = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("bridge-present-quad"),
                    contents: bytemuck::cast_slice(&quad.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });

            self.present = Some(PresentPipeline {
                pipeline,
                bind_layout,
                vertices,
            });
        }
    }
}

impl RasterContext for WgpuRaster {
    fn context_id(&self) -> RenderContextId {
        self.id
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn finish(&mut self) -> BridgeResult<()> {
        self.queue.submit(std::iter::empty());
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn create_targets(&mut self, width: u32, height: u32) -> BridgeResult<Box<dyn RasterTargets>> {
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
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        };
        Ok(Box::new(WgpuTargets {
            color: Arc::new(texture("bridge-target-color", crate::backend::wgpu::COLOR_FORMAT)),
            depth: Arc::new(texture("bridge-target-depth", crate::backend::wgpu::DEPTH_FORMAT)),
            width,
            height,
        }))
    }

    fn upload_targets(
        &mut self,
        targets: &dyn RasterTargets,
        frame: &HostFrame,
    ) -> BridgeResult<()> {
        let targets = targets
            .as_any()
            .downcast_ref::<WgpuTargets>()
            .ok_or_else(|| BridgeError::buffer("upload", "targets are not wgpu-backed"))?;
        if targets.width != frame.width || targets.height != frame.height {
            return Err(BridgeError::buffer(
                "upload",
                format!(
                    "frame {}x{} does not match targets {}x{}",
                    frame.width, frame.height, targets.width, targets.height
                ),
            ));
        }

        let extent = wgpu::Extent3d {
            width: frame.width,
            height: frame.height,
            depth_or_array_layers: 1,
        };
        let write = |texture: &wgpu::Texture, data: &[u8], bytes_per_pixel: u32| {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.width * bytes_per_pixel),
                    rows_per_image: Some(frame.height),
                },
                extent,
            );
        };
        write(&targets.color, bytemuck::cast_slice(&frame.color), 16);
        write(&targets.depth, bytemuck::cast_slice(&frame.depth), 4);
        Ok(())
    }

    fn draw_present(&mut self, targets: &dyn RasterTargets, quad: &SharedQuad) -> BridgeResult<()> {
        let targets = targets
            .as_any()
            .downcast_ref::<WgpuTargets>()
            .ok_or_else(|| BridgeError::buffer("present", "targets are not wgpu-backed"))?;
        self.ensure_present_pipeline(quad);
        let Some(present) = self.present.as_ref() else {
            return Err(BridgeError::buffer("present", "pipeline unavailable"));
        };

        let frame_color = self.frame_color.as_ref().buffer_context("present")?;
        let frame_depth = self.frame_depth.as_ref().buffer_context("present")?;

        let color_view = targets
            .color
            .create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = targets
            .depth
            .create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bridge-present-bind"),
            layout: &present.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&depth_view),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bridge-present-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("bridge-present-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame_color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: frame_depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&present.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, present.vertices.slice(..));
            pass.draw(0..4, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
