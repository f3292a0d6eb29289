//! Sphere-glyph raycasting client.
//!
//! The shipped reference client: a set of colored spheres raycast
//! analytically, one thread per pixel, writing color and window-space depth
//! so the result composites with rasterized geometry. All mutable state is
//! the glyph list itself; per-context pipelines and buffers live in the
//! opaque box the node stores.
//!
//! Glyph mutation is only safe while the owning node's gate is deactivated;
//! dispatch re-uploads the list whenever its generation moved.

use std::any::Any;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::ComputeClient;
use crate::backend::{ComputeContext, ComputeQueue, ImagePair, WgpuContext, WgpuImagePair};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{Aabb, Viewport};
use crate::view::{ViewProperties, ViewUniform};

/// One sphere glyph. A non-positive radius disables the glyph.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Glyph {
    /// xyz = center, w = radius.
    pub center_radius: [f32; 4],
    pub color: [f32; 4],
}

impl Glyph {
    pub fn new(center: Vec3, radius: f32, color: [f32; 4]) -> Self {
        Self {
            center_radius: [center.x, center.y, center.z, radius],
            color,
        }
    }
}

struct GlyphSet {
    glyphs: Vec<Glyph>,
    /// Bumped on every mutation; contexts compare against their uploaded
    /// generation to know when to re-upload.
    generation: u64,
}

/// Per-context pipeline state, boxed into the node's context slot.
struct GlyphPipelines {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    bind_layout: wgpu::BindGroupLayout,
    view_buffer: wgpu::Buffer,
    glyph_buffer: Option<wgpu::Buffer>,
    uploaded_generation: u64,
    color_view: Option<wgpu::TextureView>,
    depth_view: Option<wgpu::TextureView>,
    bind_group: Option<wgpu::BindGroup>,
}

pub struct GlyphClient {
    set: Mutex<GlyphSet>,
}

impl GlyphClient {
    pub fn new(glyphs: Vec<Glyph>) -> Arc<Self> {
        Arc::new(Self {
            set: Mutex::new(GlyphSet {
                glyphs,
                generation: 0,
            }),
        })
    }

    /// Replace the glyph set. Only call while the owning node is
    /// deactivated.
    pub fn set_glyphs(&self, glyphs: Vec<Glyph>) {
        let mut set = self.set.lock();
        set.glyphs = glyphs;
        set.generation += 1;
    }

    pub fn push_glyph(&self, glyph: Glyph) {
        let mut set = self.set.lock();
        set.glyphs.push(glyph);
        set.generation += 1;
    }

    pub fn glyph_count(&self) -> usize {
        self.set.lock().glyphs.len()
    }

    fn rebuild_bind_group(state: &mut GlyphPipelines) -> BridgeResult<()> {
        let (color, depth) = match (&state.color_view, &state.depth_view) {
            (Some(c), Some(d)) => (c, d),
            _ => {
                return Err(BridgeError::Dispatch(
                    "target images not bound".to_string(),
                ))
            }
        };
        let glyphs = state
            .glyph_buffer
            .as_ref()
            .ok_or_else(|| BridgeError::Dispatch("glyph buffer missing".to_string()))?;
        state.bind_group = Some(state.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glyph-raycast-bind"),
            layout: &state.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: state.view_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: glyphs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(color),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
            ],
        }));
        Ok(())
    }
}

impl ComputeClient for GlyphClient {
    fn build(
        &self,
        context: &dyn ComputeContext,
        _queue: &mut dyn ComputeQueue,
    ) -> BridgeResult<Box<dyn Any + Send>> {
        let context = context
            .as_any()
            .downcast_ref::<WgpuContext>()
            .ok_or_else(|| BridgeError::ClientBuild("context is not wgpu-backed".to_string()))?;
        let device = context.device().clone();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glyph-raycast-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/raycast.wgsl").into()),
        });

        let storage_texture = |binding, format| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        };
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glyph-raycast-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_texture(2, crate::backend::wgpu::COLOR_FORMAT),
                storage_texture(3, crate::backend::wgpu::DEPTH_FORMAT),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glyph-raycast-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("glyph-raycast-pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "main",
        });

        let view_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glyph-view-uniform"),
            size: std::mem::size_of::<ViewUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Box::new(GlyphPipelines {
            device,
            queue: context.queue().clone(),
            pipeline,
            bind_layout,
            view_buffer,
            glyph_buffer: None,
            uploaded_generation: 0,
            color_view: None,
            depth_view: None,
            bind_group: None,
        }))
    }

    fn bind_images(
        &self,
        data: &mut (dyn Any + Send),
        images: &dyn ImagePair,
    ) -> BridgeResult<()> {
        let state = data
            .downcast_mut::<GlyphPipelines>()
            .ok_or_else(|| BridgeError::Dispatch("foreign per-context data".to_string()))?;
        let images = images
            .as_any()
            .downcast_ref::<WgpuImagePair>()
            .ok_or_else(|| BridgeError::buffer("bind", "images are not wgpu-backed"))?;
        state.color_view = Some(
            images
                .color()
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        state.depth_view = Some(
            images
                .depth()
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        state.bind_group = None;
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
        let state = data
            .downcast_mut::<GlyphPipelines>()
            .ok_or_else(|| BridgeError::Dispatch("foreign per-context data".to_string()))?;

        {
            let set = self.set.lock();
            if state.glyph_buffer.is_none() || state.uploaded_generation != set.generation {
                // One zeroed (disabled) glyph keeps the binding non-empty.
                let fallback = [Glyph {
                    center_radius: [0.0; 4],
                    color: [0.0; 4],
                }];
                let contents: &[Glyph] = if set.glyphs.is_empty() {
                    &fallback
                } else {
                    &set.glyphs
                };
                state.glyph_buffer =
                    Some(
                        state
                            .device
                            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                                label: Some("glyph-storage"),
                                contents: bytemuck::cast_slice(contents),
                                usage: wgpu::BufferUsages::STORAGE,
                            }),
                    );
                state.uploaded_generation = set.generation;
                state.bind_group = None;
            }
        }

        state.queue.write_buffer(
            &state.view_buffer,
            0,
            bytemuck::bytes_of(&view.to_uniform()),
        );

        if state.bind_group.is_none() {
            Self::rebuild_bind_group(state)?;
        }
        let Some(bind_group) = state.bind_group.as_ref() else {
            return Err(BridgeError::Dispatch("bind group unavailable".to_string()));
        };

        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glyph-raycast-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("glyph-raycast-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&state.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(
                (viewport.width + 7) / 8,
                (viewport.height + 7) / 8,
                1,
            );
        }
        state.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn bound(&self) -> Aabb {
        let set = self.set.lock();
        let mut bound = Aabb::empty();
        for glyph in &set.glyphs {
            let [x, y, z, r] = glyph.center_radius;
            if r <= 0.0 {
                continue;
            }
            let center = Vec3::new(x, y, z);
            let radius = Vec3::splat(r);
            if bound.is_empty() {
                bound = Aabb::new(center - radius, center + radius);
            } else {
                bound.min = bound.min.min(center - radius);
                bound.max = bound.max.max(center + radius);
            }
        }
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_covers_all_glyphs() {
        let client = GlyphClient::new(vec![
            Glyph::new(Vec3::new(-2.0, 0.0, 0.0), 1.0, [1.0, 0.0, 0.0, 1.0]),
            Glyph::new(Vec3::new(3.0, 1.0, 0.0), 0.5, [0.0, 1.0, 0.0, 1.0]),
        ]);
        let bound = client.bound();
        assert_eq!(bound.min, Vec3::new(-3.0, -1.0, -1.0));
        assert_eq!(bound.max, Vec3::new(3.5, 1.5, 0.5));
    }

    #[test]
    fn empty_set_has_empty_bound() {
        let client = GlyphClient::new(Vec::new());
        assert!(client.bound().is_empty());
    }

    #[test]
    fn disabled_glyphs_do_not_widen_bound() {
        let client = GlyphClient::new(vec![
            Glyph::new(Vec3::ZERO, 1.0, [1.0; 4]),
            Glyph::new(Vec3::splat(100.0), 0.0, [1.0; 4]),
        ]);
        let bound = client.bound();
        assert_eq!(bound.max, Vec3::splat(1.0));
    }

    #[test]
    fn mutation_bumps_generation() {
        let client = GlyphClient::new(Vec::new());
        let before = client.set.lock().generation;
        client.push_glyph(Glyph::new(Vec3::ZERO, 1.0, [1.0; 4]));
        assert_eq!(client.set.lock().generation, before + 1);
        client.set_glyphs(Vec::new());
        assert_eq!(client.set.lock().generation, before + 2);
    }
}
