//! Batched GPU backend built on a shared mask texture array.
//!
//! All masks of a frame are uploaded into layers of one `R8Unorm` texture
//! array and drawn as instanced quads, batching up to a layer-count worth
//! of bitmaps per pass. The array only ever grows: it is re-created at the
//! union of the largest extents seen, so steady-state playback allocates
//! nothing per frame.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::{BackendKind, OverlayRenderer};
use crate::bitmap::CueBitmap;
use crate::color::ColorMatrix;
use crate::context::{GpuContext, SharedUniforms};
use crate::error::RenderError;
use crate::resize::PendingResize;

/// Layers in the shared mask texture array.
const MASK_LAYERS: u32 = 64;
/// Upper bound on quads drawn in one instanced batch.
const MAX_BATCH_INSTANCES: usize = 256;
/// Extent of the mask array before the first growth.
const INITIAL_MASK_EXTENT: u32 = 256;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MaskInstance {
    /// Destination x, y, width, height in surface pixels.
    rect: [f32; 4],
    /// Normalized fill RGB plus the still-inverted alpha byte.
    color: [f32; 4],
    layer: u32,
    _pad: [u32; 3],
}

struct MaskArray {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl MaskArray {
    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mask-array"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: MASK_LAYERS,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("mask-array-view"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// Extent covering both the current array and the incoming masks, capped at
/// the device maximum. `None` when the current array already fits them.
fn grown_extent(current: (u32, u32), needed: (u32, u32), max_dim: u32) -> Option<(u32, u32)> {
    if needed.0 <= current.0 && needed.1 <= current.1 {
        return None;
    }
    Some((
        needed.0.max(current.0).min(max_dim),
        needed.1.max(current.1).min(max_dim),
    ))
}

pub struct ArrayRenderer {
    ctx: GpuContext,
    pipeline: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    instances: wgpu::Buffer,
    masks: MaskArray,
    bind_group: wgpu::BindGroup,
    matrix: ColorMatrix,
    pending: PendingResize,
}

impl ArrayRenderer {
    pub fn new(ctx: GpuContext) -> Self {
        let device = &ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-array-shader"),
            source: wgpu::ShaderSource::Wgsl(matte_shaders::OVERLAY_ARRAY_WGSL.into()),
        });

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-array-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<SharedUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-array-pipeline-layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay-array-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<MaskInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 16,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 32,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Uint32,
                        },
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.config.format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overlay-array-uniforms"),
            contents: bytemuck::bytes_of(&SharedUniforms::new(
                &ColorMatrix::IDENTITY,
                ctx.config.width,
                ctx.config.height,
            )),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let batch = (MASK_LAYERS as usize).min(MAX_BATCH_INSTANCES);
        let instances = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-array-instances"),
            size: (batch * std::mem::size_of::<MaskInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let masks = MaskArray::create(device, INITIAL_MASK_EXTENT, INITIAL_MASK_EXTENT);
        let bind_group = make_bind_group(device, &bgl, &uniforms, &masks.view);

        Self {
            ctx,
            pipeline,
            bgl,
            uniforms,
            instances,
            masks,
            bind_group,
            matrix: ColorMatrix::IDENTITY,
            pending: PendingResize::new(),
        }
    }

    /// Upload one batch worth of masks and instance data. Layer `i` of the
    /// array holds the `i`-th bitmap of the batch.
    fn upload_batch(&self, chunk: &[&CueBitmap], heap: &[u8]) {
        let mut instances = Vec::with_capacity(chunk.len());
        for (layer, cue) in chunk.iter().enumerate() {
            self.ctx.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &self.masks.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                heap,
                wgpu::ImageDataLayout {
                    offset: cue.heap_offset as u64,
                    bytes_per_row: Some(cue.stride),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: cue.width,
                    height: cue.height,
                    depth_or_array_layers: 1,
                },
            );

            let [r, g, b] = cue.color.rgb_f32();
            instances.push(MaskInstance {
                rect: [
                    cue.dest_x as f32,
                    cue.dest_y as f32,
                    cue.width as f32,
                    cue.height as f32,
                ],
                color: [r, g, b, f32::from(cue.color.inverse_alpha()) / 255.0],
                layer: layer as u32,
                _pad: [0; 3],
            });
        }
        self.ctx
            .queue
            .write_buffer(&self.instances, 0, bytemuck::cast_slice(&instances));
    }

    /// Record and submit one pass. Uploads queued before this call land on
    /// the GPU ahead of it, and uploads for the next batch land after, which
    /// is what lets batches reuse the same layers.
    fn submit_batch(&self, target: &wgpu::TextureView, instance_count: u32, clear: bool) {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay-array-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay-array-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if clear {
                            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if instance_count > 0 {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.set_vertex_buffer(0, self.instances.slice(..));
                pass.draw(0..6, 0..instance_count);
            }
        }
        self.ctx.queue.submit(Some(encoder.finish()));
    }
}

impl OverlayRenderer for ArrayRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::GpuModern
    }

    fn set_color_matrix(&mut self, matrix: ColorMatrix) {
        self.matrix = matrix;
    }

    fn schedule_resize(&mut self, width: u32, height: u32) {
        self.pending.schedule(width, height);
    }

    fn render(&mut self, bitmaps: &[CueBitmap], heap: &[u8]) -> Result<(), RenderError> {
        if let Some((width, height)) = self.pending.take() {
            self.ctx.reconfigure(Some((width, height)));
        }

        let frame = match self.ctx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                // swapchain went stale; reconfigure so the next frame recovers
                self.ctx.reconfigure(None);
                return Err(err.into());
            }
        };
        let target = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let max_dim = self.ctx.max_texture_dimension();
        let renderable: Vec<&CueBitmap> = bitmaps
            .iter()
            .filter(|cue| {
                if !cue.is_renderable(heap.len()) {
                    return false;
                }
                if cue.width > max_dim || cue.height > max_dim {
                    log::warn!(
                        "mask {}x{} exceeds device texture limit {max_dim}, skipping",
                        cue.width,
                        cue.height
                    );
                    return false;
                }
                true
            })
            .collect();

        let needed = renderable
            .iter()
            .fold((0u32, 0u32), |acc, cue| (acc.0.max(cue.width), acc.1.max(cue.height)));
        if let Some((width, height)) =
            grown_extent((self.masks.width, self.masks.height), needed, max_dim)
        {
            self.masks = MaskArray::create(&self.ctx.device, width, height);
            self.bind_group =
                make_bind_group(&self.ctx.device, &self.bgl, &self.uniforms, &self.masks.view);
        }

        let (width, height) = self.ctx.size();
        self.ctx.queue.write_buffer(
            &self.uniforms,
            0,
            bytemuck::bytes_of(&SharedUniforms::new(&self.matrix, width, height)),
        );

        let batch = (MASK_LAYERS as usize).min(MAX_BATCH_INSTANCES);
        let mut first = true;
        for chunk in renderable.chunks(batch) {
            self.upload_batch(chunk, heap);
            self.submit_batch(&target, chunk.len() as u32, first);
            first = false;
        }
        if first {
            // nothing to draw; the clear alone wipes stale content
            self.submit_batch(&target, 0, true);
        }

        frame.present();
        Ok(())
    }
}

fn make_bind_group(
    device: &wgpu::Device,
    bgl: &wgpu::BindGroupLayout,
    uniforms: &wgpu::Buffer,
    mask_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("overlay-array-bind-group"),
        layout: bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(mask_view),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<MaskInstance>(), 48);
        assert_eq!(std::mem::offset_of!(MaskInstance, color), 16);
        assert_eq!(std::mem::offset_of!(MaskInstance, layer), 32);
    }

    #[test]
    fn test_extent_only_grows() {
        assert_eq!(grown_extent((256, 256), (100, 100), 8192), None);
        assert_eq!(grown_extent((256, 256), (256, 256), 8192), None);
        assert_eq!(grown_extent((256, 256), (300, 100), 8192), Some((300, 256)));
        assert_eq!(grown_extent((256, 256), (300, 400), 8192), Some((300, 400)));
    }

    #[test]
    fn test_extent_caps_at_device_limit() {
        assert_eq!(grown_extent((256, 256), (9000, 128), 8192), Some((8192, 256)));
    }
}
