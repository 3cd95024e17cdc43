//! One-quad-per-draw GPU backend for downlevel devices.
//!
//! Each mask gets its own `R8Unorm` texture and per-quad uniform from a pool
//! of slots. The pool grows with the widest frame seen and is never shrunk;
//! a slot's texture is only re-created when an incoming mask outgrows it,
//! and the replaced texture is kept alive until the frame's commands have
//! been submitted. Mask rows are repacked tight before upload because these
//! devices reject row strides wider than the texture.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::{BackendKind, OverlayRenderer};
use crate::bitmap::CueBitmap;
use crate::color::ColorMatrix;
use crate::context::{GpuContext, SharedUniforms};
use crate::error::RenderError;
use crate::resize::PendingResize;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadData {
    /// Destination x, y, width, height in surface pixels.
    rect: [f32; 4],
    /// Normalized fill RGB plus the still-inverted alpha byte.
    color: [f32; 4],
}

struct QuadSlot {
    texture: wgpu::Texture,
    data: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

/// Copy a mask into `out` with the stride padding removed.
fn pack_tight(cue: &CueBitmap, heap: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(cue.width as usize * cue.height as usize);
    for row in 0..cue.height {
        out.extend_from_slice(cue.mask_row(heap, row));
    }
}

pub struct QuadRenderer {
    ctx: GpuContext,
    pipeline: wgpu::RenderPipeline,
    quad_bgl: wgpu::BindGroupLayout,
    shared: wgpu::Buffer,
    shared_bind_group: wgpu::BindGroup,
    slots: Vec<QuadSlot>,
    /// Textures replaced this frame, dropped only after submit.
    retired: Vec<wgpu::Texture>,
    scratch: Vec<u8>,
    matrix: ColorMatrix,
    pending: PendingResize,
}

impl QuadRenderer {
    pub fn new(ctx: GpuContext) -> Self {
        let device = &ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-quad-shader"),
            source: wgpu::ShaderSource::Wgsl(matte_shaders::OVERLAY_QUAD_WGSL.into()),
        });

        let shared_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-quad-shared-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
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
            }],
        });

        let quad_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-quad-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<QuadData>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-quad-pipeline-layout"),
            bind_group_layouts: &[&shared_bgl, &quad_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay-quad-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
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

        let shared = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overlay-quad-shared-uniforms"),
            contents: bytemuck::bytes_of(&SharedUniforms::new(
                &ColorMatrix::IDENTITY,
                ctx.config.width,
                ctx.config.height,
            )),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let shared_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay-quad-shared-bind-group"),
            layout: &shared_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shared.as_entire_binding(),
            }],
        });

        Self {
            ctx,
            pipeline,
            quad_bgl,
            shared,
            shared_bind_group,
            slots: Vec::new(),
            retired: Vec::new(),
            scratch: Vec::new(),
            matrix: ColorMatrix::IDENTITY,
            pending: PendingResize::new(),
        }
    }

    fn make_slot_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("overlay-quad-mask"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn make_slot_bind_group(
        device: &wgpu::Device,
        quad_bgl: &wgpu::BindGroupLayout,
        data: &wgpu::Buffer,
        texture: &wgpu::Texture,
    ) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay-quad-bind-group"),
            layout: quad_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: data.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        })
    }

    /// Make slot `index` exist and hold a texture of at least
    /// `width` x `height`. On re-creation the old texture is retired, not
    /// dropped, because an earlier frame may still reference it.
    fn ensure_slot(&mut self, index: usize, width: u32, height: u32) {
        let device = &self.ctx.device;
        if index == self.slots.len() {
            let texture = Self::make_slot_texture(device, width, height);
            let data = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("overlay-quad-data"),
                size: std::mem::size_of::<QuadData>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = Self::make_slot_bind_group(device, &self.quad_bgl, &data, &texture);
            self.slots.push(QuadSlot {
                texture,
                data,
                bind_group,
                width,
                height,
            });
            return;
        }

        let slot = &mut self.slots[index];
        if width <= slot.width && height <= slot.height {
            return;
        }
        let width = width.max(slot.width);
        let height = height.max(slot.height);
        let texture = Self::make_slot_texture(device, width, height);
        let bind_group = Self::make_slot_bind_group(device, &self.quad_bgl, &slot.data, &texture);
        self.retired.push(std::mem::replace(&mut slot.texture, texture));
        slot.bind_group = bind_group;
        slot.width = width;
        slot.height = height;
    }
}

impl OverlayRenderer for QuadRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::GpuLegacy
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

        let (width, height) = self.ctx.size();
        self.ctx.queue.write_buffer(
            &self.shared,
            0,
            bytemuck::bytes_of(&SharedUniforms::new(&self.matrix, width, height)),
        );

        let mut scratch = std::mem::take(&mut self.scratch);
        for (index, cue) in renderable.iter().enumerate() {
            self.ensure_slot(index, cue.width, cue.height);
            pack_tight(cue, heap, &mut scratch);
            self.ctx.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &self.slots[index].texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &scratch,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(cue.width),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: cue.width,
                    height: cue.height,
                    depth_or_array_layers: 1,
                },
            );

            let [r, g, b] = cue.color.rgb_f32();
            self.ctx.queue.write_buffer(
                &self.slots[index].data,
                0,
                bytemuck::bytes_of(&QuadData {
                    rect: [
                        cue.dest_x as f32,
                        cue.dest_y as f32,
                        cue.width as f32,
                        cue.height as f32,
                    ],
                    color: [r, g, b, f32::from(cue.color.inverse_alpha()) / 255.0],
                }),
            );
        }
        self.scratch = scratch;

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay-quad-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay-quad-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if !renderable.is_empty() {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.shared_bind_group, &[]);
                for index in 0..renderable.len() {
                    pass.set_bind_group(1, &self.slots[index].bind_group, &[]);
                    pass.draw(0..6, 0..1);
                }
            }
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        self.retired.clear();

        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::PackedColor;

    #[test]
    fn test_pack_tight_strips_stride_padding() {
        // two rows of three bytes at stride five
        let heap: Vec<u8> = (0u8..12).collect();
        let cue = CueBitmap {
            dest_x: 0,
            dest_y: 0,
            width: 3,
            height: 2,
            stride: 5,
            heap_offset: 1,
            color: PackedColor::OPAQUE_WHITE,
        };
        assert!(cue.is_renderable(heap.len()));

        let mut out = Vec::new();
        pack_tight(&cue, &heap, &mut out);
        assert_eq!(out, vec![1, 2, 3, 6, 7, 8]);
    }

    #[test]
    fn test_pack_tight_reuses_allocation() {
        let heap = vec![7u8; 64];
        let cue = CueBitmap {
            dest_x: 0,
            dest_y: 0,
            width: 4,
            height: 4,
            stride: 8,
            heap_offset: 0,
            color: PackedColor::OPAQUE_WHITE,
        };
        let mut out = Vec::new();
        pack_tight(&cue, &heap, &mut out);
        let cap = out.capacity();
        pack_tight(&cue, &heap, &mut out);
        assert_eq!(out.capacity(), cap);
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_quad_data_layout() {
        assert_eq!(std::mem::size_of::<QuadData>(), 32);
        assert_eq!(std::mem::offset_of!(QuadData, color), 16);
    }
}
