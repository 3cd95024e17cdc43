//! GPU device and surface plumbing shared by both GPU backends.

use bytemuck::{Pod, Zeroable};

use crate::color::ColorMatrix;
use crate::error::SurfaceError;

/// Uniform block both overlay shaders start with: the color correction
/// matrix as vec4-padded columns, then the surface resolution in pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct SharedUniforms {
    pub color_matrix: [[f32; 4]; 3],
    pub resolution: [f32; 2],
    pub _pad: [f32; 2],
}

impl SharedUniforms {
    pub(crate) fn new(matrix: &ColorMatrix, width: u32, height: u32) -> Self {
        Self {
            color_matrix: matrix.cols,
            resolution: [width as f32, height as f32],
            _pad: [0.0; 2],
        }
    }
}

/// Which device feature level a [`GpuContext`] was brought up with.
///
/// `Full` asks for default limits and carries texture arrays plus enough
/// instancing for the batched backend. `Downlevel` sticks to the WebGL2
/// floor so the one-quad-per-draw backend can run on constrained drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTier {
    Full,
    Downlevel,
}

impl DeviceTier {
    fn limits(self, adapter: &wgpu::Adapter) -> wgpu::Limits {
        match self {
            DeviceTier::Full => wgpu::Limits::default(),
            DeviceTier::Downlevel => {
                wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
            }
        }
    }
}

/// An adapter, device, queue, and configured surface bundled together.
///
/// Construction consumes the surface; on failure the surface is handed back
/// so the next tier in the fallback order can retry with it, after the
/// failed attempt's device and adapter have already been dropped.
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub tier: DeviceTier,
}

impl GpuContext {
    pub fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        tier: DeviceTier,
    ) -> Result<Self, (SurfaceError, wgpu::Surface<'static>)> {
        let Some(adapter) = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })) else {
            return Err((SurfaceError::NoAdapter, surface));
        };

        let descriptor = wgpu::DeviceDescriptor {
            label: Some("matte-device"),
            required_features: wgpu::Features::empty(),
            required_limits: tier.limits(&adapter),
        };
        let (device, queue) = match pollster::block_on(adapter.request_device(&descriptor, None)) {
            Ok(pair) => pair,
            Err(err) => return Err((err.into(), surface)),
        };

        let (width, height) = non_empty_extent(width, height);
        let config = make_overlay_surface_config(&adapter, &surface, width, height);
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            adapter,
            device,
            queue,
            config,
            tier,
        })
    }

    /// Reconfigure the surface, optionally at a new size. Zero-area sizes
    /// are ignored; reconfiguring at the current size recovers a lost or
    /// outdated swapchain.
    pub fn reconfigure(&mut self, size: Option<(u32, u32)>) {
        if let Some((width, height)) = size {
            if width == 0 || height == 0 {
                return;
            }
            self.config.width = width;
            self.config.height = height;
        }
        self.surface.configure(&self.device, &self.config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Largest texture extent this device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

/// Surfaces reject zero extents, so an empty requested size comes up as a
/// 1x1 placeholder until the host announces a real one.
fn non_empty_extent(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

/// Choose a non-sRGB surface format when available; otherwise, pick the first format.
///
/// Mask fills blend in the gamma domain, so an sRGB view would re-encode
/// the already-encoded channel values.
pub fn choose_overlay_surface_format(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface,
) -> wgpu::TextureFormat {
    let caps = surface.get_capabilities(adapter);
    caps.formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .unwrap_or(caps.formats[0])
}

/// Create a surface configuration for the given size, favoring FIFO present
/// mode and a premultiplied compositing mode when present.
pub fn make_overlay_surface_config(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface,
    width: u32,
    height: u32,
) -> wgpu::SurfaceConfiguration {
    let caps = surface.get_capabilities(adapter);
    let format = choose_overlay_surface_format(adapter, surface);
    let present_mode = caps
        .present_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::PresentMode::Fifo)
        .unwrap_or(caps.present_modes[0]);
    let alpha_mode = caps
        .alpha_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::CompositeAlphaMode::PreMultiplied)
        .unwrap_or(caps.alpha_modes[0]);
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width,
        height,
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_extents_configure_as_placeholder() {
        // a zero-area initial size must never reach Surface::configure,
        // which rejects zero extents fatally instead of through an error
        assert_eq!(non_empty_extent(0, 0), (1, 1));
        assert_eq!(non_empty_extent(0, 720), (1, 720));
        assert_eq!(non_empty_extent(1280, 0), (1280, 1));
        assert_eq!(non_empty_extent(1280, 720), (1280, 720));
    }

    #[test]
    fn test_uniform_block_matches_wgsl_layout() {
        // mat3x3<f32> occupies three vec4 columns, then vec2 resolution,
        // then padding up to the 16-byte struct alignment
        assert_eq!(std::mem::size_of::<SharedUniforms>(), 64);
        assert_eq!(std::mem::offset_of!(SharedUniforms, resolution), 48);
    }
}
