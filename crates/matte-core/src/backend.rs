//! Backend selection and the renderer contract.
//!
//! Three backends implement [`OverlayRenderer`]: the batched texture-array
//! backend, the one-quad-per-draw legacy backend, and a CPU compositor.
//! [`create_renderer`] walks them in capability order and returns the first
//! one that comes up, so a broken driver degrades the overlay instead of
//! killing it.

use crate::bitmap::CueBitmap;
use crate::color::ColorMatrix;
use crate::context::{DeviceTier, GpuContext};
use crate::error::{RenderError, SurfaceError};
use crate::frame::PixelFrame;
use crate::legacy::QuadRenderer;
use crate::modern::ArrayRenderer;
use crate::software::SoftwareRenderer;

/// Which backend implementation is behind an [`OverlayRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    GpuModern,
    GpuLegacy,
    Software,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::GpuModern => "gpu-modern",
            BackendKind::GpuLegacy => "gpu-legacy",
            BackendKind::Software => "software",
        }
    }

    /// Parse a configuration label. Unknown labels (including "auto") mean
    /// no forced preference.
    pub fn from_label(label: &str) -> Option<BackendKind> {
        match label {
            "gpu-modern" => Some(BackendKind::GpuModern),
            "gpu-legacy" => Some(BackendKind::GpuLegacy),
            "software" => Some(BackendKind::Software),
            _ => None,
        }
    }
}

/// A compositing backend.
///
/// One renderer owns one output target. All methods run on the thread that
/// owns the renderer; implementations clip to the current surface and skip
/// bitmaps that fail validation rather than failing the frame.
pub trait OverlayRenderer: Send {
    fn kind(&self) -> BackendKind;

    /// Replace the fill-color correction matrix. Takes effect on the next
    /// render.
    fn set_color_matrix(&mut self, matrix: ColorMatrix);

    /// Park new surface dimensions, applied at the top of the next render.
    fn schedule_resize(&mut self, width: u32, height: u32);

    /// Composite `bitmaps` over a cleared surface, in list order. The heap
    /// is only valid for this call. An error means the frame was dropped;
    /// the renderer stays usable.
    fn render(&mut self, bitmaps: &[CueBitmap], heap: &[u8]) -> Result<(), RenderError>;

    /// The composited frame, for backends that keep one in memory.
    fn frame(&self) -> Option<&PixelFrame> {
        None
    }
}

/// One initialization attempt in a fallback chain.
pub type BackendFactory<'a> =
    Box<dyn FnOnce() -> Result<Box<dyn OverlayRenderer>, SurfaceError> + 'a>;

/// Walk initialization attempts in order and return the first success.
///
/// A failed attempt has dropped everything it built by the time it returns,
/// so no partial backend state survives into the next attempt. The last
/// failure is reported when the whole chain is exhausted.
pub fn first_available(
    chain: Vec<(&'static str, BackendFactory<'_>)>,
) -> Result<Box<dyn OverlayRenderer>, SurfaceError> {
    let mut last = SurfaceError::Exhausted;
    for (name, factory) in chain {
        match factory() {
            Ok(renderer) => {
                log::info!("overlay backend ready: {}", renderer.kind().name());
                return Ok(renderer);
            }
            Err(err) => {
                log::warn!("{name} backend unavailable: {err}");
                last = err;
            }
        }
    }
    Err(last)
}

/// Bring up the best available backend for `surface`.
///
/// With no preference the order is GPU full tier, GPU downlevel tier, then
/// software. A forced preference restricts the chain to that backend alone,
/// so a forced GPU tier that fails reports its error instead of silently
/// degrading.
pub fn create_renderer(
    instance: &wgpu::Instance,
    surface: wgpu::Surface<'static>,
    width: u32,
    height: u32,
    prefer: Option<BackendKind>,
) -> Result<Box<dyn OverlayRenderer>, SurfaceError> {
    let tiers: Vec<DeviceTier> = match prefer {
        None => vec![DeviceTier::Full, DeviceTier::Downlevel],
        Some(BackendKind::GpuModern) => vec![DeviceTier::Full],
        Some(BackendKind::GpuLegacy) => vec![DeviceTier::Downlevel],
        Some(BackendKind::Software) => vec![],
    };

    let mut chain: Vec<(&'static str, BackendFactory<'_>)> = Vec::new();
    if !tiers.is_empty() {
        chain.push((
            "gpu",
            Box::new(move || gpu_renderer(instance, surface, width, height, &tiers)),
        ));
    }
    if matches!(prefer, None | Some(BackendKind::Software)) {
        chain.push((
            "software",
            Box::new(move || Ok(Box::new(SoftwareRenderer::new(width, height)) as Box<dyn OverlayRenderer>)),
        ));
    }
    first_available(chain)
}

/// Bring up the best GPU tier for `surface`.
///
/// The surface is threaded through failed tiers: a tier that fails has
/// dropped its device and adapter before handing the surface to the next.
fn gpu_renderer(
    instance: &wgpu::Instance,
    mut surface: wgpu::Surface<'static>,
    width: u32,
    height: u32,
    tiers: &[DeviceTier],
) -> Result<Box<dyn OverlayRenderer>, SurfaceError> {
    let mut last = SurfaceError::NoAdapter;
    for &tier in tiers {
        match GpuContext::new(instance, surface, width, height, tier) {
            Ok(ctx) => {
                let renderer: Box<dyn OverlayRenderer> = match tier {
                    DeviceTier::Full => Box::new(ArrayRenderer::new(ctx)),
                    DeviceTier::Downlevel => Box::new(QuadRenderer::new(ctx)),
                };
                return Ok(renderer);
            }
            Err((err, handed_back)) => {
                log::warn!("{tier:?} device tier unavailable: {err}");
                surface = handed_back;
                last = err;
            }
        }
    }
    Err(last)
}
