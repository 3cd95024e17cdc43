//! matte-core: compositing backends for frame-synchronized subtitle
//! overlays.
//!
//! Subtitle frames arrive as lists of [`CueBitmap`] coverage masks pointing
//! into a byte heap. A backend implementing [`OverlayRenderer`] tints each
//! mask with its fill color, runs the color-space correction matrix, and
//! blends the result over a cleared transparent surface in list order.
//! [`create_renderer`] picks the best backend the machine can actually run.

/// Re-export wgpu for downstream crates while avoiding direct dependency leakage.
pub use wgpu;

mod backend;
mod bitmap;
mod color;
mod context;
mod error;
mod frame;
mod legacy;
mod modern;
mod resize;
mod software;

pub use backend::{BackendFactory, BackendKind, OverlayRenderer, create_renderer, first_available};
pub use bitmap::{CueBitmap, PackedColor};
pub use color::{ColorMatrix, ColorReconciler, ColorSpace, conversion};
pub use context::{
    DeviceTier, GpuContext, choose_overlay_surface_format, make_overlay_surface_config,
};
pub use error::{RenderError, Result, SurfaceError};
pub use frame::PixelFrame;
pub use legacy::QuadRenderer;
pub use modern::ArrayRenderer;
pub use resize::PendingResize;
pub use software::SoftwareRenderer;
