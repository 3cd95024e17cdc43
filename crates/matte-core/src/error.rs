//! Error types for backend setup and per-frame rendering.

use thiserror::Error;

/// Failure while bringing up or reconfiguring a render target. These abort
/// backend initialization; the caller falls back or surfaces the error.
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// No GPU adapter accepted the surface.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// The adapter refused the requested device limits.
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// The windowing handle could not be wrapped in a surface.
    #[error("surface creation failed: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    /// Every backend in the fallback chain failed.
    #[error("no overlay backend could be initialized")]
    Exhausted,
}

/// Per-frame failure inside a backend. Non-fatal: the frame is skipped and
/// the next render retries.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The surface rejected the frame (lost, outdated, or out of memory).
    #[error("surface rejected the frame: {0}")]
    Acquire(#[from] wgpu::SurfaceError),
}

pub type Result<T> = std::result::Result<T, SurfaceError>;
