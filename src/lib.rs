//! matte: a frame-synchronized subtitle overlay compositor.
//!
//! The workspace splits into [`matte_core`] (bitmap model, color
//! reconciliation, backend renderers), [`matte_session`] (demand scheduling
//! and the rendering thread), and [`matte_config`] (on-disk settings). This
//! facade re-exports the pieces most hosts need.

pub use matte_config::MatteConfig;
pub use matte_core::{
    BackendKind, ColorMatrix, ColorReconciler, ColorSpace, CueBitmap, OverlayRenderer,
    PackedColor, PixelFrame,
};
pub use matte_session::{
    ColorProbeError, EngineError, FrameUpdate, LayoutEngine, Session, SessionEvent,
    SessionOptions, SurfaceSource,
};
