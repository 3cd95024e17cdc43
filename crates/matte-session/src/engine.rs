//! The boundary to the external subtitle layout engine.

use matte_core::{ColorSpace, CueBitmap};

use crate::error::EngineError;

/// One frame's worth of layout output.
pub struct FrameUpdate<'a> {
    /// False when the picture is identical to the previous call's.
    pub changed: bool,
    /// Bitmaps to composite, in paint order.
    pub bitmaps: Vec<CueBitmap>,
    /// The mask heap the bitmaps point into. Only valid for this call; the
    /// engine may reallocate it before the next one, so offsets are never
    /// cached across frames.
    pub heap: &'a [u8],
}

/// The subtitle layout engine the compositor drives.
///
/// Implementations wrap whatever shapes and rasterizes subtitle events into
/// coverage masks. Every call happens on the rendering thread that owns the
/// engine; any engine error is fatal for the session.
pub trait LayoutEngine: Send {
    /// Produce the bitmap list for `time` in seconds. When `force` is set
    /// the full list is returned even if the picture did not change.
    fn render_frame(&mut self, time: f64, force: bool) -> Result<FrameUpdate<'_>, EngineError>;

    /// Load a subtitle track from its textual content, replacing any
    /// current one.
    fn set_track(&mut self, content: &str) -> Result<(), EngineError>;

    /// Drop the active track. Subsequent renders produce nothing.
    fn free_track(&mut self);

    /// Propagate surface and video dimensions to the layouter.
    fn set_layout_size(&mut self, width: u32, height: u32, video_width: u32, video_height: u32);

    /// The color space the active track's header declares, if any.
    fn color_space(&self) -> Option<ColorSpace>;
}
