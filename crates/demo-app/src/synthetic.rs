//! A stand-in layout engine that emits animated coverage masks.
//!
//! Real deployments wrap a shaping/rasterizing subtitle engine behind
//! [`LayoutEngine`]; the demo fakes one with procedurally generated soft
//! boxes and a scrolling blob so the compositor path can be exercised
//! without any text stack. The heap is rebuilt from scratch every frame,
//! which also exercises the offsets-never-cached contract.

use matte_core::{ColorSpace, CueBitmap, PackedColor};
use matte_session::{EngineError, FrameUpdate, LayoutEngine};

/// Animation step rate. Two demands landing in the same step report an
/// unchanged picture, like a real engine does between keyframes.
const STEP_HZ: f64 = 30.0;

const BAND_HEIGHT: u32 = 48;
const BLOB_SIZE: u32 = 40;

pub struct SyntheticEngine {
    heap: Vec<u8>,
    width: u32,
    height: u32,
    /// Dialogue line count of the loaded track; drives how many bands show.
    dialogue_lines: usize,
    track_loaded: bool,
    last_step: Option<u64>,
}

impl SyntheticEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            heap: Vec::new(),
            width,
            height,
            dialogue_lines: 0,
            track_loaded: false,
            last_step: None,
        }
    }

    /// Append one mask to the heap, rows padded to an 8-byte stride the way
    /// a rasterizer with aligned scanlines would emit them.
    fn push_mask(
        heap: &mut Vec<u8>,
        width: u32,
        height: u32,
        mut coverage: impl FnMut(u32, u32) -> u8,
    ) -> (usize, u32) {
        let stride = (width + 7) & !7;
        let offset = heap.len();
        for y in 0..height {
            for x in 0..width {
                heap.push(coverage(x, y));
            }
            for _ in width..stride {
                heap.push(0);
            }
        }
        (offset, stride)
    }

    /// A box mask with a soft falloff toward every edge.
    fn band_mask(width: u32, height: u32) -> impl FnMut(u32, u32) -> u8 {
        move |x, y| {
            let edge_x = x.min(width - 1 - x).min(8) as f32 / 8.0;
            let edge_y = y.min(height - 1 - y).min(8) as f32 / 8.0;
            (edge_x.min(edge_y) * 255.0) as u8
        }
    }

    /// A radial blob mask.
    fn blob_mask(size: u32) -> impl FnMut(u32, u32) -> u8 {
        let half = size as f32 / 2.0;
        move |x, y| {
            let dx = (x as f32 + 0.5 - half) / half;
            let dy = (y as f32 + 0.5 - half) / half;
            let d = (dx * dx + dy * dy).sqrt();
            ((1.0 - d).clamp(0.0, 1.0) * 255.0) as u8
        }
    }
}

impl LayoutEngine for SyntheticEngine {
    fn render_frame(&mut self, time: f64, force: bool) -> Result<FrameUpdate<'_>, EngineError> {
        if !self.track_loaded {
            // one changed-and-empty frame after a track drop clears the surface
            let changed = self.last_step.take().is_some() || force;
            return Ok(FrameUpdate {
                changed,
                bitmaps: Vec::new(),
                heap: &self.heap,
            });
        }

        let step = (time.max(0.0) * STEP_HZ) as u64;
        if !force && self.last_step == Some(step) {
            return Ok(FrameUpdate {
                changed: false,
                bitmaps: Vec::new(),
                heap: &self.heap,
            });
        }
        self.last_step = Some(step);

        self.heap.clear();
        let mut bitmaps = Vec::new();

        // stacked dialogue bands at the bottom, opacity pulsing out of phase
        let band_width = (self.width * 3 / 5).max(16);
        let bands = self.dialogue_lines.min(3) as u32;
        for band in 0..bands {
            let (offset, stride) = Self::push_mask(
                &mut self.heap,
                band_width,
                BAND_HEIGHT,
                Self::band_mask(band_width, BAND_HEIGHT),
            );
            let phase = time * 2.0 + f64::from(band) * 1.3;
            let inverse_alpha = ((phase.sin() * 0.5 + 0.5) * 140.0) as u32;
            bitmaps.push(CueBitmap {
                dest_x: ((self.width - band_width) / 2) as i32,
                dest_y: self.height as i32 - ((band + 1) * (BAND_HEIGHT + 8)) as i32,
                width: band_width,
                height: BAND_HEIGHT,
                stride,
                heap_offset: offset,
                color: PackedColor(0xFFFF_FF00 | inverse_alpha),
            });
        }

        // a blob scrolling along the top edge, deliberately allowed to leave
        // the surface so backend clipping is exercised
        let (offset, stride) = Self::push_mask(
            &mut self.heap,
            BLOB_SIZE,
            BLOB_SIZE,
            Self::blob_mask(BLOB_SIZE),
        );
        let span = f64::from(self.width) + f64::from(BLOB_SIZE) * 2.0;
        let x = (time * 120.0) % span - f64::from(BLOB_SIZE);
        bitmaps.push(CueBitmap {
            dest_x: x as i32,
            dest_y: 12,
            width: BLOB_SIZE,
            height: BLOB_SIZE,
            stride,
            heap_offset: offset,
            color: PackedColor(0xFFCC_2000),
        });

        Ok(FrameUpdate {
            changed: true,
            bitmaps,
            heap: &self.heap,
        })
    }

    fn set_track(&mut self, content: &str) -> Result<(), EngineError> {
        self.dialogue_lines = content
            .lines()
            .filter(|line| line.trim_start().starts_with("Dialogue:"))
            .count();
        if self.dialogue_lines == 0 {
            return Err(EngineError::TrackLoad(
                "track contains no dialogue events".into(),
            ));
        }
        self.track_loaded = true;
        self.last_step = None;
        Ok(())
    }

    fn free_track(&mut self) {
        self.track_loaded = false;
        self.dialogue_lines = 0;
    }

    fn set_layout_size(&mut self, width: u32, height: u32, _video_width: u32, _video_height: u32) {
        if width > 0 && height > 0 && (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.last_step = None;
        }
    }

    fn color_space(&self) -> Option<ColorSpace> {
        self.track_loaded.then_some(ColorSpace::Bt601)
    }
}
