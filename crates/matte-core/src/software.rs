//! CPU compositing backend.
//!
//! Composites into an in-memory [`PixelFrame`] with the same premultiplied
//! math the GPU shaders use. Hosts fetch the frame after each render and
//! present it however they like; this is also the tier of last resort when
//! no GPU device comes up.

use crate::backend::{BackendKind, OverlayRenderer};
use crate::bitmap::CueBitmap;
use crate::color::ColorMatrix;
use crate::error::RenderError;
use crate::frame::PixelFrame;
use crate::resize::PendingResize;

pub struct SoftwareRenderer {
    frame: PixelFrame,
    matrix: ColorMatrix,
    pending: PendingResize,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: PixelFrame::new(width, height),
            matrix: ColorMatrix::IDENTITY,
            pending: PendingResize::new(),
        }
    }

    fn blend_cue(&mut self, cue: &CueBitmap, heap: &[u8]) {
        let opacity = cue.color.opacity();
        if opacity == 0.0 {
            return;
        }
        let [r, g, b] = self.matrix.apply(cue.color.rgb_f32());

        let frame_w = i64::from(self.frame.width());
        let frame_h = i64::from(self.frame.height());
        for row in 0..cue.height {
            let y = i64::from(cue.dest_y) + i64::from(row);
            if y < 0 || y >= frame_h {
                continue;
            }
            let mask = cue.mask_row(heap, row);
            for col in 0..cue.width {
                let x = i64::from(cue.dest_x) + i64::from(col);
                if x < 0 || x >= frame_w {
                    continue;
                }
                let coverage = mask[col as usize];
                if coverage == 0 {
                    continue;
                }

                let alpha = opacity * f32::from(coverage) / 255.0;
                let (x, y) = (x as u32, y as u32);
                let dst = self.frame.pixel(x, y);
                let keep = 1.0 - alpha;
                // source over, premultiplied; the store clamp mirrors what
                // an unorm render target does with out-of-gamut values
                let blend = |src: f32, dst: u8| -> u8 {
                    (src * alpha * 255.0 + f32::from(dst) * keep)
                        .round()
                        .clamp(0.0, 255.0) as u8
                };
                self.frame.set_pixel(
                    x,
                    y,
                    [
                        blend(r, dst[0]),
                        blend(g, dst[1]),
                        blend(b, dst[2]),
                        (alpha * 255.0 + f32::from(dst[3]) * keep)
                            .round()
                            .clamp(0.0, 255.0) as u8,
                    ],
                );
            }
        }
    }
}

impl OverlayRenderer for SoftwareRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn set_color_matrix(&mut self, matrix: ColorMatrix) {
        self.matrix = matrix;
    }

    fn schedule_resize(&mut self, width: u32, height: u32) {
        self.pending.schedule(width, height);
    }

    fn render(&mut self, bitmaps: &[CueBitmap], heap: &[u8]) -> Result<(), RenderError> {
        if let Some((width, height)) = self.pending.take() {
            self.frame.resize(width, height);
        } else {
            self.frame.clear();
        }

        for cue in bitmaps {
            if !cue.is_renderable(heap.len()) {
                log::debug!(
                    "skipping invalid mask at ({}, {}): {}x{} stride {} offset {}",
                    cue.dest_x,
                    cue.dest_y,
                    cue.width,
                    cue.height,
                    cue.stride,
                    cue.heap_offset
                );
                continue;
            }
            self.blend_cue(cue, heap);
        }
        Ok(())
    }

    fn frame(&self) -> Option<&PixelFrame> {
        Some(&self.frame)
    }
}
