//! The bitmap model shared by every backend.
//!
//! A subtitle frame arrives as a list of [`CueBitmap`]s pointing into one
//! byte heap owned by the layout engine. Each bitmap is a single-channel
//! coverage mask plus a packed fill color; compositing tints the mask and
//! blends it over the video in list order.

/// A fill color packed as `0xRRGGBBAA` with the alpha byte inverted:
/// 0 means fully opaque, 255 fully transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedColor(pub u32);

impl PackedColor {
    pub const OPAQUE_WHITE: PackedColor = PackedColor(0xFFFF_FF00);

    pub fn red(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn blue(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// The raw alpha byte, still inverted.
    pub fn inverse_alpha(self) -> u8 {
        self.0 as u8
    }

    /// Opacity in `[0, 1]`, with the inversion resolved.
    pub fn opacity(self) -> f32 {
        1.0 - f32::from(self.inverse_alpha()) / 255.0
    }

    /// RGB channels normalized to `[0, 1]`.
    pub fn rgb_f32(self) -> [f32; 3] {
        [
            f32::from(self.red()) / 255.0,
            f32::from(self.green()) / 255.0,
            f32::from(self.blue()) / 255.0,
        ]
    }
}

/// One positioned subtitle mask inside the engine's bitmap heap.
///
/// `heap_offset` addresses the first mask byte; rows are `stride` bytes
/// apart and only the first `width` bytes of each row are coverage data.
/// The heap may move between frames, so offsets are resolved against the
/// slice handed to the renderer on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueBitmap {
    /// Destination position on the surface, in pixels. May be negative or
    /// otherwise off-surface; backends clip.
    pub dest_x: i32,
    pub dest_y: i32,
    /// Mask extent in pixels.
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive mask rows.
    pub stride: u32,
    /// Offset of the first mask byte in the heap.
    pub heap_offset: usize,
    pub color: PackedColor,
}

impl CueBitmap {
    /// Number of heap bytes the mask occupies, from `heap_offset` to the end
    /// of the last row. The last row only needs `width` bytes.
    pub fn heap_span(&self) -> Option<usize> {
        if self.width == 0 || self.height == 0 {
            return Some(0);
        }
        let rows = (self.height as usize - 1).checked_mul(self.stride as usize)?;
        rows.checked_add(self.width as usize)
    }

    /// Whether this bitmap can be composited from a heap of `heap_len`
    /// bytes. Degenerate extents, strides shorter than a row, and spans
    /// reaching past the heap are all rejected; callers skip such entries
    /// without treating the frame as failed.
    pub fn is_renderable(&self, heap_len: usize) -> bool {
        if self.width == 0 || self.height == 0 || self.stride < self.width {
            return false;
        }
        match self.heap_span() {
            Some(span) => match self.heap_offset.checked_add(span) {
                Some(end) => end <= heap_len,
                None => false,
            },
            None => false,
        }
    }

    /// The coverage bytes of `row`, without stride padding.
    ///
    /// Callers must have checked `is_renderable` against this heap first.
    pub fn mask_row<'a>(&self, heap: &'a [u8], row: u32) -> &'a [u8] {
        let start = self.heap_offset + row as usize * self.stride as usize;
        &heap[start..start + self.width as usize]
    }
}
