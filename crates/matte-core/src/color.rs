//! Color space reconciliation between subtitle tracks and video.
//!
//! Subtitle scripts are authored against the YCbCr matrix named in their
//! track header, but the video they sit on may have been decoded with a
//! different one. When the two disagree, fill colors are run through a
//! 3x3 correction matrix so the overlay matches what the author saw.
//! Coverage masks are untouched; only the fill color is corrected.

use bytemuck::{Pod, Zeroable};

/// A YCbCr color space a track or video stream can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Bt601,
    Bt709,
    Smpte240m,
    Fcc,
    /// The stream is straight RGB; no matrix was involved.
    Rgb,
}

impl ColorSpace {
    /// Map a track header's YCbCr matrix code. Unknown headers (code 1) get
    /// the historical BT.601 assumption; "none" and unrecognized codes
    /// disable correction.
    pub fn from_ycbcr_header(code: u32) -> Option<ColorSpace> {
        match code {
            1 | 3 | 4 => Some(ColorSpace::Bt601),
            5 | 6 => Some(ColorSpace::Bt709),
            7 | 8 => Some(ColorSpace::Smpte240m),
            9 | 10 => Some(ColorSpace::Fcc),
            _ => None,
        }
    }

    /// Map the color space label a video decoder reports.
    pub fn from_video_label(label: &str) -> Option<ColorSpace> {
        match label {
            "bt709" => Some(ColorSpace::Bt709),
            "bt470bg" | "smpte170m" => Some(ColorSpace::Bt601),
            "rgb" => Some(ColorSpace::Rgb),
            _ => None,
        }
    }
}

/// A 3x3 RGB correction matrix, stored as three vec4-padded columns so it
/// can be written straight into a `mat3x3<f32>` uniform.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorMatrix {
    pub cols: [[f32; 4]; 3],
}

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    /// Transform an RGB triple.
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (col, &v) in self.cols.iter().zip(rgb.iter()) {
            out[0] += col[0] * v;
            out[1] += col[1] * v;
            out[2] += col[2] * v;
        }
        out
    }

    /// The matrix applying `self` first, then `other`.
    pub fn then(&self, other: &ColorMatrix) -> ColorMatrix {
        let mut cols = [[0.0f32; 4]; 3];
        for c in 0..3 {
            for r in 0..3 {
                let mut sum = 0.0;
                for k in 0..3 {
                    sum += other.cols[k][r] * self.cols[c][k];
                }
                cols[c][r] = sum;
            }
        }
        ColorMatrix { cols }
    }

    pub fn is_identity(&self) -> bool {
        *self == ColorMatrix::IDENTITY
    }
}

const BT601_TO_BT709: ColorMatrix = ColorMatrix {
    cols: [
        [1.0863, 0.0965, -0.0141, 0.0],
        [-0.0723, 0.8451, -0.0277, 0.0],
        [-0.014, 0.0584, 1.0418, 0.0],
    ],
};

const BT709_TO_BT601: ColorMatrix = ColorMatrix {
    cols: [
        [0.9137, -0.1049, 0.0096, 0.0],
        [0.0784, 1.1722, 0.0322, 0.0],
        [0.0079, -0.0671, 0.9582, 0.0],
    ],
};

const FCC_TO_BT709: ColorMatrix = ColorMatrix {
    cols: [
        [1.0873, 0.0974, -0.0127, 0.0],
        [-0.0736, 0.8494, -0.0251, 0.0],
        [-0.0137, 0.0531, 1.0378, 0.0],
    ],
};

const FCC_TO_BT601: ColorMatrix = ColorMatrix {
    cols: [
        [1.001, 0.0009, 0.0013, 0.0],
        [-0.0008, 1.005, 0.0027, 0.0],
        [-0.0002, -0.006, 0.996, 0.0],
    ],
};

const SMPTE240M_TO_BT709: ColorMatrix = ColorMatrix {
    cols: [
        [0.9993, -0.0004, -0.0034, 0.0],
        [0.0006, 0.9812, -0.0114, 0.0],
        [0.0001, 0.0192, 1.0148, 0.0],
    ],
};

const SMPTE240M_TO_BT601: ColorMatrix = ColorMatrix {
    cols: [
        [0.913, -0.1051, 0.0063, 0.0],
        [0.0774, 1.1508, 0.0207, 0.0],
        [0.0096, -0.0456, 0.973, 0.0],
    ],
};

/// Correction matrix for subtitle colors authored against `from` shown over
/// video decoded as `to`. Equal spaces yield the identity; pairs without a
/// published matrix yield `None` and callers keep whatever they had.
pub fn conversion(from: ColorSpace, to: ColorSpace) -> Option<ColorMatrix> {
    use ColorSpace::*;
    if from == to {
        return Some(ColorMatrix::IDENTITY);
    }
    match (from, to) {
        (Bt601, Bt709) => Some(BT601_TO_BT709),
        (Bt709, Bt601) => Some(BT709_TO_BT601),
        (Fcc, Bt709) => Some(FCC_TO_BT709),
        (Fcc, Bt601) => Some(FCC_TO_BT601),
        (Smpte240m, Bt709) => Some(SMPTE240M_TO_BT709),
        (Smpte240m, Bt601) => Some(SMPTE240M_TO_BT601),
        _ => None,
    }
}

/// Tracks the subtitle-side and video-side color spaces and keeps the
/// active correction matrix current.
///
/// Either side may be unknown, in which case the matrix stays identity.
/// The dirty flag is raised whenever the matrix actually changes and is
/// consumed by the render path with [`ColorReconciler::take_dirty`].
#[derive(Debug)]
pub struct ColorReconciler {
    subtitle: Option<ColorSpace>,
    video: Option<ColorSpace>,
    matrix: ColorMatrix,
    dirty: bool,
}

impl Default for ColorReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorReconciler {
    pub fn new() -> Self {
        Self {
            subtitle: None,
            video: None,
            matrix: ColorMatrix::IDENTITY,
            dirty: false,
        }
    }

    /// Record the color space the loaded track declares. `None` when no
    /// track is loaded or the header named none.
    pub fn set_subtitle_space(&mut self, space: Option<ColorSpace>) {
        self.subtitle = space;
        self.recompute();
    }

    /// Record the color space the video was decoded with.
    pub fn set_video_space(&mut self, space: Option<ColorSpace>) {
        self.video = space;
        self.recompute();
    }

    pub fn matrix(&self) -> ColorMatrix {
        self.matrix
    }

    /// Whether the matrix changed since the last call. Reading clears the
    /// flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn recompute(&mut self) {
        let next = match (self.subtitle, self.video) {
            (Some(sub), Some(video)) => {
                conversion(sub, video).unwrap_or(ColorMatrix::IDENTITY)
            }
            _ => ColorMatrix::IDENTITY,
        };
        if next != self.matrix {
            self.matrix = next;
            self.dirty = true;
        }
    }
}
